use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::token::Token;
use crate::value::Val;

pub type ScopeLink = Rc<RefCell<Scope>>;

/// One lexical environment. Children share their parent, closures keep it alive.
#[derive(Debug, Default)]
pub struct Scope {
    stack: FxHashMap<Rc<str>, Val>,
    parent: Option<ScopeLink>,
}

fn undefined(name: &Token) -> RuntimeError {
    RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme))
}

impl Scope {
    pub fn new_global() -> ScopeLink {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn new_child(this: &ScopeLink) -> ScopeLink {
        Rc::new(RefCell::new(Scope {
            stack: Default::default(),
            parent: Some(this.clone()),
        }))
    }

    /// The outermost scope of the chain `this` belongs to.
    pub fn global_of(this: &ScopeLink) -> ScopeLink {
        let mut cur = this.clone();
        loop {
            let next = (*cur).borrow().parent.clone();
            match next {
                Some(next) => cur = next,
                None => return cur,
            }
        }
    }

    pub fn try_get_here(&self, id: &str) -> Option<Val> {
        self.stack.get(id).cloned()
    }

    pub fn define(&mut self, id: Rc<str>, val: Val) {
        self.stack.insert(id, val);
    }

    /// Looks `name` up along the whole chain.
    pub fn get(&self, name: &Token) -> Result<Val, RuntimeError> {
        if let Some(val) = self.stack.get(&*name.lexeme) {
            return Ok(val.clone());
        }
        match &self.parent {
            Some(parent) => (**parent).borrow().get(name),
            None => Err(undefined(name)),
        }
    }

    pub fn assign(&mut self, name: &Token, val: Val) -> Result<(), RuntimeError> {
        if let Some(slot) = self.stack.get_mut(&*name.lexeme) {
            *slot = val;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => (**parent).borrow_mut().assign(name, val),
            None => Err(undefined(name)),
        }
    }

    // self is of type &Scope, the rest of the elements
    // of the chain are of type ScopeLink. Callers handle dist == 0 themselves.
    fn ancestor(&self, dist: usize) -> Option<ScopeLink> {
        let mut cur = self.parent.clone()?;
        for _ in 1..dist {
            let next = (*cur).borrow().parent.clone()?;
            cur = next;
        }
        Some(cur)
    }

    /// Reads `name` exactly `dist` links up the chain, without searching.
    pub fn get_at(&self, dist: usize, name: &Token) -> Result<Val, RuntimeError> {
        if dist == 0 {
            return self.try_get_here(&name.lexeme).ok_or_else(|| undefined(name));
        }
        let scope = self.ancestor(dist).ok_or_else(|| undefined(name))?;
        let found = (*scope).borrow().try_get_here(&name.lexeme);
        found.ok_or_else(|| undefined(name))
    }

    pub fn assign_at(&mut self, dist: usize, name: &Token, val: Val) -> Result<(), RuntimeError> {
        if dist == 0 {
            self.stack.insert(name.lexeme.clone(), val);
            return Ok(());
        }
        let scope = self.ancestor(dist).ok_or_else(|| undefined(name))?;
        (*scope).borrow_mut().stack.insert(name.lexeme.clone(), val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn name(id: &str) -> Token {
        Token::new(TokenType::Identifier(id.into()), id, 1, 1)
    }

    #[test]
    fn lookups_walk_the_chain() {
        let global = Scope::new_global();
        global.borrow_mut().define("a".into(), Val::Num(1.0));
        let child = Scope::new_child(&global);
        let grandchild = Scope::new_child(&child);

        assert_eq!(grandchild.borrow().get(&name("a")), Ok(Val::Num(1.0)));
        grandchild.borrow_mut().assign(&name("a"), Val::Num(2.0)).unwrap();
        assert_eq!(global.borrow().try_get_here("a"), Some(Val::Num(2.0)));

        let err = grandchild.borrow().get(&name("b")).unwrap_err();
        assert_eq!(err.message, "Undefined variable 'b'.");
        assert!(grandchild.borrow_mut().assign(&name("b"), Val::Nil).is_err());
    }

    #[test]
    fn distances_pick_the_shadowed_binding() {
        let global = Scope::new_global();
        global.borrow_mut().define("x".into(), Val::Num(1.0));
        let child = Scope::new_child(&global);
        child.borrow_mut().define("x".into(), Val::Num(2.0));

        assert_eq!(child.borrow().get_at(0, &name("x")), Ok(Val::Num(2.0)));
        assert_eq!(child.borrow().get_at(1, &name("x")), Ok(Val::Num(1.0)));

        child.borrow_mut().assign_at(1, &name("x"), Val::Num(3.0)).unwrap();
        assert_eq!(global.borrow().try_get_here("x"), Some(Val::Num(3.0)));
        assert_eq!(child.borrow().try_get_here("x"), Some(Val::Num(2.0)));

        assert!(child.borrow().get_at(5, &name("x")).is_err());
    }

    #[test]
    fn global_of_finds_the_root() {
        let global = Scope::new_global();
        let inner = Scope::new_child(&Scope::new_child(&global));
        assert!(Rc::ptr_eq(&Scope::global_of(&inner), &global));
    }
}
