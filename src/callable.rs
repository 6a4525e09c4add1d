use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    time::{self, Duration},
};

use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::interpreter::{Flow, Interpreter};
use crate::scope::{Scope, ScopeLink};
use crate::statement::FunctionDecl;
use crate::token::Token;
use crate::value::Val;

/// A function provided by the host.
pub struct NativeFn {
    pub name: &'static str,
    pub arity: usize,
    pub fun: fn(&[Val]) -> Result<Val, String>,
}

impl NativeFn {
    pub fn clock() -> Self {
        NativeFn {
            name: "clock",
            arity: 0,
            fun: |_| {
                Ok(Val::Num(
                    time::SystemTime::now()
                        .duration_since(time::UNIX_EPOCH)
                        .unwrap_or(Duration::ZERO)
                        .as_secs_f64(),
                ))
            },
        }
    }
}

/// A function or method written in the language, paired with its closure.
pub struct LangCallable {
    pub decl: Rc<FunctionDecl>,
    pub closure: ScopeLink,
    pub is_initializer: bool,
}

impl LangCallable {
    pub fn new(decl: Rc<FunctionDecl>, closure: ScopeLink, is_initializer: bool) -> Self {
        LangCallable {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    /// A copy of this method whose closure defines `this` as `instance`.
    pub fn bind(&self, instance: Rc<ClassInstance>) -> LangCallable {
        let scope = Scope::new_child(&self.closure);
        scope.borrow_mut().define("this".into(), Val::Instance(instance));
        LangCallable::new(self.decl.clone(), scope, self.is_initializer)
    }

    fn this(&self) -> Val {
        (*self.closure).borrow().try_get_here("this").unwrap_or(Val::Nil)
    }

    pub fn call(&self, interp: &mut Interpreter, args: Vec<Val>) -> Result<Val, RuntimeError> {
        let scope = Scope::new_child(&self.closure);
        {
            let mut bor = scope.borrow_mut();
            for (param, arg) in self.decl.params.iter().zip(args) {
                bor.define(param.lexeme.clone(), arg);
            }
        }

        let flow = interp.execute_block(&self.decl.body, scope)?;
        if self.is_initializer {
            return Ok(self.this());
        }
        match flow {
            Flow::Return(val) => Ok(val),
            _ => Ok(Val::Nil),
        }
    }
}

pub struct LangClass {
    pub name: Rc<str>,
    pub superclass: Option<Rc<LangClass>>,
    pub methods: FxHashMap<Rc<str>, Rc<LangCallable>>,
    /// Field initializers of a class that has no `init` of its own.
    pub fields: Option<Rc<LangCallable>>,
    pub static_methods: FxHashMap<Rc<str>, Rc<LangCallable>>,
    statics: RefCell<FxHashMap<Rc<str>, Val>>,
}

impl LangClass {
    pub fn new(
        name: Rc<str>,
        superclass: Option<Rc<LangClass>>,
        methods: FxHashMap<Rc<str>, Rc<LangCallable>>,
        fields: Option<Rc<LangCallable>>,
        static_methods: FxHashMap<Rc<str>, Rc<LangCallable>>,
    ) -> Self {
        LangClass {
            name,
            superclass,
            methods,
            fields,
            static_methods,
            statics: Default::default(),
        }
    }

    /// Nearest definition along the superclass chain wins.
    pub fn find_method(&self, name: &str) -> Option<Rc<LangCallable>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass.as_ref()?.find_method(name)
    }

    /// Takes after the nearest `init` up the chain.
    pub fn arity(&self) -> usize {
        match (self.methods.get("init"), &self.superclass) {
            (Some(init), _) => init.arity(),
            (None, Some(superclass)) => superclass.arity(),
            (None, None) => 0,
        }
    }

    /// `init` of `class` bound to `instance`.
    pub fn initializer(class: &Rc<LangClass>, instance: Rc<ClassInstance>) -> Callable {
        match class.methods.get("init") {
            Some(init) => Callable::Function(Rc::new(init.bind(instance))),
            None => Callable::Initializer(Rc::new(Initializer {
                class: class.clone(),
                instance,
            })),
        }
    }

    /// Runs the class's own `init`. Without one, runs the inherited
    /// initializer followed by the class's field initializers.
    fn initialize(
        class: &Rc<LangClass>,
        interp: &mut Interpreter,
        instance: &Rc<ClassInstance>,
        args: Vec<Val>,
    ) -> Result<(), RuntimeError> {
        if let Some(init) = class.methods.get("init") {
            init.bind(instance.clone()).call(interp, args)?;
            return Ok(());
        }
        if let Some(superclass) = &class.superclass {
            Self::initialize(superclass, interp, instance, args)?;
        }
        if let Some(fields) = &class.fields {
            fields.bind(instance.clone()).call(interp, vec![])?;
        }
        Ok(())
    }

    /// Static fields first, then static methods, each searched up the chain.
    pub fn get_static(&self, name: &str) -> Option<Val> {
        if let Some(val) = self.statics.borrow().get(name) {
            return Some(val.clone());
        }
        if let Some(method) = self.static_methods.get(name) {
            return Some(Val::Callable(Callable::Function(method.clone())));
        }
        self.superclass.as_ref()?.get_static(name)
    }

    pub fn set_static(&self, name: Rc<str>, val: Val) {
        self.statics.borrow_mut().insert(name, val);
    }

    fn construct(class: &Rc<LangClass>, interp: &mut Interpreter, args: Vec<Val>) -> Result<Val, RuntimeError> {
        let instance = Rc::new(ClassInstance::new(class.clone()));
        Self::initialize(class, interp, &instance, args)?;
        Ok(Val::Instance(instance))
    }
}

/// `init` of a class that doesn't declare one, bound to an instance.
pub struct Initializer {
    class: Rc<LangClass>,
    instance: Rc<ClassInstance>,
}

impl Initializer {
    fn call(&self, interp: &mut Interpreter, args: Vec<Val>) -> Result<Val, RuntimeError> {
        LangClass::initialize(&self.class, interp, &self.instance, args)?;
        Ok(Val::Instance(self.instance.clone()))
    }
}

pub struct ClassInstance {
    pub class: Rc<LangClass>,
    fields: RefCell<FxHashMap<Rc<str>, Val>>,
}

impl ClassInstance {
    pub fn new(class: Rc<LangClass>) -> Self {
        ClassInstance {
            class,
            fields: Default::default(),
        }
    }

    /// Own fields shadow methods; methods come back bound to this instance.
    pub fn get(this: &Rc<ClassInstance>, name: &Token) -> Result<Val, RuntimeError> {
        if let Some(val) = this.fields.borrow().get(&*name.lexeme) {
            return Ok(val.clone());
        }
        if &*name.lexeme == "init" {
            return Ok(Val::Callable(LangClass::initializer(&this.class, this.clone())));
        }
        match this.class.find_method(&name.lexeme) {
            Some(method) => Ok(Val::Callable(Callable::Function(Rc::new(method.bind(this.clone()))))),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    pub fn set(&self, name: &Token, val: Val) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), val);
    }
}

#[derive(Clone)]
pub enum Callable {
    Native(Rc<NativeFn>),
    Function(Rc<LangCallable>),
    Initializer(Rc<Initializer>),
    Class(Rc<LangClass>),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Self::Native(native) => native.arity,
            Self::Function(fun) => fun.arity(),
            Self::Initializer(init) => init.class.arity(),
            Self::Class(class) => class.arity(),
        }
    }

    pub fn call(&self, interp: &mut Interpreter, args: Vec<Val>, paren: &Token) -> Result<Val, RuntimeError> {
        if self.arity() != args.len() {
            return Err(RuntimeError::new(
                paren,
                format!("Expected {} arguments but got {}.", self.arity(), args.len()),
            ));
        }
        match self {
            Self::Native(native) => (native.fun)(&args).map_err(|msg| RuntimeError::new(paren, msg)),
            Self::Function(fun) => fun.call(interp, args),
            Self::Initializer(init) => init.call(interp, args),
            Self::Class(class) => LangClass::construct(class, interp, args),
        }
    }

    /// Reference identity.
    pub fn same(&self, other: &Callable) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Initializer(a), Self::Initializer(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(native) => write!(f, "<native fn {}>", native.name),
            Self::Function(fun) => write!(f, "<fn {}>", fun.decl.name.lexeme),
            Self::Initializer(_) => write!(f, "<fn init>"),
            Self::Class(class) => write!(f, "{}", class.name),
        }
    }
}

// Closures and instances can reach themselves through their scopes, so
// Debug only names them.
impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}
