use std::{cell::RefCell, io::Write, rc::Rc};

use rustc_hash::FxHashMap;

use crate::callable::{Callable, ClassInstance, LangCallable, LangClass, NativeFn};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::expr::{Expr, ExprId, VarRef};
use crate::scope::{Scope, ScopeLink};
use crate::stack::ensure_sufficient_stack;
use crate::statement::{ClassDecl, FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::Val;

/// Where `print` writes to.
pub type Output = Rc<RefCell<dyn Write>>;

/// Binding distances by node identity, as computed by the resolver.
pub type Bindings = FxHashMap<ExprId, usize>;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Val),
    Break,
    Continue,
}

pub struct Interpreter {
    global_scope: ScopeLink,
    environment: ScopeLink,
    bindings: Bindings,
    output: Output,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Self::with_output(Rc::new(RefCell::new(std::io::stdout())), &Config::default())
    }

    pub fn with_output(output: Output, config: &Config) -> Interpreter {
        let global_scope = Scope::new_global();
        global_scope
            .borrow_mut()
            .define("clock".into(), Val::Callable(Callable::Native(Rc::new(NativeFn::clock()))));
        Interpreter {
            environment: global_scope.clone(),
            global_scope,
            bindings: Default::default(),
            output,
            depth: 0,
            max_depth: config.max_call_depth,
        }
    }

    /// Records that the name at `id` lives `depth` scopes up from its use.
    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.bindings.insert(id, depth);
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Takes over the binding distances of another file's code.
    pub fn merge_bindings(&mut self, other: &Bindings) {
        self.bindings.extend(other.iter().map(|(id, depth)| (*id, *depth)));
    }

    pub fn globals(&self) -> ScopeLink {
        self.global_scope.clone()
    }

    pub fn get_global(&self, id: &str) -> Option<Val> {
        (*self.global_scope).borrow().try_get_here(id)
    }

    pub fn define_global(&mut self, id: Rc<str>, val: Val) {
        (*self.global_scope).borrow_mut().define(id, val);
    }

    pub fn interpret(&mut self, program: &[Stmt]) -> Result<(), RuntimeError> {
        tracing::debug!(statements = program.len(), "interpreting");
        for stmt in program {
            self.execute(stmt)?;
        }
        Ok(())
    }

    /// Runs `stmts` inside `scope`, restoring the current scope on every exit path.
    pub fn execute_block(&mut self, stmts: &[Stmt], scope: ScopeLink) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.environment, scope);
        let result = self.execute_all(stmts);
        self.environment = previous;
        result
    }

    fn execute_all(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.execute(stmt)? {
                Flow::Normal => continue,
                interrupted => return Ok(interrupted),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        ensure_sufficient_stack(|| self.execute_inner(stmt))
    }

    fn execute_inner(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Print(keyword, expr) => {
                let val = self.evaluate(expr)?;
                writeln!(self.output.borrow_mut(), "{}", val)
                    .map_err(|e| RuntimeError::new(keyword, format!("Can't print: {e}.")))?;
            }
            Stmt::Expr(expr) => {
                self.evaluate(expr)?;
            }
            Stmt::Var(id, _, val) => {
                let val = match val {
                    Some(val) => self.evaluate(val)?,
                    None => Val::Nil,
                };
                (*self.environment).borrow_mut().define(id.lexeme.clone(), val);
            }
            Stmt::Block { body, scoped: true } => {
                let child = Scope::new_child(&self.environment);
                return self.execute_block(body, child);
            }
            Stmt::Block { body, scoped: false } => return self.execute_all(body),
            Stmt::If(cond, stmt, other) => {
                if self.evaluate(cond)?.truthy() {
                    return self.execute(stmt);
                } else if let Some(other) = other {
                    return self.execute(other);
                }
            }
            Stmt::While { cond, body, increment } => {
                while self.evaluate(cond)?.truthy() {
                    match self.execute(body)? {
                        Flow::Break => break,
                        Flow::Return(val) => return Ok(Flow::Return(val)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(increment) = increment {
                        self.evaluate(increment)?;
                    }
                }
            }
            Stmt::Return(_, Some(expr)) => return Ok(Flow::Return(self.evaluate(expr)?)),
            Stmt::Return(_, None) => return Ok(Flow::Return(Val::Nil)),
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Continue(_) => return Ok(Flow::Continue),
            Stmt::Function(decl) => {
                let fun = LangCallable::new(decl.clone(), self.environment.clone(), false);
                (*self.environment)
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), Val::Callable(Callable::Function(Rc::new(fun))));
            }
            Stmt::Class(decl) => self.class(decl)?,
            // Both were settled by the resolver before execution started.
            Stmt::Import(_) | Stmt::Expose(..) => {}
        }
        Ok(Flow::Normal)
    }

    fn class(&mut self, decl: &ClassDecl) -> Result<(), RuntimeError> {
        let name = &decl.name;
        // Methods may refer to the class before it is finished.
        (*self.environment).borrow_mut().define(name.lexeme.clone(), Val::Nil);

        let superclass = match &decl.superclass {
            Some(sup) => match self.look_up(sup)? {
                Val::Callable(Callable::Class(class)) => Some(class),
                _ => return Err(RuntimeError::new(&sup.name, "Superclass must be a class.")),
            },
            None => None,
        };

        let class_scope = match &superclass {
            Some(sup) => {
                let scope = Scope::new_child(&self.environment);
                scope
                    .borrow_mut()
                    .define("super".into(), Val::Callable(Callable::Class(sup.clone())));
                scope
            }
            None => self.environment.clone(),
        };

        let build = |decls: &[Rc<FunctionDecl>], instance: bool| {
            decls
                .iter()
                .map(|fun| {
                    // `init` only means something on instances.
                    let is_init = instance && &*fun.name.lexeme == "init";
                    let method = LangCallable::new(fun.clone(), class_scope.clone(), is_init);
                    (fun.name.lexeme.clone(), Rc::new(method))
                })
                .collect::<FxHashMap<_, _>>()
        };
        let methods = build(&decl.methods, true);
        let static_methods = build(&decl.static_methods, false);
        let fields = decl
            .fields
            .as_ref()
            .map(|fields| Rc::new(LangCallable::new(fields.clone(), class_scope.clone(), false)));

        let class = Rc::new(LangClass::new(
            name.lexeme.clone(),
            superclass,
            methods,
            fields,
            static_methods,
        ));

        let previous = std::mem::replace(&mut self.environment, class_scope);
        let statics = decl.static_fields.iter().try_for_each(|field| -> Result<(), RuntimeError> {
            let val = match &field.init {
                Some(init) => self.evaluate(init)?,
                None => Val::Nil,
            };
            class.set_static(field.name.lexeme.clone(), val);
            Ok(())
        });
        self.environment = previous;
        statics?;

        (*self.environment)
            .borrow_mut()
            .assign_at(0, name, Val::Callable(Callable::Class(class)))
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Val, RuntimeError> {
        ensure_sufficient_stack(|| self.evaluate_inner(expr))
    }

    fn evaluate_inner(&mut self, expr: &Expr) -> Result<Val, RuntimeError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Unary(op, x) => {
                let l = self.evaluate(x)?;
                match (&op.data, l) {
                    (TokenType::Bang, a) => Ok(Val::Bool(!a.truthy())),
                    (TokenType::Minus, Val::Num(a)) => Ok(Val::Num(-a)),
                    _ => Err(RuntimeError::new(op, "Operand must be a number.")),
                }
            }
            Expr::Binary(x, op, y) => {
                let l = self.evaluate(x)?;
                let r = self.evaluate(y)?;
                binary(op, &op.data, l, r)
            }
            Expr::Logical(x, op, y) => {
                let l = self.evaluate(x)?;
                let short_circuit = match op.data {
                    TokenType::Or => l.truthy(),
                    _ => !l.truthy(),
                };
                if short_circuit {
                    Ok(l)
                } else {
                    self.evaluate(y)
                }
            }
            Expr::Ternary(cond, then, other) => {
                if self.evaluate(cond)?.truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(other)
                }
            }
            Expr::Comma(exprs) => {
                let mut last = Val::Nil;
                for expr in exprs {
                    last = self.evaluate(expr)?;
                }
                Ok(last)
            }
            Expr::Variable(var) | Expr::This(var) => self.look_up(var),
            Expr::Assign(var, val) => {
                let r = self.evaluate(val)?;
                self.assign(var, r.clone())?;
                Ok(r)
            }
            Expr::CompoundAssign(var, op, val) => {
                let l = self.look_up(var)?;
                let r = self.evaluate(val)?;
                let result = compound(op, l, r)?;
                self.assign(var, result.clone())?;
                Ok(result)
            }
            Expr::Call(callee, paren, args) => {
                let callee = self.evaluate(callee)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.evaluate(arg)?);
                }
                match callee {
                    Val::Callable(callable) => self.call(&callable, evaluated, paren),
                    _ => Err(RuntimeError::new(paren, "Can only call functions and classes.")),
                }
            }
            Expr::Get(target, name) => match self.evaluate(target)? {
                Val::Instance(instance) => ClassInstance::get(&instance, name),
                Val::Callable(Callable::Class(class)) => class
                    .get_static(&name.lexeme)
                    .ok_or_else(|| undefined_property(name)),
                _ => Err(RuntimeError::new(name, "Only instances and classes have properties.")),
            },
            Expr::Set(target, name, op, val) => {
                let target = self.evaluate(target)?;
                if !matches!(target, Val::Instance(_) | Val::Callable(Callable::Class(_))) {
                    return Err(RuntimeError::new(name, "Only instances and classes have fields."));
                }
                let mut val = self.evaluate(val)?;
                if let Some(op) = op {
                    let current = match &target {
                        Val::Instance(instance) => ClassInstance::get(instance, name)?,
                        Val::Callable(Callable::Class(class)) => class
                            .get_static(&name.lexeme)
                            .ok_or_else(|| undefined_property(name))?,
                        _ => Val::Nil,
                    };
                    val = compound(op, current, val)?;
                }
                match &target {
                    Val::Instance(instance) => instance.set(name, val.clone()),
                    Val::Callable(Callable::Class(class)) => class.set_static(name.lexeme.clone(), val.clone()),
                    _ => {}
                }
                Ok(val)
            }
            Expr::Super(keyword, method) => {
                let misplaced = || RuntimeError::new(&keyword.name, "Can't use 'super' here.");
                // `this` always sits one scope inside `super`.
                let dist = self.bindings.get(&keyword.id).copied().ok_or_else(misplaced)?;
                let this_dist = dist.checked_sub(1).ok_or_else(misplaced)?;
                let superclass = (*self.environment).borrow().get_at(dist, &keyword.name)?;
                let this = Token::synthetic(TokenType::This, "this", &keyword.name);
                let instance = (*self.environment).borrow().get_at(this_dist, &this)?;
                match (superclass, instance) {
                    (Val::Callable(Callable::Class(class)), Val::Instance(instance)) if &*method.lexeme == "init" => {
                        Ok(Val::Callable(LangClass::initializer(&class, instance)))
                    }
                    (Val::Callable(Callable::Class(class)), Val::Instance(instance)) => {
                        let found = class.find_method(&method.lexeme).ok_or_else(|| undefined_property(method))?;
                        Ok(Val::Callable(Callable::Function(Rc::new(found.bind(instance)))))
                    }
                    _ => Err(misplaced()),
                }
            }
        }
    }

    /// Invokes `callable`, bounding how deep language-level calls may nest.
    pub fn call(&mut self, callable: &Callable, args: Vec<Val>, paren: &Token) -> Result<Val, RuntimeError> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::new(paren, "Stack overflow."));
        }
        tracing::trace!(callee = %callable, depth = self.depth, "call");
        self.depth += 1;
        let result = ensure_sufficient_stack(|| callable.call(self, args, paren));
        self.depth -= 1;
        result
    }

    fn look_up(&self, var: &VarRef) -> Result<Val, RuntimeError> {
        match self.bindings.get(&var.id) {
            Some(&dist) => (*self.environment).borrow().get_at(dist, &var.name),
            None => {
                let globals = Scope::global_of(&self.environment);
                let found = (*globals).borrow().get(&var.name);
                found
            }
        }
    }

    fn assign(&mut self, var: &VarRef, val: Val) -> Result<(), RuntimeError> {
        match self.bindings.get(&var.id) {
            Some(&dist) => (*self.environment).borrow_mut().assign_at(dist, &var.name, val),
            None => {
                let globals = Scope::global_of(&self.environment);
                let assigned = (*globals).borrow_mut().assign(&var.name, val);
                assigned
            }
        }
    }
}

fn undefined_property(name: &Token) -> RuntimeError {
    RuntimeError::new(name, format!("Undefined property '{}'.", name.lexeme))
}

fn compound(op: &Token, l: Val, r: Val) -> Result<Val, RuntimeError> {
    match op.data.compound_base() {
        Some(base) => binary(op, &base, l, r),
        None => Err(RuntimeError::new(op, "Unknown operator.")),
    }
}

fn binary(at: &Token, op: &TokenType, l: Val, r: Val) -> Result<Val, RuntimeError> {
    match (op, l, r) {
        (TokenType::Plus, Val::Num(a), Val::Num(b)) => Ok(Val::Num(a + b)),
        // Either side being a string stringifies the other.
        (TokenType::Plus, a @ Val::String(_), b) | (TokenType::Plus, a, b @ Val::String(_)) => {
            Ok(Val::String(format!("{a}{b}").into()))
        }
        (TokenType::Plus, _, _) => Err(RuntimeError::new(
            at,
            "Operands must be two numbers or at least one string.",
        )),
        (TokenType::Slash | TokenType::Percent, Val::Num(_), Val::Num(b)) if b == 0.0 => {
            Err(RuntimeError::new(at, "Division by zero."))
        }
        (TokenType::Minus, Val::Num(a), Val::Num(b)) => Ok(Val::Num(a - b)),
        (TokenType::Star, Val::Num(a), Val::Num(b)) => Ok(Val::Num(a * b)),
        (TokenType::Slash, Val::Num(a), Val::Num(b)) => Ok(Val::Num(a / b)),
        (TokenType::Percent, Val::Num(a), Val::Num(b)) => Ok(Val::Num(a % b)),

        (TokenType::Less, Val::Num(a), Val::Num(b)) => Ok(Val::Bool(a < b)),
        (TokenType::LessEqual, Val::Num(a), Val::Num(b)) => Ok(Val::Bool(a <= b)),
        (TokenType::GreaterEqual, Val::Num(a), Val::Num(b)) => Ok(Val::Bool(a >= b)),
        (TokenType::Greater, Val::Num(a), Val::Num(b)) => Ok(Val::Bool(a > b)),

        (TokenType::EqualEqual, x, y) => Ok(Val::Bool(x == y)),
        (TokenType::BangEqual, x, y) => Ok(Val::Bool(x != y)),

        _ => Err(RuntimeError::new(at, "Operands must be numbers.")),
    }
}
