use std::path::PathBuf;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::compiler::Compiler;
use crate::expr::{Expr, VarRef};
use crate::interpreter::Interpreter;
use crate::stack::ensure_sufficient_stack;
use crate::statement::{ClassDecl, FunctionDecl, ImportDecl, Stmt};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

/// Names declared in one scope, and whether their initializer has finished.
type ResolverScope = FxHashMap<Rc<str>, bool>;

/// Static pass over one file.
///
/// Records binding distances into the interpreter that will run the file,
/// checks placement rules, and pulls imported names in from dependencies.
pub struct Resolver<'a> {
    compiler: &'a mut Compiler,
    interpreter: &'a mut Interpreter,
    /// Imports are resolved relative to this directory.
    dir: PathBuf,
    stack: Vec<ResolverScope>,
    top_level: FxHashSet<Rc<str>>,
    exposed: Vec<Token>,
    function: FunctionKind,
    class: ClassKind,
    in_static: bool,
    loop_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(compiler: &'a mut Compiler, interpreter: &'a mut Interpreter, dir: PathBuf) -> Self {
        Resolver {
            compiler,
            interpreter,
            dir,
            stack: vec![],
            top_level: Default::default(),
            exposed: vec![],
            function: FunctionKind::None,
            class: ClassKind::None,
            in_static: false,
            loop_depth: 0,
        }
    }

    /// Resolves a whole file and returns the names it exposes.
    pub fn resolve(mut self, program: &[Stmt]) -> FxHashSet<Rc<str>> {
        for stmt in program {
            self.resolve_stmt(stmt);
        }

        // `expose` may come before the declaration it names.
        let mut exports = FxHashSet::default();
        for name in std::mem::take(&mut self.exposed) {
            if self.top_level.contains(&name.lexeme) {
                exports.insert(name.lexeme.clone());
            } else {
                self.error(&name, format!("Can't expose undeclared name '{}'.", name.lexeme));
            }
        }
        exports
    }

    fn error(&mut self, token: &Token, message: impl Into<String>) {
        self.compiler.diagnostics_mut().resolve_error(token, message);
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.resolve_stmt_inner(stmt))
    }

    fn resolve_stmt_inner(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::If(cond, if_stmt, else_stmt) => {
                self.resolve_expr(cond);
                self.resolve_stmt(if_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.resolve_stmt(else_stmt);
                }
            }
            Stmt::While { cond, body, increment } => {
                self.resolve_expr(cond);
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
            }
            Stmt::Expr(expr) | Stmt::Print(_, expr) => self.resolve_expr(expr),
            Stmt::Return(keyword, val) => {
                if self.function == FunctionKind::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(val) = val {
                    if self.function == FunctionKind::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(val);
                }
            }
            Stmt::Break(keyword) if self.loop_depth == 0 => {
                self.error(keyword, "Can't use 'break' outside of a loop.");
            }
            Stmt::Continue(keyword) if self.loop_depth == 0 => {
                self.error(keyword, "Can't use 'continue' outside of a loop.");
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Block { body, scoped } => {
                if *scoped {
                    self.push_scope();
                }
                for inner in body {
                    self.resolve_stmt(inner);
                }
                if *scoped {
                    self.pop_scope();
                }
            }
            Stmt::Var(id, _, val) => {
                self.declare(id);
                if let Some(val) = val {
                    self.resolve_expr(val);
                }
                self.define(id);
            }
            Stmt::Function(decl) => {
                // Function is defined within its body.
                // (Otherwise recursion would be forbidden)
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionKind::Function);
            }
            Stmt::Class(decl) => self.resolve_class(decl),
            Stmt::Import(import) => self.resolve_import(import),
            Stmt::Expose(keyword, names) => {
                if !self.stack.is_empty() {
                    self.error(keyword, "Can only expose names from top-level code.");
                    return;
                }
                self.exposed.extend(names.iter().cloned());
            }
        }
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionKind) {
        let enclosing = std::mem::replace(&mut self.function, kind);
        // A loop outside the function doesn't make `break` legal inside it.
        let loop_depth = std::mem::take(&mut self.loop_depth);

        self.push_scope();
        // All args are defined in the scope of a function.
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        for inner in &decl.body {
            self.resolve_stmt(inner);
        }
        self.pop_scope();

        self.loop_depth = loop_depth;
        self.function = enclosing;
    }

    fn resolve_class(&mut self, decl: &ClassDecl) {
        let enclosing = self.class;
        self.class = ClassKind::Class;
        self.declare(&decl.name);
        self.define(&decl.name);

        if let Some(superclass) = &decl.superclass {
            self.class = ClassKind::Subclass;
            self.resolve_local(superclass);
            self.push_scope();
            self.scope_insert("super".into());
        }

        // Statics run in the class scope without a `this`.
        let in_static = std::mem::replace(&mut self.in_static, true);
        for field in &decl.static_fields {
            if let Some(init) = &field.init {
                self.resolve_expr(init);
            }
        }
        for method in &decl.static_methods {
            self.resolve_function(method, FunctionKind::Function);
        }
        self.in_static = false;

        self.push_scope();
        self.scope_insert("this".into());
        for method in &decl.methods {
            let kind = if &*method.name.lexeme == "init" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(method, kind);
        }
        if let Some(fields) = &decl.fields {
            self.resolve_function(fields, FunctionKind::Method);
        }
        self.pop_scope();
        self.in_static = in_static;

        if decl.superclass.is_some() {
            self.pop_scope();
        }
        self.class = enclosing;
    }

    fn resolve_import(&mut self, import: &ImportDecl) {
        if !self.stack.is_empty() {
            self.error(&import.keyword, "Can only import at top-level code.");
            return;
        }
        // Failures were already reported by the compiler.
        let Some(module) = self.compiler.import(&self.dir, import) else {
            return;
        };

        for name in &import.names {
            if !module.exports.contains(&name.lexeme) {
                self.error(
                    name,
                    format!("'{}' is not exposed by '{}'.", name.lexeme, import.module),
                );
                continue;
            }
            if let Some(val) = module.get(&name.lexeme) {
                self.interpreter.define_global(name.lexeme.clone(), val);
            }
            self.top_level.insert(name.lexeme.clone());
        }
        self.interpreter.merge_bindings(&module.bindings);
        tracing::debug!(module = %module.name, names = import.names.len(), "imported");
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.resolve_expr_inner(expr))
    }

    fn resolve_expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Grouping(inner) | Expr::Unary(_, inner) => self.resolve_expr(inner),
            Expr::Binary(l, _, r) | Expr::Logical(l, _, r) => {
                self.resolve_expr(l);
                self.resolve_expr(r);
            }
            Expr::Ternary(cond, then, other) => {
                self.resolve_expr(cond);
                self.resolve_expr(then);
                self.resolve_expr(other);
            }
            Expr::Comma(exprs) => exprs.iter().for_each(|e| self.resolve_expr(e)),
            Expr::Call(fun, _, args) => {
                self.resolve_expr(fun);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get(target, _) => self.resolve_expr(target),
            Expr::Set(target, _, _, val) => {
                self.resolve_expr(val);
                self.resolve_expr(target);
            }
            Expr::Variable(var) => {
                if self.currently_declaring(&var.name.lexeme) {
                    self.error(&var.name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(var);
            }
            Expr::Assign(var, val) | Expr::CompoundAssign(var, _, val) => {
                self.resolve_expr(val);
                self.resolve_local(var);
            }
            Expr::This(var) => {
                if self.class == ClassKind::None {
                    self.error(&var.name, "Can't use 'this' outside of a class.");
                } else if self.in_static {
                    self.error(&var.name, "Can't use 'this' in a static method.");
                } else {
                    self.resolve_local(var);
                }
            }
            Expr::Super(var, _) => match self.class {
                ClassKind::None => self.error(&var.name, "Can't use 'super' outside of a class."),
                ClassKind::Class => {
                    self.error(&var.name, "Can't use 'super' in a class with no superclass.")
                }
                ClassKind::Subclass if self.in_static => {
                    self.error(&var.name, "Can't use 'super' in a static method.")
                }
                ClassKind::Subclass => self.resolve_local(var),
            },
        }
    }

    /// Unresolved names are left to the global scope at runtime.
    fn resolve_local(&mut self, var: &VarRef) {
        for (i, scope) in self.stack.iter().rev().enumerate() {
            if scope.contains_key(&var.name.lexeme) {
                self.interpreter.resolve(var.id, i);
                return;
            }
        }
    }

    fn push_scope(&mut self) {
        self.stack.push(ResolverScope::default());
    }

    fn pop_scope(&mut self) {
        self.stack.pop();
    }

    fn scope_insert(&mut self, id: Rc<str>) {
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(id, true);
        }
    }

    fn declare(&mut self, id: &Token) {
        let Some(scope) = self.stack.last_mut() else {
            self.top_level.insert(id.lexeme.clone());
            return;
        };
        if scope.insert(id.lexeme.clone(), false).is_some() {
            self.error(id, "Already a variable with this name in this scope.");
        }
    }

    fn define(&mut self, id: &Token) {
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(id.lexeme.clone(), true);
        }
    }

    fn currently_declaring(&self, id: &str) -> bool {
        self.stack.last().is_some_and(|scope| scope.get(id) == Some(&false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, io::sink};

    fn resolve_errors(source: &str) -> Vec<String> {
        let mut compiler = Compiler::with_output(Config::default(), Rc::new(RefCell::new(sink())));
        let mut interp = compiler.new_interpreter();
        compiler.run_source(None, source, &mut interp);
        compiler.diagnostics().iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn accepts_well_formed_code() {
        let errors = resolve_errors(
            "fun f(a) { var b = a; { var b = 2; } while (b) { if (a) break; continue; } return b; }
             class A { init() { this.x = 1; } static make() { return A(); } }
             class B < A { init() { super.init(); } get() { return super.init; } }",
        );
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn reports_placement_errors() {
        let errors = resolve_errors(
            "return 1;\nbreak;\nfun f() { continue; }\nprint this;\nprint super.x;\nclass A { m() { super.m(); } }",
        );
        assert_eq!(
            errors,
            vec![
                "1:1 - Error at 'return': Can't return from top-level code.",
                "2:1 - Error at 'break': Can't use 'break' outside of a loop.",
                "3:11 - Error at 'continue': Can't use 'continue' outside of a loop.",
                "4:7 - Error at 'this': Can't use 'this' outside of a class.",
                "5:7 - Error at 'super': Can't use 'super' outside of a class.",
                "6:17 - Error at 'super': Can't use 'super' in a class with no superclass.",
            ]
        );
    }

    #[test]
    fn reports_local_declaration_errors() {
        let errors = resolve_errors("{ var a = 1; var a = 2; }\n{ var b = b; }");
        assert_eq!(
            errors,
            vec![
                "1:18 - Error at 'a': Already a variable with this name in this scope.",
                "2:11 - Error at 'b': Can't read local variable in its own initializer.",
            ]
        );
    }

    #[test]
    fn globals_may_be_redeclared() {
        assert!(resolve_errors("var a = 1; var a = a;").is_empty());
    }

    #[test]
    fn initializers_return_no_value() {
        let errors = resolve_errors("class A { init() { return 1; } }");
        assert_eq!(errors, vec!["1:20 - Error at 'return': Can't return a value from an initializer."]);
        assert!(resolve_errors("class A { init() { return; } }").is_empty());
    }

    #[test]
    fn statics_have_no_this() {
        let errors = resolve_errors("class A { static f() { return this; } }");
        assert_eq!(errors, vec!["1:31 - Error at 'this': Can't use 'this' in a static method."]);
    }

    #[test]
    fn expose_rules() {
        let errors = resolve_errors("expose a, missing;\nvar a = 1;\n{ expose a; }");
        assert_eq!(
            errors,
            vec![
                "3:3 - Error at 'expose': Can only expose names from top-level code.",
                "1:11 - Error at 'missing': Can't expose undeclared name 'missing'.",
            ]
        );
    }

    #[test]
    fn import_only_at_top_level() {
        let errors = resolve_errors("fun f() { import { a } from \"x\"; }");
        assert_eq!(errors, vec!["1:11 - Error at 'import': Can only import at top-level code."]);
    }
}
