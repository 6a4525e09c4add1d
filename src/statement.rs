use std::rc::Rc;

use crate::expr::{Expr, ExprRef, VarRef};
use crate::token::Token;

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}

/// A `name: Type = value;` class member, static or not.
#[derive(Debug, PartialEq, Clone)]
pub struct FieldDecl {
    pub name: Token,
    pub annotation: Option<Token>,
    pub init: Option<Expr>,
}

/// A class after the parser's desugaring: instance field assignments live
/// in `init`, or in `fields` when the class declares no `init`.
#[derive(Debug, PartialEq, Clone)]
pub struct ClassDecl {
    pub name: Token,
    pub superclass: Option<VarRef>,
    pub methods: Vec<Rc<FunctionDecl>>,
    /// Runs after the inherited initializer of a class without an `init`.
    pub fields: Option<Rc<FunctionDecl>>,
    pub static_methods: Vec<Rc<FunctionDecl>>,
    pub static_fields: Vec<FieldDecl>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ImportDecl {
    pub keyword: Token,
    pub names: Vec<Token>,
    /// The string token naming the module, as written.
    pub path: Token,
    pub module: Rc<str>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Stmt {
    Expr(ExprRef),
    Print(Token, ExprRef),
    /// Name, type annotation, initializer.
    Var(Token, Option<Token>, Option<ExprRef>),
    /// `scoped` is false for the statement list a multi-declaration expands to.
    Block { body: Vec<Stmt>, scoped: bool },
    If(ExprRef, Box<Stmt>, Option<Box<Stmt>>),
    /// `increment` comes from a desugared `for` and also runs after `continue`.
    While {
        cond: ExprRef,
        body: Box<Stmt>,
        increment: Option<ExprRef>,
    },
    Function(Rc<FunctionDecl>),
    Return(Token, Option<ExprRef>),
    Class(Rc<ClassDecl>),
    Break(Token),
    Continue(Token),
    Import(ImportDecl),
    Expose(Token, Vec<Token>),
}

impl Stmt {
    pub fn block(body: Vec<Stmt>) -> Self {
        Stmt::Block { body, scoped: true }
    }
}
