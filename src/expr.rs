use crate::token::Token;
use crate::value::Val;

pub type ExprRef = Box<Expr>;

/// Identity of a name-reading or name-writing node.
///
/// The resolver records binding distances under this id and the interpreter
/// looks them up again, so ids must be unique across every file of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

#[derive(Debug, Default)]
pub struct NodeIds {
    next: u32,
}

impl NodeIds {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn next(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}

/// A reference to a name: variables, `this` and `super`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub id: ExprId,
    pub name: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Val),
    Grouping(ExprRef),
    Unary(Token, ExprRef),
    Binary(ExprRef, Token, ExprRef),
    Logical(ExprRef, Token, ExprRef),
    Ternary(ExprRef, ExprRef, ExprRef),
    Comma(Vec<Expr>),
    Variable(VarRef),
    Assign(VarRef, ExprRef),
    /// `name op= value`, the token is the compound operator.
    CompoundAssign(VarRef, Token, ExprRef),
    /// Callee, closing paren, arguments.
    Call(ExprRef, Token, Vec<Expr>),
    Get(ExprRef, Token),
    /// Object, property, compound operator if any, value.
    Set(ExprRef, Token, Option<Token>, ExprRef),
    This(VarRef),
    /// The `super` keyword and the method name after the dot.
    Super(VarRef, Token),
}
