use std::rc::Rc;

use crate::error::Diagnostics;
use crate::expr::*;
use crate::stack::ensure_sufficient_stack;
use crate::statement::*;
use crate::token::*;
use crate::value::Val;

/// Marks a parse error that has already been reported.
#[derive(Debug, Clone, Copy)]
pub struct ParseErr;

type ExprResult = Result<ExprRef, ParseErr>;

const MAX_ARGS: usize = 255;

pub struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    diags: &'a mut Diagnostics,
    ids: &'a mut NodeIds,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with the EOF token the scanner appends.
    pub fn new(tokens: &'a [Token], diags: &'a mut Diagnostics, ids: &'a mut NodeIds) -> Parser<'a> {
        Parser {
            tokens,
            index: 0,
            diags,
            ids,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.index += 1;
        }
        self.previous()
    }

    fn check(&self, tok: &TokenType) -> bool {
        !self.is_at_end() && self.peek().data == *tok
    }

    fn check_identifier(&self) -> bool {
        matches!(self.peek().data, TokenType::Identifier(_))
    }

    fn match_next_lits<const N: usize>(&mut self, ttypes: [TokenType; N]) -> bool {
        let res = ttypes.iter().any(|x| self.check(x));
        if res {
            self.index += 1;
        }
        res
    }

    fn consume(&mut self, tok: &TokenType, message: &str) -> Result<Token, ParseErr> {
        if self.check(tok) {
            return Ok(self.advance().clone());
        }
        Err(self.error_at_peek(message))
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, ParseErr> {
        if self.check_identifier() {
            return Ok(self.advance().clone());
        }
        Err(self.error_at_peek(message))
    }

    fn error(&mut self, token: &Token, message: &str) -> ParseErr {
        self.diags.syntax_error(token, message);
        ParseErr
    }

    fn error_at_peek(&mut self, message: &str) -> ParseErr {
        let token = self.peek().clone();
        self.error(&token, message)
    }

    fn var_ref(&mut self, name: Token) -> VarRef {
        VarRef {
            id: self.ids.next(),
            name,
        }
    }

    /// Drops tokens until the next statement boundary.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().data == TokenType::Semicolon {
                return;
            }
            match self.peek().data {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return
                | TokenType::Import
                | TokenType::Expose
                | TokenType::Break
                | TokenType::Continue => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // Parsing the actual grammar.
    /// Parses every statement it can, reporting errors instead of stopping at them.
    pub fn parse(mut self) -> Vec<Stmt> {
        let mut res = vec![];
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                res.push(stmt);
            }
        }
        res
    }

    fn declaration(&mut self) -> Option<Stmt> {
        ensure_sufficient_stack(|| self.declaration_inner())
    }

    fn declaration_inner(&mut self) -> Option<Stmt> {
        let res = if self.match_next_lits([TokenType::Var]) {
            self.var_declaration()
        } else if self.match_next_lits([TokenType::Fun]) {
            self.function("function").map(|f| Stmt::Function(Rc::new(f)))
        } else if self.match_next_lits([TokenType::Class]) {
            self.class()
        } else if self.match_next_lits([TokenType::Import]) {
            self.import()
        } else if self.match_next_lits([TokenType::Expose]) {
            self.expose()
        } else {
            self.statement()
        };

        match res {
            Ok(stmt) => Some(stmt),
            Err(ParseErr) => {
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt, ParseErr> {
        let mut decls = vec![];
        loop {
            let name = self.consume_identifier("Expect variable name.")?;
            let annotation = self.annotation()?;
            let init = if self.match_next_lits([TokenType::Equal]) {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push(Stmt::Var(name, annotation, init));
            if !self.match_next_lits([TokenType::Comma]) {
                break;
            }
        }
        self.consume(&TokenType::Semicolon, "Expect ';' after variable declaration.")?;

        if decls.len() == 1 {
            Ok(decls.remove(0))
        } else {
            // Every name lands in the enclosing scope.
            Ok(Stmt::Block {
                body: decls,
                scoped: false,
            })
        }
    }

    fn annotation(&mut self) -> Result<Option<Token>, ParseErr> {
        if self.match_next_lits([TokenType::Colon]) {
            Ok(Some(self.consume_identifier("Expect type name after ':'.")?))
        } else {
            Ok(None)
        }
    }

    fn function(&mut self, kind: &str) -> Result<FunctionDecl, ParseErr> {
        let name = self.consume_identifier(&format!("Expect {kind} name."))?;
        self.function_rest(name, kind)
    }

    fn function_rest(&mut self, name: Token, kind: &str) -> Result<FunctionDecl, ParseErr> {
        self.consume(&TokenType::LeftParen, &format!("Expect '(' after {kind} name."))?;
        let mut params = vec![];
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 parameters.");
                }
                params.push(self.consume_identifier("Expect parameter name.")?);
                if !self.match_next_lits([TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(&TokenType::LeftBrace, &format!("Expect '{{' before {kind} body."))?;
        let body = self.block()?;

        Ok(FunctionDecl { name, params, body })
    }

    fn class(&mut self) -> Result<Stmt, ParseErr> {
        let name = self.consume_identifier("Expect class name.")?;
        let superclass = if self.match_next_lits([TokenType::Less]) {
            let sup = self.consume_identifier("Expect superclass name.")?;
            if sup.lexeme == name.lexeme {
                self.error(&sup, "A class can't inherit from itself.");
            }
            Some(self.var_ref(sup))
        } else {
            None
        };
        self.consume(&TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = vec![];
        let mut static_methods = vec![];
        let mut fields = vec![];
        let mut static_fields = vec![];
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            let is_static = self.match_next_lits([TokenType::Static]);
            let member = self.consume_identifier("Expect member name.")?;
            if self.check(&TokenType::LeftParen) {
                let method = self.function_rest(member, "method")?;
                if is_static {
                    static_methods.push(Rc::new(method));
                } else {
                    methods.push(method);
                }
                continue;
            }

            let annotation = self.annotation()?;
            let init = if self.match_next_lits([TokenType::Equal]) {
                Some(*self.expression()?)
            } else {
                None
            };
            self.consume(&TokenType::Semicolon, "Expect ';' after field declaration.")?;
            let field = FieldDecl {
                name: member,
                annotation,
                init,
            };
            if is_static {
                static_fields.push(field);
            } else {
                fields.push(field);
            }
        }
        self.consume(&TokenType::RightBrace, "Expect '}' after class body.")?;

        let (methods, fields) = self.splice_fields(&name, superclass.is_some(), methods, fields);

        Ok(Stmt::Class(Rc::new(ClassDecl {
            name,
            superclass,
            methods,
            fields,
            static_methods,
            static_fields,
        })))
    }

    /// Moves instance field initializers into `init`. A class without one
    /// gets them back as a separate initializer instead.
    fn splice_fields(
        &mut self,
        class: &Token,
        has_super: bool,
        mut methods: Vec<FunctionDecl>,
        fields: Vec<FieldDecl>,
    ) -> (Vec<Rc<FunctionDecl>>, Option<Rc<FunctionDecl>>) {
        let assignments = fields
            .into_iter()
            .map(|field| {
                let this = Token::synthetic(TokenType::This, "this", &field.name);
                let this = Box::new(Expr::This(self.var_ref(this)));
                let value = Box::new(field.init.unwrap_or(Expr::Literal(Val::Nil)));
                Stmt::Expr(Box::new(Expr::Set(this, field.name, None, value)))
            })
            .collect::<Vec<_>>();

        let mut initializer = None;
        match methods.iter_mut().find(|m| &*m.name.lexeme == "init") {
            Some(init) => {
                let at = if has_super {
                    if !init.body.first().is_some_and(is_super_init_call) {
                        let name = init.name.clone();
                        self.error(&name, "Expect superclass constructor call as first statement in 'init'.");
                    }
                    1.min(init.body.len())
                } else {
                    0
                };
                init.body.splice(at..at, assignments);
            }
            None if !assignments.is_empty() => {
                initializer = Some(Rc::new(FunctionDecl {
                    name: Token::synthetic(TokenType::Identifier("init".into()), "init", class),
                    params: vec![],
                    body: assignments,
                }));
            }
            None => {}
        }

        (methods.into_iter().map(Rc::new).collect(), initializer)
    }

    fn import(&mut self) -> Result<Stmt, ParseErr> {
        let keyword = self.previous().clone();
        self.consume(&TokenType::LeftBrace, "Expect '{' after 'import'.")?;
        let mut names = vec![self.consume_identifier("Expect imported name.")?];
        while self.match_next_lits([TokenType::Comma]) {
            names.push(self.consume_identifier("Expect imported name.")?);
        }
        self.consume(&TokenType::RightBrace, "Expect '}' after imported names.")?;

        // `from` is only special here, it stays usable as a name elsewhere.
        if !matches!(&self.peek().data, TokenType::Identifier(word) if &**word == "from") {
            return Err(self.error_at_peek("Expect 'from' after imported names."));
        }
        self.advance();

        let path = self.peek().clone();
        let TokenType::String(module) = &path.data else {
            return Err(self.error_at_peek("Expect module path string."));
        };
        let module = module.clone();
        self.advance();
        self.consume(&TokenType::Semicolon, "Expect ';' after import.")?;

        Ok(Stmt::Import(ImportDecl {
            keyword,
            names,
            path,
            module,
        }))
    }

    fn expose(&mut self) -> Result<Stmt, ParseErr> {
        let keyword = self.previous().clone();
        let mut names = vec![self.consume_identifier("Expect name to expose.")?];
        while self.match_next_lits([TokenType::Comma]) {
            names.push(self.consume_identifier("Expect name to expose.")?);
        }
        self.consume(&TokenType::Semicolon, "Expect ';' after exposed names.")?;
        Ok(Stmt::Expose(keyword, names))
    }

    fn statement(&mut self) -> Result<Stmt, ParseErr> {
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Stmt, ParseErr> {
        if self.match_next_lits([TokenType::Print]) {
            self.print_statement()
        } else if self.match_next_lits([TokenType::If]) {
            self.if_statement()
        } else if self.match_next_lits([TokenType::While]) {
            self.while_statement()
        } else if self.match_next_lits([TokenType::For]) {
            self.for_statement()
        } else if self.match_next_lits([TokenType::Return]) {
            self.return_statement()
        } else if self.match_next_lits([TokenType::Break]) {
            let keyword = self.previous().clone();
            self.consume(&TokenType::Semicolon, "Expect ';' after 'break'.")?;
            Ok(Stmt::Break(keyword))
        } else if self.match_next_lits([TokenType::Continue]) {
            let keyword = self.previous().clone();
            self.consume(&TokenType::Semicolon, "Expect ';' after 'continue'.")?;
            Ok(Stmt::Continue(keyword))
        } else if self.match_next_lits([TokenType::LeftBrace]) {
            Ok(Stmt::block(self.block()?))
        } else {
            self.expression_statement()
        }
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseErr> {
        let keyword = self.previous().clone();
        let val = if !self.check(&TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(&TokenType::Semicolon, "Expect ';' after return value.")?;

        Ok(Stmt::Return(keyword, val))
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseErr> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let cond = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after if condition.")?;
        let stmt = self.statement()?;
        if self.match_next_lits([TokenType::Else]) {
            let other = self.statement()?;
            Ok(Stmt::If(cond, Box::new(stmt), Some(Box::new(other))))
        } else {
            Ok(Stmt::If(cond, Box::new(stmt), None))
        }
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseErr> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'for'.")?;
        let mut result = vec![];
        if self.match_next_lits([TokenType::Var]) {
            result.push(self.var_declaration()?);
        } else if !self.match_next_lits([TokenType::Semicolon]) {
            result.push(self.expression_statement()?);
        }

        let cond = if self.check(&TokenType::Semicolon) {
            Box::new(Expr::Literal(Val::Bool(true)))
        } else {
            self.expression()?
        };

        self.consume(&TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(&TokenType::RightParen, "Expect ')' after for clauses.")?;
        let body = self.statement()?;

        result.push(Stmt::While {
            cond,
            body: Box::new(body),
            increment,
        });
        Ok(Stmt::block(result))
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseErr> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let cond = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after condition.")?;
        let stmt = self.statement()?;
        Ok(Stmt::While {
            cond,
            body: Box::new(stmt),
            increment: None,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseErr> {
        let mut res = vec![];
        while !self.is_at_end() && !self.check(&TokenType::RightBrace) {
            if let Some(stmt) = self.declaration() {
                res.push(stmt);
            }
        }
        self.consume(&TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(res)
    }

    fn print_statement(&mut self) -> Result<Stmt, ParseErr> {
        let keyword = self.previous().clone();
        let res = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(keyword, res))
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseErr> {
        let res = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expr(res))
    }

    fn expression(&mut self) -> ExprResult {
        ensure_sufficient_stack(|| self.comma())
    }

    fn comma(&mut self) -> ExprResult {
        let first = self.assignment()?;
        if !self.check(&TokenType::Comma) {
            return Ok(first);
        }
        let mut list = vec![*first];
        while self.match_next_lits([TokenType::Comma]) {
            list.push(*self.assignment()?);
        }
        Ok(Box::new(Expr::Comma(list)))
    }

    fn assignment(&mut self) -> ExprResult {
        let expr = self.ternary()?;
        if !self.match_next_lits([
            TokenType::Equal,
            TokenType::PlusEqual,
            TokenType::MinusEqual,
            TokenType::StarEqual,
            TokenType::SlashEqual,
            TokenType::PercentEqual,
        ]) {
            return Ok(expr);
        }

        let op = self.previous().clone();
        let val = self.assignment()?;
        let compound = op.data.compound_base().is_some();
        match *expr {
            Expr::Variable(var) if compound => Ok(Box::new(Expr::CompoundAssign(var, op, val))),
            Expr::Variable(var) => Ok(Box::new(Expr::Assign(var, val))),
            Expr::Get(target, id) => Ok(Box::new(Expr::Set(target, id, compound.then_some(op), val))),
            other => {
                // Reported, but no need to resynchronize.
                self.error(&op, "Invalid assignment target.");
                Ok(Box::new(other))
            }
        }
    }

    fn ternary(&mut self) -> ExprResult {
        let cond = self.logic_or()?;
        if !self.match_next_lits([TokenType::Question]) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.consume(&TokenType::Colon, "Expect ':' after then branch of conditional expression.")?;
        let other = self.ternary()?;
        Ok(Box::new(Expr::Ternary(cond, then, other)))
    }

    fn logic_or(&mut self) -> ExprResult {
        let mut expr = self.logic_and()?;

        while self.match_next_lits([TokenType::Or]) {
            let op = self.previous().clone();
            let right = self.logic_and()?;
            expr = Box::new(Expr::Logical(expr, op, right));
        }

        Ok(expr)
    }

    fn logic_and(&mut self) -> ExprResult {
        let mut expr = self.equality()?;

        while self.match_next_lits([TokenType::And]) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Box::new(Expr::Logical(expr, op, right));
        }

        Ok(expr)
    }

    fn equality(&mut self) -> ExprResult {
        let mut expr = self.comparison()?;

        while self.match_next_lits([TokenType::BangEqual, TokenType::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison()?;
            expr = Box::new(Expr::Binary(expr, op, right));
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> ExprResult {
        let mut expr = self.term()?;
        while self.match_next_lits([
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term()?;
            expr = Box::new(Expr::Binary(expr, op, right));
        }

        Ok(expr)
    }

    fn term(&mut self) -> ExprResult {
        let mut expr = self.factor()?;

        while self.match_next_lits([TokenType::Plus, TokenType::Minus]) {
            let op = self.previous().clone();
            let right = self.factor()?;
            expr = Box::new(Expr::Binary(expr, op, right));
        }

        Ok(expr)
    }

    fn factor(&mut self) -> ExprResult {
        let mut expr = self.unary()?;

        while self.match_next_lits([TokenType::Slash, TokenType::Star, TokenType::Percent]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            expr = Box::new(Expr::Binary(expr, op, right));
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ExprResult {
        if self.match_next_lits([TokenType::Bang, TokenType::Minus]) {
            let op = self.previous().clone();
            let operand = ensure_sufficient_stack(|| self.unary())?;
            Ok(Box::new(Expr::Unary(op, operand)))
        } else {
            self.call()
        }
    }

    fn call(&mut self) -> ExprResult {
        let mut expr = self.primary()?;
        loop {
            if self.match_next_lits([TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_next_lits([TokenType::Dot]) {
                let id = self.consume_identifier("Expect property name after '.'.")?;
                expr = Box::new(Expr::Get(expr, id));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: ExprRef) -> ExprResult {
        let mut args = vec![];
        if !self.check(&TokenType::RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 arguments.");
                }
                args.push(*self.assignment()?);
                if !self.match_next_lits([TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume(&TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Box::new(Expr::Call(callee, paren, args)))
    }

    fn primary(&mut self) -> ExprResult {
        let tok = self.peek().clone();
        let res = match &tok.data {
            TokenType::True => Expr::Literal(Val::Bool(true)),
            TokenType::False => Expr::Literal(Val::Bool(false)),
            TokenType::Nil => Expr::Literal(Val::Nil),
            TokenType::Number(x) => Expr::Literal(Val::Num(*x)),
            TokenType::String(x) => Expr::Literal(Val::String(x.clone())),
            TokenType::This => Expr::This(self.var_ref(tok.clone())),
            TokenType::Identifier(_) => Expr::Variable(self.var_ref(tok.clone())),
            TokenType::Super => {
                self.advance();
                self.consume(&TokenType::Dot, "Expect '.' after 'super'.")?;
                let method = self.consume_identifier("Expect superclass method name.")?;
                return Ok(Box::new(Expr::Super(self.var_ref(tok.clone()), method)));
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(&TokenType::RightParen, "Expect ')' after expression.")?;
                return Ok(Box::new(Expr::Grouping(expr)));
            }
            _ => return Err(self.error(&tok, "Expect expression.")),
        };
        self.advance();

        Ok(Box::new(res))
    }
}

fn is_super_init_call(stmt: &Stmt) -> bool {
    let Stmt::Expr(expr) = stmt else {
        return false;
    };
    let Expr::Call(callee, _, _) = &**expr else {
        return false;
    };
    matches!(&**callee, Expr::Super(_, method) if &*method.lexeme == "init")
}
