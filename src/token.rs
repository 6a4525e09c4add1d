use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub data: TokenType,
    pub lexeme: Rc<str>,
    pub line: usize,
    pub column: usize,
    /// The file the token was scanned from, if any.
    pub file: Option<Rc<str>>,
}

impl Token {
    pub fn new(data: TokenType, lexeme: impl Into<Rc<str>>, line: usize, column: usize) -> Self {
        Token {
            data,
            lexeme: lexeme.into(),
            line,
            column,
            file: None,
        }
    }

    pub fn in_file(mut self, file: Option<Rc<str>>) -> Self {
        self.file = file;
        self
    }

    /// A token that does not come from source text, used by parser desugarings.
    pub fn synthetic(data: TokenType, lexeme: &str, at: &Token) -> Self {
        Token::new(data, lexeme, at.line, at.column).in_file(at.file.clone())
    }

    pub fn is_eof(&self) -> bool {
        self.data == TokenType::Eof
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Question,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Semicolon,

    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,

    Identifier(Rc<str>),
    String(Rc<str>),
    Number(f64),

    And,
    Break,
    Class,
    Continue,
    Else,
    Expose,
    False,
    Fun,
    For,
    If,
    Import,
    Module,
    Nil,
    Or,
    Print,
    Return,
    Static,
    Super,
    This,
    True,
    Var,
    While,

    Eof,
}

impl TokenType {
    pub fn keyword(word: &str) -> Option<TokenType> {
        Some(match word {
            "and" => TokenType::And,
            "break" => TokenType::Break,
            "class" => TokenType::Class,
            "continue" => TokenType::Continue,
            "else" => TokenType::Else,
            "expose" => TokenType::Expose,
            "false" => TokenType::False,
            "for" => TokenType::For,
            "fun" => TokenType::Fun,
            "if" => TokenType::If,
            "import" => TokenType::Import,
            "module" => TokenType::Module,
            "nil" => TokenType::Nil,
            "or" => TokenType::Or,
            "print" => TokenType::Print,
            "return" => TokenType::Return,
            "static" => TokenType::Static,
            "super" => TokenType::Super,
            "this" => TokenType::This,
            "true" => TokenType::True,
            "var" => TokenType::Var,
            "while" => TokenType::While,
            _ => return None,
        })
    }

    /// The plain operator a compound assignment operator applies.
    pub fn compound_base(&self) -> Option<TokenType> {
        match self {
            TokenType::PlusEqual => Some(TokenType::Plus),
            TokenType::MinusEqual => Some(TokenType::Minus),
            TokenType::StarEqual => Some(TokenType::Star),
            TokenType::SlashEqual => Some(TokenType::Slash),
            TokenType::PercentEqual => Some(TokenType::Percent),
            _ => None,
        }
    }
}
