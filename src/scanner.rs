use std::rc::Rc;

use crate::error::Diagnostics;
use crate::token::*;

struct Cursor<'a> {
    str: &'a [char],
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(str: &'a [char]) -> Self {
        Self {
            str,
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.str.get(self.index).copied()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    // "match" is a keyword in the metalanguage already.
    fn match_next(&mut self, c: char) -> bool {
        let res = self.peek() == Some(c);
        if res {
            self.advance();
        }
        res
    }

    fn either(&mut self, c: char, matched: TokenType, plain: TokenType) -> TokenType {
        if self.match_next(c) {
            matched
        } else {
            plain
        }
    }

    fn peek(&self) -> Option<char> {
        self.str.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.str.get(self.index + 1).copied()
    }

    fn text(&self, start: usize) -> String {
        self.str[start..self.index].iter().collect()
    }
}

/// Turns source text into tokens. The result is computed once and cached.
pub struct Scanner {
    chars: Vec<char>,
    file: Option<Rc<str>>,
    tokens: Option<Rc<[Token]>>,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            file: None,
            tokens: None,
        }
    }

    /// Tags every token with `file`, so errors raised at them name it.
    pub fn in_file(mut self, file: Option<Rc<str>>) -> Self {
        self.file = file;
        self
    }

    /// Scans the whole source, ending with an EOF token.
    ///
    /// Errors are reported to `diags` on the first call only; later calls
    /// hand back the same token sequence without rescanning.
    pub fn scan_tokens(&mut self, diags: &mut Diagnostics) -> Rc<[Token]> {
        if let Some(tokens) = &self.tokens {
            return tokens.clone();
        }
        let tokens: Rc<[Token]> = scan(&self.chars, &self.file, diags).into();
        self.tokens = Some(tokens.clone());
        tokens
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

fn scan(chars: &[char], file: &Option<Rc<str>>, diags: &mut Diagnostics) -> Vec<Token> {
    let mut scanner = Cursor::new(chars);
    let mut result = vec![];

    loop {
        let start = scanner.index;
        let (line, column) = (scanner.line, scanner.column);
        let Some(c) = scanner.advance() else {
            result.push(Token::new(TokenType::Eof, "", scanner.line, scanner.column).in_file(file.clone()));
            return result;
        };

        let tok = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            ':' => TokenType::Colon,
            '?' => TokenType::Question,
            ';' => TokenType::Semicolon,
            '+' => scanner.either('=', TokenType::PlusEqual, TokenType::Plus),
            '-' => scanner.either('=', TokenType::MinusEqual, TokenType::Minus),
            '*' => scanner.either('=', TokenType::StarEqual, TokenType::Star),
            '%' => scanner.either('=', TokenType::PercentEqual, TokenType::Percent),
            '/' => {
                if scanner.match_next('/') {
                    while !matches!(scanner.peek(), Some('\n') | None) {
                        scanner.advance();
                    }
                    continue;
                }
                if scanner.match_next('*') {
                    loop {
                        match scanner.advance() {
                            Some('*') if scanner.match_next('/') => break,
                            Some(_) => {}
                            None => {
                                diags.lex_error(line, column, "Unterminated block comment.");
                                break;
                            }
                        }
                    }
                    continue;
                }
                scanner.either('=', TokenType::SlashEqual, TokenType::Slash)
            }
            '>' => scanner.either('=', TokenType::GreaterEqual, TokenType::Greater),
            '=' => scanner.either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => scanner.either('=', TokenType::LessEqual, TokenType::Less),
            '!' => scanner.either('=', TokenType::BangEqual, TokenType::Bang),
            '\n' | '\r' | '\t' | ' ' => continue,
            '"' => {
                let mut string = String::new();
                let mut closed = false;
                while let Some(c) = scanner.advance() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match scanner.advance() {
                            Some('n') => string.push('\n'),
                            Some('t') => string.push('\t'),
                            Some('r') => string.push('\r'),
                            Some('0') => string.push('\0'),
                            // Quotes, backslashes and anything else stand for themselves.
                            Some(other) => string.push(other),
                            None => break,
                        },
                        c => string.push(c),
                    }
                }

                if !closed {
                    diags.lex_error(line, column, "Unterminated string.");
                    continue;
                }
                TokenType::String(string.into())
            }
            '0'..='9' => {
                while scanner.peek().is_some_and(|d| d.is_ascii_digit()) {
                    scanner.advance();
                }
                if scanner.peek() == Some('.') && scanner.peek_next().is_some_and(|d| d.is_ascii_digit()) {
                    scanner.advance();
                    while scanner.peek().is_some_and(|d| d.is_ascii_digit()) {
                        scanner.advance();
                    }
                }

                match scanner.text(start).parse() {
                    Ok(num) => TokenType::Number(num),
                    Err(e) => {
                        diags.lex_error(line, column, e.to_string());
                        continue;
                    }
                }
            }
            c if is_alpha(c) => {
                while scanner.peek().is_some_and(is_alpha_numeric) {
                    scanner.advance();
                }
                let word = scanner.text(start);
                TokenType::keyword(&word).unwrap_or_else(|| TokenType::Identifier(word.into()))
            }
            c => {
                diags.lex_error(line, column, format!("Unexpected character '{c}'."));
                continue;
            }
        };

        result.push(Token::new(tok, scanner.text(start), line, column).in_file(file.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> (Vec<TokenType>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new(source).scan_tokens(&mut diags);
        (tokens.iter().map(|t| t.data.clone()).collect(), diags)
    }

    #[test]
    fn compound_operators() {
        let (toks, diags) = kinds("a += 1 -= *= /= %= <= ! %");
        assert!(diags.is_empty());
        assert_eq!(
            toks,
            vec![
                TokenType::Identifier("a".into()),
                TokenType::PlusEqual,
                TokenType::Number(1.0),
                TokenType::MinusEqual,
                TokenType::StarEqual,
                TokenType::SlashEqual,
                TokenType::PercentEqual,
                TokenType::LessEqual,
                TokenType::Bang,
                TokenType::Percent,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        let (toks, _) = kinds("import expose module static break continue from _x1");
        assert_eq!(
            toks,
            vec![
                TokenType::Import,
                TokenType::Expose,
                TokenType::Module,
                TokenType::Static,
                TokenType::Break,
                TokenType::Continue,
                TokenType::Identifier("from".into()),
                TokenType::Identifier("_x1".into()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn numbers_take_one_fraction() {
        let (toks, _) = kinds("1.5 2. 3.25.4");
        assert_eq!(
            toks,
            vec![
                TokenType::Number(1.5),
                TokenType::Number(2.0),
                TokenType::Dot,
                TokenType::Number(3.25),
                TokenType::Dot,
                TokenType::Number(4.0),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_positions() {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new("// line\n/* a\n * b */ x /**/ y").scan_tokens(&mut diags);
        assert!(diags.is_empty());
        let x = &tokens[0];
        assert_eq!((x.line, x.column, &*x.lexeme), (3, 9, "x"));
        let y = &tokens[1];
        assert_eq!((y.line, y.column, &*y.lexeme), (3, 16, "y"));
        let eof = &tokens[2];
        assert!(eof.is_eof());
        assert_eq!((eof.line, eof.column), (3, 17));
    }

    #[test]
    fn string_escapes() {
        let (toks, diags) = kinds(r#""a\"b\\c\n""#);
        assert!(diags.is_empty());
        assert_eq!(toks[0], TokenType::String("a\"b\\c\n".into()));
    }

    #[test]
    fn keeps_scanning_after_errors() {
        let (toks, diags) = kinds("# var \"open");
        let messages = diags.iter().map(|d| d.message.clone()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["Unexpected character '#'.", "Unterminated string."]);
        assert_eq!(toks, vec![TokenType::Var, TokenType::Eof]);
    }

    #[test]
    fn unterminated_block_comment() {
        let (toks, diags) = kinds("x /* never closed");
        assert_eq!(toks.len(), 2);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn cached_tokens_are_shared() {
        let mut diags = Diagnostics::new();
        let mut scanner = Scanner::new("var x = @;");
        let first = scanner.scan_tokens(&mut diags);
        let second = scanner.scan_tokens(&mut diags);
        assert!(Rc::ptr_eq(&first, &second));
        // The error is reported by the first scan only.
        assert_eq!(diags.len(), 1);
    }
}
