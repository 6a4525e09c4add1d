use std::{fmt, rc::Rc};

use thiserror::Error;

use crate::token::Token;

/// Which stage of the pipeline reported a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Syntax,
    Resolve,
    Runtime,
}

/// Where in the source a static error points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Lexical errors have no lexeme.
    Nowhere,
    At(Rc<str>),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub file: Option<Rc<str>>,
    pub line: usize,
    pub column: usize,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        write!(f, "{}:{} - ", self.line, self.column)?;
        if self.stage == Stage::Runtime {
            return write!(f, "{}", self.message);
        }
        match &self.location {
            Location::Nowhere => write!(f, "Error: {}", self.message),
            Location::At(lexeme) => write!(f, "Error at '{lexeme}': {}", self.message),
            Location::End => write!(f, "Error at end: {}", self.message),
        }
    }
}

/// Collects every diagnostic of one compilation run.
///
/// Replaces a process-wide "had error" flag: each stage reports into the
/// collector it is handed, and the compiler checks it between stages.
#[derive(Debug, Default)]
pub struct Diagnostics {
    file: Option<Rc<str>>,
    reported: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the file later reports are attributed to, replacing the current one.
    pub fn set_file(&mut self, file: Option<Rc<str>>) -> Option<Rc<str>> {
        std::mem::replace(&mut self.file, file)
    }

    pub fn lex_error(&mut self, line: usize, column: usize, message: impl Into<String>) {
        let file = self.file.clone();
        self.push(Stage::Syntax, file, line, column, Location::Nowhere, message.into());
    }

    pub fn syntax_error(&mut self, token: &Token, message: impl Into<String>) {
        let file = self.file.clone();
        self.push(Stage::Syntax, file, token.line, token.column, Self::location(token), message.into());
    }

    pub fn resolve_error(&mut self, token: &Token, message: impl Into<String>) {
        let file = self.file.clone();
        self.push(Stage::Resolve, file, token.line, token.column, Self::location(token), message.into());
    }

    /// Runtime errors name the file of the code that failed, not the one being run.
    pub fn runtime_error(&mut self, err: &RuntimeError) {
        let file = err.file.clone();
        self.push(Stage::Runtime, file, err.line, err.column, Location::Nowhere, err.message.clone());
    }

    fn location(token: &Token) -> Location {
        if token.is_eof() {
            Location::End
        } else {
            Location::At(token.lexeme.clone())
        }
    }

    fn push(
        &mut self,
        stage: Stage,
        file: Option<Rc<str>>,
        line: usize,
        column: usize,
        location: Location,
        message: String,
    ) {
        let diagnostic = Diagnostic {
            stage,
            file,
            line,
            column,
            location,
            message,
        };
        tracing::debug!(%diagnostic, "reported");
        self.reported.push(diagnostic);
    }

    /// Whether a syntax or resolution error was reported.
    pub fn had_error(&self) -> bool {
        self.reported.iter().any(|d| d.stage != Stage::Runtime)
    }

    pub fn had_runtime_error(&self) -> bool {
        self.reported.iter().any(|d| d.stage == Stage::Runtime)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reported.iter()
    }

    pub fn len(&self) -> usize {
        self.reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    /// Forgets everything reported so far. The REPL calls this between lines.
    pub fn clear(&mut self) {
        self.reported.clear();
    }
}

/// An error that aborts execution of the current top-level statement list.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{line}:{column} - {message}")]
pub struct RuntimeError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: Option<Rc<str>>,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
            line: token.line,
            column: token.column,
            file: token.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_static_errors() {
        let mut diags = Diagnostics::new();
        diags.set_file(Some("main.vuel".into()));
        let tok = Token::new(TokenType::Identifier("x".into()), "x", 3, 7);
        diags.syntax_error(&tok, "Expect ';' after value.");
        let eof = Token::new(TokenType::Eof, "", 9, 1);
        diags.set_file(None);
        diags.resolve_error(&eof, "Expect '}' after block.");
        diags.lex_error(1, 2, "Unexpected character '#'.");

        let rendered = diags.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                "main.vuel:3:7 - Error at 'x': Expect ';' after value.",
                "9:1 - Error at end: Expect '}' after block.",
                "1:2 - Error: Unexpected character '#'.",
            ]
        );
        assert!(diags.had_error());
        assert!(!diags.had_runtime_error());
    }

    #[test]
    fn formats_runtime_errors() {
        let mut diags = Diagnostics::new();
        diags.set_file(Some("main.vuel".into()));
        let tok = Token::new(TokenType::Slash, "/", 2, 5).in_file(Some("lib.vuel".into()));
        diags.runtime_error(&RuntimeError::new(&tok, "Division by zero."));

        let first = diags.iter().next().map(ToString::to_string);
        assert_eq!(first.as_deref(), Some("lib.vuel:2:5 - Division by zero."));
        assert!(!diags.had_error());
        assert!(diags.had_runtime_error());

        diags.clear();
        assert!(diags.is_empty());
    }
}
