pub mod callable;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expr;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod scope;
mod stack;
pub mod statement;
pub mod token;
pub mod value;

pub use compiler::{Compiler, Module};
pub use config::Config;
pub use error::{Diagnostic, Diagnostics, RuntimeError};
pub use interpreter::Interpreter;
pub use value::Val;
