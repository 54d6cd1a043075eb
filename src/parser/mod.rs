//! Textual IR parser.

mod text;

pub use text::parse;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Unknown value '{name}' at line {line}")]
    UnknownValue { line: usize, name: String },

    #[error("Duplicate definition of '{name}' at line {line}")]
    DuplicateValue { line: usize, name: String },

    #[error("Duplicate block label '{label}' at line {line}")]
    DuplicateBlock { line: usize, label: String },

    #[error("Invalid type '{0}'")]
    InvalidType(String),

    #[error("Unexpected end of input")]
    UnexpectedEof,
}

pub type ParseResult<T> = Result<T, ParseError>;
