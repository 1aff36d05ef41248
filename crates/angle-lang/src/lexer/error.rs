use thiserror::Error;

use crate::range::Range;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unexpected next character `{0}`")]
    UnexpectedCharacter(char, Range),
    #[error("Unmatched quote")]
    UnterminatedString(Range),
    #[error("Invalid exponent")]
    InvalidExponent(Range),
    #[error("Invalid unicode escape `\\u{0}`")]
    InvalidUnicodeEscape(String, Range),
    #[error("Invalid number `{0}`")]
    InvalidNumber(String, Range),
}

impl LexerError {
    pub fn range(&self) -> Range {
        match self {
            LexerError::UnexpectedCharacter(_, range)
            | LexerError::UnterminatedString(range)
            | LexerError::InvalidExponent(range)
            | LexerError::InvalidUnicodeEscape(_, range)
            | LexerError::InvalidNumber(_, range) => *range,
        }
    }
}
