use smol_str::SmolStr;
use thiserror::Error;

use crate::{error::security::SecurityError, range::Range};

#[derive(Error, Debug, PartialEq, Clone)]
pub enum CompileError {
    #[error("Unknown filter `{0}`")]
    UnknownFilter(SmolStr, Range),
    #[error("{0}")]
    Security(SecurityError, Range),
    #[error("`{0}` cannot be assigned to")]
    NotAssignable(String, Range),
}

impl CompileError {
    pub fn range(&self) -> Range {
        match self {
            CompileError::UnknownFilter(_, range)
            | CompileError::Security(_, range)
            | CompileError::NotAssignable(_, range) => *range,
        }
    }
}
