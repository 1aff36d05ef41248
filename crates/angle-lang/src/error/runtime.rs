use thiserror::Error;

use super::security::SecurityError;

type TypeName = &'static str;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum RuntimeError {
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("`{0}` is not a function, got {1}")]
    NotAFunction(String, TypeName),
    #[error("Invalid arguments for `{0}`: {1}")]
    InvalidArguments(String, String),
    #[error("Function constructor is not supported")]
    FunctionConstructor,
    #[error("Expression `{0}` is not assignable")]
    NotAssignable(String),
    #[error("Invalid array length: {0}")]
    InvalidArrayLength(String),
    #[error("{0}")]
    UserDefined(String),
}

impl RuntimeError {
    pub fn user_defined(message: impl Into<String>) -> Self {
        RuntimeError::UserDefined(message.into())
    }
}
