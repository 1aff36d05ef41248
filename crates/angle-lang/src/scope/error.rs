use std::fmt;

use thiserror::Error;

use crate::error::{Error, runtime::RuntimeError};

/// The phase a scope tree is in while `apply` or `digest` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Apply,
    Digest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Apply => write!(f, "$apply"),
            Phase::Digest => write!(f, "$digest"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ScopeError {
    #[error("{0} already in progress")]
    PhaseInProgress(Phase),
    #[error("{0} $digest() iterations reached. Aborting!")]
    DigestIterationsReached(usize),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Expression(#[from] Box<Error>),
}

impl From<Error> for ScopeError {
    fn from(err: Error) -> Self {
        ScopeError::Expression(Box::new(err))
    }
}
