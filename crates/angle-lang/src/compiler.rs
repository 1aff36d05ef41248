//! Closure-based compiler for expressions.
//!
//! Each analyzed AST node becomes a boxed closure that takes a `Frame`
//! (scope, locals and the value being assigned) and returns a `Value`.
//! Nothing is turned back into source text, and every member read, call
//! and argument goes through the checks in [`security`].

mod compile;
pub(crate) mod compiled;
pub mod error;
mod expression;
mod operator;
pub mod security;

pub use expression::{Expression, Input, WatchDelegate};
