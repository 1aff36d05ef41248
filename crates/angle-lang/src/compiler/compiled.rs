use crate::Value;
use crate::error::runtime::RuntimeError;

/// What a compiled expression is evaluated against.
pub struct Frame<'a> {
    /// The scope object; `this` inside expressions.
    pub scope: &'a Value,
    /// Per-call overrides, consulted before the scope.
    pub locals: &'a Value,
    /// The value being written by an `assign` call.
    pub value: &'a Value,
}

impl<'a> Frame<'a> {
    pub fn new(scope: &'a Value, locals: &'a Value, value: &'a Value) -> Self {
        Self {
            scope,
            locals,
            value,
        }
    }
}

pub type CompiledExpr = Box<dyn Fn(&Frame<'_>) -> Result<Value, RuntimeError>>;
