use smol_str::SmolStr;
use thiserror::Error;

/// Raised when an expression reaches for something outside the sandbox.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum SecurityError {
    #[error("Attempting to access a disallowed field `{0}` in expressions")]
    DisallowedMemberName(SmolStr),
    #[error("Referencing the window object in expressions is disallowed")]
    WindowReference,
    #[error("Referencing DOM nodes in expressions is disallowed")]
    DomNodeReference,
    #[error("Referencing the Function constructor in expressions is disallowed")]
    FunctionConstructorReference,
    #[error("Referencing the Object constructor in expressions is disallowed")]
    ObjectConstructorReference,
    #[error("Referencing call, apply or bind in expressions is disallowed")]
    CallApplyBindReference,
}
