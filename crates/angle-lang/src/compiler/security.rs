//! Runtime guards that keep expressions inside their sandbox.
//!
//! The checks are a denylist: they refuse the well-known escape hatches
//! (prototype tampering names, the global object, DOM-shaped values and the
//! function constructors) but do not make arbitrary host functions safe.

use smol_str::SmolStr;

use crate::{FunctionKind, Value, error::security::SecurityError};

const DISALLOWED_MEMBER_NAMES: [&str; 6] = [
    "constructor",
    "__proto__",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

pub fn ensure_safe_member_name(name: &str) -> Result<(), SecurityError> {
    if DISALLOWED_MEMBER_NAMES.contains(&name) {
        return Err(SecurityError::DisallowedMemberName(SmolStr::new(name)));
    }

    Ok(())
}

pub fn ensure_safe_object(value: &Value) -> Result<(), SecurityError> {
    match value {
        Value::Object(object) => {
            if matches!(object.get("window"), Value::Object(window) if window.ptr_eq(object)) {
                return Err(SecurityError::WindowReference);
            }

            let has = |key: &str| object.get(key).truthy();
            if has("children") && (has("nodeName") || (has("prop") && has("attr") && has("find")))
            {
                return Err(SecurityError::DomNodeReference);
            }

            Ok(())
        }
        Value::Function(function) => match function.kind() {
            FunctionKind::FunctionConstructor => Err(SecurityError::FunctionConstructorReference),
            FunctionKind::ObjectConstructor => Err(SecurityError::ObjectConstructorReference),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

pub fn ensure_safe_function(value: &Value) -> Result<(), SecurityError> {
    match value.as_function().map(|f| f.kind()) {
        Some(FunctionKind::FunctionConstructor) => Err(SecurityError::FunctionConstructorReference),
        Some(FunctionKind::Call | FunctionKind::Apply | FunctionKind::Bind) => {
            Err(SecurityError::CallApplyBindReference)
        }
        _ => Ok(()),
    }
}
