pub mod function;
pub mod json;
pub mod object;

use std::{borrow::Cow, cmp::Ordering};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::runtime::RuntimeError;

pub use function::{Function, FunctionKind, NativeFunction};
pub use object::{Array, Object};

/// A dynamically typed expression value.
///
/// `Array`, `Object` and `Function` are handles: cloning a value shares the
/// underlying storage, and strict equality on them is identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(SmolStr),
    Array(Array),
    Object(Object),
    Function(Function),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(Array::new(values))
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Structural comparison, used mainly by tests and hosts. Handles compare by
/// content here; use [`Value::strict_equals`] for identity semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.to_js_string())
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Array(array) => f.debug_list().entries(array.to_vec()).finish(),
            Value::Object(object) => f.debug_map().entries(object.entries()).finish(),
            Value::Function(function) => write!(f, "{:?}", function),
            other => write!(f, "{}", other),
        }
    }
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if !(1e-7..1e21).contains(&n.abs()) {
        let formatted = format!("{:e}", n);
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        }
    } else if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// Largest length an array may be grown to by an expression write.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Parses a property key as a canonical array index (`"0"`, `"12"`, not `"01"`).
fn array_index(key: &str) -> Option<usize> {
    match key.as_bytes() {
        [b'0'] => Some(0),
        [b'1'..=b'9', rest @ ..] if rest.iter().all(u8::is_ascii_digit) => key.parse().ok(),
        _ => None,
    }
}

impl Value {
    pub const UNDEFINED: Value = Value::Undefined;
    pub const NULL: Value = Value::Null;
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    #[inline(always)]
    pub fn new_object() -> Value {
        Value::Object(Object::new())
    }

    #[inline(always)]
    pub fn new_array() -> Value {
        Value::Array(Array::default())
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    #[inline(always)]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline(always)]
    pub fn is_defined(&self) -> bool {
        !self.is_undefined()
    }

    #[inline(always)]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    #[inline(always)]
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    #[inline(always)]
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> Cow<'_, str> {
        match self {
            Value::Undefined => Cow::Borrowed("undefined"),
            Value::Null => Cow::Borrowed("null"),
            Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Number(n) => Cow::Owned(format_number(*n)),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Array(array) => Cow::Owned(
                array
                    .to_vec()
                    .iter()
                    .map(|v| match v {
                        Value::Undefined | Value::Null => Cow::Borrowed(""),
                        v => Cow::Owned(v.to_js_string().into_owned()),
                    })
                    .join(","),
            ),
            Value::Object(_) => Cow::Borrowed("[object Object]"),
            Value::Function(function) => {
                Cow::Owned(format!("function {}() {{ [native code] }}", function.name()))
            }
        }
    }

    /// Reduces handles to their string form, leaves primitives untouched.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                Value::String(SmolStr::new(self.to_js_string()))
            }
            other => other.clone(),
        }
    }

    pub fn to_property_key(&self) -> SmolStr {
        match self {
            Value::String(s) => s.clone(),
            other => SmolStr::new(other.to_js_string()),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (
                Value::Array(_) | Value::Object(_) | Value::Function(_),
                Value::Number(_) | Value::String(_),
            ) => self.to_primitive().loose_equals(other),
            (
                Value::Number(_) | Value::String(_),
                Value::Array(_) | Value::Object(_) | Value::Function(_),
            ) => self.loose_equals(&other.to_primitive()),
            _ => self.strict_equals(other),
        }
    }

    /// Identity comparison used by dirty checking: `===`, except that two
    /// `NaN`s are considered equal.
    pub fn identical(&self, other: &Value) -> bool {
        self.strict_equals(other) || (self.is_nan() && other.is_nan())
    }

    /// Relational comparison: strings compare lexically when both sides are
    /// strings after primitive conversion, numerically otherwise. `None` when
    /// either side converts to `NaN`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.to_primitive(), other.to_primitive()) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_number().partial_cmp(&b.to_number()),
        }
    }

    /// Structural equality with `NaN == NaN`. Keys starting with `$` and
    /// function-valued properties are ignored on objects.
    pub fn deep_equals(&self, other: &Value) -> bool {
        if self.identical(other) {
            return true;
        }

        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.to_vec(), b.to_vec());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.deep_equals(b))
            }
            (Value::Object(a), Value::Object(b)) => {
                let comparable = |key: &SmolStr, value: &Value| {
                    !key.starts_with('$') && !value.is_function()
                };
                let a_entries = a
                    .entries()
                    .into_iter()
                    .filter(|(k, v)| comparable(k, v))
                    .collect::<Vec<_>>();

                if !a_entries.iter().all(|(k, v)| v.deep_equals(&b.get(k))) {
                    return false;
                }

                b.entries().iter().all(|(k, v)| {
                    !comparable(k, v) || v.is_undefined() || a_entries.iter().any(|(key, _)| key == k)
                })
            }
            _ => false,
        }
    }

    /// Recursively copies arrays and own object properties. Shared
    /// sub-structures and cycles are preserved in the copy.
    pub fn deep_clone(&self) -> Value {
        self.deep_clone_with(&mut FxHashMap::default())
    }

    fn deep_clone_with(&self, seen: &mut FxHashMap<usize, Value>) -> Value {
        match self {
            Value::Array(array) => {
                if let Some(copy) = seen.get(&array.id()) {
                    return copy.clone();
                }

                let copy = Array::default();
                seen.insert(array.id(), Value::Array(copy.clone()));
                for value in array.to_vec() {
                    copy.push(value.deep_clone_with(seen));
                }
                Value::Array(copy)
            }
            Value::Object(object) => {
                if let Some(copy) = seen.get(&object.id()) {
                    return copy.clone();
                }

                let copy = Object::new();
                seen.insert(object.id(), Value::Object(copy.clone()));
                for (key, value) in object.entries() {
                    copy.set(key, value.deep_clone_with(seen));
                }
                Value::Object(copy)
            }
            other => other.clone(),
        }
    }

    /// Copies one level: a new array or object holding the same values.
    pub fn shallow_clone(&self) -> Value {
        match self {
            Value::Array(array) => Value::Array(Array::new(array.to_vec())),
            Value::Object(object) => Value::Object(Object::from_iter(object.entries())),
            other => other.clone(),
        }
    }

    /// Array-likes are arrays and strings: both expose `length` and indices.
    pub fn is_array_like(&self) -> bool {
        matches!(self, Value::Array(_) | Value::String(_))
    }

    /// `key in value`
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Value::Object(object) => object.has(key),
            Value::Array(array) => {
                key == "length" || array_index(key).is_some_and(|i| i < array.len())
            }
            Value::String(s) => {
                key == "length" || array_index(key).is_some_and(|i| i < s.chars().count())
            }
            Value::Function(_) => matches!(key, "call" | "apply" | "bind" | "name"),
            _ => false,
        }
    }

    /// `value[key]`; nullish receivers yield `undefined`.
    pub fn get_member(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key),
            Value::Array(array) => match key {
                "length" => Value::from(array.len()),
                _ => array_index(key).map(|i| array.get(i)).unwrap_or_default(),
            },
            Value::String(s) => match key {
                "length" => Value::from(s.chars().count()),
                _ => array_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(SmolStr::new(c.to_string())))
                    .unwrap_or_default(),
            },
            Value::Function(function) => match key {
                "call" => Value::Function(function.call_method()),
                "apply" => Value::Function(function.apply_method()),
                "bind" => Value::Function(function.bind_method()),
                "name" => Value::String(SmolStr::new(function.name())),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// `value[key] = new_value`. Writes to primitives are ignored.
    ///
    /// Arrays are dense, so a length or index write that would grow one past
    /// [`MAX_ARRAY_LENGTH`] fails instead of allocating.
    pub fn set_member(&self, key: &str, new_value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Object(object) => object.set(key, new_value),
            Value::Array(array) => match (key, array_index(key)) {
                ("length", _) => {
                    let len = new_value.to_number();
                    if len.fract() != 0.0 || !(0.0..=MAX_ARRAY_LENGTH as f64).contains(&len) {
                        return Err(RuntimeError::InvalidArrayLength(format_number(len)));
                    }
                    array.set_len(len as usize);
                }
                (_, Some(index)) if index < MAX_ARRAY_LENGTH => array.set(index, new_value),
                (_, Some(_)) => return Err(RuntimeError::InvalidArrayLength(key.to_string())),
                // Out of `usize` range, too large for any array.
                (_, None)
                    if key.len() > 1
                        && !key.starts_with('0')
                        && key.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    return Err(RuntimeError::InvalidArrayLength(key.to_string()));
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    match s {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        s if s.starts_with("0x") || s.starts_with("0X") => {
            i64::from_str_radix(&s[2..], 16).map(|n| n as f64).unwrap_or(f64::NAN)
        }
        s if s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            s.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}
