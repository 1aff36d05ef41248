use smol_str::SmolStr;

use crate::{Object, Value, error::runtime::RuntimeError};

use super::Filter;

type Comparator = Box<dyn Fn(&Value, &Value) -> Result<bool, RuntimeError>>;

/// `items | filter:predicate:comparator`
///
/// The predicate may be a function called with each item, or a criterion:
/// a primitive matched against any nested property, a `!`-prefixed string
/// for negation, or an object matched key by key (`$` matches any key).
pub fn filter_filter() -> Filter {
    Filter::new(|args| {
        let input = args.first().cloned().unwrap_or_default();
        let expression = args.get(1).cloned().unwrap_or_default();
        let comparator = args.get(2).cloned().unwrap_or_default();

        let array = match &input {
            Value::Array(array) => array.to_vec(),
            Value::Undefined | Value::Null => return Ok(input),
            other => {
                return Err(RuntimeError::InvalidArguments(
                    "filter".to_string(),
                    format!("expected an array, got {}", other.name()),
                ));
            }
        };

        let predicate: Box<dyn Fn(&Value) -> Result<bool, RuntimeError>> = match &expression {
            Value::Function(function) => {
                let function = function.clone();
                Box::new(move |item| Ok(function.call(&Value::Undefined, &[item.clone()])?.truthy()))
            }
            Value::String(_)
            | Value::Number(_)
            | Value::Bool(_)
            | Value::Null
            | Value::Object(_)
            | Value::Array(_) => predicate_for(expression.clone(), comparator_for(comparator)),
            Value::Undefined => return Ok(input),
        };

        let mut selected = Vec::with_capacity(array.len());
        for item in array {
            if predicate(&item)? {
                selected.push(item);
            }
        }

        Ok(Value::from(selected))
    })
}

fn comparator_for(comparator: Value) -> Comparator {
    match comparator {
        Value::Bool(true) => Box::new(|actual, expected| Ok(actual.deep_equals(expected))),
        Value::Function(function) => Box::new(move |actual, expected| {
            Ok(function
                .call(&Value::Undefined, &[actual.clone(), expected.clone()])?
                .truthy())
        }),
        _ => Box::new(|actual, expected| {
            Ok(match (actual, expected) {
                (Value::Undefined, _) => false,
                (Value::Null, _) | (_, Value::Null) => actual.strict_equals(expected),
                _ => actual
                    .to_js_string()
                    .to_lowercase()
                    .contains(&expected.to_js_string().to_lowercase()),
            })
        }),
    }
}

fn predicate_for(
    expression: Value,
    comparator: Comparator,
) -> Box<dyn Fn(&Value) -> Result<bool, RuntimeError>> {
    let wildcard = match &expression {
        Value::Object(object) if object.has("$") => Some(object.get("$")),
        _ => None,
    };

    Box::new(move |item| match (&wildcard, is_object_like(item)) {
        (Some(any), false) => deep_compare(item, any, &comparator, false, false),
        _ => deep_compare(item, &expression, &comparator, true, false),
    })
}

#[inline(always)]
fn is_object_like(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_) | Value::Function(_))
}

fn values_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(object) => object.entries().into_iter().map(|(_, v)| v).collect(),
        Value::Array(array) => array.to_vec(),
        _ => Vec::new(),
    }
}

fn deep_compare(
    actual: &Value,
    expected: &Value,
    comparator: &Comparator,
    match_any_property: bool,
    in_wildcard: bool,
) -> Result<bool, RuntimeError> {
    if let Value::String(s) = expected
        && let Some(negated) = s.strip_prefix('!')
    {
        return Ok(!deep_compare(
            actual,
            &Value::from(negated),
            comparator,
            match_any_property,
            false,
        )?);
    }

    if let Value::Array(items) = actual {
        for item in items.to_vec() {
            if deep_compare(&item, expected, comparator, match_any_property, false)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if !is_object_like(actual) {
        return comparator(actual, expected);
    }

    match expected {
        Value::Object(criteria) if !in_wildcard => {
            for (key, expected_value) in criteria_entries(criteria) {
                if expected_value.is_undefined() {
                    continue;
                }

                let is_wildcard = key == "$";
                let actual_value = if is_wildcard {
                    actual.clone()
                } else {
                    actual.get_member(&key)
                };

                if !deep_compare(
                    &actual_value,
                    &expected_value,
                    comparator,
                    is_wildcard,
                    is_wildcard,
                )? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ if match_any_property => {
            for value in values_of(actual) {
                if deep_compare(&value, expected, comparator, match_any_property, false)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => comparator(actual, expected),
    }
}

// Own and inherited keys, nearest first.
fn criteria_entries(criteria: &Object) -> Vec<(SmolStr, Value)> {
    let mut entries: Vec<(SmolStr, Value)> = Vec::new();
    let mut current = Some(criteria.clone());

    while let Some(object) = current {
        for (key, value) in object.entries() {
            if !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, value));
            }
        }
        current = object.proto();
    }

    entries
}
