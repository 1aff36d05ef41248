use smol_str::SmolStr;

use super::{Array, Object, Value};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(SmolStr::new(s)),
            serde_json::Value::Array(values) => {
                Value::Array(values.into_iter().map(Value::from).collect::<Array>())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Object>(),
            ),
        }
    }
}

impl Value {
    /// Converts to JSON the way `JSON.stringify` would: `undefined` and
    /// functions are dropped from objects and become `null` inside arrays,
    /// non-finite numbers become `null`. Cyclic structures are cut at the
    /// repeated reference.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_with(&mut Vec::new())
    }

    fn to_json_with(&self, path: &mut Vec<usize>) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(array) => {
                if path.contains(&array.id()) {
                    return serde_json::Value::Null;
                }

                path.push(array.id());
                let values = array
                    .to_vec()
                    .iter()
                    .map(|v| v.to_json_with(path))
                    .collect();
                path.pop();
                serde_json::Value::Array(values)
            }
            Value::Object(object) => {
                if path.contains(&object.id()) {
                    return serde_json::Value::Null;
                }

                path.push(object.id());
                let map = object
                    .entries()
                    .into_iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_)))
                    .map(|(k, v)| (k.to_string(), v.to_json_with(path)))
                    .collect();
                path.pop();
                serde_json::Value::Object(map)
            }
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
        serde_json::Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
