use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{Shared, SharedCell, Value};

#[derive(Default)]
struct ObjectData {
    properties: IndexMap<SmolStr, Value>,
    proto: Option<Object>,
}

/// A reference-counted property bag with insertion-ordered keys.
///
/// The optional prototype is consulted on reads only: `get` and `has` fall
/// through to it, while `set` and `remove` always act on own properties.
#[derive(Clone, Default)]
pub struct Object(Shared<SharedCell<ObjectData>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proto(proto: &Object) -> Self {
        Self(Shared::new(SharedCell::new(ObjectData {
            properties: IndexMap::default(),
            proto: Some(proto.clone()),
        })))
    }

    pub fn get(&self, key: &str) -> Value {
        let mut current = self.clone();

        loop {
            let next = {
                let data = current.0.borrow();
                if let Some(value) = data.properties.get(key) {
                    return value.clone();
                }
                data.proto.clone()
            };

            match next {
                Some(proto) => current = proto,
                None => return Value::Undefined,
            }
        }
    }

    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.0.borrow().properties.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        let mut current = self.clone();

        loop {
            let next = {
                let data = current.0.borrow();
                if data.properties.contains_key(key) {
                    return true;
                }
                data.proto.clone()
            };

            match next {
                Some(proto) => current = proto,
                None => return false,
            }
        }
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.borrow().properties.contains_key(key)
    }

    pub fn set(&self, key: impl Into<SmolStr>, value: impl Into<Value>) {
        self.0.borrow_mut().properties.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().properties.shift_remove(key)
    }

    /// Own keys in insertion order.
    pub fn keys(&self) -> Vec<SmolStr> {
        self.0.borrow().properties.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(SmolStr, Value)> {
        self.0
            .borrow()
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().properties.is_empty()
    }

    pub fn proto(&self) -> Option<Object> {
        self.0.borrow().proto.clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().properties.clear();
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> usize {
        Shared::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: Into<SmolStr>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let object = Object::new();
        {
            let mut data = object.0.borrow_mut();
            for (k, v) in iter {
                data.properties.insert(k.into(), v.into());
            }
        }
        object
    }
}

/// A reference-counted, growable list of values.
#[derive(Clone, Default)]
pub struct Array(Shared<SharedCell<Vec<Value>>>);

impl Array {
    pub fn new(values: Vec<Value>) -> Self {
        Self(Shared::new(SharedCell::new(values)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Writes past the end pad the gap with `undefined`.
    pub fn set(&self, index: usize, value: Value) {
        let mut values = self.0.borrow_mut();
        if index >= values.len() {
            values.resize(index + 1, Value::Undefined);
        }
        values[index] = value;
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    pub fn set_len(&self, len: usize) {
        self.0.borrow_mut().resize(len, Value::Undefined);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> usize {
        Shared::as_ptr(&self.0) as *const () as usize
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Array::new(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_proto_read_fallback() {
        let parent = Object::from_iter([("a", 1.0), ("b", 2.0)]);
        let child = Object::with_proto(&parent);

        assert_eq!(child.get("a"), Value::Number(1.0));
        assert!(child.has("a"));
        assert!(!child.has_own("a"));

        child.set("a", 10.0);
        assert_eq!(child.get("a"), Value::Number(10.0));
        assert_eq!(parent.get("a"), Value::Number(1.0));

        parent.set("c", 3.0);
        assert_eq!(child.get("c"), Value::Number(3.0));
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let object = Object::from_iter([("z", 1.0), ("a", 2.0), ("m", 3.0)]);
        object.remove("a");
        object.set("b", 4.0);
        assert_eq!(object.keys(), vec!["z", "m", "b"]);
    }

    #[rstest]
    #[case::inside(1, vec![Value::Number(1.0), Value::Number(9.0)])]
    #[case::past_end(3, vec![Value::Number(1.0), Value::Number(2.0), Value::Undefined, Value::Number(9.0)])]
    fn test_array_set(#[case] index: usize, #[case] expected: Vec<Value>) {
        let array = Array::from_iter([1.0, 2.0]);
        array.set(index, Value::Number(9.0));
        assert_eq!(array.to_vec(), expected);
    }

    #[test]
    fn test_reference_semantics() {
        let array = Array::from_iter([1.0]);
        let alias = array.clone();
        alias.push(2.0);
        assert_eq!(array.len(), 2);
        assert!(array.ptr_eq(&alias));
        assert!(!array.ptr_eq(&Array::from_iter([1.0, 2.0])));
    }
}
