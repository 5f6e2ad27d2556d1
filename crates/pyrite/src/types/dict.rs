//! Insertion-ordered dictionaries and the hashable key projection they share with sets.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    exception_private::{ExcType, RunResult},
    value::{ObjectId, Value},
};

/// Map keyed by [`DictKey`], used by both dictionaries and sets.
pub(crate) type KeyMap<V> = IndexMap<DictKey, V, ahash::RandomState>;

pub(crate) fn new_key_map<V>() -> KeyMap<V> {
    IndexMap::with_hasher(ahash::RandomState::new())
}

/// Hashable projection of a [`Value`].
///
/// Numbers are normalized so `1`, `1.0` and `True` land on the same key.
/// Objects without structural equality hash by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<DictKey>),
    Identity(ObjectId),
}

impl DictKey {
    /// Builds the key for `value`, failing with `TypeError` for mutable containers.
    pub fn from_value(value: &Value) -> RunResult<Self> {
        Ok(match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Int(i64::from(*b)),
            Value::Int(i) => Self::Int(*i),
            #[expect(clippy::cast_possible_truncation, reason = "integral floats in i64 range only")]
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => Self::Int(*f as i64),
            Value::Float(f) => Self::Float(f.to_bits()),
            Value::Str(s) => Self::Str(s.clone()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
            Value::Tuple(t) => Self::Tuple(t.items().iter().map(Self::from_value).collect::<RunResult<_>>()?),
            Value::List(_) | Value::Dict(_) | Value::Set(_) | Value::Reference(_) => {
                return Err(ExcType::type_error_unhashable(&value.type_name()));
            }
            other => match other.object_id() {
                Some(id) => Self::Identity(id),
                None => return Err(ExcType::type_error_unhashable(&value.type_name())),
            },
        })
    }
}

/// A mutable, insertion-ordered dictionary.
///
/// Entries keep the original key value next to the stored value so iteration
/// returns exactly what was inserted.
#[derive(Debug)]
pub struct Dict {
    id: ObjectId,
    entries: RefCell<KeyMap<(Value, Value)>>,
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            entries: RefCell::new(new_key_map()),
        }
    }

    /// Builds a dictionary from key/value pairs, later duplicates overwriting earlier ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> RunResult<Self> {
        let dict = Self::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value) -> RunResult<Option<Value>> {
        let key = DictKey::from_value(key)?;
        Ok(self.entries.borrow().get(&key).map(|(_, value)| value.clone()))
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.entries
            .borrow()
            .get(&DictKey::Str(Rc::from(key)))
            .map(|(_, value)| value.clone())
    }

    pub fn contains(&self, key: &Value) -> RunResult<bool> {
        let key = DictKey::from_value(key)?;
        Ok(self.entries.borrow().contains_key(&key))
    }

    pub fn insert(&self, key: Value, value: Value) -> RunResult<()> {
        let hashed = DictKey::from_value(&key)?;
        let mut entries = self.entries.borrow_mut();
        match entries.get_mut(&hashed) {
            Some(entry) => entry.1 = value,
            None => {
                entries.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn insert_str(&self, key: Rc<str>, value: Value) {
        self.entries
            .borrow_mut()
            .insert(DictKey::Str(key.clone()), (Value::Str(key), value));
    }

    /// Removes `key`, preserving the order of the remaining entries.
    pub fn remove(&self, key: &Value) -> RunResult<Option<Value>> {
        let key = DictKey::from_value(key)?;
        Ok(self.entries.borrow_mut().shift_remove(&key).map(|(_, value)| value))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.entries.borrow().values().map(|(key, _)| key.clone()).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.entries.borrow().values().map(|(_, value)| value.clone()).collect()
    }

    #[must_use]
    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.borrow().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_collapse() {
        let dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("float")).unwrap();
        dict.insert(Value::Bool(true), Value::str("bool")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Int(1)).unwrap(), Some(Value::str("bool")));
        assert_eq!(dict.keys(), vec![Value::Int(1)]);
    }

    #[test]
    fn lists_are_unhashable() {
        let err = DictKey::from_value(&Value::list(vec![])).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
    }

    #[test]
    fn removal_keeps_order() {
        let dict = Dict::from_pairs([
            (Value::str("a"), Value::Int(1)),
            (Value::str("b"), Value::Int(2)),
            (Value::str("c"), Value::Int(3)),
        ])
        .unwrap();
        assert_eq!(dict.remove(&Value::str("b")).unwrap(), Some(Value::Int(2)));
        assert_eq!(dict.keys(), vec![Value::str("a"), Value::str("c")]);
    }
}
