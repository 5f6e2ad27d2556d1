use std::cell::RefCell;

use super::dict::{DictKey, KeyMap, new_key_map};
use crate::{
    exception_private::RunResult,
    value::{ObjectId, Value},
};

/// Insertion-ordered set, shared by `set` (mutable) and `frozenset` values.
#[derive(Debug)]
pub struct Set {
    id: ObjectId,
    items: RefCell<KeyMap<Value>>,
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl Set {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            items: RefCell::new(new_key_map()),
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> RunResult<Self> {
        let set = Self::new();
        for value in values {
            set.add(value)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `value`; returns whether it was newly inserted.
    pub fn add(&self, value: Value) -> RunResult<bool> {
        let key = DictKey::from_value(&value)?;
        let mut items = self.items.borrow_mut();
        if items.contains_key(&key) {
            return Ok(false);
        }
        items.insert(key, value);
        Ok(true)
    }

    pub fn contains(&self, value: &Value) -> RunResult<bool> {
        let key = DictKey::from_value(value)?;
        Ok(self.items.borrow().contains_key(&key))
    }

    /// Removes `value`; returns whether it was present.
    pub fn remove(&self, value: &Value) -> RunResult<bool> {
        let key = DictKey::from_value(value)?;
        Ok(self.items.borrow_mut().shift_remove(&key).is_some())
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.items.borrow().values().cloned().collect()
    }

    /// Membership equality, ignoring order.
    #[must_use]
    pub fn same_members(&self, other: &Self) -> bool {
        if self.id == other.id {
            return true;
        }
        let (mine, theirs) = (self.items.borrow(), other.items.borrow());
        mine.len() == theirs.len() && mine.keys().all(|key| theirs.contains_key(key))
    }
}
