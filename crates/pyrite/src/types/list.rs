use std::cell::{Ref, RefCell, RefMut};

use crate::value::{ObjectId, Value};

/// A mutable, shared list.
#[derive(Debug)]
pub struct List {
    id: ObjectId,
    items: RefCell<Vec<Value>>,
}

impl List {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            id: ObjectId::next(),
            items: RefCell::new(items),
        }
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

    /// Clones the current contents.
    ///
    /// Callers that may re-enter the VM while walking the list use this instead
    /// of holding a borrow across the call.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.items.borrow_mut()
    }
}

/// An immutable tuple.
#[derive(Debug)]
pub struct Tuple {
    id: ObjectId,
    items: Vec<Value>,
}

impl Tuple {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            id: ObjectId::next(),
            items,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }
}
