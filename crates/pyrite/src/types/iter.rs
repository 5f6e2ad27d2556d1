//! Native iterators over builtin containers and ranges.

use std::{cell::RefCell, rc::Rc};

use super::List;
use crate::value::{ObjectId, Value};

#[derive(Debug)]
enum IterState {
    /// A snapshot of immutable (or snapshotted) items.
    Items { items: Vec<Value>, index: usize },
    /// A live view of a list; appends during iteration are observed.
    List { list: Rc<List>, index: usize },
    Range { next: i64, stop: i64, step: i64 },
    Exhausted,
}

/// An iterator produced by `iter()` or `GetIter` on a builtin value.
#[derive(Debug)]
pub struct ValueIter {
    id: ObjectId,
    state: RefCell<IterState>,
}

impl ValueIter {
    fn with_state(state: IterState) -> Self {
        Self {
            id: ObjectId::next(),
            state: RefCell::new(state),
        }
    }

    #[must_use]
    pub fn over_items(items: Vec<Value>) -> Self {
        Self::with_state(IterState::Items { items, index: 0 })
    }

    #[must_use]
    pub fn over_list(list: Rc<List>) -> Self {
        Self::with_state(IterState::List { list, index: 0 })
    }

    /// A `range(start, stop, step)` iterator; `step` must be non-zero.
    #[must_use]
    pub fn over_range(start: i64, stop: i64, step: i64) -> Self {
        Self::with_state(IterState::Range { next: start, stop, step })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Produces the next item, or `None` once exhausted.
    pub fn next_value(&self) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        let item = match &mut *state {
            IterState::Items { items, index } => {
                let item = items.get(*index).cloned();
                *index += 1;
                item
            }
            IterState::List { list, index } => {
                let item = list.get(*index);
                *index += 1;
                item
            }
            IterState::Range { next, stop, step } => {
                let in_range = if *step > 0 { *next < *stop } else { *next > *stop };
                if in_range {
                    let current = *next;
                    match current.checked_add(*step) {
                        Some(following) => *next = following,
                        None => *next = *stop,
                    }
                    Some(Value::Int(current))
                } else {
                    None
                }
            }
            IterState::Exhausted => None,
        };
        if item.is_none() {
            *state = IterState::Exhausted;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(iter: &ValueIter) -> Vec<Value> {
        std::iter::from_fn(|| iter.next_value()).collect()
    }

    #[test]
    fn ranges_respect_step_sign() {
        assert_eq!(drain(&ValueIter::over_range(0, 5, 2)), vec![Value::Int(0), Value::Int(2), Value::Int(4)]);
        assert_eq!(drain(&ValueIter::over_range(3, 0, -1)), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
        assert!(drain(&ValueIter::over_range(0, 0, 1)).is_empty());
    }

    #[test]
    fn list_iteration_sees_appends() {
        let list = Rc::new(List::new(vec![Value::Int(1)]));
        let iter = ValueIter::over_list(list.clone());
        assert_eq!(iter.next_value(), Some(Value::Int(1)));
        list.push(Value::Int(2));
        assert_eq!(iter.next_value(), Some(Value::Int(2)));
        assert_eq!(iter.next_value(), None);
        list.push(Value::Int(3));
        assert_eq!(iter.next_value(), None);
    }
}
