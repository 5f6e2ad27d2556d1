//! Lvalue references.
//!
//! Assignment and delete targets are compiled into a [`Reference`] value that
//! the `Assign`, `Delete` and `Deref` instructions consume. Building a
//! reference only checks its shape; the target is resolved when it is used.

use std::{fmt, rc::Rc};

use crate::{
    exception_private::{ExcType, RunResult},
    namespace::{Qualifier, ScopeRef},
    value::Value,
};

/// An assignable location.
pub enum Reference {
    /// A name, resolved against `scope` according to `qualifier`.
    Variable {
        name: Rc<str>,
        qualifier: Qualifier,
        scope: ScopeRef,
    },
    /// `parent.name`
    Property { parent: Value, name: Rc<str> },
    /// `parent[key]`
    Index { parent: Value, key: Value },
    /// `parent[from:to:step]`
    Range {
        parent: Value,
        from: Option<Value>,
        to: Option<Value>,
        step: Option<Value>,
    },
}

impl Reference {
    /// Builds a property reference; the name operand must hold a string.
    pub(crate) fn property(parent: Value, name: &Value) -> RunResult<Self> {
        match name {
            Value::Str(name) => Ok(Self::Property {
                parent,
                name: name.clone(),
            }),
            _ => Err(ExcType::type_error_property_name()),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable { name, qualifier, .. } => write!(f, "Variable({name}, {qualifier})"),
            Self::Property { parent, name } => write!(f, "Property({parent:?}.{name})"),
            Self::Index { parent, key } => write!(f, "Index({parent:?}[{key:?}])"),
            Self::Range { parent, .. } => write!(f, "Range({parent:?}[..])"),
        }
    }
}

/// Slice bounds resolved against a concrete sequence length.
///
/// Follows the source language's slice clamping: out-of-range bounds are
/// clamped instead of raising, and a negative step walks backwards from the
/// end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceIndices {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl SliceIndices {
    /// Resolves optional `from`/`to`/`step` bounds for a sequence of `len` items.
    ///
    /// # Errors
    /// Raises `ValueError` when `step` is zero, and `TypeError` when a bound is
    /// neither an integer nor `None`.
    pub fn resolve(len: usize, from: Option<&Value>, to: Option<&Value>, step: Option<&Value>) -> RunResult<Self> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let step = bound(step)?.unwrap_or(1);
        if step == 0 {
            return Err(ExcType::value_error_slice_step_zero());
        }
        let clamp = |value: Option<i64>, default: i64| -> i64 {
            let Some(mut value) = value else { return default };
            if value < 0 {
                value += len;
                if value < 0 {
                    value = if step < 0 { -1 } else { 0 };
                }
            } else if value >= len {
                value = if step < 0 { len - 1 } else { len };
            }
            value
        };
        let (default_start, default_stop) = if step < 0 { (len - 1, -1) } else { (0, len) };
        Ok(Self {
            start: clamp(bound(from)?, default_start),
            stop: clamp(bound(to)?, default_stop),
            step,
        })
    }

    /// The selected positions, in iteration order.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut next = Some(self.start);
        while let Some(index) = next {
            let inside = if self.step > 0 { index < self.stop } else { index > self.stop };
            if !inside {
                break;
            }
            out.extend(usize::try_from(index).ok());
            next = index.checked_add(self.step);
        }
        out
    }

    /// The contiguous range replaced by a step-1 slice assignment.
    #[must_use]
    pub fn contiguous(&self) -> std::ops::Range<usize> {
        let start = usize::try_from(self.start).unwrap_or(0);
        let stop = usize::try_from(self.stop).unwrap_or(0).max(start);
        start..stop
    }
}

fn bound(value: Option<&Value>) -> RunResult<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => value
            .as_int()
            .map(Some)
            .ok_or_else(|| ExcType::type_error_indices("slice", &value.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(len: usize, from: Option<i64>, to: Option<i64>, step: Option<i64>) -> SliceIndices {
        let (from, to, step) = (from.map(Value::Int), to.map(Value::Int), step.map(Value::Int));
        SliceIndices::resolve(len, from.as_ref(), to.as_ref(), step.as_ref()).unwrap()
    }

    #[test]
    fn forward_slices_clamp() {
        assert_eq!(resolve(5, Some(1), Some(3), None).indices(), vec![1, 2]);
        assert_eq!(resolve(5, Some(-2), None, None).indices(), vec![3, 4]);
        assert_eq!(resolve(5, Some(-10), Some(10), None).indices(), vec![0, 1, 2, 3, 4]);
        assert_eq!(resolve(5, None, None, Some(2)).indices(), vec![0, 2, 4]);
        assert!(resolve(5, Some(4), Some(1), None).indices().is_empty());
    }

    #[test]
    fn negative_steps_walk_backwards() {
        assert_eq!(resolve(5, None, None, Some(-1)).indices(), vec![4, 3, 2, 1, 0]);
        assert_eq!(resolve(5, Some(3), Some(0), Some(-1)).indices(), vec![3, 2, 1]);
        assert_eq!(resolve(5, Some(10), None, Some(-2)).indices(), vec![4, 2, 0]);
        assert_eq!(resolve(5, None, Some(-10), Some(-1)).indices(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn extreme_steps_stop_after_one_item() {
        assert_eq!(resolve(5, Some(1), None, Some(i64::MAX)).indices(), vec![1]);
        assert_eq!(resolve(5, None, None, Some(i64::MIN)).indices(), vec![4]);
        assert_eq!(resolve(5, Some(-1), Some(-6), Some(i64::MIN)).indices(), vec![4]);
    }

    #[test]
    fn zero_step_is_rejected() {
        let step = Value::Int(0);
        let err = SliceIndices::resolve(3, None, None, Some(&step)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::ValueError);
    }

    #[test]
    fn contiguous_range_never_inverts() {
        assert_eq!(resolve(5, Some(0), Some(3), None).contiguous(), 0..3);
        assert_eq!(resolve(5, Some(4), Some(1), None).contiguous(), 4..4);
    }
}
