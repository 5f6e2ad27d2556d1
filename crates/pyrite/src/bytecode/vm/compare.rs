//! Comparison, membership and identity operators.

use std::cmp::Ordering;

use super::{Dispatch, Vm};
use crate::{
    args::CallArgs,
    bytecode::CompareOperator,
    exception_private::{ExcType, RunResult},
    value::Value,
};

impl Vm {
    pub(super) fn compare_op(&mut self, op: CompareOperator, lhs: &Value, rhs: &Value) -> RunResult<Dispatch> {
        use CompareOperator as Op;

        let result = match op {
            Op::Is => lhs.is(rhs),
            Op::IsNot => !lhs.is(rhs),
            Op::In => self.contains(rhs, lhs)?,
            Op::NotIn => !self.contains(rhs, lhs)?,
            Op::Eq | Op::NotEq => {
                let dunder = if op == Op::Eq { "__eq__" } else { "__ne__" };
                if let Some(call) = instance_dunder(lhs, rhs, dunder, dunder) {
                    return Ok(call);
                }
                self.values_equal(lhs, rhs)? == (op == Op::Eq)
            }
            Op::Lt | Op::LtE | Op::Gt | Op::GtE => {
                let (dunder, reflected) = match op {
                    Op::Lt => ("__lt__", "__gt__"),
                    Op::LtE => ("__le__", "__ge__"),
                    Op::Gt => ("__gt__", "__lt__"),
                    _ => ("__ge__", "__le__"),
                };
                if let Some(call) = instance_dunder(lhs, rhs, dunder, reflected) {
                    return Ok(call);
                }
                let ordering = builtin_ordering(lhs, rhs).ok_or_else(|| {
                    ExcType::type_error_not_comparable(&op.to_string(), &lhs.type_name(), &rhs.type_name())
                })?;
                match ordering {
                    // unordered floats (NaN) compare false
                    None => false,
                    Some(ordering) => match op {
                        Op::Lt => ordering == Ordering::Less,
                        Op::LtE => ordering != Ordering::Greater,
                        Op::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    },
                }
            }
        };
        Ok(Dispatch::Value(Value::Bool(result)))
    }

    /// `a == b`, consulting `__eq__` on instances and recursing into sequences.
    pub fn values_equal(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        if let Some(call) = instance_dunder(a, b, "__eq__", "__eq__") {
            let result = self.resolve(call)?;
            return self.truthy(&result);
        }
        match (a, b) {
            (Value::List(x), Value::List(y)) => self.items_equal(&x.snapshot(), &y.snapshot()),
            (Value::Tuple(x), Value::Tuple(y)) => self.items_equal(x.items(), y.items()),
            _ => Ok(a.simple_eq(b)),
        }
    }

    fn items_equal(&mut self, a: &[Value], b: &[Value]) -> RunResult<bool> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.values_equal(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `a < b`, for natives that order values.
    pub fn less_than(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        let outcome = self.compare_op(CompareOperator::Lt, a, b)?;
        let result = self.resolve(outcome)?;
        self.truthy(&result)
    }
}

/// A dunder call on whichever operand is an instance defining it, left first.
fn instance_dunder(lhs: &Value, rhs: &Value, dunder: &str, reflected: &str) -> Option<Dispatch> {
    if let Value::Instance(instance) = lhs
        && let Some(method) = instance.lookup_class_attr(dunder)
    {
        return Some(Dispatch::Call(method, CallArgs::from_values([lhs.clone(), rhs.clone()])));
    }
    if let Value::Instance(instance) = rhs
        && let Some(method) = instance.lookup_class_attr(reflected)
    {
        return Some(Dispatch::Call(method, CallArgs::from_values([rhs.clone(), lhs.clone()])));
    }
    None
}

/// Orders two builtin values.
///
/// The outer `None` means the types cannot be ordered; the inner `None`
/// means they can but these two values are unordered (NaN).
fn builtin_ordering(lhs: &Value, rhs: &Value) -> Option<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => Some(lhs.as_int()?.partial_cmp(&rhs.as_int()?)),
        (Value::Float(_) | Value::Int(_) | Value::Bool(_), Value::Float(_) | Value::Int(_) | Value::Bool(_)) => {
            Some(lhs.as_float()?.partial_cmp(&rhs.as_float()?))
        }
        (Value::Str(a), Value::Str(b)) => Some(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Some(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequence_ordering(&a.snapshot(), &b.snapshot()),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_ordering(a.items(), b.items()),
        _ => None,
    }
}

/// Lexicographic ordering: the first unequal pair decides, then length.
fn sequence_ordering(a: &[Value], b: &[Value]) -> Option<Option<Ordering>> {
    match a.iter().zip(b).find(|(x, y)| !x.simple_eq(y)) {
        Some((x, y)) => builtin_ordering(x, y),
        None => Some(Some(a.len().cmp(&b.len()))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn numbers_order_across_int_and_float() {
        assert_eq!(builtin_ordering(&Value::Int(1), &Value::Float(1.5)), Some(Some(Ordering::Less)));
        assert_eq!(builtin_ordering(&Value::Float(f64::NAN), &Value::Int(1)), Some(None));
        assert_eq!(builtin_ordering(&Value::Int(1), &Value::str("a")), None);
    }

    #[test]
    fn sequences_order_lexicographically() {
        let short = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let long = Value::tuple(vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
        let bigger = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(builtin_ordering(&short, &long), Some(Some(Ordering::Less)));
        assert_eq!(builtin_ordering(&bigger, &long), Some(Some(Ordering::Greater)));
    }
}
