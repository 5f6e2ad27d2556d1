//! Binary and unary operators.
//!
//! Operators follow the dunder protocol:
//! 1. try the builtin operation on the two values
//! 2. otherwise call `__op__` on an instance left operand
//! 3. otherwise call the reflected `__rop__` on an instance right operand
//!
//! A dunder call is returned as [`Dispatch::Call`] so it runs as a frame.

use std::rc::Rc;

use super::{Dispatch, Vm};
use crate::{
    args::CallArgs,
    bytecode::{BinaryOperator, UnaryOperator},
    exception_private::{ExcType, RunResult},
    types::{Dict, Set},
    value::Value,
};

impl Vm {
    pub(super) fn binary_op(&mut self, op: BinaryOperator, lhs: &Value, rhs: &Value) -> RunResult<Dispatch> {
        if let Some(value) = builtin_binary(op, lhs, rhs)? {
            return Ok(Dispatch::Value(value));
        }
        if let Value::Instance(instance) = lhs
            && let Some(method) = instance.lookup_class_attr(op.dunder())
        {
            return Ok(Dispatch::Call(method, CallArgs::from_values([lhs.clone(), rhs.clone()])));
        }
        if let Value::Instance(instance) = rhs
            && let Some(method) = instance.lookup_class_attr(&reflected(op))
        {
            return Ok(Dispatch::Call(method, CallArgs::from_values([rhs.clone(), lhs.clone()])));
        }
        Err(ExcType::binary_type_error(
            &op.to_string(),
            &lhs.type_name(),
            &rhs.type_name(),
        ))
    }

    /// `lhs + rhs`, for natives that accumulate values.
    pub fn add_values(&mut self, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        let outcome = self.binary_op(BinaryOperator::Add, lhs, rhs)?;
        self.resolve(outcome)
    }

    pub(super) fn unary_op(&mut self, op: UnaryOperator, operand: &Value) -> RunResult<Dispatch> {
        let value = match (op, operand) {
            (UnaryOperator::Not, _) => Value::Bool(!self.truthy(operand)?),
            (UnaryOperator::Neg, Value::Int(_) | Value::Bool(_)) => {
                let i = operand.as_int().unwrap_or_default();
                Value::Int(i.checked_neg().ok_or_else(ExcType::overflow)?)
            }
            (UnaryOperator::Neg, Value::Float(f)) => Value::Float(-f),
            (UnaryOperator::Pos, Value::Int(_) | Value::Bool(_)) => Value::Int(operand.as_int().unwrap_or_default()),
            (UnaryOperator::Pos, Value::Float(f)) => Value::Float(*f),
            (UnaryOperator::Invert, Value::Int(_) | Value::Bool(_)) => Value::Int(!operand.as_int().unwrap_or_default()),
            (_, Value::Instance(instance)) => {
                let dunder = match op {
                    UnaryOperator::Neg => "__neg__",
                    UnaryOperator::Pos => "__pos__",
                    _ => "__invert__",
                };
                return match instance.lookup_class_attr(dunder) {
                    Some(method) => Ok(Dispatch::Call(method, CallArgs::from_values([operand.clone()]))),
                    None => Err(ExcType::unary_type_error(&op.to_string(), &operand.type_name())),
                };
            }
            _ => return Err(ExcType::unary_type_error(&op.to_string(), &operand.type_name())),
        };
        Ok(Dispatch::Value(value))
    }
}

/// `__add__` becomes `__radd__`.
fn reflected(op: BinaryOperator) -> String {
    format!("__r{}", &op.dunder()[2..])
}

/// The builtin result of `lhs op rhs`, or `None` if the operand types have no builtin meaning.
fn builtin_binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    use BinaryOperator as Op;

    let value = match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) if matches!(op, Op::BitAnd | Op::BitOr | Op::BitXor) => Value::Bool(match op {
            Op::BitAnd => a & b,
            Op::BitOr => a | b,
            _ => a ^ b,
        }),
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            return int_binary(op, lhs.as_int().unwrap_or_default(), rhs.as_int().unwrap_or_default());
        }
        (Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_))
        | (Value::Int(_) | Value::Bool(_), Value::Float(_)) => {
            return float_binary(op, lhs.as_float().unwrap_or_default(), rhs.as_float().unwrap_or_default());
        }
        (Value::Str(a), Value::Str(b)) if op == Op::Add => Value::from(format!("{a}{b}")),
        (Value::Str(s), count @ (Value::Int(_) | Value::Bool(_)))
        | (count @ (Value::Int(_) | Value::Bool(_)), Value::Str(s))
            if op == Op::Mul =>
        {
            Value::from(s.repeat(repeat_count(count)))
        }
        (Value::Bytes(a), Value::Bytes(b)) if op == Op::Add => Value::Bytes(Rc::from([&a[..], &b[..]].concat())),
        (Value::Bytes(b), count @ (Value::Int(_) | Value::Bool(_))) if op == Op::Mul => {
            Value::Bytes(Rc::from(b.repeat(repeat_count(count))))
        }
        (Value::List(a), Value::List(b)) if op == Op::Add => {
            let mut items = a.snapshot();
            items.extend(b.snapshot());
            Value::list(items)
        }
        (Value::List(l), count @ (Value::Int(_) | Value::Bool(_)))
        | (count @ (Value::Int(_) | Value::Bool(_)), Value::List(l))
            if op == Op::Mul =>
        {
            Value::list(repeat_items(&l.snapshot(), repeat_count(count)))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == Op::Add => Value::tuple([a.items(), b.items()].concat()),
        (Value::Tuple(t), count @ (Value::Int(_) | Value::Bool(_)))
        | (count @ (Value::Int(_) | Value::Bool(_)), Value::Tuple(t))
            if op == Op::Mul =>
        {
            Value::tuple(repeat_items(t.items(), repeat_count(count)))
        }
        (Value::Set(a) | Value::FrozenSet(a), Value::Set(b) | Value::FrozenSet(b)) => {
            let Some(set) = set_binary(op, a, b)? else { return Ok(None) };
            match lhs {
                Value::FrozenSet(_) => Value::FrozenSet(Rc::new(set)),
                _ => Value::Set(Rc::new(set)),
            }
        }
        (Value::Dict(a), Value::Dict(b)) if op == Op::BitOr => {
            let merged = Dict::from_pairs(a.items())?;
            for (key, value) in b.items() {
                merged.insert(key, value)?;
            }
            Value::Dict(Rc::new(merged))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn repeat_count(count: &Value) -> usize {
    count
        .as_int()
        .and_then(|count| usize::try_from(count).ok())
        .unwrap_or(0)
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    (0..count).flat_map(|_| items.iter().cloned()).collect()
}

/// Integer arithmetic with floor semantics for `//` and `%`; overflow raises.
fn int_binary(op: BinaryOperator, a: i64, b: i64) -> RunResult<Option<Value>> {
    use BinaryOperator as Op;

    let value = match op {
        Op::Add => Value::Int(a.checked_add(b).ok_or_else(ExcType::overflow)?),
        Op::Sub => Value::Int(a.checked_sub(b).ok_or_else(ExcType::overflow)?),
        Op::Mul => Value::Int(a.checked_mul(b).ok_or_else(ExcType::overflow)?),
        Op::Div => {
            if b == 0 {
                return Err(ExcType::zero_division());
            }
            Value::Float(a as f64 / b as f64)
        }
        Op::FloorDiv => {
            if b == 0 {
                return Err(ExcType::zero_division());
            }
            let quotient = a.checked_div(b).ok_or_else(ExcType::overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Value::Int(if adjust { quotient - 1 } else { quotient })
        }
        Op::Mod => {
            if b == 0 {
                return Err(ExcType::zero_division());
            }
            let remainder = a.checked_rem(b).ok_or_else(ExcType::overflow)?;
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            Value::Int(if adjust { remainder + b } else { remainder })
        }
        Op::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ExcType::zero_division());
                }
                return Ok(Some(Value::Float((a as f64).powf(b as f64))));
            }
            let exponent = u32::try_from(b).map_err(|_| ExcType::overflow())?;
            Value::Int(a.checked_pow(exponent).ok_or_else(ExcType::overflow)?)
        }
        Op::BitAnd => Value::Int(a & b),
        Op::BitOr => Value::Int(a | b),
        Op::BitXor => Value::Int(a ^ b),
        Op::LShift => {
            if b < 0 {
                return Err(ExcType::value_error_negative_shift());
            }
            if a == 0 {
                Value::Int(0)
            } else {
                let shift = u32::try_from(b).ok().filter(|shift| *shift < 64).ok_or_else(ExcType::overflow)?;
                let shifted = a << shift;
                if shifted >> shift != a {
                    return Err(ExcType::overflow());
                }
                Value::Int(shifted)
            }
        }
        Op::RShift => {
            if b < 0 {
                return Err(ExcType::value_error_negative_shift());
            }
            match u32::try_from(b).ok().filter(|shift| *shift < 64) {
                Some(shift) => Value::Int(a >> shift),
                None => Value::Int(if a < 0 { -1 } else { 0 }),
            }
        }
    };
    Ok(Some(value))
}

fn float_binary(op: BinaryOperator, a: f64, b: f64) -> RunResult<Option<Value>> {
    use BinaryOperator as Op;

    let result = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div | Op::FloorDiv | Op::Mod if b == 0.0 => return Err(ExcType::zero_division()),
        Op::Div => a / b,
        Op::FloorDiv => (a / b).floor(),
        Op::Mod => {
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        Op::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExcType::zero_division());
            }
            a.powf(b)
        }
        Op::BitAnd | Op::BitOr | Op::BitXor | Op::LShift | Op::RShift => return Ok(None),
    };
    Ok(Some(Value::Float(result)))
}

fn set_binary(op: BinaryOperator, a: &Set, b: &Set) -> RunResult<Option<Set>> {
    let (left, right) = (a.values(), b.values());
    let set = match op {
        BinaryOperator::BitOr => Set::from_values(left.into_iter().chain(right))?,
        BinaryOperator::BitAnd => {
            let mut kept = Vec::new();
            for value in left {
                if b.contains(&value)? {
                    kept.push(value);
                }
            }
            Set::from_values(kept)?
        }
        BinaryOperator::Sub => {
            let mut kept = Vec::new();
            for value in left {
                if !b.contains(&value)? {
                    kept.push(value);
                }
            }
            Set::from_values(kept)?
        }
        BinaryOperator::BitXor => {
            let mut kept = Vec::new();
            for value in left {
                if !b.contains(&value)? {
                    kept.push(value);
                }
            }
            for value in right {
                if !a.contains(&value)? {
                    kept.push(value);
                }
            }
            Set::from_values(kept)?
        }
        _ => return Ok(None),
    };
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn int(op: BinaryOperator, a: i64, b: i64) -> Value {
        int_binary(op, a, b).unwrap().unwrap()
    }

    #[test]
    fn floor_division_and_modulo_round_towards_negative_infinity() {
        assert_eq!(int(BinaryOperator::FloorDiv, 7, 2), Value::Int(3));
        assert_eq!(int(BinaryOperator::FloorDiv, -7, 2), Value::Int(-4));
        assert_eq!(int(BinaryOperator::Mod, -7, 2), Value::Int(1));
        assert_eq!(int(BinaryOperator::Mod, 7, -2), Value::Int(-1));
    }

    #[test]
    fn integer_overflow_and_zero_division_raise() {
        let overflow = int_binary(BinaryOperator::Add, i64::MAX, 1).unwrap_err();
        assert_eq!(overflow.exc_type(), ExcType::OverflowError);
        let zero = int_binary(BinaryOperator::Mod, 1, 0).unwrap_err();
        assert_eq!(zero.exc_type(), ExcType::ZeroDivisionError);
        assert_eq!(int(BinaryOperator::LShift, 1, 62), Value::Int(1 << 62));
        assert!(int_binary(BinaryOperator::LShift, 1, 63).is_err());
    }

    #[test]
    fn sequences_concatenate_and_repeat() {
        let joined = builtin_binary(BinaryOperator::Add, &Value::str("ab"), &Value::str("c")).unwrap();
        assert_eq!(joined, Some(Value::str("abc")));
        let repeated = builtin_binary(BinaryOperator::Mul, &Value::Int(2), &Value::list(vec![Value::Int(1)])).unwrap();
        assert_eq!(repeated, Some(Value::list(vec![Value::Int(1), Value::Int(1)])));
        let mixed = builtin_binary(BinaryOperator::Add, &Value::str("a"), &Value::Int(1)).unwrap();
        assert_eq!(mixed, None);
    }

    #[test]
    fn mixed_numbers_promote_to_float() {
        let sum = builtin_binary(BinaryOperator::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(sum, Some(Value::Float(1.5)));
        assert_eq!(int(BinaryOperator::Div, 1, 2), Value::Float(0.5));
    }
}
