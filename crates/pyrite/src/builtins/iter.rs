//! Implementation of the len(), range(), iter() and next() builtin functions.

use std::rc::Rc;

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::{NativeReturn, ValueIter},
    value::Value,
};

pub(super) fn builtin_len(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("len")?;
    let len = vm.len_of(&value)?;
    let len = i64::try_from(len).map_err(|_| ExcType::overflow())?;
    Ok(Value::Int(len).into())
}

/// Implementation of the range() builtin function.
///
/// Produces a lazy iterator rather than a sequence object: `range(stop)`,
/// `range(start, stop)` and `range(start, stop, step)` are accepted, and a
/// zero step raises `ValueError`.
pub(super) fn builtin_range(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let count = args.count();
    let bounds = args
        .into_positional("range")?
        .iter()
        .map(integer_arg)
        .collect::<RunResult<Vec<_>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(ExcType::type_error_arg_count("range", "one to three", count)),
    };
    if step == 0 {
        return Err(ExcType::value_error_range_step_zero());
    }
    Ok(Value::Iterator(Rc::new(ValueIter::over_range(start, stop, step))).into())
}

pub(super) fn builtin_iter(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let source = args.get_one_arg("iter")?;
    Ok(vm.iter_value(&source)?.into())
}

/// Implementation of the next() builtin function.
///
/// Without a default, generators and user iterators are advanced as ordinary
/// frames that deliver straight to this call's target, so a generator body
/// resumed by `next()` can itself be stepped through. With a default the item
/// is fetched synchronously so exhaustion can be caught here.
pub(super) fn builtin_next(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (iterator, default) = args.get_one_two_args("next")?;
    if let Value::Iterator(iter) = &iterator {
        return match (iter.next_value(), default) {
            (Some(item), _) | (None, Some(item)) => Ok(item.into()),
            (None, None) => Err(ExcType::stop_iteration()),
        };
    }
    if let Some(default) = default {
        return Ok(vm.next_item(&iterator)?.unwrap_or(default).into());
    }
    let target = vm.take_call_target()?;
    vm.for_next(iterator, target.0)?;
    Ok(NativeReturn::Pending)
}

/// Reads an `int` (or `bool`) argument.
pub(super) fn integer_arg(value: &Value) -> RunResult<i64> {
    value
        .as_int()
        .ok_or_else(|| ExcType::type_error_integer_expected(&value.type_name()))
}
