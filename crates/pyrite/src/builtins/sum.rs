//! Implementation of the sum() builtin function.

use crate::{args::CallArgs, bytecode::Vm, exception_private::RunResult, types::NativeReturn, value::Value};

/// Implementation of the sum() builtin function.
///
/// Adds items left to right onto `start` (default `0`) with the same `+` the
/// language uses, so instances with `__add__`/`__radd__` participate.
pub(super) fn builtin_sum(vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let named_start = args.take_named("start");
    let (iterable, positional_start) = args.get_one_two_args("sum")?;
    let mut total = positional_start.or(named_start).unwrap_or(Value::Int(0));
    for item in vm.collect_iterable(&iterable)? {
        total = vm.add_values(&total, &item)?;
    }
    Ok(total.into())
}
