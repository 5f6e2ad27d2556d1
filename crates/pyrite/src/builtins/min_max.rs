//! Implementation of the min() and max() builtin functions.

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::NativeReturn,
    value::Value,
};

pub(super) fn builtin_min(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    extreme(vm, args, "min", false)
}

pub(super) fn builtin_max(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    extreme(vm, args, "max", true)
}

/// Shared implementation of min() and max().
///
/// A single positional argument is iterated; several are compared directly.
/// `key=` maps items before comparison and `default=` is returned for an
/// empty iterable. Ties keep the first item, as `<` decides every replacement.
fn extreme(vm: &mut Vm, mut args: CallArgs, func: &str, largest: bool) -> RunResult<NativeReturn> {
    let key = args.take_named("key").filter(|key| !key.is_none());
    let default = args.take_named("default");
    let mut values = args.into_positional(func)?;
    let items = match values.len() {
        0 => return Err(ExcType::type_error_arg_count(func, "at least one", 0)),
        1 => {
            let iterable = values.remove(0);
            vm.collect_iterable(&iterable)?
        }
        _ => values,
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let ranked = match &key {
            Some(key) => vm.call_nested(key.clone(), CallArgs::from_values([item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((_, current)) if largest => vm.less_than(current, &ranked)?,
            Some((_, current)) => vm.less_than(&ranked, current)?,
        };
        if replace {
            best = Some((item, ranked));
        }
    }

    match (best, default) {
        (Some((item, _)), _) | (None, Some(item)) => Ok(item.into()),
        (None, None) => Err(ExcType::value_error_empty(func)),
    }
}
