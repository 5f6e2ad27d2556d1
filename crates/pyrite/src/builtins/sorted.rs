//! Implementation of the sorted() builtin function.

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::RunResult,
    types::NativeReturn,
    value::Value,
};

/// Implementation of the sorted() builtin function.
///
/// Returns a new list. Comparisons go through `<`, which may run user
/// `__lt__` methods and fail, so the sort is a merge sort that propagates the
/// first comparison error. The sort is stable, including with `reverse=True`.
pub(super) fn builtin_sorted(vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let key = args.take_named("key").filter(|key| !key.is_none());
    let reverse = match args.take_named("reverse") {
        Some(flag) => vm.truthy(&flag)?,
        None => false,
    };
    let iterable = args.get_one_arg("sorted")?;

    let mut decorated = Vec::new();
    for item in vm.collect_iterable(&iterable)? {
        let ranked = match &key {
            Some(key) => vm.call_nested(key.clone(), CallArgs::from_values([item.clone()]))?,
            None => item.clone(),
        };
        decorated.push((item, ranked));
    }
    let sorted = merge_sort(vm, decorated, reverse)?;
    Ok(Value::list(sorted.into_iter().map(|(item, _)| item).collect()).into())
}

fn merge_sort(vm: &mut Vm, mut items: Vec<(Value, Value)>, reverse: bool) -> RunResult<Vec<(Value, Value)>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(vm, items, reverse)?;
    let right = merge_sort(vm, right, reverse)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        // the right item only moves ahead when strictly smaller, keeping ties in order
        let take_right = match (left.peek(), right.peek()) {
            (Some((_, l)), Some((_, r))) if reverse => vm.less_than(l, r)?,
            (Some((_, l)), Some((_, r))) => vm.less_than(r, l)?,
            _ => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
