//! Implementation of the enumerate() and zip() builtin functions.
//!
//! Both collect their inputs up front and hand back an iterator over the
//! resulting tuples.

use std::rc::Rc;

use super::iter::integer_arg;
use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::{NativeReturn, ValueIter},
    value::Value,
};

pub(super) fn builtin_enumerate(vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let named_start = args.take_named("start");
    let (iterable, positional_start) = args.get_one_two_args("enumerate")?;
    let start = match positional_start.or(named_start) {
        Some(start) => integer_arg(&start)?,
        None => 0,
    };

    let mut counter = start;
    let mut pairs = Vec::new();
    for item in vm.collect_iterable(&iterable)? {
        pairs.push(Value::tuple(vec![Value::Int(counter), item]));
        counter = counter.checked_add(1).ok_or_else(ExcType::overflow)?;
    }
    Ok(Value::Iterator(Rc::new(ValueIter::over_items(pairs))).into())
}

/// Implementation of the zip() builtin function.
///
/// Stops at the shortest input; `zip()` with no arguments is empty.
pub(super) fn builtin_zip(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let sources = args.into_positional("zip")?;
    let mut columns = Vec::with_capacity(sources.len());
    for source in &sources {
        columns.push(vm.collect_iterable(source)?.into_iter());
    }

    let mut rows = Vec::new();
    if !columns.is_empty() {
        'rows: loop {
            let mut row = Vec::with_capacity(columns.len());
            for column in &mut columns {
                match column.next() {
                    Some(item) => row.push(item),
                    None => break 'rows,
                }
            }
            rows.push(Value::tuple(row));
        }
    }
    Ok(Value::Iterator(Rc::new(ValueIter::over_items(rows))).into())
}
