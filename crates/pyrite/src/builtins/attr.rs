//! Implementation of the hasattr(), getattr() and setattr() builtin functions.

use std::rc::Rc;

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::NativeReturn,
    value::Value,
};

/// Implementation of the hasattr() builtin function.
///
/// Only `AttributeError` counts as "missing"; any other error propagates.
pub(super) fn builtin_hasattr(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (object, name) = args.get_two_args("hasattr")?;
    let name = attr_name(&name)?;
    match vm.get_attr(&object, &name) {
        Ok(_) => Ok(Value::Bool(true).into()),
        Err(err) if err.exc_type().is_subclass_of(ExcType::AttributeError) => Ok(Value::Bool(false).into()),
        Err(err) => Err(err),
    }
}

/// Implementation of the getattr() builtin function.
pub(super) fn builtin_getattr(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let count = args.count();
    let mut values = args.into_positional("getattr")?.into_iter();
    let (Some(object), Some(name), default, None) = (values.next(), values.next(), values.next(), values.next()) else {
        return Err(ExcType::type_error_arg_count("getattr", "two or three", count));
    };
    let name = attr_name(&name)?;
    match (vm.get_attr(&object, &name), default) {
        (Ok(value), _) => Ok(value.into()),
        (Err(err), Some(default)) if err.exc_type().is_subclass_of(ExcType::AttributeError) => Ok(default.into()),
        (Err(err), _) => Err(err),
    }
}

pub(super) fn builtin_setattr(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let count = args.count();
    let values = args.into_positional("setattr")?;
    let [object, name, value]: [Value; 3] = values
        .try_into()
        .map_err(|_| ExcType::type_error_arg_count("setattr", "exactly three", count))?;
    let name = attr_name(&name)?;
    vm.set_attr(&object, name, value)?;
    Ok(Value::None.into())
}

fn attr_name(name: &Value) -> RunResult<Rc<str>> {
    match name {
        Value::Str(name) => Ok(name.clone()),
        _ => Err(ExcType::type_error_property_name()),
    }
}
