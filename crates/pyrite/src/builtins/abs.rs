//! Implementation of the abs() builtin function.

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::NativeReturn,
    value::Value,
};

/// Implementation of the abs() builtin function.
///
/// Instances may define `__abs__`; `abs(i64::MIN)` raises `OverflowError`.
pub(super) fn builtin_abs(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("abs")?;
    let result = match &value {
        Value::Int(i) => Value::Int(i.checked_abs().ok_or_else(ExcType::overflow)?),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Float(f) => Value::Float(f.abs()),
        Value::Instance(instance) => match instance.lookup_class_attr("__abs__") {
            Some(method) => vm.call_nested(method, CallArgs::from_values([value.clone()]))?,
            None => return Err(ExcType::unary_type_error("abs()", &value.type_name())),
        },
        other => return Err(ExcType::unary_type_error("abs()", &other.type_name())),
    };
    Ok(result.into())
}
