//! Implementation of the callable() builtin function.

use crate::{args::CallArgs, bytecode::Vm, exception_private::RunResult, types::NativeReturn, value::Value};

pub(super) fn builtin_callable(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("callable")?;
    Ok(Value::Bool(value.is_callable()).into())
}
