//! Implementation of the print() and input() builtin functions.

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::NativeReturn,
    value::Value,
};

/// Implementation of the print() builtin function.
///
/// Supports the following keyword arguments:
/// - `sep`: separator between values (default: " ")
/// - `end`: string appended after the last value (default: "\n")
///
/// The text of one call is assembled before anything is written, so a failing
/// `__str__` produces no partial line.
pub(super) fn builtin_print(vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let sep = text_kwarg(args.take_named("sep"), "sep", " ")?;
    let end = text_kwarg(args.take_named("end"), "end", "\n")?;
    let values = args.into_positional("print")?;

    let mut output = String::new();
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            output.push_str(&sep);
        }
        output.push_str(&vm.str_value(value)?);
    }
    output.push_str(&end);
    vm.write_output(&output);
    Ok(Value::None.into())
}

/// Implementation of the input() builtin function.
///
/// The prompt is written to the program output before the host input reader
/// is asked for a line; end of input raises `EOFError`.
pub(super) fn builtin_input(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let prompt = match args.get_zero_one_arg("input")? {
        Some(prompt) => vm.str_value(&prompt)?,
        None => String::new(),
    };
    let line = vm.read_input(&prompt)?;
    Ok(Value::from(line).into())
}

fn text_kwarg(value: Option<Value>, name: &str, default: &str) -> RunResult<String> {
    match value {
        None | Some(Value::None) => Ok(default.to_owned()),
        Some(Value::Str(text)) => Ok(text.to_string()),
        Some(other) => Err(ExcType::type_error_str_expected(name, &other.type_name())),
    }
}
