//! Implementation of the super() builtin function.

use std::rc::Rc;

use crate::{
    args::CallArgs,
    bytecode::{CodeRef, Vm},
    exception_private::{ExcType, RunResult},
    types::{Class, NativeReturn, SuperProxy},
    value::Value,
};

/// Implementation of the super() builtin function.
///
/// `super()` takes the receiver from the first parameter of the running
/// function and resumes the MRO search after the class whose body defines
/// that function. `super(cls, obj)` resumes after `cls` in `obj`'s MRO.
pub(super) fn builtin_super(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let count = args.count();
    let values = args.into_positional("super")?;
    let proxy = match <[Value; 2]>::try_from(values) {
        Ok([class, receiver]) => explicit_super(&class, receiver)?,
        Err(values) if values.is_empty() => {
            let (code, receiver) = vm.super_context()?;
            implicit_super(&code, receiver)?
        }
        Err(_) => return Err(ExcType::type_error_arg_count("super", "zero or two", count)),
    };
    Ok(Value::Super(Rc::new(proxy)).into())
}

fn explicit_super(class: &Value, receiver: Value) -> RunResult<SuperProxy> {
    let Value::Class(class) = class else {
        return Err(ExcType::type_error_not_a_class(&class.type_name()));
    };
    let mro = receiver_mro(&receiver).ok_or_else(ExcType::type_error_super_receiver)?;
    let index = mro
        .iter()
        .position(|candidate| Rc::ptr_eq(candidate, class))
        .ok_or_else(ExcType::type_error_super_receiver)?;
    Ok(SuperProxy::new(receiver, mro, index + 1))
}

fn implicit_super(code: &CodeRef, receiver: Value) -> RunResult<SuperProxy> {
    let mro = receiver_mro(&receiver).ok_or_else(ExcType::runtime_error_super)?;
    // methods inherited unchanged start the search after the receiver's own class
    let start = mro
        .iter()
        .position(|class| defines_body(class, code))
        .map_or(1, |index| index + 1);
    Ok(SuperProxy::new(receiver, mro, start))
}

fn defines_body(class: &Class, code: &CodeRef) -> bool {
    class
        .own_attr_values()
        .iter()
        .any(|attr| matches!(attr, Value::Function(function) if function.code().same_body(code)))
}

fn receiver_mro(receiver: &Value) -> Option<Rc<[Rc<Class>]>> {
    match receiver {
        Value::Instance(instance) | Value::Exception(instance) => Some(instance.mro_rc()),
        Value::Class(class) => class.mro().map(Rc::from),
        _ => None,
    }
}
