//! Builtin exception classes.
//!
//! Each class is materialized on first use with its parent taken from the
//! global scope, so `except LookupError` catches the same `KeyError` class
//! user code subclasses. `BaseException` carries the one native `__init__`
//! the whole hierarchy inherits.

use super::native_value;
use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ErrorCode, ExcType, RunError, RunResult},
    namespace::Scope,
    types::{Class, NativeReturn},
    value::Value,
};

pub(super) fn exception_class(exc_type: ExcType, global: &Scope) -> Value {
    let parents = exc_type
        .parent()
        .and_then(|parent| match global.lookup(parent.into()) {
            Some(Value::Class(class)) => Some(class),
            _ => None,
        })
        .into_iter()
        .collect();
    let class = Class::exception(exc_type, parents);
    if exc_type == ExcType::BaseException {
        class.set_attr("__init__", native_value("BaseException.__init__", exception_init));
    }
    Value::Class(class)
}

/// `BaseException.__init__(self, *args)`.
///
/// Stores `args` and makes the message the `str()` of the arguments, so
/// `ValueError("bad", 3)` reads `('bad', 3)`-style like the language does.
fn exception_init(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let mut values = args.into_positional("BaseException.__init__")?;
    if values.is_empty() {
        return Err(ExcType::type_error_arg_count("BaseException.__init__", "at least one", 0));
    }
    let receiver = values.remove(0);
    let (Value::Exception(exception) | Value::Instance(exception)) = &receiver else {
        return Err(RunError::internal(format!(
            "BaseException.__init__ bound to {}",
            receiver.type_name()
        )));
    };
    let params = if let [single] = values.as_slice() {
        vec![vm.str_value(single)?]
    } else {
        values
            .iter()
            .map(|value| vm.repr_value(value))
            .collect::<RunResult<_>>()?
    };
    exception.set_attr("args", Value::tuple(values));
    exception.set_exception_details(ErrorCode::UserRaised, params);
    Ok(Value::None.into())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn only_the_root_defines_init() {
        let global = Scope::global();
        let Value::Class(base) = exception_class(ExcType::BaseException, &global) else {
            panic!("BaseException is not a class");
        };
        assert!(base.get_own_attr("__init__").is_some());
        let Some(Value::Class(value_error)) = global.lookup("ValueError") else {
            panic!("ValueError is not a class");
        };
        assert!(value_error.get_own_attr("__init__").is_none());
        assert!(value_error.lookup("__init__").is_some());
        assert_eq!(value_error.parents()[0].1.name(), "Exception");
    }

    #[test]
    fn roots_have_no_parents() {
        let global = Scope::global();
        let Value::Class(base) = exception_class(ExcType::BaseException, &global) else {
            panic!("BaseException is not a class");
        };
        assert!(base.parents().is_empty());
        assert!(Rc::ptr_eq(&base, &base.mro().unwrap()[0]));
    }
}
