//! Implementation of the isinstance() and issubclass() builtin functions.

use std::rc::Rc;

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::{Class, NativeReturn},
    value::Value,
};

/// Implementation of the isinstance() builtin function.
///
/// Instances are checked against their MRO, so `isinstance(dog, Animal)` holds
/// for `class Dog(Animal)`. Plain values match the builtin type classes
/// (`isinstance(True, int)` is true). The second argument may be a tuple of
/// classes, nested to any depth.
pub(super) fn builtin_isinstance(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (object, classinfo) = args.get_two_args("isinstance")?;
    let result = match_classinfo("isinstance", &classinfo, &|class| instance_of(&object, class))?;
    Ok(Value::Bool(result).into())
}

/// Implementation of the issubclass() builtin function.
pub(super) fn builtin_issubclass(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (candidate, classinfo) = args.get_two_args("issubclass")?;
    let Value::Class(candidate) = candidate else {
        return Err(ExcType::type_error_class_info("issubclass", 1));
    };
    let result = match_classinfo("issubclass", &classinfo, &|class| candidate.is_subclass_of(class))?;
    Ok(Value::Bool(result).into())
}

fn match_classinfo(func: &str, classinfo: &Value, check: &dyn Fn(&Rc<Class>) -> bool) -> RunResult<bool> {
    match classinfo {
        Value::Class(class) => Ok(check(class)),
        Value::Tuple(classes) => {
            for class in classes.items() {
                if match_classinfo(func, class, check)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(ExcType::type_error_class_info(func, 2)),
    }
}

pub(super) fn instance_of(value: &Value, class: &Rc<Class>) -> bool {
    match value {
        Value::Instance(instance) | Value::Exception(instance) => instance.is_instance_of(class),
        other => class.builtin_type().is_some_and(|kind| kind.matches(other)),
    }
}
