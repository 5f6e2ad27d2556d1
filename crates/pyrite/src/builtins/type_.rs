//! Builtin type classes and their constructors.
//!
//! `int`, `list`, `object` and the other builtin type names are classes with
//! a native constructor, so they can be called, inherited from and passed to
//! `isinstance` like any other class.

use std::{rc::Rc, str::FromStr};

use super::iter::integer_arg;
use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ExcType, RunResult},
    types::{BuiltinType, Class, Dict, NativeConstructor, Set},
    value::Value,
};

/// Creates the class for the builtin type `name`, if there is one.
pub(super) fn builtin_class(name: &str) -> Option<Rc<Class>> {
    let kind = BuiltinType::from_str(name).ok()?;
    let constructor: NativeConstructor = match kind {
        BuiltinType::Object => construct_object,
        BuiltinType::Type => construct_type,
        BuiltinType::Int => construct_int,
        BuiltinType::Float => construct_float,
        BuiltinType::Bool => construct_bool,
        BuiltinType::Str => construct_str,
        BuiltinType::Bytes => construct_bytes,
        BuiltinType::List => construct_list,
        BuiltinType::Tuple => construct_tuple,
        BuiltinType::Dict => construct_dict,
        BuiltinType::Set => construct_set,
        BuiltinType::FrozenSet => construct_frozenset,
    };
    Some(Class::builtin(kind, Some(constructor)))
}

fn construct_object(vm: &mut Vm, class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    args.check_zero_args("object")?;
    vm.new_instance(class)
}

/// `type(value)`: the class of an instance, or the builtin class of a plain value.
///
/// Values without a builtin class of their own (functions, modules, `None`)
/// get a fresh empty class carrying their type name.
fn construct_type(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let value = args.get_one_arg("type")?;
    let class = match &value {
        Value::Instance(instance) | Value::Exception(instance) => instance.class().clone(),
        other => {
            let name = other.type_name();
            match vm.global().lookup(&name) {
                Some(Value::Class(class)) if class.builtin_type().is_some() => class,
                _ => Class::new(name.into_owned(), Vec::new()),
            }
        }
    };
    Ok(Value::Class(class))
}

fn construct_int(_vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let Some(value) = args.get_zero_one_arg("int")? else {
        return Ok(Value::Int(0));
    };
    let int = match &value {
        Value::Int(_) | Value::Bool(_) => integer_arg(&value)?,
        Value::Float(f) => float_to_int(*f)?,
        Value::Str(text) => {
            let trimmed = text.trim();
            trimmed
                .replace('_', "")
                .parse::<i64>()
                .ok()
                .filter(|_| !trimmed.starts_with('_') && !trimmed.ends_with('_'))
                .ok_or_else(|| ExcType::value_error_conversion("int", text))?
        }
        other => return Err(ExcType::type_error_integer_expected(&other.type_name())),
    };
    Ok(Value::Int(int))
}

#[expect(clippy::cast_possible_truncation, reason = "range checked before the cast")]
fn float_to_int(f: f64) -> RunResult<i64> {
    let truncated = f.trunc();
    if !truncated.is_finite() || truncated < -9.223_372_036_854_776e18 || truncated >= 9.223_372_036_854_776e18 {
        return Err(ExcType::overflow());
    }
    Ok(truncated as i64)
}

fn construct_float(_vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let Some(value) = args.get_zero_one_arg("float")? else {
        return Ok(Value::Float(0.0));
    };
    let float = match &value {
        Value::Str(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ExcType::value_error_conversion("float", text))?,
        other => other
            .as_float()
            .ok_or_else(|| ExcType::type_error_integer_expected(&other.type_name()))?,
    };
    Ok(Value::Float(float))
}

fn construct_bool(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let truth = match args.get_zero_one_arg("bool")? {
        Some(value) => vm.truthy(&value)?,
        None => false,
    };
    Ok(Value::Bool(truth))
}

fn construct_str(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let text = match args.get_zero_one_arg("str")? {
        Some(value) => vm.str_value(&value)?,
        None => String::new(),
    };
    Ok(Value::from(text))
}

/// `bytes()`, `bytes(n)` (n zero bytes), `bytes(b)` or `bytes(iterable_of_ints)`.
fn construct_bytes(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let bytes: Vec<u8> = match args.get_zero_one_arg("bytes")? {
        None => Vec::new(),
        Some(Value::Bytes(bytes)) => return Ok(Value::Bytes(bytes)),
        Some(Value::Int(count)) => vec![0; usize::try_from(count).map_err(|_| ExcType::value_error_byte_range())?],
        Some(Value::Str(_)) => return Err(ExcType::type_error_integer_expected("str")),
        Some(iterable) => vm
            .collect_iterable(&iterable)?
            .iter()
            .map(|item| {
                let int = integer_arg(item)?;
                u8::try_from(int).map_err(|_| ExcType::value_error_byte_range())
            })
            .collect::<RunResult<_>>()?,
    };
    Ok(Value::Bytes(Rc::from(bytes)))
}

fn construct_list(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let items = match args.get_zero_one_arg("list")? {
        Some(iterable) => vm.collect_iterable(&iterable)?,
        None => Vec::new(),
    };
    Ok(Value::list(items))
}

fn construct_tuple(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    match args.get_zero_one_arg("tuple")? {
        Some(tuple @ Value::Tuple(_)) => Ok(tuple),
        Some(iterable) => Ok(Value::tuple(vm.collect_iterable(&iterable)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

/// `dict()`, `dict(mapping_or_pairs)` and `dict(**named)`, combinable.
fn construct_dict(vm: &mut Vm, _class: &Rc<Class>, mut args: CallArgs) -> RunResult<Value> {
    let named = std::mem::take(&mut args.named);
    let dict = match args.get_zero_one_arg("dict")? {
        Some(source) => vm.dict_from_iterable(&source)?,
        None => Dict::new(),
    };
    for (name, value) in named {
        dict.insert_str(name, value);
    }
    Ok(Value::Dict(Rc::new(dict)))
}

fn construct_set(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    let set = match args.get_zero_one_arg("set")? {
        Some(iterable) => vm.set_from_iterable(&iterable)?,
        None => Set::new(),
    };
    Ok(Value::Set(Rc::new(set)))
}

fn construct_frozenset(vm: &mut Vm, _class: &Rc<Class>, args: CallArgs) -> RunResult<Value> {
    match args.get_zero_one_arg("frozenset")? {
        Some(frozen @ Value::FrozenSet(_)) => Ok(frozen),
        Some(iterable) => Ok(Value::FrozenSet(Rc::new(vm.set_from_iterable(&iterable)?))),
        None => Ok(Value::FrozenSet(Rc::new(Set::new()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_type_name_has_a_class() {
        for name in [
            "object", "type", "int", "float", "bool", "str", "bytes", "list", "tuple", "dict", "set", "frozenset",
        ] {
            let class = builtin_class(name).unwrap_or_else(|| panic!("no class for {name}"));
            assert_eq!(class.name(), name);
            assert!(class.builtin_type().is_some());
        }
        assert!(builtin_class("NoneType").is_none());
    }

    #[test]
    fn floats_truncate_toward_zero() {
        assert_eq!(float_to_int(2.9).unwrap(), 2);
        assert_eq!(float_to_int(-2.9).unwrap(), -2);
        assert!(float_to_int(f64::INFINITY).is_err());
        assert!(float_to_int(1e19).is_err());
    }
}
