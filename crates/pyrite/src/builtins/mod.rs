//! Builtin functions, types and exception classes.
//!
//! Nothing here is registered up front: the global scope asks [`materialize`]
//! the first time a name misses and memoizes whatever it returns.

mod abs;
mod attr;
mod callable;
mod enumerate;
mod exceptions;
mod id;
mod isinstance;
mod iter;
pub(crate) mod methods;
mod min_max;
mod print;
mod sorted;
mod sum;
mod super_;
mod type_;

use std::{rc::Rc, str::FromStr};

use strum::{EnumString, IntoStaticStr};

use crate::{
    exception_private::ExcType,
    namespace::Scope,
    types::{NativeFn, NativeFunction},
    value::Value,
};

/// Enumerates the builtin functions.
///
/// Variants parse from and serialize to their lowercase names (`Print` -> "print").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
enum BuiltinFunction {
    Print,
    Input,
    Len,
    Range,
    Iter,
    Next,
    IsInstance,
    IsSubclass,
    Id,
    Repr,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Enumerate,
    Zip,
    HasAttr,
    GetAttr,
    SetAttr,
    Callable,
    Super,
}

impl BuiltinFunction {
    fn native(self) -> NativeFn {
        match self {
            Self::Print => print::builtin_print,
            Self::Input => print::builtin_input,
            Self::Len => iter::builtin_len,
            Self::Range => iter::builtin_range,
            Self::Iter => iter::builtin_iter,
            Self::Next => iter::builtin_next,
            Self::IsInstance => isinstance::builtin_isinstance,
            Self::IsSubclass => isinstance::builtin_issubclass,
            Self::Id => id::builtin_id,
            Self::Repr => id::builtin_repr,
            Self::Abs => abs::builtin_abs,
            Self::Min => min_max::builtin_min,
            Self::Max => min_max::builtin_max,
            Self::Sum => sum::builtin_sum,
            Self::Sorted => sorted::builtin_sorted,
            Self::Enumerate => enumerate::builtin_enumerate,
            Self::Zip => enumerate::builtin_zip,
            Self::HasAttr => attr::builtin_hasattr,
            Self::GetAttr => attr::builtin_getattr,
            Self::SetAttr => attr::builtin_setattr,
            Self::Callable => callable::builtin_callable,
            Self::Super => super_::builtin_super,
        }
    }
}

/// Produces the builtin bound to `name`, or `None` if there is none.
///
/// Exception classes look their parent class up through `global` so the
/// whole hierarchy shares one class object per name.
pub(crate) fn materialize(name: &str, global: &Scope) -> Option<Value> {
    if let Ok(exc_type) = ExcType::from_str(name) {
        return Some(exceptions::exception_class(exc_type, global));
    }
    if let Some(class) = type_::builtin_class(name) {
        return Some(Value::Class(class));
    }
    let function = BuiltinFunction::from_str(name).ok()?;
    Some(native_value(name, function.native()))
}

fn native_value(name: &str, func: NativeFn) -> Value {
    Value::Native(Rc::new(NativeFunction::new(name, func)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_to_the_right_kind_of_builtin() {
        let global = Scope::global();
        assert!(matches!(materialize("print", &global), Some(Value::Native(_))));
        assert!(matches!(materialize("isinstance", &global), Some(Value::Native(_))));
        assert!(matches!(materialize("int", &global), Some(Value::Class(_))));
        assert!(materialize("no_such_builtin", &global).is_none());
    }

    #[test]
    fn exception_classes_share_their_parents() {
        let global = Scope::global();
        let Some(Value::Class(key_error)) = global.lookup("KeyError") else {
            panic!("KeyError is not a class");
        };
        let Some(Value::Class(lookup_error)) = global.lookup("LookupError") else {
            panic!("LookupError is not a class");
        };
        assert!(key_error.is_subclass_of(&lookup_error));
        assert_eq!(key_error.exception_type(), Some(ExcType::KeyError));
    }
}
