//! Attribute access and lvalue references.

use std::rc::Rc;

use super::{Dispatch, Vm};
use crate::{
    builtins::methods,
    exception_private::{ExcType, RunResult},
    reference::Reference,
    types::BoundMethod,
    value::Value,
};

impl Vm {
    /// Reads `object.name`.
    ///
    /// Instances check their own attributes first, then each class of their
    /// MRO; functions found on a class are bound to the instance.
    pub fn get_attr(&mut self, object: &Value, name: &str) -> RunResult<Value> {
        let found = match object {
            Value::Instance(instance) | Value::Exception(instance) => {
                if let Some(value) = instance.get_attr(name) {
                    return Ok(value);
                }
                if name == "__class__" {
                    return Ok(Value::Class(instance.class().clone()));
                }
                instance
                    .lookup_class_attr(name)
                    .map(|attr| bind(object, attr))
            }
            Value::Class(class) => match name {
                "__name__" => Some(Value::str(class.name())),
                "__mro__" => class
                    .mro()
                    .map(|mro| Value::tuple(mro.into_iter().map(Value::Class).collect())),
                "__bases__" => Some(Value::tuple(
                    class
                        .parents()
                        .iter()
                        .map(|(_, parent)| Value::Class(parent.clone()))
                        .collect(),
                )),
                _ => class.lookup(name),
            },
            Value::Module(module) => match name {
                "__name__" => Some(Value::str(module.name())),
                _ => module.get_attr(name),
            },
            Value::Function(function) => match name {
                "__name__" => Some(Value::str(function.name())),
                _ => function.get_attr(name),
            },
            Value::Super(proxy) => proxy.lookup(name).map(|attr| bind(proxy.receiver(), attr)),
            _ => None,
        };
        if let Some(value) = found {
            return Ok(value);
        }
        match methods::lookup(object, name) {
            Some(native) => Ok(bind(object, native)),
            None => Err(ExcType::attribute_error(&attr_owner_name(object), name)),
        }
    }

    /// Writes `object.name = value`.
    pub fn set_attr(&mut self, object: &Value, name: Rc<str>, value: Value) -> RunResult<()> {
        match object {
            Value::Instance(instance) | Value::Exception(instance) => instance.set_attr(name, value),
            Value::Class(class) => class.set_attr(name, value),
            Value::Function(function) => function.set_attr(name, value),
            Value::Module(module) => module.scope().set_local(name, value),
            other => return Err(ExcType::attribute_error_read_only(&other.type_name(), &name)),
        }
        Ok(())
    }

    fn delete_attr(&mut self, object: &Value, name: &str) -> RunResult<()> {
        let removed = match object {
            Value::Instance(instance) | Value::Exception(instance) => instance.remove_attr(name),
            Value::Class(class) => class.remove_attr(name),
            Value::Module(module) => module.scope().remove_local(name),
            other => return Err(ExcType::attribute_error_read_only(&other.type_name(), name)),
        };
        removed
            .map(drop)
            .ok_or_else(|| ExcType::attribute_error(&attr_owner_name(object), name))
    }

    /// Stores `value` through `reference`.
    pub(super) fn assign_reference(&mut self, reference: &Reference, value: Value) -> RunResult<Dispatch> {
        match reference {
            Reference::Variable { name, qualifier, scope } => {
                scope.target_scope(name, *qualifier)?.set_local(name.clone(), value);
            }
            Reference::Property { parent, name } => self.set_attr(parent, name.clone(), value)?,
            Reference::Index { parent, key } => return self.set_item(parent, key, value),
            Reference::Range { parent, from, to, step } => {
                self.assign_slice(parent, from.as_ref(), to.as_ref(), step.as_ref(), &value)?;
            }
        }
        Ok(Dispatch::Value(Value::None))
    }

    /// Removes the binding, attribute or items `reference` designates.
    pub(super) fn delete_reference(&mut self, reference: &Reference) -> RunResult<Dispatch> {
        match reference {
            Reference::Variable { name, qualifier, scope } => {
                if scope.target_scope(name, *qualifier)?.remove_local(name).is_none() {
                    return Err(ExcType::name_error(name));
                }
            }
            Reference::Property { parent, name } => self.delete_attr(parent, name)?,
            Reference::Index { parent, key } => return self.del_item(parent, key),
            Reference::Range { parent, from, to, step } => {
                self.delete_slice(parent, from.as_ref(), to.as_ref(), step.as_ref())?;
            }
        }
        Ok(Dispatch::Value(Value::None))
    }

    /// Reads the current value `reference` designates.
    pub(super) fn deref_reference(&mut self, reference: &Reference) -> RunResult<Dispatch> {
        match reference {
            Reference::Variable { name, qualifier, scope } => scope.load(name, *qualifier).map(Dispatch::Value),
            Reference::Property { parent, name } => self.get_attr(parent, name).map(Dispatch::Value),
            Reference::Index { parent, key } => self.get_item(parent, key),
            Reference::Range { parent, from, to, step } => self
                .get_slice(parent, from.as_ref(), to.as_ref(), step.as_ref())
                .map(Dispatch::Value),
        }
    }
}

/// Binds callables found on a class to `receiver`; other attributes are returned as is.
fn bind(receiver: &Value, attr: Value) -> Value {
    match attr {
        Value::Function(_) | Value::Native(_) => Value::BoundMethod(Rc::new(BoundMethod::new(receiver.clone(), attr))),
        other => other,
    }
}

fn attr_owner_name(object: &Value) -> String {
    match object {
        Value::Class(class) => class.name().to_owned(),
        other => other.type_name().into_owned(),
    }
}
