//! Callable values: user functions, native functions and bound methods.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    args::{CallArgs, ParamSpec},
    bytecode::{CodeRef, Vm},
    exception_private::RunResult,
    namespace::ScopeRef,
    value::{AttrMap, ObjectId, Value, new_attr_map},
};

/// A user function: a compiled body closed over the scope it was created in.
///
/// Parameter names and default values are resolved once at creation time.
pub struct Function {
    id: ObjectId,
    name: Rc<str>,
    code: CodeRef,
    closure: ScopeRef,
    params: Vec<ParamSpec>,
    attrs: RefCell<AttrMap>,
}

impl Function {
    pub(crate) fn new(name: Rc<str>, code: CodeRef, closure: ScopeRef, params: Vec<ParamSpec>) -> Self {
        Self {
            id: ObjectId::next(),
            name,
            code,
            closure,
            params,
            attrs: RefCell::new(new_attr_map()),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_rc(&self) -> &Rc<str> {
        &self.name
    }

    pub(crate) fn code(&self) -> &CodeRef {
        &self.code
    }

    pub(crate) fn closure(&self) -> &ScopeRef {
        &self.closure
    }

    pub(crate) fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: Rc<str>, value: Value) {
        self.attrs.borrow_mut().insert(name, value);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish_non_exhaustive()
    }
}

/// What a native function hands back to the dispatcher.
#[derive(Debug)]
pub enum NativeReturn {
    /// The call finished with this value.
    Value(Value),
    /// The native took the call's completion target (see [`Vm::take_call_target`])
    /// and the result will be delivered to it later, typically after frames it
    /// pushed have run.
    Pending,
}

impl From<Value> for NativeReturn {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Signature of host-implemented functions.
///
/// Natives receive the raw call arguments (with `*spread` already expanded)
/// and do their own arity checking.
pub type NativeFn = fn(&mut Vm, CallArgs) -> RunResult<NativeReturn>;

/// A host-implemented function.
pub struct NativeFunction {
    id: ObjectId,
    name: Rc<str>,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: impl Into<Rc<str>>, func: NativeFn) -> Self {
        Self {
            id: ObjectId::next(),
            name: name.into(),
            func,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn func(&self) -> NativeFn {
        self.func
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// A function paired with the receiver it was looked up on.
///
/// Calling it prepends the receiver to the positional arguments.
#[derive(Debug)]
pub struct BoundMethod {
    id: ObjectId,
    receiver: Value,
    function: Value,
}

impl BoundMethod {
    #[must_use]
    pub fn new(receiver: Value, function: Value) -> Self {
        Self {
            id: ObjectId::next(),
            receiver,
            function,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    #[must_use]
    pub fn function(&self) -> &Value {
        &self.function
    }
}
