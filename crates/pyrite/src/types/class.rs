//! Class objects, instances and `super` proxies.
//!
//! `Class` represents the class itself (created by `MakeClass` or materialized
//! as a builtin). `Instance` represents objects created by calling the class.
//!
//! # Inheritance
//!
//! Inheritance is an explicit graph of `(name, Class)` edges. The method
//! resolution order is the C3 linearization of that graph, computed lazily and
//! cached per class; instances carry the MRO they were created with.
//!
//! # Attribute Access
//!
//! - Instance attributes are checked first, then each class of the MRO in order
//! - Class attributes are shared across all instances
//! - Setting an attribute on an instance creates an instance-level attribute

use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt,
    rc::Rc,
};

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    args::CallArgs,
    bytecode::Vm,
    exception_private::{ErrorCode, ExcType, RunResult},
    value::{AttrMap, ObjectId, Value, new_attr_map},
};

/// A raised (or raisable) exception object.
pub type ExcRef = Rc<Instance>;

/// Constructor used by builtin classes in place of `__init__` dispatch.
pub type NativeConstructor = fn(&mut Vm, &Rc<Class>, CallArgs) -> RunResult<Value>;

/// The builtin value category a builtin class stands for.
///
/// Lets `isinstance(3, int)` and friends work against plain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinType {
    Object,
    Type,
    Int,
    Float,
    Bool,
    Str,
    Bytes,
    List,
    Tuple,
    Dict,
    Set,
    FrozenSet,
}

impl BuiltinType {
    /// Whether a plain (non-instance) value belongs to this builtin type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Object => true,
            Self::Type => matches!(value, Value::Class(_)),
            Self::Int => matches!(value, Value::Int(_) | Value::Bool(_)),
            Self::Float => matches!(value, Value::Float(_)),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Str => matches!(value, Value::Str(_)),
            Self::Bytes => matches!(value, Value::Bytes(_)),
            Self::List => matches!(value, Value::List(_)),
            Self::Tuple => matches!(value, Value::Tuple(_)),
            Self::Dict => matches!(value, Value::Dict(_)),
            Self::Set => matches!(value, Value::Set(_)),
            Self::FrozenSet => matches!(value, Value::FrozenSet(_)),
        }
    }

    /// The builtin type of a plain value, if it has one.
    #[must_use]
    pub fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Str,
            Value::Bytes(_) => Self::Bytes,
            Value::List(_) => Self::List,
            Value::Tuple(_) => Self::Tuple,
            Value::Dict(_) => Self::Dict,
            Value::Set(_) => Self::Set,
            Value::FrozenSet(_) => Self::FrozenSet,
            Value::Class(_) => Self::Type,
            _ => return None,
        })
    }
}

/// A class object.
pub struct Class {
    id: ObjectId,
    name: Rc<str>,
    parents: Vec<(Rc<str>, Rc<Class>)>,
    attrs: RefCell<AttrMap>,
    constructor: Option<NativeConstructor>,
    builtin: Option<BuiltinType>,
    exception_type: Option<ExcType>,
    /// MRO without the class itself; `None` inside when no consistent order exists.
    ancestors: OnceCell<Option<Vec<Rc<Class>>>>,
}

impl Class {
    /// Creates a user-level class with the given direct parents (in declaration order).
    pub fn new(name: impl Into<Rc<str>>, parents: Vec<Rc<Self>>) -> Rc<Self> {
        Self::with_attrs(name, parents, new_attr_map())
    }

    /// Creates a class whose attributes are taken from a finished class body.
    pub fn with_attrs(name: impl Into<Rc<str>>, parents: Vec<Rc<Self>>, attrs: AttrMap) -> Rc<Self> {
        Rc::new(Self {
            id: ObjectId::next(),
            name: name.into(),
            parents: parents.into_iter().map(|parent| (parent.name.clone(), parent)).collect(),
            attrs: RefCell::new(attrs),
            constructor: None,
            builtin: None,
            exception_type: None,
            ancestors: OnceCell::new(),
        })
    }

    /// Creates a builtin type class such as `int` or `list`.
    pub(crate) fn builtin(kind: BuiltinType, constructor: Option<NativeConstructor>) -> Rc<Self> {
        let name: &'static str = kind.into();
        Rc::new(Self {
            id: ObjectId::next(),
            name: Rc::from(name),
            parents: Vec::new(),
            attrs: RefCell::new(new_attr_map()),
            constructor,
            builtin: Some(kind),
            exception_type: None,
            ancestors: OnceCell::new(),
        })
    }

    /// Creates the builtin class for an exception type.
    pub(crate) fn exception(exc_type: ExcType, parents: Vec<Rc<Self>>) -> Rc<Self> {
        let name: &'static str = exc_type.into();
        Rc::new(Self {
            id: ObjectId::next(),
            name: Rc::from(name),
            parents: parents.into_iter().map(|parent| (parent.name.clone(), parent)).collect(),
            attrs: RefCell::new(new_attr_map()),
            constructor: None,
            builtin: None,
            exception_type: Some(exc_type),
            ancestors: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct parents as `(name, class)` edges, in declaration order.
    #[must_use]
    pub fn parents(&self) -> &[(Rc<str>, Rc<Self>)] {
        &self.parents
    }

    pub(crate) fn constructor(&self) -> Option<NativeConstructor> {
        self.constructor
    }

    #[must_use]
    pub fn builtin_type(&self) -> Option<BuiltinType> {
        self.builtin
    }

    /// The exception type this class itself is tagged with (builtin exception classes only).
    #[must_use]
    pub fn exception_type(&self) -> Option<ExcType> {
        self.exception_type
    }

    /// The method resolution order, starting with the class itself.
    ///
    /// Returns `None` when the hierarchy has no consistent C3 linearization.
    #[must_use]
    pub fn mro(self: &Rc<Self>) -> Option<Vec<Rc<Self>>> {
        let ancestors = self
            .ancestors
            .get_or_init(|| compute_mro(self).map(|mut mro| mro.split_off(1)))
            .as_ref()?;
        let mut mro = Vec::with_capacity(ancestors.len() + 1);
        mro.push(self.clone());
        mro.extend(ancestors.iter().cloned());
        Some(mro)
    }

    #[must_use]
    pub fn get_own_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<Rc<str>>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub(crate) fn remove_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow_mut().shift_remove(name)
    }

    /// The values of the class's own attributes, in definition order.
    pub(crate) fn own_attr_values(&self) -> Vec<Value> {
        self.attrs.borrow().values().cloned().collect()
    }

    /// Looks an attribute up along the MRO.
    ///
    /// Inconsistent hierarchies fall back to a depth-first walk of the parent graph
    /// so that attribute reads on the class object itself still work.
    #[must_use]
    pub fn lookup(self: &Rc<Self>, name: &str) -> Option<Value> {
        match self.mro() {
            Some(mro) => mro.iter().find_map(|class| class.get_own_attr(name)),
            None => self.lookup_depth_first(name),
        }
    }

    fn lookup_depth_first(&self, name: &str) -> Option<Value> {
        self.get_own_attr(name)
            .or_else(|| self.parents.iter().find_map(|(_, parent)| parent.lookup_depth_first(name)))
    }

    /// Whether `other` appears in this class's ancestry (including itself).
    #[must_use]
    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Self>) -> bool {
        if Rc::ptr_eq(self, other) || other.builtin == Some(BuiltinType::Object) {
            return true;
        }
        self.parents.iter().any(|(_, parent)| parent.is_subclass_of(other))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.name)
    }
}

/// Computes the C3 linearization of `class`.
///
/// The result starts with `class` itself, followed by the merge of every
/// parent's linearization and the parent list. Returns `None` if at some step
/// no head candidate is absent from the tails of all remaining sequences.
#[must_use]
pub fn compute_mro(class: &Rc<Class>) -> Option<Vec<Rc<Class>>> {
    let mut sequences: Vec<Vec<Rc<Class>>> = Vec::with_capacity(class.parents.len() + 1);
    for (_, parent) in &class.parents {
        sequences.push(parent.mro()?);
    }
    sequences.push(class.parents.iter().map(|(_, parent)| parent.clone()).collect());

    let mut result = vec![class.clone()];
    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }
        // first head that does not occur in the tail of any sequence
        let head = sequences
            .iter()
            .map(|sequence| &sequence[0])
            .find(|candidate| {
                !sequences
                    .iter()
                    .any(|sequence| sequence[1..].iter().any(|class| Rc::ptr_eq(class, candidate)))
            })?
            .clone();
        for sequence in &mut sequences {
            if Rc::ptr_eq(&sequence[0], &head) {
                sequence.remove(0);
            }
        }
        result.push(head);
    }
}

/// Counts the core exception classes in `mro` that declare no exception-class parents.
pub(crate) fn exception_roots(mro: &[Rc<Class>]) -> usize {
    mro.iter()
        .filter(|class| {
            class.exception_type.is_some()
                && class
                    .parents
                    .iter()
                    .all(|(_, parent)| parent.exception_type.is_none())
        })
        .count()
}

/// Exception state carried by instances of exception classes.
#[derive(Debug)]
struct ExceptionData {
    exc_type: ExcType,
    code: Cell<ErrorCode>,
    params: RefCell<Vec<String>>,
}

/// An instance of a class.
pub struct Instance {
    id: ObjectId,
    class: Rc<Class>,
    mro: Rc<[Rc<Class>]>,
    attrs: RefCell<AttrMap>,
    exception: Option<ExceptionData>,
}

impl Instance {
    /// Creates an instance with the MRO computed for its class.
    ///
    /// The instance is an exception when any class of the MRO is a builtin
    /// exception class; the most derived such class decides its type.
    pub(crate) fn new(class: Rc<Class>, mro: Rc<[Rc<Class>]>) -> Self {
        let exception = mro.iter().find_map(|c| c.exception_type).map(|exc_type| ExceptionData {
            exc_type,
            code: Cell::new(ErrorCode::UserRaised),
            params: RefCell::new(Vec::new()),
        });
        Self {
            id: ObjectId::next(),
            class,
            mro,
            attrs: RefCell::new(new_attr_map()),
            exception,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    #[must_use]
    pub fn mro(&self) -> &[Rc<Class>] {
        &self.mro
    }

    pub(crate) fn mro_rc(&self) -> Rc<[Rc<Class>]> {
        self.mro.clone()
    }

    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<Rc<str>>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub(crate) fn remove_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow_mut().shift_remove(name)
    }

    /// Looks `name` up in the classes of the MRO, skipping instance attributes.
    #[must_use]
    pub fn lookup_class_attr(&self, name: &str) -> Option<Value> {
        self.mro.iter().find_map(|class| class.get_own_attr(name))
    }

    /// Whether `class` appears in this instance's MRO.
    #[must_use]
    pub fn is_instance_of(&self, class: &Rc<Class>) -> bool {
        class.builtin == Some(BuiltinType::Object) || self.mro.iter().any(|c| Rc::ptr_eq(c, class))
    }

    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        self.exception.as_ref().map(|data| data.exc_type)
    }

    #[must_use]
    pub fn exception_code(&self) -> Option<ErrorCode> {
        self.exception.as_ref().map(|data| data.code.get())
    }

    #[must_use]
    pub fn exception_params(&self) -> Vec<String> {
        self.exception
            .as_ref()
            .map(|data| data.params.borrow().clone())
            .unwrap_or_default()
    }

    /// The formatted exception message, empty for non-exceptions.
    #[must_use]
    pub fn exception_message(&self) -> String {
        match &self.exception {
            Some(data) => data.code.get().format(&data.params.borrow()),
            None => String::new(),
        }
    }

    pub(crate) fn set_exception_details(&self, code: ErrorCode, params: Vec<String>) {
        if let Some(data) = &self.exception {
            data.code.set(code);
            *data.params.borrow_mut() = params;
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object>", self.class.name)
    }
}

/// Attribute proxy returned by `super()`.
///
/// Lookups search the receiver's MRO starting after the class `super` was
/// resolved against and bind hits to the receiver.
#[derive(Debug)]
pub struct SuperProxy {
    id: ObjectId,
    receiver: Value,
    mro: Rc<[Rc<Class>]>,
    start: usize,
}

impl SuperProxy {
    pub(crate) fn new(receiver: Value, mro: Rc<[Rc<Class>]>, start: usize) -> Self {
        Self {
            id: ObjectId::next(),
            receiver,
            mro,
            start,
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

    /// Finds `name` in the MRO entries after the starting class.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.mro
            .get(self.start..)
            .and_then(|rest| rest.iter().find_map(|class| class.get_own_attr(name)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(mro: &[Rc<Class>]) -> Vec<&str> {
        mro.iter().map(|class| class.name()).collect()
    }

    #[test]
    fn diamond_linearizes_depth_last() {
        let o = Class::new("O", vec![]);
        let a = Class::new("A", vec![o.clone()]);
        let b = Class::new("B", vec![o]);
        let c = Class::new("C", vec![a, b]);
        let mro = c.mro().expect("diamond has a consistent order");
        assert_eq!(names(&mro), vec!["C", "A", "B", "O"]);
    }

    #[test]
    fn inconsistent_hierarchy_has_no_order() {
        let x = Class::new("X", vec![]);
        let y = Class::new("Y", vec![]);
        let a = Class::new("A", vec![x.clone(), y.clone()]);
        let b = Class::new("B", vec![y, x]);
        let c = Class::new("C", vec![a.clone(), b]);
        assert!(compute_mro(&c).is_none());
        assert!(c.mro().is_none());
        assert_eq!(names(&a.mro().unwrap()), vec!["A", "X", "Y"]);
    }

    #[test]
    fn textbook_example() {
        // the classic C3 example from the Dylan paper
        let o = Class::new("O", vec![]);
        let f = Class::new("F", vec![o.clone()]);
        let e = Class::new("E", vec![o.clone()]);
        let d = Class::new("D", vec![o]);
        let c = Class::new("C", vec![d.clone(), f.clone()]);
        let b = Class::new("B", vec![d, e.clone()]);
        let a = Class::new("A", vec![b, c]);
        assert_eq!(names(&a.mro().unwrap()), vec!["A", "B", "C", "D", "E", "F", "O"]);
    }

    #[test]
    fn lookup_follows_mro() {
        let base = Class::new("Base", vec![]);
        base.set_attr("greet", Value::str("base"));
        let left = Class::new("Left", vec![base.clone()]);
        let right = Class::new("Right", vec![base]);
        right.set_attr("greet", Value::str("right"));
        let child = Class::new("Child", vec![left, right]);
        assert_eq!(child.lookup("greet"), Some(Value::str("right")));
    }

    #[test]
    fn builtin_exception_hierarchy_has_one_root() {
        let base = Class::exception(ExcType::BaseException, vec![]);
        let exception = Class::exception(ExcType::Exception, vec![base]);
        let value_error = Class::exception(ExcType::ValueError, vec![exception]);
        let custom = Class::new("Custom", vec![value_error]);
        let mro = custom.mro().unwrap();
        assert_eq!(exception_roots(&mro), 1);
        let instance = Instance::new(custom, Rc::from(mro));
        assert_eq!(instance.exc_type(), Some(ExcType::ValueError));
    }
}
