//! The closed value type manipulated by the VM.
//!
//! Scalars are stored inline; everything else is a shared handle (`Rc`) so
//! assignment aliases exactly like the source language. Containers that the
//! language can mutate carry their own `RefCell`.

use std::{
    borrow::Cow,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use indexmap::IndexMap;

use crate::{
    reference::Reference,
    types::{
        BoundMethod, Class, Dict, Function, Generator, Instance, List, Module, NativeFunction, Set, SuperProxy,
        Tuple, ValueIter,
    },
};

/// Maximum nesting depth followed when rendering containers without VM help.
const MAX_RENDER_DEPTH: usize = 64;

/// String-keyed attribute table used by instances, classes, functions and scopes.
pub type AttrMap = IndexMap<Rc<str>, Value, ahash::RandomState>;

/// Creates an empty [`AttrMap`].
#[must_use]
pub fn new_attr_map() -> AttrMap {
    IndexMap::with_hasher(ahash::RandomState::new())
}

/// Process-wide monotonic object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocates the next identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    List(Rc<List>),
    Tuple(Rc<Tuple>),
    Set(Rc<Set>),
    FrozenSet(Rc<Set>),
    Dict(Rc<Dict>),
    Module(Rc<Module>),
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    BoundMethod(Rc<BoundMethod>),
    Super(Rc<SuperProxy>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    /// An instance whose MRO contains a builtin exception class; raisable.
    Exception(Rc<Instance>),
    Reference(Rc<Reference>),
    Generator(Rc<Generator>),
    Iterator(Rc<ValueIter>),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Self::Str(Rc::from(text))
    }

    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(List::new(items)))
    }

    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(Rc::new(Tuple::new(items)))
    }

    /// Name of the value's type as reported in error messages and by `type()`.
    #[must_use]
    pub fn type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::FrozenSet(_) => "frozenset",
            Self::Dict(_) => "dict",
            Self::Module(_) => "module",
            Self::Function(_) => "function",
            Self::Native(_) => "builtin_function_or_method",
            Self::BoundMethod(_) => "method",
            Self::Super(_) => "super",
            Self::Class(_) => "type",
            Self::Instance(instance) | Self::Exception(instance) => {
                return Cow::Owned(instance.class().name().to_owned());
            }
            Self::Reference(_) => "reference",
            Self::Generator(_) => "generator",
            Self::Iterator(_) => "iterator",
        })
    }

    /// Whether calling this value can succeed without looking at dunder methods.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        match self {
            Self::Function(_) | Self::Native(_) | Self::BoundMethod(_) | Self::Class(_) => true,
            Self::Instance(instance) => instance.lookup_class_attr("__call__").is_some(),
            _ => false,
        }
    }

    /// Whether this value holds other values.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Tuple(_) | Self::Set(_) | Self::FrozenSet(_) | Self::Dict(_)
        )
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Identity of heap-backed values; scalars have none.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        Some(match self {
            Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Bytes(_) => return None,
            Self::List(v) => v.id(),
            Self::Tuple(v) => v.id(),
            Self::Set(v) | Self::FrozenSet(v) => v.id(),
            Self::Dict(v) => v.id(),
            Self::Module(v) => v.id(),
            Self::Function(v) => v.id(),
            Self::Native(v) => v.id(),
            Self::BoundMethod(v) => v.id(),
            Self::Super(v) => v.id(),
            Self::Class(v) => v.id(),
            Self::Instance(v) | Self::Exception(v) => v.id(),
            Self::Reference(_) => return None,
            Self::Generator(v) => v.id(),
            Self::Iterator(v) => v.id(),
        })
    }

    /// Identity comparison (`is`).
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Bytes(a), Self::Bytes(b)) => Rc::ptr_eq(a, b),
            (Self::Reference(a), Self::Reference(b)) => Rc::ptr_eq(a, b),
            _ => match (self.object_id(), other.object_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Integer view of ints and bools.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float view of any number.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness for values that do not need dunder dispatch.
    ///
    /// Returns `None` for instances, which may define `__bool__` or `__len__`.
    #[must_use]
    pub fn simple_truthy(&self) -> Option<bool> {
        Some(match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(l) => l.len() != 0,
            Self::Tuple(t) => !t.items().is_empty(),
            Self::Set(s) | Self::FrozenSet(s) => s.len() != 0,
            Self::Dict(d) => d.len() != 0,
            Self::Instance(_) => return None,
            _ => true,
        })
    }

    /// Structural equality for builtin values; identity for everything else.
    ///
    /// Instances fall back to identity here; the VM layers `__eq__` on top.
    #[must_use]
    pub fn simple_eq(&self, other: &Self) -> bool {
        self.eq_depth(other, 0)
    }

    fn eq_depth(&self, other: &Self, depth: usize) -> bool {
        if depth > MAX_RENDER_DEPTH {
            return false;
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Float(_), _) | (_, Self::Float(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Self::Int(_) | Self::Bool(_), Self::Int(_) | Self::Bool(_)) => self.as_int() == other.as_int(),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.eq_depth(y, depth + 1))
            }
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.items().len() == b.items().len()
                    && a.items().iter().zip(b.items()).all(|(x, y)| x.eq_depth(y, depth + 1))
            }
            (Self::Set(a) | Self::FrozenSet(a), Self::Set(b) | Self::FrozenSet(b)) => a.same_members(b),
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.items(), b.items());
                a.len() == b.len()
                    && a.iter().zip(&b).all(|((ka, va), (kb, vb))| {
                        ka.eq_depth(kb, depth + 1) && va.eq_depth(vb, depth + 1)
                    })
            }
            _ => self.is(other),
        }
    }

    /// `repr()` rendering that does not consult dunder methods.
    #[must_use]
    pub fn basic_repr(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, true, 0);
        out
    }

    /// `str()` rendering that does not consult dunder methods.
    #[must_use]
    pub fn basic_str(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, false, 0);
        out
    }

    fn render(&self, out: &mut String, repr: bool, depth: usize) {
        if depth > MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::Str(s) if repr => out.push_str(&string_repr(s)),
            Self::Str(s) => out.push_str(s),
            Self::Bytes(b) => out.push_str(&bytes_repr(b)),
            Self::List(l) => render_sequence(out, "[", "]", &l.snapshot(), depth, false),
            Self::Tuple(t) => render_sequence(out, "(", ")", t.items(), depth, true),
            Self::Set(s) => {
                let items = s.values();
                if items.is_empty() {
                    out.push_str("set()");
                } else {
                    render_sequence(out, "{", "}", &items, depth, false);
                }
            }
            Self::FrozenSet(s) => {
                out.push_str("frozenset(");
                let items = s.values();
                if !items.is_empty() {
                    render_sequence(out, "{", "}", &items, depth, false);
                }
                out.push(')');
            }
            Self::Dict(d) => {
                out.push('{');
                for (index, (key, value)) in d.items().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    key.render(out, true, depth + 1);
                    out.push_str(": ");
                    value.render(out, true, depth + 1);
                }
                out.push('}');
            }
            Self::Module(m) => out.push_str(&format!("<module '{}'>", m.name())),
            Self::Function(f) => out.push_str(&format!("<function {}>", f.name())),
            Self::Native(n) => out.push_str(&format!("<built-in function {}>", n.name())),
            Self::BoundMethod(m) => {
                out.push_str("<bound method of ");
                out.push_str(&m.receiver().type_name());
                out.push('>');
            }
            Self::Super(_) => out.push_str("<super>"),
            Self::Class(c) => out.push_str(&format!("<class '{}'>", c.name())),
            Self::Instance(i) => out.push_str(&format!("<{} object>", i.class().name())),
            Self::Exception(e) => {
                if repr {
                    out.push_str(&format!("{}({})", e.class().name(), exception_args_repr(e)));
                } else {
                    out.push_str(&e.exception_message());
                }
            }
            Self::Reference(_) => out.push_str("<reference>"),
            Self::Generator(g) => out.push_str(&format!("<generator object {}>", g.name())),
            Self::Iterator(_) => out.push_str("<iterator>"),
        }
    }
}

fn render_sequence(out: &mut String, open: &str, close: &str, items: &[Value], depth: usize, tuple: bool) {
    out.push_str(open);
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        item.render(out, true, depth + 1);
    }
    if tuple && items.len() == 1 {
        out.push(',');
    }
    out.push_str(close);
}

fn exception_args_repr(exc: &Instance) -> String {
    match exc.get_attr("args") {
        Some(Value::Tuple(args)) => args
            .items()
            .iter()
            .map(Value::basic_repr)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

/// Formats a float the way `repr(float)` does: shortest round-trip digits,
/// always with a fractional part or exponent.
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let text = buffer.format_finite(f);
    let (sign, text) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (mantissa, exponent) = match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = format!("{whole}{fraction}");
    let significant = all_digits.trim_start_matches('0');
    if significant.is_empty() {
        return format!("{sign}0.0");
    }
    let leading_zeros = all_digits.len() - significant.len();
    let digits = significant.trim_end_matches('0');
    // position of the decimal point, counted in digits from the first significant one
    let point = digit_count(whole) + exponent - digit_count(&all_digits[..leading_zeros]);
    let scientific = point - 1;

    if !(-4..16).contains(&scientific) {
        let (first, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        let exp_sign = if scientific < 0 { '-' } else { '+' };
        return format!("{sign}{first}{rest}e{exp_sign}{:02}", scientific.unsigned_abs());
    }
    let len = digit_count(digits);
    if point <= 0 {
        let zeros = "0".repeat(point.unsigned_abs() as usize);
        format!("{sign}0.{zeros}{digits}")
    } else if point >= len {
        let zeros = "0".repeat((point - len).unsigned_abs() as usize);
        format!("{sign}{digits}{zeros}.0")
    } else {
        let (integer, decimals) = digits.split_at(point.unsigned_abs() as usize);
        format!("{sign}{integer}.{decimals}")
    }
}

fn digit_count(digits: &str) -> i32 {
    i32::try_from(digits.len()).unwrap_or(i32::MAX)
}

/// Quotes a string like `repr(str)`.
#[must_use]
pub fn string_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(byte)),
            other => out.push_str(&format!("\\x{other:02x}")),
        }
    }
    out.push('\'');
    out
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.basic_repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.basic_str())
    }
}

/// Structural equality, see [`Value::simple_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.simple_eq(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_like_repr() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(123.456), "123.456");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn container_rendering() {
        let value = Value::list(vec![Value::Int(1), Value::str("a"), Value::tuple(vec![Value::None])]);
        assert_eq!(value.basic_repr(), "[1, 'a', (None,)]");
        assert_eq!(Value::str("it's").basic_repr(), "\"it's\"");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::str("1"));
    }
}
