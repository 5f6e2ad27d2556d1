//! Iteration, truthiness, rendering, indexing and slicing.
//!
//! Builtin containers are handled directly. Instances go through their dunder
//! methods: operations that produce a value for an instruction return a
//! [`Dispatch::Call`] so the user method runs as an ordinary frame, while the
//! helpers natives rely on (`truthy`, `str_value`, `collect_iterable`) resolve
//! user code with nested calls.

use std::rc::Rc;

use super::{Dispatch, OnFinish, Vm};
use crate::{
    args::CallArgs,
    exception_private::{ExcType, RunResult},
    reference::SliceIndices,
    types::{Dict, Set, ValueIter},
    value::{Value, format_float, string_repr},
};

/// Containers nested deeper than this render as `...`.
const MAX_REPR_DEPTH: usize = 64;

impl Vm {
    /// `GetIter`: produces an iterator over `source`.
    ///
    /// Lists are iterated live; other builtin containers are snapshotted.
    pub(super) fn get_iter(&mut self, source: &Value) -> RunResult<Dispatch> {
        let iter = match source {
            Value::Generator(_) | Value::Iterator(_) => return Ok(Dispatch::Value(source.clone())),
            Value::List(list) => ValueIter::over_list(list.clone()),
            Value::Instance(instance) => {
                return match instance.lookup_class_attr("__iter__") {
                    Some(method) => Ok(Dispatch::Call(method, CallArgs::from_values([source.clone()]))),
                    None => Err(ExcType::type_error_not_iterable(&source.type_name())),
                };
            }
            other => match builtin_items(other) {
                Some(items) => ValueIter::over_items(items),
                None => return Err(ExcType::type_error_not_iterable(&other.type_name())),
            },
        };
        Ok(Dispatch::Value(Value::Iterator(Rc::new(iter))))
    }

    /// `iter(source)`, running a user `__iter__` to completion.
    pub fn iter_value(&mut self, source: &Value) -> RunResult<Value> {
        let outcome = self.get_iter(source)?;
        self.resolve(outcome)
    }

    /// `ForNext`: sends the next item of `iterator` to `target`.
    ///
    /// Exhaustion raises `StopIteration`, which the enclosing `for` loop
    /// frame turns into leaving the loop.
    pub(crate) fn for_next(&mut self, iterator: Value, target: OnFinish) -> RunResult<()> {
        match &iterator {
            Value::Generator(generator) => self.resume_generator(generator, target),
            Value::Iterator(iter) => match iter.next_value() {
                Some(value) => self.deliver(target, Ok(value)),
                None => Err(ExcType::stop_iteration()),
            },
            Value::Instance(instance) => match instance.lookup_class_attr("__next__") {
                Some(method) => self.invoke(method, CallArgs::from_values([iterator.clone()]), target),
                None => Err(ExcType::type_error_not_iterator(&iterator.type_name())),
            },
            other => Err(ExcType::type_error_not_iterator(&other.type_name())),
        }
    }

    /// Advances `iterator` synchronously, returning `None` when it is exhausted.
    pub fn next_item(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        if let Value::Iterator(iter) = iterator {
            return Ok(iter.next_value());
        }
        let iterator = iterator.clone();
        match self.run_nested(move |vm, target| vm.for_next(iterator, target)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_stop_iteration() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Collects every item `source` yields, running user iterators to completion.
    pub fn collect_iterable(&mut self, source: &Value) -> RunResult<Vec<Value>> {
        if let Some(items) = builtin_items(source) {
            return Ok(items);
        }
        let iterator = self.get_iter(source)?;
        let iterator = self.resolve(iterator)?;
        let mut items = Vec::new();
        while let Some(item) = self.next_item(&iterator)? {
            items.push(item);
        }
        Ok(items)
    }

    /// Items of a `*spread` argument, or `None` when `value` is not iterable.
    pub(super) fn spread_items(&mut self, value: &Value) -> RunResult<Option<Vec<Value>>> {
        let iterable = match value {
            Value::Instance(instance) => instance.lookup_class_attr("__iter__").is_some(),
            Value::Generator(_) | Value::Iterator(_) => true,
            other => builtin_items(other).is_some(),
        };
        if iterable {
            self.collect_iterable(value).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Truthiness, consulting `__bool__` then `__len__` on instances.
    pub fn truthy(&mut self, value: &Value) -> RunResult<bool> {
        if let Some(truth) = value.simple_truthy() {
            return Ok(truth);
        }
        let Value::Instance(instance) = value else { return Ok(true) };
        if let Some(method) = instance.lookup_class_attr("__bool__") {
            let result = self.call_nested(method, CallArgs::from_values([value.clone()]))?;
            return Ok(result.simple_truthy().unwrap_or(true));
        }
        if instance.lookup_class_attr("__len__").is_some() {
            return Ok(self.len_of(value)? != 0);
        }
        Ok(true)
    }

    /// `len(value)`.
    pub fn len_of(&mut self, value: &Value) -> RunResult<usize> {
        let len = match value {
            Value::Str(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::List(l) => l.len(),
            Value::Tuple(t) => t.items().len(),
            Value::Set(s) | Value::FrozenSet(s) => s.len(),
            Value::Dict(d) => d.len(),
            Value::Instance(instance) => {
                let method = instance
                    .lookup_class_attr("__len__")
                    .ok_or_else(|| ExcType::type_error_no_len(&value.type_name()))?;
                let result = self.call_nested(method, CallArgs::from_values([value.clone()]))?;
                return result
                    .as_int()
                    .and_then(|len| usize::try_from(len).ok())
                    .ok_or_else(|| ExcType::type_error_no_len(&value.type_name()));
            }
            other => return Err(ExcType::type_error_no_len(&other.type_name())),
        };
        Ok(len)
    }

    /// `str(value)`, consulting `__str__` and `__repr__`.
    pub fn str_value(&mut self, value: &Value) -> RunResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Instance(instance) | Value::Exception(instance) => {
                match instance.lookup_class_attr("__str__") {
                    Some(method) => self.call_text(method, value),
                    None if matches!(value, Value::Exception(_)) => Ok(instance.exception_message()),
                    None => self.repr_value(value),
                }
            }
            _ if value.is_container() => self.repr_value(value),
            other => Ok(other.basic_str()),
        }
    }

    /// `repr(value)`, consulting `__repr__` on instances, including those nested in containers.
    pub fn repr_value(&mut self, value: &Value) -> RunResult<String> {
        let mut out = String::new();
        self.render_repr(value, &mut out, 0)?;
        Ok(out)
    }

    fn render_repr(&mut self, value: &Value, out: &mut String, depth: usize) -> RunResult<()> {
        if depth > MAX_REPR_DEPTH {
            out.push_str("...");
            return Ok(());
        }
        match value {
            Value::Instance(instance) | Value::Exception(instance) => {
                match instance.lookup_class_attr("__repr__") {
                    Some(method) => out.push_str(&self.call_text(method, value)?),
                    None => out.push_str(&value.basic_repr()),
                }
            }
            Value::List(list) => self.render_items(&list.snapshot(), "[", "]", false, out, depth)?,
            Value::Tuple(tuple) => self.render_items(tuple.items(), "(", ")", true, out, depth)?,
            Value::Set(set) if !set.is_empty() => self.render_items(&set.values(), "{", "}", false, out, depth)?,
            Value::FrozenSet(set) if !set.is_empty() => {
                out.push_str("frozenset(");
                self.render_items(&set.values(), "{", "}", false, out, depth)?;
                out.push(')');
            }
            Value::Dict(dict) => {
                out.push('{');
                for (index, (key, item)) in dict.items().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    self.render_repr(key, out, depth + 1)?;
                    out.push_str(": ");
                    self.render_repr(item, out, depth + 1)?;
                }
                out.push('}');
            }
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => out.push_str(&string_repr(s)),
            other => out.push_str(&other.basic_repr()),
        }
        Ok(())
    }

    fn render_items(
        &mut self,
        items: &[Value],
        open: &str,
        close: &str,
        tuple: bool,
        out: &mut String,
        depth: usize,
    ) -> RunResult<()> {
        out.push_str(open);
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            self.render_repr(item, out, depth + 1)?;
        }
        if tuple && items.len() == 1 {
            out.push(',');
        }
        out.push_str(close);
        Ok(())
    }

    /// Calls a `__str__`/`__repr__` style method that must return a string.
    fn call_text(&mut self, method: Value, receiver: &Value) -> RunResult<String> {
        match self.call_nested(method, CallArgs::from_values([receiver.clone()]))? {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ExcType::binary_type_error("str()", "str", &other.type_name())),
        }
    }

    /// `parent[key]`
    pub(super) fn get_item(&mut self, parent: &Value, key: &Value) -> RunResult<Dispatch> {
        let value = match parent {
            Value::List(list) => {
                let items = list.borrow();
                items[sequence_index("list", items.len(), key)?].clone()
            }
            Value::Tuple(tuple) => tuple.items()[sequence_index("tuple", tuple.items().len(), key)?].clone(),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let ch = chars[sequence_index("string", chars.len(), key)?];
                Value::from(ch.to_string())
            }
            Value::Bytes(bytes) => Value::Int(i64::from(bytes[sequence_index("bytes", bytes.len(), key)?])),
            Value::Dict(dict) => match dict.get(key)? {
                Some(value) => value,
                None => return Err(ExcType::key_error(&self.repr_value(key)?)),
            },
            Value::Instance(instance) => {
                return match instance.lookup_class_attr("__getitem__") {
                    Some(method) => Ok(Dispatch::Call(
                        method,
                        CallArgs::from_values([parent.clone(), key.clone()]),
                    )),
                    None => Err(ExcType::type_error_not_subscriptable(&parent.type_name())),
                };
            }
            other => return Err(ExcType::type_error_not_subscriptable(&other.type_name())),
        };
        Ok(Dispatch::Value(value))
    }

    /// `parent[key] = value`
    pub(super) fn set_item(&mut self, parent: &Value, key: &Value, value: Value) -> RunResult<Dispatch> {
        match parent {
            Value::List(list) => {
                let mut items = list.borrow_mut();
                let index = sequence_index("list", items.len(), key)?;
                items[index] = value;
            }
            Value::Dict(dict) => dict.insert(key.clone(), value)?,
            Value::Instance(instance) => {
                return match instance.lookup_class_attr("__setitem__") {
                    Some(method) => Ok(Dispatch::Call(
                        method,
                        CallArgs::from_values([parent.clone(), key.clone(), value]),
                    )),
                    None => Err(ExcType::type_error_item_assignment(&parent.type_name())),
                };
            }
            other => return Err(ExcType::type_error_item_assignment(&other.type_name())),
        }
        Ok(Dispatch::Value(Value::None))
    }

    /// `del parent[key]`
    pub(super) fn del_item(&mut self, parent: &Value, key: &Value) -> RunResult<Dispatch> {
        match parent {
            Value::List(list) => {
                let mut items = list.borrow_mut();
                let index = sequence_index("list", items.len(), key)?;
                items.remove(index);
            }
            Value::Dict(dict) => {
                if dict.remove(key)?.is_none() {
                    return Err(ExcType::key_error(&self.repr_value(key)?));
                }
            }
            Value::Instance(instance) => {
                return match instance.lookup_class_attr("__delitem__") {
                    Some(method) => Ok(Dispatch::Call(
                        method,
                        CallArgs::from_values([parent.clone(), key.clone()]),
                    )),
                    None => Err(ExcType::type_error_item_assignment(&parent.type_name())),
                };
            }
            other => return Err(ExcType::type_error_item_assignment(&other.type_name())),
        }
        Ok(Dispatch::Value(Value::None))
    }

    /// `parent[from:to:step]`
    pub(super) fn get_slice(
        &mut self,
        parent: &Value,
        from: Option<&Value>,
        to: Option<&Value>,
        step: Option<&Value>,
    ) -> RunResult<Value> {
        let pick = |items: &[Value]| -> RunResult<Vec<Value>> {
            let slice = SliceIndices::resolve(items.len(), from, to, step)?;
            Ok(slice.indices().into_iter().map(|index| items[index].clone()).collect())
        };
        match parent {
            Value::List(list) => Ok(Value::list(pick(&list.borrow())?)),
            Value::Tuple(tuple) => Ok(Value::tuple(pick(tuple.items())?)),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let slice = SliceIndices::resolve(chars.len(), from, to, step)?;
                let text: String = slice.indices().into_iter().map(|index| chars[index]).collect();
                Ok(Value::from(text))
            }
            Value::Bytes(bytes) => {
                let slice = SliceIndices::resolve(bytes.len(), from, to, step)?;
                let picked: Vec<u8> = slice.indices().into_iter().map(|index| bytes[index]).collect();
                Ok(Value::Bytes(Rc::from(picked)))
            }
            other => Err(ExcType::type_error_not_subscriptable(&other.type_name())),
        }
    }

    /// `parent[from:to:step] = value`; only lists accept slice assignment.
    ///
    /// A step-1 slice is replaced by however many items `value` yields; an
    /// extended slice requires exactly as many items as it selects.
    pub(super) fn assign_slice(
        &mut self,
        parent: &Value,
        from: Option<&Value>,
        to: Option<&Value>,
        step: Option<&Value>,
        value: &Value,
    ) -> RunResult<()> {
        let Value::List(list) = parent else {
            return Err(ExcType::type_error_item_assignment(&parent.type_name()));
        };
        let replacement = self.collect_iterable(value)?;
        let mut items = list.borrow_mut();
        let slice = SliceIndices::resolve(items.len(), from, to, step)?;
        if slice.step == 1 {
            items.splice(slice.contiguous(), replacement);
            return Ok(());
        }
        let positions = slice.indices();
        if positions.len() != replacement.len() {
            return Err(ExcType::value_error_slice_size(replacement.len(), positions.len()));
        }
        for (index, item) in positions.into_iter().zip(replacement) {
            items[index] = item;
        }
        Ok(())
    }

    /// `del parent[from:to:step]`
    pub(super) fn delete_slice(
        &mut self,
        parent: &Value,
        from: Option<&Value>,
        to: Option<&Value>,
        step: Option<&Value>,
    ) -> RunResult<()> {
        let Value::List(list) = parent else {
            return Err(ExcType::type_error_item_assignment(&parent.type_name()));
        };
        let mut items = list.borrow_mut();
        let slice = SliceIndices::resolve(items.len(), from, to, step)?;
        if slice.step == 1 {
            items.drain(slice.contiguous());
            return Ok(());
        }
        let mut doomed = slice.indices();
        doomed.sort_unstable();
        for index in doomed.into_iter().rev() {
            items.remove(index);
        }
        Ok(())
    }

    /// `item in container`
    pub fn contains(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                other => Err(ExcType::binary_type_error("in", &other.type_name(), "str")),
            },
            Value::Bytes(haystack) => match item {
                Value::Int(byte) => Ok(u8::try_from(*byte).is_ok_and(|byte| haystack.contains(&byte))),
                Value::Bytes(needle) => Ok(needle.is_empty() || haystack.windows(needle.len()).any(|w| w == &**needle)),
                other => Err(ExcType::binary_type_error("in", &other.type_name(), "bytes")),
            },
            Value::Dict(dict) => dict.contains(item),
            Value::Set(set) | Value::FrozenSet(set) => set.contains(item),
            Value::Instance(instance) => match instance.lookup_class_attr("__contains__") {
                Some(method) => {
                    let result = self.call_nested(method, CallArgs::from_values([container.clone(), item.clone()]))?;
                    self.truthy(&result)
                }
                None => self.contains_by_iteration(container, item),
            },
            other => self.contains_by_iteration(other, item),
        }
    }

    fn contains_by_iteration(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        for candidate in self.collect_iterable(container)? {
            if self.values_equal(&candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Builds a `Dict` from `(key, value)` pairs produced by user iteration.
    pub(crate) fn dict_from_iterable(&mut self, source: &Value) -> RunResult<Dict> {
        if let Value::Dict(dict) = source {
            return Dict::from_pairs(dict.items());
        }
        let dict = Dict::new();
        for entry in self.collect_iterable(source)? {
            let pair = self.collect_iterable(&entry)?;
            let [key, value]: [Value; 2] = pair
                .try_into()
                .map_err(|pair: Vec<Value>| ExcType::value_error_unpack(2, pair.len()))?;
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    /// Builds a `Set` from every item of `source`.
    pub(crate) fn set_from_iterable(&mut self, source: &Value) -> RunResult<Set> {
        let items = self.collect_iterable(source)?;
        Set::from_values(items)
    }
}

/// Items of a builtin iterable, snapshotted; `None` for anything else.
fn builtin_items(value: &Value) -> Option<Vec<Value>> {
    Some(match value {
        Value::List(list) => list.snapshot(),
        Value::Tuple(tuple) => tuple.items().to_vec(),
        Value::Str(s) => s.chars().map(|ch| Value::from(ch.to_string())).collect(),
        Value::Bytes(bytes) => bytes.iter().map(|byte| Value::Int(i64::from(*byte))).collect(),
        Value::Set(set) | Value::FrozenSet(set) => set.values(),
        Value::Dict(dict) => dict.keys(),
        _ => return None,
    })
}

/// Resolves a possibly negative index against a sequence of `len` items.
pub(crate) fn sequence_index(type_name: &str, len: usize, key: &Value) -> RunResult<usize> {
    let index = match key {
        Value::Int(_) | Value::Bool(_) => key.as_int().unwrap_or_default(),
        other => return Err(ExcType::type_error_indices(type_name, &other.type_name())),
    };
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| ExcType::index_error(type_name))
    } else {
        Err(ExcType::index_error(type_name))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(sequence_index("list", 3, &Value::Int(-1)).unwrap(), 2);
        assert_eq!(sequence_index("list", 3, &Value::Int(0)).unwrap(), 0);
        assert!(sequence_index("list", 3, &Value::Int(3)).is_err());
        assert!(sequence_index("list", 3, &Value::Int(-4)).is_err());
        assert!(sequence_index("list", 3, &Value::str("0")).is_err());
    }

    #[test]
    fn builtin_items_cover_iterable_builtins() {
        assert_eq!(
            builtin_items(&Value::str("ab")),
            Some(vec![Value::str("a"), Value::str("b")])
        );
        assert_eq!(builtin_items(&Value::Int(1)), None);
    }
}
