//! Methods of builtin values (`list.append`, `str.split`, ...).
//!
//! [`lookup`] is the attribute fallback for values that have no attribute
//! table of their own. It returns an unbound native; attribute access binds
//! it, so every method here receives its receiver as the first argument.

use std::rc::Rc;

use super::native_value;
use crate::{
    args::CallArgs,
    bytecode::{Vm, sequence_index},
    exception_private::{ExcType, RunError, RunResult},
    types::{Dict, List, NativeFn, NativeReturn, Set},
    value::Value,
};

/// Finds the builtin method `name` of `value`.
pub(crate) fn lookup(value: &Value, name: &str) -> Option<Value> {
    let (qualified, func): (&str, NativeFn) = match (value, name) {
        (Value::List(_), "append") => ("list.append", list_append),
        (Value::List(_), "extend") => ("list.extend", list_extend),
        (Value::List(_), "insert") => ("list.insert", list_insert),
        (Value::List(_), "pop") => ("list.pop", list_pop),
        (Value::List(_), "remove") => ("list.remove", list_remove),
        (Value::List(_), "index") => ("list.index", list_index),
        (Value::Dict(_), "get") => ("dict.get", dict_get),
        (Value::Dict(_), "keys") => ("dict.keys", dict_keys),
        (Value::Dict(_), "values") => ("dict.values", dict_values),
        (Value::Dict(_), "items") => ("dict.items", dict_items),
        (Value::Dict(_), "pop") => ("dict.pop", dict_pop),
        (Value::Dict(_), "update") => ("dict.update", dict_update),
        (Value::Set(_), "add") => ("set.add", set_add),
        (Value::Set(_), "remove") => ("set.remove", set_remove),
        (Value::Set(_), "discard") => ("set.discard", set_discard),
        (Value::Str(_), "join") => ("str.join", str_join),
        (Value::Str(_), "split") => ("str.split", str_split),
        (Value::Str(_), "upper") => ("str.upper", str_upper),
        (Value::Str(_), "lower") => ("str.lower", str_lower),
        (Value::Str(_), "strip") => ("str.strip", str_strip),
        (Value::Str(_), "startswith") => ("str.startswith", str_startswith),
        (Value::Str(_), "endswith") => ("str.endswith", str_endswith),
        (Value::Str(_), "replace") => ("str.replace", str_replace),
        (Value::Generator(_) | Value::Iterator(_), "__next__") => ("__next__", iterator_next),
        (Value::Generator(_) | Value::Iterator(_), "__iter__") => ("__iter__", iterator_iter),
        _ => return None,
    };
    Some(native_value(qualified, func))
}

/// Splits off the receiver and checks the remaining positional count.
fn unpack(args: CallArgs, method: &str, min: usize, max: usize) -> RunResult<(Value, Vec<Value>)> {
    let mut values = args.into_positional(method)?;
    if values.is_empty() {
        return Err(RunError::internal(format!("{method} called without a receiver")));
    }
    let receiver = values.remove(0);
    if values.len() < min || values.len() > max {
        let expected = match (min, max) {
            (0, 0) => "no".to_owned(),
            (min, max) if min == max => format!("exactly {min}"),
            (min, max) => format!("{min} to {max}"),
        };
        return Err(ExcType::type_error_arg_count(method, &expected, values.len()));
    }
    Ok((receiver, values))
}

fn wrong_receiver(method: &str, receiver: &Value) -> RunError {
    RunError::internal(format!("{method} bound to {}", receiver.type_name()))
}

fn list_receiver<'a>(receiver: &'a Value, method: &str) -> RunResult<&'a Rc<List>> {
    match receiver {
        Value::List(list) => Ok(list),
        other => Err(wrong_receiver(method, other)),
    }
}

fn dict_receiver<'a>(receiver: &'a Value, method: &str) -> RunResult<&'a Rc<Dict>> {
    match receiver {
        Value::Dict(dict) => Ok(dict),
        other => Err(wrong_receiver(method, other)),
    }
}

fn set_receiver<'a>(receiver: &'a Value, method: &str) -> RunResult<&'a Rc<Set>> {
    match receiver {
        Value::Set(set) => Ok(set),
        other => Err(wrong_receiver(method, other)),
    }
}

fn str_receiver<'a>(receiver: &'a Value, method: &str) -> RunResult<&'a str> {
    match receiver {
        Value::Str(text) => Ok(text),
        other => Err(wrong_receiver(method, other)),
    }
}

fn str_arg<'a>(value: &'a Value, method: &str) -> RunResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ExcType::type_error_str_expected(&format!("{method}() argument"), &value.type_name()))
}

// --- list ---

fn list_append(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, mut values) = unpack(args, "list.append", 1, 1)?;
    let list = list_receiver(&receiver, "list.append")?;
    list.push(values.remove(0));
    Ok(Value::None.into())
}

fn list_extend(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "list.extend", 1, 1)?;
    let list = list_receiver(&receiver, "list.extend")?;
    // collected first so `l.extend(l)` sees the original items only
    let items = vm.collect_iterable(&values[0])?;
    list.borrow_mut().extend(items);
    Ok(Value::None.into())
}

/// `list.insert(index, item)`; out-of-range indices clamp to the ends.
fn list_insert(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "list.insert", 2, 2)?;
    let list = list_receiver(&receiver, "list.insert")?;
    let item = values[1].clone();
    let index = values[0]
        .as_int()
        .ok_or_else(|| ExcType::type_error_integer_expected(&values[0].type_name()))?;
    let mut items = list.borrow_mut();
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
    items.insert(usize::try_from(position).unwrap_or_default(), item);
    Ok(Value::None.into())
}

fn list_pop(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "list.pop", 0, 1)?;
    let list = list_receiver(&receiver, "list.pop")?;
    let mut items = list.borrow_mut();
    let index = match values.first() {
        Some(key) => sequence_index("pop", items.len(), key)?,
        None => items.len().checked_sub(1).ok_or_else(|| ExcType::index_error("pop"))?,
    };
    Ok(items.remove(index).into())
}

fn list_remove(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "list.remove", 1, 1)?;
    let list = list_receiver(&receiver, "list.remove")?;
    let index = position_of(vm, list, &values[0])?;
    let mut items = list.borrow_mut();
    // an `__eq__` may have shrunk the list meanwhile
    if index < items.len() {
        items.remove(index);
    }
    Ok(Value::None.into())
}

fn list_index(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "list.index", 1, 1)?;
    let list = list_receiver(&receiver, "list.index")?;
    let index = position_of(vm, list, &values[0])?;
    Ok(Value::Int(i64::try_from(index).map_err(|_| ExcType::overflow())?).into())
}

/// First index holding a value equal to `item`; `__eq__` may run user code.
fn position_of(vm: &mut Vm, list: &List, item: &Value) -> RunResult<usize> {
    for (index, candidate) in list.snapshot().iter().enumerate() {
        if vm.values_equal(candidate, item)? {
            return Ok(index);
        }
    }
    Err(ExcType::value_error_not_in_list())
}

// --- dict ---

fn dict_get(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, mut values) = unpack(args, "dict.get", 1, 2)?;
    let dict = dict_receiver(&receiver, "dict.get")?;
    let default = if values.len() == 2 { values.pop() } else { None };
    Ok(dict.get(&values[0])?.or(default).unwrap_or(Value::None).into())
}

fn dict_keys(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "dict.keys", 0, 0)?;
    Ok(Value::list(dict_receiver(&receiver, "dict.keys")?.keys()).into())
}

fn dict_values(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "dict.values", 0, 0)?;
    Ok(Value::list(dict_receiver(&receiver, "dict.values")?.values()).into())
}

fn dict_items(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "dict.items", 0, 0)?;
    let pairs = dict_receiver(&receiver, "dict.items")?
        .items()
        .into_iter()
        .map(|(key, value)| Value::tuple(vec![key, value]))
        .collect();
    Ok(Value::list(pairs).into())
}

fn dict_pop(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, mut values) = unpack(args, "dict.pop", 1, 2)?;
    let dict = dict_receiver(&receiver, "dict.pop")?;
    let default = if values.len() == 2 { values.pop() } else { None };
    match (dict.remove(&values[0])?, default) {
        (Some(value), _) | (None, Some(value)) => Ok(value.into()),
        (None, None) => Err(ExcType::key_error(&vm.repr_value(&values[0])?)),
    }
}

/// `dict.update(other)` with a mapping or pairs, plus `**named` entries.
fn dict_update(vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let named = std::mem::take(&mut args.named);
    let (receiver, values) = unpack(args, "dict.update", 0, 1)?;
    let dict = dict_receiver(&receiver, "dict.update")?;
    if let Some(source) = values.first() {
        for (key, value) in vm.dict_from_iterable(source)?.items() {
            dict.insert(key, value)?;
        }
    }
    for (name, value) in named {
        dict.insert_str(name, value);
    }
    Ok(Value::None.into())
}

// --- set ---

fn set_add(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, mut values) = unpack(args, "set.add", 1, 1)?;
    set_receiver(&receiver, "set.add")?.add(values.remove(0))?;
    Ok(Value::None.into())
}

fn set_remove(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "set.remove", 1, 1)?;
    if !set_receiver(&receiver, "set.remove")?.remove(&values[0])? {
        return Err(ExcType::key_error(&vm.repr_value(&values[0])?));
    }
    Ok(Value::None.into())
}

fn set_discard(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "set.discard", 1, 1)?;
    set_receiver(&receiver, "set.discard")?.remove(&values[0])?;
    Ok(Value::None.into())
}

// --- str ---

fn str_join(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "str.join", 1, 1)?;
    let separator = str_receiver(&receiver, "str.join")?;
    let mut joined = String::new();
    for (index, item) in vm.collect_iterable(&values[0])?.iter().enumerate() {
        let Value::Str(text) = item else {
            return Err(ExcType::type_error_join_item(index, &item.type_name()));
        };
        if index > 0 {
            joined.push_str(separator);
        }
        joined.push_str(text);
    }
    Ok(Value::from(joined).into())
}

/// `str.split(sep=None, maxsplit=-1)`.
fn str_split(_vm: &mut Vm, mut args: CallArgs) -> RunResult<NativeReturn> {
    let named_sep = args.take_named("sep");
    let named_max = args.take_named("maxsplit");
    let (receiver, values) = unpack(args, "str.split", 0, 2)?;
    let text = str_receiver(&receiver, "str.split")?;
    let mut values = values.into_iter();
    let separator = values.next().or(named_sep).filter(|sep| !sep.is_none());
    let max_split = match values.next().or(named_max) {
        Some(limit) => limit
            .as_int()
            .ok_or_else(|| ExcType::type_error_integer_expected(&limit.type_name()))?,
        None => -1,
    };
    let limit = usize::try_from(max_split).ok();

    let pieces: Vec<Value> = match &separator {
        Some(separator) => {
            let separator = str_arg(separator, "split")?;
            if separator.is_empty() {
                return Err(ExcType::value_error_empty_separator());
            }
            match limit {
                Some(limit) => text.splitn(limit + 1, separator).map(Value::from).collect(),
                None => text.split(separator).map(Value::from).collect(),
            }
        }
        None => split_whitespace(text, limit).into_iter().map(Value::from).collect(),
    };
    Ok(Value::list(pieces).into())
}

/// Whitespace splitting: runs of whitespace separate, ends are ignored, and
/// once `limit` splits are made the rest is kept verbatim.
fn split_whitespace(text: &str, limit: Option<usize>) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if limit.is_some_and(|limit| pieces.len() == limit) {
            pieces.push(rest);
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        pieces.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    pieces
}

fn str_upper(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "str.upper", 0, 0)?;
    Ok(Value::from(str_receiver(&receiver, "str.upper")?.to_uppercase()).into())
}

fn str_lower(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "str.lower", 0, 0)?;
    Ok(Value::from(str_receiver(&receiver, "str.lower")?.to_lowercase()).into())
}

fn str_strip(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "str.strip", 0, 1)?;
    let text = str_receiver(&receiver, "str.strip")?;
    let stripped = match values.first().filter(|chars| !chars.is_none()) {
        Some(chars) => {
            let chars = str_arg(chars, "strip")?;
            text.trim_matches(|ch| chars.contains(ch))
        }
        None => text.trim(),
    };
    Ok(Value::str(stripped).into())
}

fn str_startswith(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "str.startswith", 1, 1)?;
    let text = str_receiver(&receiver, "str.startswith")?;
    let result = any_affix(&values[0], "startswith", |prefix| text.starts_with(prefix))?;
    Ok(Value::Bool(result).into())
}

fn str_endswith(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "str.endswith", 1, 1)?;
    let text = str_receiver(&receiver, "str.endswith")?;
    let result = any_affix(&values[0], "endswith", |suffix| text.ends_with(suffix))?;
    Ok(Value::Bool(result).into())
}

/// Applies `test` to a string or to each string of a tuple.
fn any_affix(affixes: &Value, method: &str, test: impl Fn(&str) -> bool) -> RunResult<bool> {
    match affixes {
        Value::Tuple(options) => {
            for option in options.items() {
                if test(str_arg(option, method)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Ok(test(str_arg(other, method)?)),
    }
}

/// `str.replace(old, new, count=-1)`.
fn str_replace(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, values) = unpack(args, "str.replace", 2, 3)?;
    let text = str_receiver(&receiver, "str.replace")?;
    let old = str_arg(&values[0], "replace")?;
    let new = str_arg(&values[1], "replace")?;
    let count = match values.get(2) {
        Some(count) => count
            .as_int()
            .ok_or_else(|| ExcType::type_error_integer_expected(&count.type_name()))?,
        None => -1,
    };
    let replaced = match usize::try_from(count) {
        Ok(count) => text.replacen(old, new, count),
        Err(_) => text.replace(old, new),
    };
    Ok(Value::from(replaced).into())
}

// --- iterators ---

/// `gen.__next__()`: resumes like `next(gen)`, delivering to the caller's target.
fn iterator_next(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "__next__", 0, 0)?;
    if let Value::Iterator(iter) = &receiver {
        return iter.next_value().map(NativeReturn::from).ok_or_else(ExcType::stop_iteration);
    }
    let target = vm.take_call_target()?;
    vm.for_next(receiver, target.0)?;
    Ok(NativeReturn::Pending)
}

fn iterator_iter(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let (receiver, _) = unpack(args, "__iter__", 0, 0)?;
    Ok(receiver.into())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn whitespace_split_honours_the_limit() {
        assert_eq!(split_whitespace("  a b\t c  ", None), vec!["a", "b", "c"]);
        assert_eq!(split_whitespace("a b  c ", Some(1)), vec!["a", "b  c "]);
        assert!(split_whitespace("   ", None).is_empty());
    }

    #[test]
    fn methods_are_found_by_receiver_type() {
        assert!(lookup(&Value::list(vec![]), "append").is_some());
        assert!(lookup(&Value::str("x"), "append").is_none());
        assert!(lookup(&Value::str("x"), "split").is_some());
        assert!(lookup(&Value::Int(1), "split").is_none());
    }
}
