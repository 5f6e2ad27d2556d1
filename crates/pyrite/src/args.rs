//! Call arguments and the binding protocol.
//!
//! The dispatcher accumulates `PushArg`/`PushNamedArg` instructions into a
//! [`CallArgs`] and hands it to the callee. User functions bind it against
//! their [`ParamSpec`]s with [`bind_arguments`]; native functions receive it
//! directly and use the arity helpers below.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    bytecode::ArgumentKind,
    exception_private::{ExcType, RunResult},
    types::Dict,
    value::Value,
};

/// A positional argument, optionally marked as a `*spread`.
#[derive(Debug, Clone)]
pub struct PositionalArg {
    pub value: Value,
    pub expand: bool,
}

impl PositionalArg {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, expand: false }
    }

    #[must_use]
    pub fn spread(value: Value) -> Self {
        Self { value, expand: true }
    }
}

/// The raw arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: SmallVec<[PositionalArg; 4]>,
    pub named: Vec<(Rc<str>, Value)>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain positional arguments, no spreads and no names.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().map(PositionalArg::new).collect(),
            named: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_named(mut self, name: &str, value: Value) -> Self {
        self.named.push((Rc::from(name), value));
        self
    }

    /// Prepends a receiver, as bound-method calls do.
    pub fn prepend(&mut self, receiver: Value) {
        self.positional.insert(0, PositionalArg::new(receiver));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Removes and returns the named argument `name`, if supplied.
    pub fn take_named(&mut self, name: &str) -> Option<Value> {
        let index = self.named.iter().position(|(key, _)| &**key == name)?;
        Some(self.named.remove(index).1)
    }

    /// Fails if any named arguments remain.
    pub fn check_no_named(&self, func: &str) -> RunResult<()> {
        if self.named.is_empty() {
            Ok(())
        } else {
            Err(ExcType::type_error_no_kwargs(func))
        }
    }

    /// Positional values, rejecting named arguments.
    pub fn into_positional(self, func: &str) -> RunResult<Vec<Value>> {
        self.check_no_named(func)?;
        Ok(self.positional.into_iter().map(|arg| arg.value).collect())
    }

    /// Checks that zero arguments were passed.
    pub fn check_zero_args(self, func: &str) -> RunResult<()> {
        let count = self.count();
        if count == 0 {
            Ok(())
        } else {
            Err(ExcType::type_error_arg_count(func, "no", count))
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub fn get_one_arg(self, func: &str) -> RunResult<Value> {
        let count = self.count();
        let mut values = self.into_positional(func)?;
        match values.pop() {
            Some(value) if values.is_empty() => Ok(value),
            _ => Err(ExcType::type_error_arg_count(func, "exactly one", count)),
        }
    }

    /// Checks that exactly two positional arguments were passed, returning them.
    pub fn get_two_args(self, func: &str) -> RunResult<(Value, Value)> {
        let count = self.count();
        let values = self.into_positional(func)?;
        match <[Value; 2]>::try_from(values) {
            Ok([first, second]) => Ok((first, second)),
            Err(_) => Err(ExcType::type_error_arg_count(func, "exactly two", count)),
        }
    }

    /// Accepts one required and one optional positional argument.
    pub fn get_one_two_args(self, func: &str) -> RunResult<(Value, Option<Value>)> {
        let count = self.count();
        let mut values = self.into_positional(func)?.into_iter();
        match (values.next(), values.next(), values.next()) {
            (Some(first), second, None) => Ok((first, second)),
            _ => Err(ExcType::type_error_arg_count(func, "one or two", count)),
        }
    }

    /// Accepts at most one positional argument.
    pub fn get_zero_one_arg(self, func: &str) -> RunResult<Option<Value>> {
        let count = self.count();
        let mut values = self.into_positional(func)?.into_iter();
        match (values.next(), values.next()) {
            (first, None) => Ok(first),
            _ => Err(ExcType::type_error_arg_count(func, "at most one", count)),
        }
    }
}

/// A declared parameter of a user function, resolved at function creation.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: Rc<str>,
    pub kind: ArgumentKind,
    /// Default value captured when the function was created.
    pub default: Option<Value>,
}

/// Binds call arguments to declared parameters.
///
/// Binding runs in four steps:
/// 1. every `*spread` positional is materialized in place (one site per pass)
/// 2. positionals fill parameters left to right; `*args` absorbs the rest
/// 3. named arguments match parameter names or land in `**kwargs`
/// 4. unbound parameters take their captured default or fail
///
/// # Arguments
/// * `func` - Function name used in error messages
/// * `params` - Declared parameters in order
/// * `args` - The call's raw arguments
/// * `materialize` - Turns a spread value into its items, or `None` if it is not iterable
///
/// Returns `(name, value)` bindings in parameter order.
pub(crate) fn bind_arguments(
    func: &str,
    params: &[ParamSpec],
    mut args: CallArgs,
    mut materialize: impl FnMut(&Value) -> RunResult<Option<Vec<Value>>>,
) -> RunResult<Vec<(Rc<str>, Value)>> {
    expand_spreads(func, &mut args, &mut materialize)?;

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    let given = args.positional.len();
    let mut positional = args.positional.into_iter().map(|arg| arg.value);
    let mut accepts = 0;
    let mut has_varargs = false;
    for (slot, param) in slots.iter_mut().zip(params) {
        match param.kind {
            // positional parameters after `*args` are keyword-only
            ArgumentKind::Positional if !has_varargs => {
                accepts += 1;
                *slot = positional.next();
            }
            ArgumentKind::Positional | ArgumentKind::KeywordArguments => {}
            ArgumentKind::ArbitraryArguments => {
                has_varargs = true;
                *slot = Some(Value::tuple(positional.by_ref().collect()));
            }
        }
    }
    if positional.next().is_some() {
        return Err(ExcType::type_error_too_many_positional(func, accepts, given));
    }

    let collector = params
        .iter()
        .position(|param| param.kind == ArgumentKind::KeywordArguments);
    let extra = Dict::new();
    for (name, value) in args.named {
        let matched = params
            .iter()
            .position(|param| param.kind == ArgumentKind::Positional && param.name == name);
        match (matched, collector) {
            (Some(index), _) => {
                if slots[index].is_some() {
                    return Err(ExcType::type_error_duplicate_arg(func, &name));
                }
                slots[index] = Some(value);
            }
            (None, Some(_)) => {
                if extra.get_str(&name).is_some() {
                    return Err(ExcType::type_error_duplicate_arg(func, &name));
                }
                extra.insert_str(name, value);
            }
            (None, None) => return Err(ExcType::type_error_unexpected_keyword(func, &name)),
        }
    }
    if let Some(index) = collector {
        slots[index] = Some(Value::Dict(Rc::new(extra)));
    }

    params
        .iter()
        .zip(slots)
        .map(|(param, slot)| match slot.or_else(|| param.default.clone()) {
            Some(value) => Ok((param.name.clone(), value)),
            None => Err(ExcType::type_error_missing_arg(func, &param.name)),
        })
        .collect()
}

/// Replaces every `*spread` positional with the items it yields.
///
/// Natives get this step too; only the remaining binding steps are skipped for them.
pub(crate) fn expand_spreads(
    func: &str,
    args: &mut CallArgs,
    materialize: &mut impl FnMut(&Value) -> RunResult<Option<Vec<Value>>>,
) -> RunResult<()> {
    while let Some(index) = args.positional.iter().position(|arg| arg.expand) {
        let spread = args.positional.remove(index);
        let Some(items) = materialize(&spread.value)? else {
            return Err(ExcType::type_error_expand_not_iterable(func, &spread.value.type_name()));
        };
        args.positional
            .insert_many(index, items.into_iter().map(PositionalArg::new));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::exception_private::RunError;

    fn param(name: &str, kind: ArgumentKind, default: Option<Value>) -> ParamSpec {
        ParamSpec {
            name: Rc::from(name),
            kind,
            default,
        }
    }

    /// `f(a, b=1, *args, **kwargs)`
    fn full_signature() -> Vec<ParamSpec> {
        vec![
            param("a", ArgumentKind::Positional, None),
            param("b", ArgumentKind::Positional, Some(Value::Int(1))),
            param("args", ArgumentKind::ArbitraryArguments, None),
            param("kwargs", ArgumentKind::KeywordArguments, None),
        ]
    }

    fn no_spreads(_: &Value) -> RunResult<Option<Vec<Value>>> {
        Ok(None)
    }

    fn bind(params: &[ParamSpec], args: CallArgs) -> RunResult<Vec<(Rc<str>, Value)>> {
        bind_arguments("f", params, args, no_spreads)
    }

    fn message(err: &RunError) -> String {
        match err {
            RunError::Exc(exc) => exc.message(),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn positional_named_and_collector() {
        let args = CallArgs::from_values([Value::Int(10)])
            .with_named("b", Value::Int(20))
            .with_named("extra", Value::Int(30));
        let bound = bind(&full_signature(), args).unwrap();
        assert_eq!(bound[0], (Rc::<str>::from("a"), Value::Int(10)));
        assert_eq!(bound[1], (Rc::<str>::from("b"), Value::Int(20)));
        assert_eq!(bound[2], (Rc::<str>::from("args"), Value::tuple(vec![])));
        let Value::Dict(kwargs) = &bound[3].1 else { panic!("kwargs is not a dict") };
        assert_eq!(kwargs.items(), vec![(Value::str("extra"), Value::Int(30))]);
    }

    #[test]
    fn duplicate_positional_and_named() {
        let args = CallArgs::from_values([Value::Int(1), Value::Int(2)]).with_named("b", Value::Int(3));
        let err = bind(&full_signature(), args).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
        assert_eq!(message(&err), "f() got multiple values for argument 'b'");
    }

    #[test]
    fn varargs_absorbs_rest_and_defaults_fill() {
        let bound = bind(&full_signature(), CallArgs::from_values([1, 2, 3, 4].map(Value::Int))).unwrap();
        assert_eq!(bound[1].1, Value::Int(2));
        assert_eq!(bound[2].1, Value::tuple(vec![Value::Int(3), Value::Int(4)]));

        let bound = bind(&full_signature(), CallArgs::from_values([Value::Int(1)])).unwrap();
        assert_eq!(bound[1].1, Value::Int(1));
    }

    #[test]
    fn arity_errors() {
        let params = vec![param("a", ArgumentKind::Positional, None)];
        let err = bind(&params, CallArgs::from_values([Value::Int(1), Value::Int(2)])).unwrap_err();
        assert_eq!(message(&err), "f() takes 1 positional arguments but 2 were given");

        let err = bind(&params, CallArgs::new()).unwrap_err();
        assert_eq!(message(&err), "f() missing required argument: 'a'");

        let err = bind(&params, CallArgs::new().with_named("z", Value::None)).unwrap_err();
        assert_eq!(message(&err), "f() got an unexpected keyword argument 'z'");
    }

    #[test]
    fn keyword_only_after_varargs() {
        let params = vec![
            param("args", ArgumentKind::ArbitraryArguments, None),
            param("sep", ArgumentKind::Positional, Some(Value::str(" "))),
        ];
        let bound = bind(&params, CallArgs::from_values([Value::Int(1), Value::Int(2)])).unwrap();
        assert_eq!(bound[0].1, Value::tuple(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(bound[1].1, Value::str(" "));
    }

    #[test]
    fn spreads_are_expanded_in_place() {
        let params = vec![
            param("a", ArgumentKind::Positional, None),
            param("b", ArgumentKind::Positional, None),
            param("c", ArgumentKind::Positional, None),
        ];
        let mut args = CallArgs::from_values([Value::Int(1)]);
        args.positional.push(PositionalArg::spread(Value::list(vec![Value::Int(2), Value::Int(3)])));
        let bound = bind_arguments("f", &params, args, |value| match value {
            Value::List(list) => Ok(Some(list.snapshot())),
            _ => Ok(None),
        })
        .unwrap();
        let values: Vec<Value> = bound.into_iter().map(|(_, value)| value).collect();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let mut args = CallArgs::new();
        args.positional.push(PositionalArg::spread(Value::Int(5)));
        let err = bind(&params, args).unwrap_err();
        assert_eq!(message(&err), "f() argument after * must be an iterable, not int");
    }
}
