//! Calls: argument binding, frame push and pop, class creation and result delivery.

use std::{mem, rc::Rc};

use super::{
    Completion, OnFinish, Vm, store_target,
    frame::{Frame, FrameId, FrameKind, FunctionFrame},
};
use crate::{
    args::{CallArgs, ParamSpec, bind_arguments, expand_spreads},
    bytecode::{CodeRef, FunctionType},
    exception_private::{ExcType, RunError, RunResult},
    exception_public::ExceptionInfo,
    namespace::{Scope, ScopeKind, ScopeRef},
    types::{
        Class, ExcRef, Function, Instance, Module, NativeFunction, NativeReturn, class::exception_roots,
    },
    value::Value,
};

impl Vm {
    /// Calls `callee`, sending its result to `target`.
    ///
    /// User functions push a frame and return immediately; the result is
    /// delivered when that frame completes. Natives run to completion here
    /// unless they take the target themselves.
    pub(crate) fn invoke(&mut self, callee: Value, mut args: CallArgs, target: OnFinish) -> RunResult<()> {
        match callee {
            Value::Function(function) => self.call_user_function(&function, args, target),
            Value::BoundMethod(method) => {
                args.prepend(method.receiver().clone());
                self.invoke(method.function().clone(), args, target)
            }
            Value::Native(native) => self.call_native(&native, args, target),
            Value::Class(class) => self.instantiate(&class, args, target),
            Value::Instance(instance) => match instance.lookup_class_attr("__call__") {
                Some(method) => {
                    args.prepend(Value::Instance(instance.clone()));
                    self.invoke(method, args, target)
                }
                None => Err(ExcType::type_error_not_callable(instance.class().name())),
            },
            other => Err(ExcType::type_error_not_callable(&other.type_name())),
        }
    }

    fn call_user_function(&mut self, function: &Rc<Function>, args: CallArgs, target: OnFinish) -> RunResult<()> {
        let bindings = bind_arguments(function.name(), function.params(), args, |value| self.spread_items(value))?;
        let scope = Scope::child(function.closure(), ScopeKind::Function, function.name());
        for (name, value) in bindings {
            scope.set_local(name, value);
        }
        self.push_function_frame(function.code().clone(), scope, function.name_rc().clone(), target)
    }

    fn call_native(&mut self, native: &Rc<NativeFunction>, mut args: CallArgs, target: OnFinish) -> RunResult<()> {
        expand_spreads(native.name(), &mut args, &mut |value: &Value| self.spread_items(value))?;
        let saved = self.call_target.replace(target);
        let result = (native.func())(self, args);
        let target = mem::replace(&mut self.call_target, saved);
        match (result?, target) {
            (NativeReturn::Value(value), Some(target)) => self.deliver(target, Ok(value)),
            (NativeReturn::Pending, None) => Ok(()),
            (NativeReturn::Value(_), None) => Err(RunError::internal(format!(
                "native '{}' returned a value after taking its call target",
                native.name()
            ))),
            (NativeReturn::Pending, Some(_)) => Err(RunError::internal(format!(
                "native '{}' is pending but kept no call target",
                native.name()
            ))),
        }
    }

    fn instantiate(&mut self, class: &Rc<Class>, mut args: CallArgs, target: OnFinish) -> RunResult<()> {
        if let Some(constructor) = class.constructor() {
            expand_spreads(class.name(), &mut args, &mut |value: &Value| self.spread_items(value))?;
            let value = constructor(self, class, args)?;
            return self.deliver(target, Ok(value));
        }
        let instance = self.new_instance(class)?;
        match class.lookup("__init__") {
            Some(init) => {
                args.prepend(instance.clone());
                let then = Box::new(target);
                self.invoke(init, args, OnFinish::Instantiate { instance, then })
            }
            None if args.is_empty() => self.deliver(target, Ok(instance)),
            None => Err(ExcType::type_error_no_init_args(class.name())),
        }
    }

    /// Allocates an instance of `class` without running `__init__`.
    pub(crate) fn new_instance(&self, class: &Rc<Class>) -> RunResult<Value> {
        let mro = class
            .mro()
            .ok_or_else(|| ExcType::type_error_mro_conflict(class.name()))?;
        if exception_roots(&mro) > 1 {
            return Err(ExcType::type_error_exception_roots(class.name()));
        }
        let instance = Rc::new(Instance::new(class.clone(), Rc::from(mro)));
        Ok(if instance.exc_type().is_some() {
            Value::Exception(instance)
        } else {
            Value::Instance(instance)
        })
    }

    /// Pushes a function frame above the current frame.
    ///
    /// # Arguments
    /// * `code` - The body to execute
    /// * `scope` - The activation's scope, already holding the bound parameters
    /// * `name` - Name reported by stack views and tracers
    /// * `target` - Where the result goes when the frame completes
    pub(crate) fn push_function_frame(
        &mut self,
        code: CodeRef,
        scope: ScopeRef,
        name: Rc<str>,
        target: OnFinish,
    ) -> RunResult<()> {
        let depth = match self.current_function() {
            Some(id) => self.frames.function(id)?.depth + 1,
            None => 1,
        };
        if depth > self.limits.max_call_depth {
            return Err(ExcType::recursion_error(self.limits.max_call_depth));
        }
        let frame = FunctionFrame::new(code, scope, name.clone(), target, depth);
        let id = self.frames.push(Frame {
            parent: self.current,
            kind: FrameKind::Function(Box::new(frame)),
        });
        self.current = Some(id);
        self.tracer.on_call(&name, depth);
        Ok(())
    }

    /// Pops function frame `id` and delivers its outcome.
    ///
    /// Module bodies register their module on success, generator bodies
    /// finish their generator and turn a return into `StopIteration`.
    pub(super) fn complete_function(&mut self, id: FrameId, result: Result<Value, ExcRef>) -> RunResult<()> {
        if self.current != Some(id) {
            return Err(RunError::internal("completed a frame that is not current"));
        }
        let frame = self
            .frames
            .remove(id)
            .ok_or_else(|| RunError::internal("completed a dead frame"))?;
        self.current = frame.parent;
        let FrameKind::Function(function) = frame.kind else {
            return Err(RunError::internal("completed a block frame as a function"));
        };
        let mut function = *function;
        self.tracer.on_return(function.depth.saturating_sub(1));

        let mut result = match (result, function.default_return.take()) {
            (Ok(Value::None), Some(forced)) => Ok(forced),
            (result, _) => result,
        };
        if function.kind() == FunctionType::Module {
            let name = function.module_name().to_owned();
            self.loading.remove(&name);
            if result.is_ok() {
                let module = Value::Module(Rc::new(Module::new(Rc::from(name.as_str()), function.scope.clone())));
                self.loaded.insert(name, module.clone());
                result = Ok(module);
            }
        }
        if let Some(generator) = function.generator.as_ref().and_then(std::rc::Weak::upgrade) {
            generator.finish();
            if result.is_ok() {
                result = Err(self.materialize(ExcType::stop_iteration()));
            }
        }
        let target = function.on_finish.unwrap_or(OnFinish::Discard);
        self.deliver(target, result)
    }

    /// Sends a finished computation's outcome to its target.
    ///
    /// An `Err` return means the exception keeps unwinding from the current frame.
    pub(crate) fn deliver(&mut self, target: OnFinish, result: Result<Value, ExcRef>) -> RunResult<()> {
        match target {
            OnFinish::Discard => result.map(drop).map_err(RunError::Raised),
            OnFinish::Store { frame, register } => {
                let value = result.map_err(RunError::Raised)?;
                self.store(frame, register, value)
            }
            OnFinish::Capture(slot) => {
                let cell = self
                    .captures
                    .get_mut(slot)
                    .ok_or_else(|| RunError::internal("nested call slot vanished"))?;
                *cell = Some(result);
                Ok(())
            }
            OnFinish::Instantiate { instance, then } => self.deliver(*then, result.map(|_| instance)),
            OnFinish::BuildClass {
                name,
                parents,
                scope,
                then,
            } => match result {
                Ok(_) => {
                    let class = build_class(name, parents, &scope)?;
                    self.deliver(*then, Ok(class))
                }
                Err(exc) => self.deliver(*then, Err(exc)),
            },
            OnFinish::Raise => match result {
                Ok(value) => self.exec_raise(value),
                Err(exc) => Err(RunError::Raised(exc)),
            },
            OnFinish::Host(callback) => {
                let completion = match &result {
                    Ok(value) => Completion::Returned(value.clone()),
                    Err(exc) => Completion::Raised(ExceptionInfo::from_instance(exc)),
                };
                let taken = callback.borrow_mut().take();
                if let Some(callback) = taken {
                    callback(completion);
                }
                result.map(drop).map_err(RunError::Raised)
            }
        }
    }

    /// `raise value`: raises instances directly and instantiates exception classes first.
    pub(super) fn exec_raise(&mut self, value: Value) -> RunResult<()> {
        match value {
            Value::Exception(exc) => Err(RunError::Raised(exc)),
            Value::Class(class)
                if class
                    .mro()
                    .is_some_and(|mro| mro.iter().any(|c| c.exception_type().is_some())) =>
            {
                self.invoke(Value::Class(class), CallArgs::new(), OnFinish::Raise)
            }
            other => Err(ExcType::type_error_not_an_exception(&other.type_name())),
        }
    }

    /// `MakeFunction`: closes a body over the defining scope.
    ///
    /// Functions defined in a class body close over the scope around the class,
    /// so methods do not see class attributes as bare names.
    pub(super) fn exec_make_function(&mut self, frame: FrameId, dest: u32, index: u32) -> RunResult<()> {
        let defining = self.frames.function(frame)?;
        let code = CodeRef::new(defining.code.module.clone(), index as usize)?;
        let body = code.body();
        let mut params = Vec::with_capacity(body.arguments.len());
        for decl in &body.arguments {
            let default = match decl.default_register {
                Some(register) => Some(defining.register(register)?),
                None => None,
            };
            params.push(ParamSpec {
                name: Rc::from(code.identifier(decl.identifier)?),
                kind: decl.kind,
                default,
            });
        }
        let scope = &defining.scope;
        let closure = match (scope.kind(), scope.parent()) {
            (ScopeKind::Class, Some(parent)) => parent.clone(),
            _ => scope.clone(),
        };
        let name: Rc<str> = Rc::from(body.name.as_str());
        let function = Function::new(name, code, closure, params);
        self.store(frame, dest, Value::Function(Rc::new(function)))
    }

    /// `MakeClass`: runs a class body; the class is built when the body completes.
    pub(super) fn exec_make_class(
        &mut self,
        frame: FrameId,
        dest: u32,
        body: u32,
        name: u32,
        first_parent: u32,
        count: u32,
    ) -> RunResult<()> {
        let name = self.identifier(frame, name)?;
        let parents = self
            .register_range(frame, first_parent, count)?
            .into_iter()
            .map(|value| match value {
                Value::Class(class) => Ok(class),
                other => Err(ExcType::type_error_not_a_class(&other.type_name())),
            })
            .collect::<RunResult<Vec<_>>>()?;
        let defining = self.frames.function(frame)?;
        let code = CodeRef::new(defining.code.module.clone(), body as usize)?;
        let scope = Scope::child(&defining.scope, ScopeKind::Class, &*name);
        let target = OnFinish::BuildClass {
            name: name.clone(),
            parents,
            scope: scope.clone(),
            then: Box::new(store_target(frame, dest)),
        };
        self.push_function_frame(code, scope, name, target)
    }

    /// The code and first argument of the running function, for zero-argument `super()`.
    pub(crate) fn super_context(&self) -> RunResult<(CodeRef, Value)> {
        let frame = self
            .current_function()
            .ok_or_else(ExcType::runtime_error_super)?;
        let function = self.frames.function(frame)?;
        let first = function
            .code
            .body()
            .arguments
            .first()
            .ok_or_else(ExcType::runtime_error_super)?;
        let name = function.code.identifier(first.identifier)?;
        let receiver = function
            .scope
            .get_local(name)
            .ok_or_else(ExcType::runtime_error_super)?;
        Ok((function.code.clone(), receiver))
    }

    /// Calls `callee` from native code and runs the VM until it finishes.
    ///
    /// Used by builtins that need user code, such as `sorted(key=...)` or a
    /// `__repr__` reached from `print`. Nesting is bounded by
    /// `max_nested_calls`.
    pub fn call_nested(&mut self, callee: Value, args: CallArgs) -> RunResult<Value> {
        self.run_nested(move |vm, target| vm.invoke(callee, args, target))
    }

    /// Starts a computation with a capture target and executes until it is filled.
    pub(crate) fn run_nested(&mut self, start: impl FnOnce(&mut Self, OnFinish) -> RunResult<()>) -> RunResult<Value> {
        if self.nested_depth >= self.limits.max_nested_calls {
            return Err(ExcType::nested_call_limit(self.limits.max_nested_calls));
        }
        let slot = self.captures.len();
        self.captures.push(None);
        self.nested_depth += 1;
        let continue_active = mem::replace(&mut self.continue_active, false);
        let base = self.current;
        let result = self.drive_nested(slot, base, start);
        self.continue_active = continue_active;
        self.nested_depth -= 1;
        self.captures.truncate(slot);
        result
    }

    fn drive_nested(
        &mut self,
        slot: usize,
        base: Option<FrameId>,
        start: impl FnOnce(&mut Self, OnFinish) -> RunResult<()>,
    ) -> RunResult<Value> {
        start(self, OnFinish::Capture(slot))?;
        loop {
            if let Some(outcome) = self.captures.get_mut(slot).and_then(Option::take) {
                return outcome.map_err(RunError::Raised);
            }
            if self.current == base || self.current.is_none() {
                return Err(RunError::internal("nested call finished without a result"));
            }
            self.execute_one();
        }
    }
}

/// Builds a class from a finished body, checking that its MRO is consistent.
fn build_class(name: Rc<str>, parents: Vec<Rc<Class>>, scope: &ScopeRef) -> RunResult<Value> {
    let class = Class::with_attrs(name, parents, scope.take_variables());
    let mro = class
        .mro()
        .ok_or_else(|| ExcType::type_error_mro_conflict(class.name()))?;
    if exception_roots(&mro) > 1 {
        return Err(ExcType::type_error_exception_roots(class.name()));
    }
    Ok(Value::Class(class))
}
