//! Register virtual machine for executing compiled modules.
//!
//! The VM keeps every frame in an arena ([`frame::Frames`]) and tracks the
//! innermost active frame in `current`. Function frames own the instruction
//! cursor and register file; loop and try frames sit above their function
//! frame and only carry the bookkeeping control transfer needs.
//!
//! Operation handlers are split by concern:
//!
//! - `call` - invocation, binding, class creation and completion targets
//! - `control` - continue contexts, loops and try/except/finally
//! - `generator` - yield and resume by frame splicing
//! - `attr` - attributes and references
//! - `binary`, `compare` - operators and dunder dispatch
//! - `collections` - iteration, indexing and slicing
//! - `exceptions` - materializing errors and finishing runs
//! - `import` - module loading
//! - `debug` - stepping, breakpoints and stack inspection

mod attr;
mod binary;
mod call;
mod collections;
mod compare;
mod control;
mod debug;
mod exceptions;
mod frame;
mod generator;
mod import;

use std::{cell::RefCell, fmt, mem, rc::Rc};

use ahash::{AHashMap, AHashSet};
pub(crate) use collections::sequence_index;
pub(crate) use control::ContinueContext;
pub use debug::{Breakpoint, Position, StackEntry, StepMode};
use debug::DebugState;
pub use frame::FrameId;
use frame::{Frame, FrameKind, Frames, LoopFrame, TryFrame};
use indexmap::IndexMap;

use crate::{
    args::{CallArgs, PositionalArg},
    bytecode::{
        BinaryOperator, CompareOperator, CompiledModule, Instruction, LoopKind, NO_OPERAND, Opcode, Program,
        UnaryOperator,
    },
    exception_private::{ExcType, RunError, RunResult},
    exception_public::ExceptionInfo,
    io::{InputReader, NoInput, NoPrint, OutputBuffer, PrintWriter},
    namespace::{Qualifier, ScopeRef},
    reference::Reference,
    resource::ResourceLimits,
    tracer::{NoopTracer, VmTracer},
    types::{Class, Dict, ExcRef, Set},
    value::Value,
};

/// How a call started by the host ended.
#[derive(Debug, Clone)]
pub enum Completion {
    Returned(Value),
    Raised(ExceptionInfo),
    /// The run was stopped before the call finished.
    Stopped,
}

/// Host completion callback, shared so a failed start can still report through it.
pub(crate) type HostCallback = Rc<RefCell<Option<Box<dyn FnOnce(Completion)>>>>;

/// Where the result of a finished call goes.
///
/// Every function frame carries one; natives receive theirs through
/// [`Vm::take_call_target`] when they finish asynchronously.
pub(crate) enum OnFinish {
    /// Drop the value; exceptions keep unwinding.
    Discard,
    /// Write the value to a register of a function frame.
    Store { frame: FrameId, register: u32 },
    /// Record the outcome for a nested call driven by native code. Exceptions are absorbed.
    Capture(usize),
    /// `__init__` finished; produce the instance instead of its return value.
    Instantiate { instance: Value, then: Box<OnFinish> },
    /// A class body finished; build the class from its scope.
    BuildClass {
        name: Rc<str>,
        parents: Vec<Rc<Class>>,
        scope: ScopeRef,
        then: Box<OnFinish>,
    },
    /// Raise the produced value, used by `raise SomeClass`.
    Raise,
    /// Report to the host.
    Host(HostCallback),
}

impl fmt::Debug for OnFinish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "Discard"),
            Self::Store { frame, register } => write!(f, "Store({}, r{register})", frame.index()),
            Self::Capture(slot) => write!(f, "Capture({slot})"),
            Self::Instantiate { then, .. } => write!(f, "Instantiate -> {then:?}"),
            Self::BuildClass { name, then, .. } => write!(f, "BuildClass({name}) -> {then:?}"),
            Self::Raise => write!(f, "Raise"),
            Self::Host(_) => write!(f, "Host"),
        }
    }
}

/// Completion target of a native call, taken with [`Vm::take_call_target`].
#[derive(Debug)]
pub struct CallTarget(pub(crate) OnFinish);

/// Result of an operation that may need to call user code.
///
/// Opcode handlers hand `Call` to the frame machinery so the callee runs as
/// ordinary frames; native code resolves it with a nested call.
pub(crate) enum Dispatch {
    Value(Value),
    Call(Value, CallArgs),
}

/// The virtual machine: frame arena, loaded modules and run state.
pub struct Vm {
    modules: IndexMap<String, Rc<CompiledModule>>,
    native_modules: AHashMap<String, Value>,
    /// Finished modules by name.
    loaded: AHashMap<String, Value>,
    /// Modules whose body is still running.
    loading: AHashSet<String>,
    global: ScopeRef,
    frames: Frames,
    current: Option<FrameId>,
    limits: ResourceLimits,
    instructions: u64,
    continue_active: bool,
    /// Completion target of the native currently executing.
    call_target: Option<OnFinish>,
    /// Outcomes of nested calls, innermost last.
    captures: Vec<Option<Result<Value, ExcRef>>>,
    nested_depth: usize,
    running: bool,
    unhandled: Option<ExcRef>,
    /// Scope of the module most recently started by the host.
    main_scope: Option<ScopeRef>,
    output: OutputBuffer,
    input: Box<dyn InputReader>,
    tracer: Box<dyn VmTracer>,
    debug: DebugState,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("frames", &self.frames.len())
            .field("current", &self.current)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Vm {
    pub(crate) fn new(program: Program, limits: ResourceLimits) -> Self {
        let modules = program
            .modules
            .into_iter()
            .map(|(name, module)| (name, Rc::new(module)))
            .collect();
        Self {
            modules,
            native_modules: AHashMap::new(),
            loaded: AHashMap::new(),
            loading: AHashSet::new(),
            global: crate::namespace::Scope::global(),
            frames: Frames::default(),
            current: None,
            output: OutputBuffer::new(Box::new(NoPrint), limits.output_log_limit),
            limits,
            instructions: 0,
            continue_active: false,
            call_target: None,
            captures: Vec::new(),
            nested_depth: 0,
            running: false,
            unhandled: None,
            main_scope: None,
            input: Box::new(NoInput),
            tracer: Box::new(NoopTracer),
            debug: DebugState::default(),
        }
    }

    pub(crate) fn set_limits(&mut self, limits: ResourceLimits) {
        self.output.set_limit(limits.output_log_limit);
        self.limits = limits;
    }

    pub(crate) fn set_print_writer(&mut self, writer: Box<dyn PrintWriter>) {
        self.output.set_writer(writer);
    }

    pub(crate) fn set_input_reader(&mut self, reader: Box<dyn InputReader>) {
        self.input = reader;
    }

    pub(crate) fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = tracer;
    }

    /// The process-wide root scope holding builtins.
    #[must_use]
    pub fn global(&self) -> &ScopeRef {
        &self.global
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running && self.current.is_some()
    }

    pub(crate) fn unhandled(&self) -> Option<&ExcRef> {
        self.unhandled.as_ref()
    }

    pub(crate) fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub(crate) fn main_scope(&self) -> Option<&ScopeRef> {
        self.main_scope.as_ref()
    }

    pub(crate) fn loaded_module(&self, name: &str) -> Option<&Value> {
        self.loaded.get(name)
    }

    /// Whether `name` is a compiled or registered native module.
    pub(crate) fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name) || self.native_modules.contains_key(name)
    }

    /// Marks the start of a host-initiated run.
    pub(crate) fn begin_run(&mut self) {
        self.running = true;
        self.unhandled = None;
        self.instructions = 0;
        self.debug.reset();
    }

    /// Appends program output; newlines complete lines.
    pub fn write_output(&mut self, text: &str) {
        self.output.write(text);
    }

    /// Reads a line for `input()`, writing the prompt first.
    pub fn read_input(&mut self, prompt: &str) -> RunResult<String> {
        if !prompt.is_empty() {
            self.output.write(prompt);
        }
        self.input.read_line(prompt).ok_or_else(ExcType::eof_error)
    }

    /// Takes the completion target of the running native call.
    ///
    /// A native that does this must return [`crate::types::NativeReturn::Pending`]
    /// and arrange for the target to receive the result, e.g. with
    /// [`Vm::call_with_target`].
    pub fn take_call_target(&mut self) -> RunResult<CallTarget> {
        self.call_target
            .take()
            .map(CallTarget)
            .ok_or_else(|| RunError::internal("call target already taken"))
    }

    /// Calls `callee` and delivers its result to `target` when it finishes.
    pub fn call_with_target(&mut self, callee: Value, args: CallArgs, target: CallTarget) -> RunResult<()> {
        self.invoke(callee, args, target.0)
    }

    /// Executes the instruction under the cursor of the current frame.
    pub(crate) fn execute_one(&mut self) {
        if let Err(err) = self.try_execute_one() {
            self.raise(err);
        }
        self.settle();
    }

    fn try_execute_one(&mut self) -> RunResult<()> {
        let current = self
            .current
            .ok_or_else(|| RunError::internal("no frame to execute"))?;
        let frame_id = self.frames.function_entry(current)?;
        let frame = self.frames.function_mut(frame_id)?;
        let Some(instruction) = frame.next_instruction().copied() else {
            return self.run_continue_context(ContinueContext::Exit {
                target: frame_id,
                value: Value::None,
            });
        };
        let index = frame.cursor;
        frame.cursor += 1;
        if let Some(row) = instruction.row() {
            frame.last_row = Some(row);
        }
        let name = frame.name.clone();
        self.count_instruction()?;
        self.tracer
            .on_instruction(&name, index, instruction.opcode, instruction.row());
        self.dispatch(frame_id, &instruction)
    }

    fn count_instruction(&mut self) -> RunResult<()> {
        self.instructions += 1;
        match self.limits.max_instructions {
            Some(limit) if self.instructions > limit => Err(ExcType::timeout_error(limit)),
            _ => Ok(()),
        }
    }

    fn dispatch(&mut self, frame: FrameId, instruction: &Instruction) -> RunResult<()> {
        let [a, b, c, d, e, _] = instruction.operands;
        match instruction.opcode {
            Opcode::Nop => Ok(()),
            Opcode::LoadLiteral => {
                let value = self.frames.function(frame)?.code.literal(b)?;
                self.store(frame, a, value)
            }
            Opcode::LoadName => {
                let name = self.identifier(frame, b)?;
                let qualifier = Qualifier::from_operand(c)?;
                let value = self.scope_of(frame)?.load(&name, qualifier)?;
                self.store(frame, a, value)
            }
            Opcode::Move => {
                let value = self.register(frame, b)?;
                self.store(frame, a, value)
            }
            Opcode::RefVariable => {
                let reference = Reference::Variable {
                    name: self.identifier(frame, b)?,
                    qualifier: Qualifier::from_operand(c)?,
                    scope: self.scope_of(frame)?,
                };
                self.store(frame, a, Value::Reference(Rc::new(reference)))
            }
            Opcode::RefProperty => {
                let reference = Reference::property(self.register(frame, b)?, &self.register(frame, c)?)?;
                self.store(frame, a, Value::Reference(Rc::new(reference)))
            }
            Opcode::RefIndex => {
                let reference = Reference::Index {
                    parent: self.register(frame, b)?,
                    key: self.register(frame, c)?,
                };
                self.store(frame, a, Value::Reference(Rc::new(reference)))
            }
            Opcode::RefRange => {
                let function = self.frames.function(frame)?;
                let reference = Reference::Range {
                    parent: function.register(b)?,
                    from: function.optional_register(c)?,
                    to: function.optional_register(d)?,
                    step: function.optional_register(e)?,
                };
                self.store(frame, a, Value::Reference(Rc::new(reference)))
            }
            Opcode::Assign => {
                let reference = self.reference(frame, a)?;
                let value = self.register(frame, b)?;
                let outcome = self.assign_reference(&reference, value)?;
                self.finish_dispatch(outcome, OnFinish::Discard)
            }
            Opcode::Delete => {
                let reference = self.reference(frame, a)?;
                let outcome = self.delete_reference(&reference)?;
                self.finish_dispatch(outcome, OnFinish::Discard)
            }
            Opcode::Deref => {
                let reference = self.reference(frame, b)?;
                let outcome = self.deref_reference(&reference)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::GetAttr => {
                let object = self.register(frame, b)?;
                let name = self.identifier(frame, c)?;
                let value = self.get_attr(&object, &name)?;
                self.store(frame, a, value)
            }
            Opcode::GetItem => {
                let object = self.register(frame, b)?;
                let key = self.register(frame, c)?;
                let outcome = self.get_item(&object, &key)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::BinaryOp => {
                let op = BinaryOperator::from_operand(d)?;
                let outcome = self.binary_op(op, &self.register(frame, b)?, &self.register(frame, c)?)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::UnaryOp => {
                let op = UnaryOperator::from_operand(c)?;
                let outcome = self.unary_op(op, &self.register(frame, b)?)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::Compare => {
                let op = CompareOperator::from_operand(d)?;
                let outcome = self.compare_op(op, &self.register(frame, b)?, &self.register(frame, c)?)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::BuildList => {
                let items = self.register_range(frame, b, c)?;
                self.store(frame, a, Value::list(items))
            }
            Opcode::BuildTuple => {
                let items = self.register_range(frame, b, c)?;
                self.store(frame, a, Value::tuple(items))
            }
            Opcode::BuildSet => {
                let items = self.register_range(frame, b, c)?;
                self.store(frame, a, Value::Set(Rc::new(Set::from_values(items)?)))
            }
            Opcode::BuildDict => {
                let items = self.register_range(frame, b, c.saturating_mul(2))?;
                let mut items = items.into_iter();
                let pairs = std::iter::from_fn(|| Some((items.next()?, items.next()?)));
                self.store(frame, a, Value::Dict(Rc::new(Dict::from_pairs(pairs)?)))
            }
            Opcode::Unpack => {
                let source = self.register(frame, a)?;
                let items = self.collect_iterable(&source)?;
                if items.len() != c as usize {
                    return Err(ExcType::value_error_unpack(c as usize, items.len()));
                }
                for (offset, item) in (0..c).zip(items) {
                    self.store(frame, b + offset, item)?;
                }
                Ok(())
            }
            Opcode::Jump => self.frames.function_mut(frame)?.jump(a),
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let condition = self.register(frame, a)?;
                if self.truthy(&condition)? == (instruction.opcode == Opcode::JumpIfTrue) {
                    self.frames.function_mut(frame)?.jump(b)
                } else {
                    Ok(())
                }
            }
            Opcode::MakeFunction => self.exec_make_function(frame, a, b),
            Opcode::MakeClass => self.exec_make_class(frame, a, b, c, d, e),
            Opcode::PushArg => {
                let value = self.register(frame, a)?;
                let arg = PositionalArg { value, expand: b == 1 };
                self.frames.function_mut(frame)?.args.positional.push(arg);
                Ok(())
            }
            Opcode::PushNamedArg => {
                let name = self.identifier(frame, a)?;
                let value = self.register(frame, b)?;
                self.frames.function_mut(frame)?.args.named.push((name, value));
                Ok(())
            }
            Opcode::PushNamedArgs => {
                let mapping = self.register(frame, a)?;
                let Value::Dict(dict) = &mapping else {
                    return Err(ExcType::type_error_kwargs_not_mapping(&mapping.type_name()));
                };
                let mut named = Vec::with_capacity(dict.len());
                for (key, value) in dict.items() {
                    match key {
                        Value::Str(name) => named.push((name, value)),
                        _ => return Err(ExcType::type_error_kwargs_not_mapping(&mapping.type_name())),
                    }
                }
                self.frames.function_mut(frame)?.args.named.extend(named);
                Ok(())
            }
            Opcode::Call => {
                let callee = self.register(frame, b)?;
                let args = mem::take(&mut self.frames.function_mut(frame)?.args);
                self.invoke(callee, args, store_target(frame, a))
            }
            Opcode::Return => {
                let value = self.frames.function(frame)?.optional_register(a)?.unwrap_or(Value::None);
                self.run_continue_context(ContinueContext::Exit { target: frame, value })
            }
            Opcode::Yield => {
                let value = self.frames.function(frame)?.optional_register(b)?.unwrap_or(Value::None);
                self.exec_yield(frame, a, value)
            }
            Opcode::Import => {
                let name = self.identifier(frame, b)?;
                self.import_module(&name, store_target(frame, a))
            }
            Opcode::ImportFrom => {
                let module = self.register(frame, b)?;
                let name = self.identifier(frame, c)?;
                let value = self.import_from(&module, &name)?;
                self.store(frame, a, value)
            }
            Opcode::LoopBegin => {
                let kind = LoopKind::from_operand(a)?;
                let start = self.frames.function(frame)?.cursor;
                let frame = LoopFrame {
                    kind,
                    start,
                    end: b,
                    no_break: (c != NO_OPERAND).then_some(c),
                };
                self.push_block(FrameKind::Loop(frame));
                Ok(())
            }
            Opcode::LoopEnd => {
                let id = self.current.ok_or_else(|| RunError::internal("loop end without a frame"))?;
                match self.frames.frame(id)?.kind {
                    FrameKind::Loop(_) => self.pop_block(id),
                    _ => Err(RunError::internal("end-of-cycle marker without a loop frame")),
                }
            }
            Opcode::GetIter => {
                let source = self.register(frame, b)?;
                let outcome = self.get_iter(&source)?;
                self.finish_dispatch(outcome, store_target(frame, a))
            }
            Opcode::ForNext => {
                let iterator = self.register(frame, b)?;
                self.for_next(iterator, store_target(frame, a))
            }
            Opcode::Break => self.exec_cycle(control::Cycle::Break),
            Opcode::Continue => self.exec_cycle(control::Cycle::Continue),
            Opcode::TryBegin => {
                if a == NO_OPERAND || b == NO_OPERAND || a > b || d == NO_OPERAND {
                    return Err(RunError::internal("malformed try block operands"));
                }
                let finally = (c != NO_OPERAND).then_some(c);
                let frame = TryFrame::new(a as usize..b as usize, finally, d);
                self.push_block(FrameKind::Try(Box::new(frame)));
                Ok(())
            }
            Opcode::TryEnd => self.exec_try_end(),
            Opcode::ExceptHandler => Err(RunError::internal("handler table entry executed")),
            Opcode::ExceptEnd => self.exec_except_end(),
            Opcode::FinallyEnd => self.exec_finally_end(),
            Opcode::Raise => {
                if a == NO_OPERAND {
                    Err(RunError::Raised(self.active_exception()?))
                } else {
                    let value = self.register(frame, a)?;
                    self.exec_raise(value)
                }
            }
        }
    }

    /// Sends an operation's outcome to `target`, calling user code if needed.
    fn finish_dispatch(&mut self, outcome: Dispatch, target: OnFinish) -> RunResult<()> {
        match outcome {
            Dispatch::Value(value) => self.deliver(target, Ok(value)),
            Dispatch::Call(callee, args) => self.invoke(callee, args, target),
        }
    }

    /// Resolves an outcome synchronously, running any call as a nested call.
    pub(crate) fn resolve(&mut self, outcome: Dispatch) -> RunResult<Value> {
        match outcome {
            Dispatch::Value(value) => Ok(value),
            Dispatch::Call(callee, args) => self.call_nested(callee, args),
        }
    }

    fn push_block(&mut self, kind: FrameKind) {
        let id = self.frames.push(Frame {
            parent: self.current,
            kind,
        });
        self.current = Some(id);
    }

    fn register(&self, frame: FrameId, index: u32) -> RunResult<Value> {
        self.frames.function(frame)?.register(index)
    }

    fn register_range(&self, frame: FrameId, first: u32, count: u32) -> RunResult<Vec<Value>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let function = self.frames.function(frame)?;
        (first..first.saturating_add(count))
            .map(|index| function.register(index))
            .collect()
    }

    fn store(&mut self, frame: FrameId, index: u32, value: Value) -> RunResult<()> {
        self.frames.function_mut(frame)?.set_register(index, value)
    }

    fn identifier(&self, frame: FrameId, index: u32) -> RunResult<Rc<str>> {
        self.frames.function(frame)?.code.identifier(index).map(Rc::from)
    }

    fn scope_of(&self, frame: FrameId) -> RunResult<ScopeRef> {
        Ok(self.frames.function(frame)?.scope.clone())
    }

    fn reference(&self, frame: FrameId, index: u32) -> RunResult<Rc<Reference>> {
        match self.register(frame, index)? {
            Value::Reference(reference) => Ok(reference),
            other => Err(RunError::internal(format!(
                "expected a reference, found {}",
                other.type_name()
            ))),
        }
    }

    /// The function frame owning the current frame, if any.
    pub(crate) fn current_function(&self) -> Option<FrameId> {
        self.current.and_then(|id| self.frames.function_entry(id).ok())
    }
}

fn store_target(frame: FrameId, register: u32) -> OnFinish {
    if register == NO_OPERAND {
        OnFinish::Discard
    } else {
        OnFinish::Store { frame, register }
    }
}
