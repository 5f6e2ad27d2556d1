//! Public interface for running and debugging compiled programs.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    args::CallArgs,
    bytecode::{Breakpoint, Completion, HostCallback, OnFinish, Position, Program, StackEntry, StepMode, Vm},
    exception_public::ExceptionInfo,
    io::{InputReader, PrintWriter},
    namespace::ScopeRef,
    resource::ResourceLimits,
    tracer::VmTracer,
    types::NativeFn,
    value::Value,
};

/// Misuse of the host API.
///
/// These are contract violations by the embedder, reported immediately rather
/// than raised inside the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A run is already active; start calls need an idle engine.
    Busy,
    /// A stepping or inspection command was issued with no active run.
    NotRunning,
    /// No compiled or native module has this name.
    UnknownModule(String),
    /// The module exists but has not been loaded by a run yet.
    ModuleNotLoaded(String),
    /// The module has no callable attribute of this name.
    UnknownFunction { module: String, function: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "the interpreter is already running"),
            Self::NotRunning => write!(f, "the interpreter is not running"),
            Self::UnknownModule(name) => write!(f, "no module named '{name}'"),
            Self::ModuleNotLoaded(name) => write!(f, "module '{name}' has not been loaded"),
            Self::UnknownFunction { module, function } => {
                write!(f, "module '{module}' has no function '{function}'")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Primary interface for running compiled programs.
///
/// An `Interpreter` owns one run context: loaded modules, the frame stack,
/// output and debug state. Execution is cooperative; nothing happens between
/// host calls.
///
/// - **Simple execution**: [`Interpreter::run_module`] starts a module and runs it to completion.
/// - **Driven execution**: [`Interpreter::start_call_module`] or [`Interpreter::start_call_function`]
///   start a call, then [`Interpreter::run`] or one of the stepping commands advances it.
///
/// # Example
/// ```
/// use pyrite::{
///     Interpreter, Program,
///     bytecode::{FunctionBuilder, FunctionType, ModuleBuilder},
/// };
///
/// let mut module = ModuleBuilder::new("main");
/// let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
/// body.set_row(0);
/// let text = body.load_str(&mut module, "hello");
/// body.call_name(&mut module, "print", &[text]);
/// module.add_function(body.finish());
/// let mut program = Program::new();
/// program.add_module(module.build());
///
/// let mut interpreter = Interpreter::new(program);
/// interpreter.run_module("main").unwrap();
/// assert_eq!(interpreter.output(), vec!["hello".to_owned()]);
/// ```
pub struct Interpreter {
    vm: Vm,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter").field("vm", &self.vm).finish()
    }
}

impl Interpreter {
    /// Creates an interpreter for `program` with default resource limits.
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self::with_limits(program, ResourceLimits::default())
    }

    #[must_use]
    pub fn with_limits(program: Program, limits: ResourceLimits) -> Self {
        Self {
            vm: Vm::new(program, limits),
        }
    }

    pub fn set_limits(&mut self, limits: ResourceLimits) {
        self.vm.set_limits(limits);
    }

    /// Sends every completed output line to `writer` as well as the output log.
    pub fn set_print_writer(&mut self, writer: impl PrintWriter + 'static) {
        self.vm.set_print_writer(Box::new(writer));
    }

    /// Supplies the lines `input()` reads.
    pub fn set_input_reader(&mut self, reader: impl InputReader + 'static) {
        self.vm.set_input_reader(Box::new(reader));
    }

    pub fn set_tracer(&mut self, tracer: impl VmTracer + 'static) {
        self.vm.set_tracer(Box::new(tracer));
    }

    /// Makes a module of host functions importable under `name`.
    pub fn register_native_module(&mut self, name: &str, functions: Vec<(&str, NativeFn)>) {
        self.vm.register_native_module(name, functions);
    }

    /// Starts running module `name` as the main module.
    ///
    /// `callback` receives the module value once the body finishes, or the
    /// exception that ended it. Nothing executes until the run is driven.
    ///
    /// # Errors
    /// [`EngineError::Busy`] while another run is active and
    /// [`EngineError::UnknownModule`] for a name no module carries.
    pub fn start_call_module(
        &mut self,
        name: &str,
        callback: impl FnOnce(Completion) + 'static,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        if !self.vm.has_module(name) {
            return Err(EngineError::UnknownModule(name.to_owned()));
        }
        let callback = host_callback(callback);
        self.vm.begin_run();
        if let Err(err) = self.vm.start_main_module(name, OnFinish::Host(callback.clone())) {
            self.vm.fail_host_start(err, &callback);
        }
        self.vm.settle();
        Ok(())
    }

    /// Starts calling `function` from the already loaded module `module`.
    ///
    /// # Errors
    /// [`EngineError::Busy`] while another run is active, and the lookup
    /// errors when the module or function cannot be found.
    pub fn start_call_function(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Value>,
        callback: impl FnOnce(Completion) + 'static,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let callee = self.find_function(module, function)?;
        let callback = host_callback(callback);
        self.vm.begin_run();
        if let Err(err) = self
            .vm
            .invoke(callee, CallArgs::from_values(args), OnFinish::Host(callback.clone()))
        {
            self.vm.fail_host_start(err, &callback);
        }
        self.vm.settle();
        Ok(())
    }

    /// Runs module `name` to completion.
    ///
    /// An unhandled exception does not make this fail; inspect it with
    /// [`Interpreter::unhandled_exception`]. Breakpoints still pause the run,
    /// in which case it is left paused.
    ///
    /// # Errors
    /// The start errors of [`Interpreter::start_call_module`].
    pub fn run_module(&mut self, name: &str) -> Result<(), EngineError> {
        self.start_call_module(name, |_| {})?;
        self.vm.drive(StepMode::Run);
        Ok(())
    }

    /// Calls `function` of a loaded module and runs it to completion.
    ///
    /// # Errors
    /// The start errors of [`Interpreter::start_call_function`], or
    /// [`EngineError::NotRunning`] if the call paused at a breakpoint before finishing.
    pub fn call_function(&mut self, module: &str, function: &str, args: Vec<Value>) -> Result<Completion, EngineError> {
        let outcome = Rc::new(RefCell::new(None));
        let slot = outcome.clone();
        self.start_call_function(module, function, args, move |completion| {
            *slot.borrow_mut() = Some(completion);
        })?;
        self.vm.drive(StepMode::Run);
        outcome.borrow_mut().take().ok_or(EngineError::NotRunning)
    }

    /// Runs until the run finishes, a breakpoint is hit or a pause is requested.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn run(&mut self) -> Result<(), EngineError> {
        self.step_with(StepMode::Run)
    }

    /// Executes exactly one instruction.
    ///
    /// Returns whether the run may continue.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        self.ensure_running()?;
        self.vm.execute_one();
        Ok(self.vm.is_running())
    }

    /// Runs to the next statement at any depth.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn debug(&mut self) -> Result<(), EngineError> {
        self.step_with(StepMode::Statement)
    }

    /// Runs to the next statement, entering calls.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn debug_in(&mut self) -> Result<(), EngineError> {
        self.step_with(StepMode::Into)
    }

    /// Runs to the next statement of this function or a caller.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn debug_over(&mut self) -> Result<(), EngineError> {
        self.step_with(StepMode::Over)
    }

    /// Runs until the current function has returned to its caller.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn debug_out(&mut self) -> Result<(), EngineError> {
        self.step_with(StepMode::Out)
    }

    /// Pauses at the next instruction boundary.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.vm.request_pause();
        Ok(())
    }

    /// Continues with the stepping command that ran last.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.vm.resume();
        Ok(())
    }

    /// Abandons the active run. Host callbacks receive [`Completion::Stopped`].
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.vm.stop();
        Ok(())
    }

    /// Makes the current function return `value` once its pending `finally` blocks ran.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] with no active run.
    pub fn force_return(&mut self, value: Value) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.vm.force_return(value);
        Ok(())
    }

    /// Replaces the breakpoint set. Breakpoints survive across runs.
    pub fn update_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        self.vm.set_breakpoints(breakpoints);
    }

    /// Where the next instruction of the active run is.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.vm.position()
    }

    /// The scope of the module most recently started with [`Interpreter::start_call_module`].
    #[must_use]
    pub fn global_scope(&self) -> Option<ScopeRef> {
        self.vm.main_scope().cloned()
    }

    /// The scope of the innermost active function.
    #[must_use]
    pub fn current_scope(&self) -> Option<ScopeRef> {
        self.vm.current_scope()
    }

    /// Active function frames, innermost first.
    #[must_use]
    pub fn stack_entries(&self) -> Vec<StackEntry> {
        self.vm.stack_entries()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.vm.is_running()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.vm.is_paused()
    }

    /// Completed output lines, oldest first.
    #[must_use]
    pub fn output(&self) -> Vec<String> {
        self.vm.output().lines()
    }

    /// All retained output joined with newlines, including an unterminated fragment.
    #[must_use]
    pub fn output_text(&self) -> String {
        self.vm.output().text()
    }

    /// The exception that ended the last run, if one did.
    #[must_use]
    pub fn unhandled_exception(&self) -> Option<ExceptionInfo> {
        self.vm.unhandled().map(ExceptionInfo::from_instance)
    }

    /// The module value of a module that finished loading.
    #[must_use]
    pub fn loaded_module(&self, name: &str) -> Option<Value> {
        self.vm.loaded_module(name).cloned()
    }

    fn step_with(&mut self, mode: StepMode) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.vm.drive(mode);
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.vm.is_running() {
            return Err(EngineError::Busy);
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if !self.vm.is_running() {
            return Err(EngineError::NotRunning);
        }
        Ok(())
    }

    fn find_function(&self, module: &str, function: &str) -> Result<Value, EngineError> {
        let Some(Value::Module(loaded)) = self.vm.loaded_module(module) else {
            if self.vm.has_module(module) {
                return Err(EngineError::ModuleNotLoaded(module.to_owned()));
            }
            return Err(EngineError::UnknownModule(module.to_owned()));
        };
        loaded
            .get_attr(function)
            .filter(Value::is_callable)
            .ok_or_else(|| EngineError::UnknownFunction {
                module: module.to_owned(),
                function: function.to_owned(),
            })
    }
}

fn host_callback(callback: impl FnOnce(Completion) + 'static) -> HostCallback {
    Rc::new(RefCell::new(Some(Box::new(callback))))
}
