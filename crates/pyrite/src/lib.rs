#![doc = include_str!("../../../README.md")]

mod args;
mod builtins;
pub mod bytecode;
mod exception_private;
mod exception_public;
pub mod io;
pub mod namespace;
mod reference;
mod resource;
mod run;
pub mod tracer;
pub mod types;
mod value;

pub use crate::{
    args::{CallArgs, PositionalArg},
    bytecode::{Breakpoint, CallTarget, Completion, Position, Program, StackEntry, StepMode, Vm},
    exception_private::{ErrorCode, ExcType, RunError, RunResult, SimpleException},
    exception_public::ExceptionInfo,
    io::{CallbackPrint, InputReader, NoInput, NoPrint, PrintWriter, QueuedInput, StdInput, StdPrint},
    namespace::{Qualifier, Scope, ScopeId, ScopeRef},
    resource::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_NESTED_CALLS, ResourceLimits},
    run::{EngineError, Interpreter},
    tracer::{LogTracer, NoopTracer, RecordingTracer, TraceEvent, VmTracer},
    types::{NativeFn, NativeReturn},
    value::{ObjectId, Value},
};
