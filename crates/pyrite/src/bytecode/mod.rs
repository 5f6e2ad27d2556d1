//! Bytecode representation and the virtual machine that executes it.
//!
//! # Module Structure
//!
//! - `op` - Opcode and operator enumerations
//! - `code` - Compiled modules, function bodies and instructions
//! - `builder` - Helpers for emitting instruction streams
//! - `vm` - The frame-arena virtual machine
//!
//! # Execution Model
//!
//! The VM is register based: each function frame owns a register file that
//! instructions read and write by index. Loops and `try` blocks push their own
//! frames above the function frame so that `break`, `continue`, `return` and
//! exceptions are all delivered by walking one linked chain of frames.
//! Generators detach a segment of that chain on `yield` and splice it back
//! onto whichever frame resumes them.

pub use builder::{FunctionBuilder, Label, ModuleBuilder, Operand};
pub(crate) use code::CodeRef;
pub use code::{
    ArgumentDecl, ArgumentKind, CompiledModule, FunctionBody, FunctionType, Instruction, Literal, NO_OPERAND, Program,
    SourceLocation,
};
pub use op::{BinaryOperator, CompareOperator, LoopKind, Opcode, UnaryOperator};
pub(crate) use vm::{HostCallback, OnFinish, sequence_index};
pub use vm::{Breakpoint, CallTarget, Completion, FrameId, Position, StackEntry, StepMode, Vm};

mod builder;
mod code;
mod op;
mod vm;
