//! VM execution tracing infrastructure.
//!
//! The [`VmTracer`] trait defines hook points at key execution events
//! (instruction dispatch, calls and returns, exception raise and catch,
//! generator yield and resume, debugger pauses). Every hook has a no-op
//! default so implementations only override what they care about.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`LogTracer`] | Structured `tracing` events under the `pyrite::vm` target |
//! | [`RecordingTracer`] | Full event recording for post-mortem inspection |
//!
//! # Usage
//!
//! ```
//! use pyrite::{Interpreter, Program, tracer::RecordingTracer};
//!
//! let recorder = RecordingTracer::new();
//! let mut interpreter = Interpreter::new(Program::new());
//! interpreter.set_tracer(recorder.clone());
//! // ... run ...
//! let events = recorder.events();
//! # assert!(events.is_empty());
//! ```

use std::{cell::RefCell, rc::Rc};

use crate::bytecode::Opcode;

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction was dispatched.
    Instruction {
        /// Function whose code holds the instruction.
        function: String,
        /// Index of the instruction in the function body.
        index: usize,
        opcode: Opcode,
        /// Source row, when the instruction carries one.
        row: Option<u32>,
    },
    /// A function frame was pushed.
    Call { function: String, depth: usize },
    /// A function frame was popped.
    Return { depth: usize },
    /// An exception started unwinding.
    ExceptionRaised { exc_type: String, message: String },
    /// An except clause caught an exception.
    ExceptionHandled { exc_type: String },
    Yield { generator: String },
    Resume { generator: String },
    /// Stepping stopped at a statement boundary.
    Pause { module: String, row: Option<u32> },
}

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code.
pub trait VmTracer {
    /// Called before each instruction dispatch.
    ///
    /// This is the hottest hook; implementations should be as lightweight as possible.
    ///
    /// # Arguments
    /// * `function` - Name of the function whose code is executing
    /// * `index` - Index of the instruction in the function body
    /// * `opcode` - The opcode about to be executed
    /// * `row` - Source row of the instruction, if any
    #[inline(always)]
    fn on_instruction(&mut self, _function: &str, _index: usize, _opcode: Opcode, _row: Option<u32>) {}

    /// Called when a function frame is pushed.
    ///
    /// # Arguments
    /// * `function` - Name of the called function (module and class bodies included)
    /// * `depth` - Number of function frames after the push
    #[inline(always)]
    fn on_call(&mut self, _function: &str, _depth: usize) {}

    /// Called when a function frame is popped.
    ///
    /// # Arguments
    /// * `depth` - Number of function frames after the pop
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when an exception starts unwinding.
    #[inline(always)]
    fn on_exception_raised(&mut self, _exc_type: &str, _message: &str) {}

    /// Called when an except clause catches an exception.
    #[inline(always)]
    fn on_exception_handled(&mut self, _exc_type: &str) {}

    /// Called when a generator suspends at a `yield`.
    #[inline(always)]
    fn on_yield(&mut self, _generator: &str) {}

    /// Called when a suspended generator is spliced back onto a driver.
    #[inline(always)]
    fn on_resume(&mut self, _generator: &str) {}

    /// Called when stepping stops at a statement boundary (step end, breakpoint or pause).
    #[inline(always)]
    fn on_pause(&mut self, _module: &str, _row: Option<u32>) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Tracer that emits every hook as a `tracing` event.
///
/// Instructions are logged at `trace` level, everything else at `debug`.
/// Enable with e.g. `RUST_LOG=pyrite::vm=trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl VmTracer for LogTracer {
    fn on_instruction(&mut self, function: &str, index: usize, opcode: Opcode, row: Option<u32>) {
        tracing::trace!(target: "pyrite::vm", function, index, %opcode, ?row, "instruction");
    }

    fn on_call(&mut self, function: &str, depth: usize) {
        tracing::debug!(target: "pyrite::vm", function, depth, "call");
    }

    fn on_return(&mut self, depth: usize) {
        tracing::debug!(target: "pyrite::vm", depth, "return");
    }

    fn on_exception_raised(&mut self, exc_type: &str, message: &str) {
        tracing::debug!(target: "pyrite::vm", exc_type, message, "exception raised");
    }

    fn on_exception_handled(&mut self, exc_type: &str) {
        tracing::debug!(target: "pyrite::vm", exc_type, "exception handled");
    }

    fn on_yield(&mut self, generator: &str) {
        tracing::debug!(target: "pyrite::vm", generator, "yield");
    }

    fn on_resume(&mut self, generator: &str) {
        tracing::debug!(target: "pyrite::vm", generator, "resume");
    }

    fn on_pause(&mut self, module: &str, row: Option<u32>) {
        tracing::debug!(target: "pyrite::vm", module, ?row, "paused");
    }
}

/// Tracer that records every event.
///
/// Clones share the same event log, so a host can keep one clone and hand
/// the other to the interpreter.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Rc::default(),
            limit: Some(limit),
        }
    }

    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }

    fn record(&self, event: TraceEvent) {
        let mut events = self.events.borrow_mut();
        if self.limit.is_none_or(|limit| events.len() < limit) {
            events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, function: &str, index: usize, opcode: Opcode, row: Option<u32>) {
        self.record(TraceEvent::Instruction {
            function: function.to_owned(),
            index,
            opcode,
            row,
        });
    }

    fn on_call(&mut self, function: &str, depth: usize) {
        self.record(TraceEvent::Call {
            function: function.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.record(TraceEvent::Return { depth });
    }

    fn on_exception_raised(&mut self, exc_type: &str, message: &str) {
        self.record(TraceEvent::ExceptionRaised {
            exc_type: exc_type.to_owned(),
            message: message.to_owned(),
        });
    }

    fn on_exception_handled(&mut self, exc_type: &str) {
        self.record(TraceEvent::ExceptionHandled {
            exc_type: exc_type.to_owned(),
        });
    }

    fn on_yield(&mut self, generator: &str) {
        self.record(TraceEvent::Yield {
            generator: generator.to_owned(),
        });
    }

    fn on_resume(&mut self, generator: &str) {
        self.record(TraceEvent::Resume {
            generator: generator.to_owned(),
        });
    }

    fn on_pause(&mut self, module: &str, row: Option<u32>) {
        self.record(TraceEvent::Pause {
            module: module.to_owned(),
            row,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_log_and_respect_the_limit() {
        let recorder = RecordingTracer::with_limit(2);
        let mut handle: Box<dyn VmTracer> = Box::new(recorder.clone());
        handle.on_call("f", 1);
        handle.on_return(0);
        handle.on_yield("g");
        assert_eq!(
            recorder.events(),
            vec![
                TraceEvent::Call {
                    function: "f".to_owned(),
                    depth: 1
                },
                TraceEvent::Return { depth: 0 },
            ]
        );
    }
}
