//! Stepping, breakpoints, pause/resume and stack inspection.
//!
//! Stepping stops at statement boundaries: before an instruction whose source
//! row differs from the row its function frame last executed. The instruction
//! a command starts on is always executed, so resuming from a breakpoint does
//! not immediately hit it again.

use serde::{Deserialize, Serialize};

use super::{Completion, ContinueContext, Vm, frame::FunctionFrame};
use crate::{
    exception_private::{RunError, RunResult},
    namespace::{ScopeId, ScopeRef},
    value::Value,
};

/// How far a stepping command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepMode {
    /// Until the run finishes, a breakpoint is hit or a pause is requested.
    #[default]
    Run,
    /// To the next statement at any depth.
    Statement,
    /// To the next statement, entering calls.
    Into,
    /// To the next statement in this function or a caller.
    Over,
    /// To the next statement in a caller.
    Out,
}

/// A source row of a module where stepping stops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
    pub module: String,
    pub row: u32,
}

impl Breakpoint {
    pub fn new(module: impl Into<String>, row: u32) -> Self {
        Self {
            module: module.into(),
            row,
        }
    }
}

/// Where execution currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub module: String,
    pub function: String,
    pub row: u32,
    pub column: u32,
}

/// One active function frame, as shown in a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEntry {
    pub module: String,
    pub function: String,
    pub row: u32,
    pub column: u32,
    pub scope_id: ScopeId,
}

#[derive(Debug, Default)]
pub(crate) struct DebugState {
    /// The predicate the last stepping command used; `resume` replays it.
    mode: StepMode,
    breakpoints: Vec<Breakpoint>,
    pause_requested: bool,
    paused: bool,
    driving: bool,
}

impl DebugState {
    /// Forgets per-run state; breakpoints survive across runs.
    pub(crate) fn reset(&mut self) {
        self.mode = StepMode::Run;
        self.pause_requested = false;
        self.paused = false;
    }

    pub(crate) fn clear_pause(&mut self) {
        self.pause_requested = false;
        self.paused = false;
    }
}

impl Vm {
    /// Executes instructions until `mode` says to stop or the run ends.
    pub(crate) fn drive(&mut self, mode: StepMode) {
        let origin = self.function_depth();
        self.debug.mode = mode;
        self.debug.paused = false;
        self.debug.driving = true;
        let mut first = true;
        while self.is_running() {
            if !first && self.should_stop(mode, origin) {
                self.pause_here();
                break;
            }
            first = false;
            self.execute_one();
        }
        self.debug.driving = false;
        self.settle();
    }

    /// Repeats the last stepping command.
    pub(crate) fn resume(&mut self) {
        let mode = self.debug.mode;
        self.drive(mode);
    }

    /// Requests a pause; it takes effect at the next instruction boundary.
    pub(crate) fn request_pause(&mut self) {
        if self.debug.driving {
            self.debug.pause_requested = true;
        } else if self.is_running() {
            self.pause_here();
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.debug.paused && self.is_running()
    }

    pub(crate) fn set_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        tracing::debug!(count = breakpoints.len(), "breakpoints updated");
        self.debug.breakpoints = breakpoints;
    }

    fn should_stop(&mut self, mode: StepMode, origin: usize) -> bool {
        if std::mem::take(&mut self.debug.pause_requested) {
            return true;
        }
        let Some(frame) = self.current_function().and_then(|id| self.frames.function(id).ok()) else {
            return false;
        };
        let Some(row) = frame.next_instruction().and_then(|instruction| instruction.row()) else {
            return false;
        };
        if frame.last_row == Some(row) {
            return false;
        }
        let module = frame.module_name();
        if self
            .debug
            .breakpoints
            .iter()
            .any(|breakpoint| breakpoint.row == row && breakpoint.module == module)
        {
            tracing::info!(module, row, "breakpoint hit");
            return true;
        }
        let depth = self.function_depth();
        match mode {
            StepMode::Run => false,
            StepMode::Statement | StepMode::Into => true,
            StepMode::Over => depth <= origin,
            StepMode::Out => depth < origin,
        }
    }

    fn pause_here(&mut self) {
        self.debug.paused = true;
        if let Some(position) = self.position() {
            self.tracer.on_pause(&position.module, Some(position.row));
        }
    }

    /// Number of function frames on the active chain.
    fn function_depth(&self) -> usize {
        self.frames
            .chain(self.current)
            .filter(|id| self.frames.function(*id).is_ok())
            .count()
    }

    /// Finishes the run once its last frame is gone.
    pub(crate) fn settle(&mut self) {
        if self.running && self.current.is_none() && self.nested_depth == 0 {
            self.finish_run(None);
        }
    }

    /// The module, function and source location of the next instruction.
    pub(crate) fn position(&self) -> Option<Position> {
        let frame = self.frames.function(self.current_function()?).ok()?;
        let (row, column) = frame_location(frame, true);
        Some(Position {
            module: frame.module_name().to_owned(),
            function: frame.name.to_string(),
            row,
            column,
        })
    }

    /// Active function frames, innermost first.
    pub(crate) fn stack_entries(&self) -> Vec<StackEntry> {
        let innermost = self.current_function();
        self.frames
            .chain(self.current)
            .filter_map(|id| {
                let frame = self.frames.function(id).ok()?;
                let (row, column) = frame_location(frame, Some(id) == innermost);
                Some(StackEntry {
                    module: frame.module_name().to_owned(),
                    function: frame.name.to_string(),
                    row,
                    column,
                    scope_id: frame.scope.id(),
                })
            })
            .collect()
    }

    /// The scope of the innermost active function frame.
    pub(crate) fn current_scope(&self) -> Option<ScopeRef> {
        let frame = self.frames.function(self.current_function()?).ok()?;
        Some(frame.scope.clone())
    }

    /// Abandons the active run, reporting `Stopped` to host callbacks.
    pub(crate) fn stop(&mut self) {
        tracing::info!("run stopped by the host");
        self.continue_active = false;
        self.discard_active_chain(&Completion::Stopped);
        self.loading.clear();
        self.finish_run(None);
    }

    /// Leaves the current function early, returning `value` to its caller.
    ///
    /// Pending `finally` blocks still run.
    pub(crate) fn force_return(&mut self, value: Value) {
        let outcome = self.try_force_return(value);
        if let Err(err) = outcome {
            self.raise(err);
        }
        self.settle();
    }

    fn try_force_return(&mut self, value: Value) -> RunResult<()> {
        let frame = self
            .current_function()
            .ok_or_else(|| RunError::internal("force_return without a function frame"))?;
        self.frames.function_mut(frame)?.default_return = Some(value);
        self.run_continue_context(ContinueContext::Exit {
            target: frame,
            value: Value::None,
        })
    }
}

/// The location a frame reports: the next instruction for the innermost frame,
/// the call in progress for callers.
fn frame_location(frame: &FunctionFrame, innermost: bool) -> (u32, u32) {
    let instruction = if innermost {
        frame.next_instruction().or_else(|| frame.previous_instruction())
    } else {
        frame.previous_instruction()
    };
    match instruction.and_then(|instruction| instruction.location) {
        Some(location) => (location.row, location.column),
        None => (frame.last_row.unwrap_or(0), 0),
    }
}
