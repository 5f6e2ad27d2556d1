//! Control transfer: returns, `break`/`continue`, exceptions and `try` blocks.
//!
//! Every way a computation leaves its instruction pointer is expressed as a
//! [`ContinueContext`] and applied by [`Vm::run_continue_context`], which
//! walks the frame chain outward from the current frame until the context is
//! absorbed. `finally` blocks interrupt the walk: the context is parked on the
//! `try` frame and re-applied by `FinallyEnd`.

use std::rc::Rc;

use super::{
    Vm,
    frame::{FrameKind, TrySection},
};
use crate::{
    bytecode::{FrameId, LoopKind, NO_OPERAND, Opcode},
    exception_private::{ExcType, RunError, RunResult},
    namespace::Qualifier,
    types::ExcRef,
    value::Value,
};

/// Loop control requested by `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cycle {
    Continue,
    Break,
}

/// A pending transfer of control to an ancestor frame.
#[derive(Debug)]
pub(crate) enum ContinueContext {
    /// Return `value` from the function frame `target`.
    Exit { target: FrameId, value: Value },
    /// Restart or leave the loop frame `target`.
    Cycle { target: FrameId, cycle: Cycle },
    /// Unwind until a handler accepts the exception.
    Exception(ExcRef),
}

impl ContinueContext {
    fn is_stop_iteration(&self) -> bool {
        match self {
            Self::Exception(exc) => exc
                .exc_type()
                .is_some_and(|exc_type| exc_type.is_subclass_of(ExcType::StopIteration)),
            _ => false,
        }
    }
}

impl Vm {
    /// Applies a control transfer.
    ///
    /// Only one context may be in flight; a second one while the first is
    /// still being applied indicates an engine bug.
    pub(crate) fn run_continue_context(&mut self, context: ContinueContext) -> RunResult<()> {
        if self.continue_active {
            return Err(RunError::internal("control transfer started while another is in flight"));
        }
        self.continue_active = true;
        let result = self.unwind(context);
        self.continue_active = false;
        result
    }

    fn unwind(&mut self, mut context: ContinueContext) -> RunResult<()> {
        loop {
            let Some(id) = self.current else {
                let exception = match context {
                    ContinueContext::Exception(exc) => Some(exc),
                    _ => None,
                };
                self.finish_run(exception);
                return Ok(());
            };
            match self.unwind_frame(id, context)? {
                Some(next) => context = next,
                None => return Ok(()),
            }
        }
    }

    /// Applies `context` to frame `id`, returning the context to continue with
    /// if the frame did not absorb it.
    fn unwind_frame(&mut self, id: FrameId, context: ContinueContext) -> RunResult<Option<ContinueContext>> {
        match &self.frames.frame(id)?.kind {
            FrameKind::Loop(frame) => {
                let frame = frame.clone();
                match &context {
                    ContinueContext::Cycle { target, cycle } if *target == id => {
                        match cycle {
                            Cycle::Continue => {
                                let entry = self.frames.function_entry(id)?;
                                self.frames.function_mut(entry)?.cursor = frame.start;
                            }
                            Cycle::Break => {
                                self.pop_block(id)?;
                                self.jump_current(frame.end)?;
                            }
                        }
                        return Ok(None);
                    }
                    ContinueContext::Exception(_) if frame.kind == LoopKind::For && context.is_stop_iteration() => {
                        self.pop_block(id)?;
                        self.jump_current(frame.no_break.unwrap_or(frame.end))?;
                        return Ok(None);
                    }
                    _ => {}
                }
                self.pop_block(id)?;
                Ok(Some(context))
            }
            FrameKind::Try(_) => self.unwind_try(id, context),
            FrameKind::Function(_) => match context {
                ContinueContext::Exit { target, value } if target == id => {
                    Ok(self.complete_function(id, Ok(value)).err().map(|err| self.error_context(err)))
                }
                ContinueContext::Exception(exc) => {
                    Ok(self.complete_function(id, Err(exc)).err().map(|err| self.error_context(err)))
                }
                ContinueContext::Exit { .. } | ContinueContext::Cycle { .. } => {
                    // the target should have been met before the function boundary
                    Ok(Some(self.error_context(RunError::internal(
                        "control transfer crossed a function boundary",
                    ))))
                }
            },
        }
    }

    fn unwind_try(&mut self, id: FrameId, context: ContinueContext) -> RunResult<Option<ContinueContext>> {
        let (section, except_handled, has_finally) = match &self.frames.frame(id)?.kind {
            FrameKind::Try(frame) => (
                frame.section,
                frame.except_handled,
                frame.finally.is_some() && !frame.finally_handled,
            ),
            _ => return Err(RunError::internal("expected a try frame")),
        };
        if let ContinueContext::Exception(exc) = &context
            && section == TrySection::Body
            && !except_handled
            && self.enter_handler(id, exc)?
        {
            return Ok(None);
        }
        if section == TrySection::Except {
            self.unbind_handler(id)?;
        }
        if has_finally {
            self.enter_finally(id, Some(context))?;
            return Ok(None);
        }
        self.pop_block(id)?;
        Ok(Some(context))
    }

    /// Scans the handler table of try frame `id` and lands in the first matching clause.
    fn enter_handler(&mut self, id: FrameId, exc: &ExcRef) -> RunResult<bool> {
        let entry = self.frames.function_entry(id)?;
        let handlers = match &self.frames.frame(id)?.kind {
            FrameKind::Try(frame) => frame.handlers.clone(),
            _ => return Err(RunError::internal("expected a try frame")),
        };
        let function = self.frames.function(entry)?;
        let code = function.code.clone();
        let scope = function.scope.clone();
        for index in handlers {
            let Some(instruction) = code.body().code.get(index) else {
                return Err(RunError::internal("handler table out of range"));
            };
            if instruction.opcode != Opcode::ExceptHandler {
                return Err(RunError::internal("handler table entry is not an ExceptHandler"));
            }
            let [class, body, bind, ..] = instruction.operands;
            let matched = class == NO_OPERAND
                || code
                    .identifier(class)
                    .ok()
                    .and_then(|name| scope.load(name, Qualifier::Default).ok())
                    .is_some_and(|value| match value {
                        Value::Class(class) => exc.is_instance_of(&class),
                        _ => false,
                    });
            if !matched {
                continue;
            }
            let bound_name = if bind == NO_OPERAND {
                None
            } else {
                let name: Rc<str> = Rc::from(code.identifier(bind)?);
                scope.set_local(name.clone(), Value::Exception(exc.clone()));
                Some(name)
            };
            if let FrameKind::Try(frame) = &mut self.frames.frame_mut(id)?.kind {
                frame.section = TrySection::Except;
                frame.except_handled = true;
                frame.exception = Some(exc.clone());
                frame.bound_name = bound_name;
            }
            self.current = Some(id);
            self.frames.function_mut(entry)?.jump(body)?;
            self.tracer.on_exception_handled(exc.class().name());
            return Ok(true);
        }
        Ok(false)
    }

    /// Clears the exception an except clause bound, along with its variable.
    fn unbind_handler(&mut self, id: FrameId) -> RunResult<()> {
        let entry = self.frames.function_entry(id)?;
        let name = match &mut self.frames.frame_mut(id)?.kind {
            FrameKind::Try(frame) => {
                frame.exception = None;
                frame.bound_name.take()
            }
            _ => return Err(RunError::internal("expected a try frame")),
        };
        if let Some(name) = name {
            self.frames.function(entry)?.scope.remove_local(&name);
        }
        Ok(())
    }

    /// Runs the finally block of try frame `id`, parking `pending` until `FinallyEnd`.
    fn enter_finally(&mut self, id: FrameId, pending: Option<ContinueContext>) -> RunResult<()> {
        let entry = self.frames.function_entry(id)?;
        let target = match &mut self.frames.frame_mut(id)?.kind {
            FrameKind::Try(frame) => {
                frame.section = TrySection::Finally;
                frame.finally_handled = true;
                frame.pending = pending;
                frame
                    .finally
                    .ok_or_else(|| RunError::internal("try frame has no finally block"))?
            }
            _ => return Err(RunError::internal("expected a try frame")),
        };
        self.current = Some(id);
        self.frames.function_mut(entry)?.jump(target)
    }

    /// Pops block frame `id`, which must be the current frame.
    pub(super) fn pop_block(&mut self, id: FrameId) -> RunResult<()> {
        if self.current != Some(id) {
            return Err(RunError::internal("popped a frame that is not current"));
        }
        let frame = self
            .frames
            .remove(id)
            .ok_or_else(|| RunError::internal("popped a dead frame"))?;
        self.current = frame.parent;
        Ok(())
    }

    /// Jumps the function frame owning the current frame.
    pub(super) fn jump_current(&mut self, target: u32) -> RunResult<()> {
        let current = self.current.ok_or_else(|| RunError::internal("jump without a frame"))?;
        let entry = self.frames.function_entry(current)?;
        self.frames.function_mut(entry)?.jump(target)
    }

    /// Turns a failure while completing a frame into the context that keeps unwinding.
    fn error_context(&mut self, err: RunError) -> ContinueContext {
        let exc = self.materialize(err);
        ContinueContext::Exception(exc)
    }

    /// The nearest loop frame between the current frame and its function frame.
    fn enclosing_loop(&self) -> RunResult<FrameId> {
        for id in self.frames.chain(self.current) {
            match &self.frames.frame(id)?.kind {
                FrameKind::Loop(_) => return Ok(id),
                FrameKind::Function(_) => break,
                FrameKind::Try(_) => {}
            }
        }
        Err(RunError::internal("break or continue outside of a loop"))
    }

    pub(super) fn exec_cycle(&mut self, cycle: Cycle) -> RunResult<()> {
        let target = self.enclosing_loop()?;
        self.run_continue_context(ContinueContext::Cycle { target, cycle })
    }

    /// `TryEnd`: the try body finished without raising.
    pub(super) fn exec_try_end(&mut self) -> RunResult<()> {
        let id = self.current_block(TrySection::Body)?;
        self.leave_try(id)
    }

    /// `ExceptEnd`: an except clause finished.
    pub(super) fn exec_except_end(&mut self) -> RunResult<()> {
        let id = self.current_block(TrySection::Except)?;
        self.unbind_handler(id)?;
        self.leave_try(id)
    }

    /// `FinallyEnd`: re-applies the parked context, or falls through to the end.
    pub(super) fn exec_finally_end(&mut self) -> RunResult<()> {
        let id = self.current_block(TrySection::Finally)?;
        let (pending, end) = match &mut self.frames.frame_mut(id)?.kind {
            FrameKind::Try(frame) => (frame.pending.take(), frame.end),
            _ => return Err(RunError::internal("expected a try frame")),
        };
        self.pop_block(id)?;
        match pending {
            Some(context) => self.run_continue_context(context),
            None => self.jump_current(end),
        }
    }

    /// Goes to the finally block if it has not run yet, else pops the try frame and jumps to its end.
    fn leave_try(&mut self, id: FrameId) -> RunResult<()> {
        let (has_finally, end) = match &self.frames.frame(id)?.kind {
            FrameKind::Try(frame) => (frame.finally.is_some() && !frame.finally_handled, frame.end),
            _ => return Err(RunError::internal("expected a try frame")),
        };
        if has_finally {
            self.enter_finally(id, None)
        } else {
            self.pop_block(id)?;
            self.jump_current(end)
        }
    }

    /// The current frame, which must be a try frame in `section`.
    fn current_block(&self, section: TrySection) -> RunResult<FrameId> {
        let id = self.current.ok_or_else(|| RunError::internal("try marker without a frame"))?;
        match &self.frames.frame(id)?.kind {
            FrameKind::Try(frame) if frame.section == section => Ok(id),
            FrameKind::Try(_) => Err(RunError::internal("try marker in the wrong section")),
            _ => Err(RunError::internal("try marker without a try frame")),
        }
    }

    /// The exception bound by the innermost active except clause, for a bare `raise`.
    pub(super) fn active_exception(&self) -> RunResult<ExcRef> {
        for id in self.frames.chain(self.current) {
            if let FrameKind::Try(frame) = &self.frames.frame(id)?.kind
                && frame.section == TrySection::Except
                && let Some(exc) = &frame.exception
            {
                return Ok(exc.clone());
            }
        }
        Err(ExcType::runtime_error_no_active_exception())
    }
}
