//! The frame arena.
//!
//! Frames are stored in slots addressed by [`FrameId`] and linked through
//! their `parent` field. The active chain runs from the VM's current frame to
//! a root whose parent is `None`; suspended generators own detached chains
//! that are re-linked when they resume.

use std::{
    ops::Range,
    rc::{Rc, Weak},
};

use super::{OnFinish, control::ContinueContext};
use crate::{
    args::CallArgs,
    bytecode::{CodeRef, FunctionType, Instruction, LoopKind, NO_OPERAND},
    exception_private::{RunError, RunResult},
    namespace::ScopeRef,
    types::{ExcRef, Generator},
    value::Value,
};

/// Handle to a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u32);

impl FrameId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A frame: its link to the enclosing frame and what kind of block it is.
#[derive(Debug)]
pub(crate) struct Frame {
    pub parent: Option<FrameId>,
    pub kind: FrameKind,
}

#[derive(Debug)]
pub(crate) enum FrameKind {
    Function(Box<FunctionFrame>),
    Loop(LoopFrame),
    Try(Box<TryFrame>),
}

/// An activation of a function, class or module body.
#[derive(Debug)]
pub(crate) struct FunctionFrame {
    pub code: CodeRef,
    pub scope: ScopeRef,
    pub name: Rc<str>,
    /// Index of the next instruction to execute.
    pub cursor: usize,
    pub registers: Vec<Value>,
    /// Arguments accumulated by `PushArg` for the next `Call`.
    pub args: CallArgs,
    /// Where the result goes when the frame completes.
    pub on_finish: Option<OnFinish>,
    /// Substituted for a `None` result, set by a forced return.
    pub default_return: Option<Value>,
    /// Set once the body yields; the generator owning this frame.
    pub generator: Option<Weak<Generator>>,
    /// Number of function frames in the chain when this frame was pushed.
    pub depth: usize,
    /// Row of the last instruction executed in this frame.
    pub last_row: Option<u32>,
}

impl FunctionFrame {
    pub fn new(code: CodeRef, scope: ScopeRef, name: Rc<str>, on_finish: OnFinish, depth: usize) -> Self {
        let registers = vec![Value::None; code.body().register_count as usize];
        Self {
            code,
            scope,
            name,
            cursor: 0,
            registers,
            args: CallArgs::new(),
            on_finish: Some(on_finish),
            default_return: None,
            generator: None,
            depth,
            last_row: None,
        }
    }

    pub fn kind(&self) -> FunctionType {
        self.code.body().kind
    }

    pub fn module_name(&self) -> &str {
        &self.code.module.name
    }

    /// The instruction at the cursor, or `None` past the end of the body.
    pub fn next_instruction(&self) -> Option<&Instruction> {
        self.code.body().code.get(self.cursor)
    }

    /// The instruction that most recently ran in this frame.
    pub fn previous_instruction(&self) -> Option<&Instruction> {
        self.cursor.checked_sub(1).and_then(|index| self.code.body().code.get(index))
    }

    pub fn register(&self, index: u32) -> RunResult<Value> {
        self.registers
            .get(index as usize)
            .cloned()
            .ok_or_else(|| RunError::internal(format!("register {index} out of range in '{}'", self.name)))
    }

    /// Reads an optional register operand.
    pub fn optional_register(&self, index: u32) -> RunResult<Option<Value>> {
        if index == NO_OPERAND {
            Ok(None)
        } else {
            self.register(index).map(Some)
        }
    }

    /// Writes a register, growing the file when the size hint was too small.
    pub fn set_register(&mut self, index: u32, value: Value) -> RunResult<()> {
        if index == NO_OPERAND {
            return Err(RunError::internal("write to an absent register operand"));
        }
        let index = index as usize;
        if index >= self.registers.len() {
            self.registers.resize(index + 1, Value::None);
        }
        self.registers[index] = value;
        Ok(())
    }

    /// Moves the cursor to a jump target, rejecting targets past the end of the body.
    pub fn jump(&mut self, target: u32) -> RunResult<()> {
        let target = target as usize;
        if target == NO_OPERAND as usize || target > self.code.body().code.len() {
            return Err(RunError::internal(format!("jump target {target} out of range in '{}'", self.name)));
        }
        self.cursor = target;
        Ok(())
    }
}

/// A `while` or `for` loop in progress.
#[derive(Debug, Clone)]
pub(crate) struct LoopFrame {
    pub kind: LoopKind,
    /// First instruction of the loop body; `continue` resumes here.
    pub start: usize,
    /// Instruction after the loop; `break` lands here.
    pub end: u32,
    /// Where a `for` loop lands when its iterator runs out (the `else` clause).
    pub no_break: Option<u32>,
}

/// Which part of a `try` statement is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrySection {
    Body,
    Except,
    Finally,
}

/// A `try` statement in progress.
#[derive(Debug)]
pub(crate) struct TryFrame {
    pub section: TrySection,
    /// Set once an except clause has been entered; later exceptions skip the handlers.
    pub except_handled: bool,
    /// Set once the finally block has been entered.
    pub finally_handled: bool,
    /// Instruction indices of the `ExceptHandler` table.
    pub handlers: Range<usize>,
    pub finally: Option<u32>,
    pub end: u32,
    /// The exception being handled by the active except clause.
    pub exception: Option<ExcRef>,
    /// Name the active except clause bound the exception to.
    pub bound_name: Option<Rc<str>>,
    /// Control transfer suspended while the finally block runs.
    pub pending: Option<ContinueContext>,
}

impl TryFrame {
    pub fn new(handlers: Range<usize>, finally: Option<u32>, end: u32) -> Self {
        Self {
            section: TrySection::Body,
            except_handled: false,
            finally_handled: false,
            handlers,
            finally,
            end,
            exception: None,
            bound_name: None,
            pending: None,
        }
    }
}

/// Slot storage for frames with a free list.
#[derive(Debug, Default)]
pub(crate) struct Frames {
    slots: Vec<Option<Frame>>,
    free: Vec<u32>,
}

impl Frames {
    pub fn push(&mut self, frame: Frame) -> FrameId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(frame);
            FrameId(index)
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Some(frame));
            FrameId(index)
        }
    }

    pub fn remove(&mut self, id: FrameId) -> Option<Frame> {
        let frame = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        Some(frame)
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn frame(&self, id: FrameId) -> RunResult<&Frame> {
        self.get(id)
            .ok_or_else(|| RunError::internal(format!("frame {} is not live", id.0)))
    }

    pub fn frame_mut(&mut self, id: FrameId) -> RunResult<&mut Frame> {
        self.get_mut(id)
            .ok_or_else(|| RunError::internal(format!("frame {} is not live", id.0)))
    }

    pub fn function(&self, id: FrameId) -> RunResult<&FunctionFrame> {
        match &self.frame(id)?.kind {
            FrameKind::Function(function) => Ok(function),
            _ => Err(RunError::internal("expected a function frame")),
        }
    }

    pub fn function_mut(&mut self, id: FrameId) -> RunResult<&mut FunctionFrame> {
        match &mut self.frame_mut(id)?.kind {
            FrameKind::Function(function) => Ok(function),
            _ => Err(RunError::internal("expected a function frame")),
        }
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.get(id).and_then(|frame| frame.parent)
    }

    /// The nearest function frame at or above `id` in its chain.
    pub fn function_entry(&self, id: FrameId) -> RunResult<FrameId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let frame = self.frame(current)?;
            if matches!(frame.kind, FrameKind::Function(_)) {
                return Ok(current);
            }
            cursor = frame.parent;
        }
        Err(RunError::internal("block frame outside of any function"))
    }

    /// `id` followed by each of its ancestors.
    pub fn chain(&self, id: Option<FrameId>) -> impl Iterator<Item = FrameId> + '_ {
        std::iter::successors(id, |current| self.parent(*current))
    }

    /// The root of the chain containing `id`.
    pub fn root(&self, id: FrameId) -> FrameId {
        self.chain(Some(id)).last().unwrap_or(id)
    }

    pub fn live_ids(&self) -> Vec<FrameId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(index, _)| u32::try_from(index).ok().map(FrameId))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_frame(parent: Option<FrameId>) -> Frame {
        Frame {
            parent,
            kind: FrameKind::Loop(LoopFrame {
                kind: LoopKind::While,
                start: 0,
                end: 0,
                no_break: None,
            }),
        }
    }

    #[test]
    fn slots_are_reused_after_removal() {
        let mut frames = Frames::default();
        let a = frames.push(loop_frame(None));
        let b = frames.push(loop_frame(Some(a)));
        assert_eq!(frames.len(), 2);
        assert!(frames.remove(b).is_some());
        assert!(frames.get(b).is_none());
        let c = frames.push(loop_frame(Some(a)));
        assert_eq!(c, b);
        assert_eq!(frames.chain(Some(c)).collect::<Vec<_>>(), vec![c, a]);
        assert_eq!(frames.root(c), a);
    }

    #[test]
    fn block_frames_without_a_function_are_malformed() {
        let mut frames = Frames::default();
        let id = frames.push(loop_frame(None));
        assert!(frames.function_entry(id).is_err());
    }
}
