//! Generator objects.
//!
//! A generator owns no frames itself: it records the two ends of the detached
//! frame chain that lives in the VM's frame arena. See
//! [`crate::bytecode`] for how yield and resume splice that chain.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    bytecode::FrameId,
    value::{ObjectId, Value},
};

/// Lifecycle of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeneratorState {
    /// Detached and waiting for the next resume.
    Suspended,
    /// Spliced onto a driver's frame chain.
    Running,
    /// The body returned or raised; frames are gone.
    Finished,
}

#[derive(Debug)]
pub(crate) struct GeneratorFrames {
    /// Innermost frame at the point of the last yield; becomes current on resume.
    pub head: FrameId,
    /// The generator's function frame; re-parented onto the driver on resume.
    pub tail: FrameId,
    /// Value produced by the yield that created the generator, not yet consumed.
    pub pending: Option<Value>,
    pub state: GeneratorState,
}

/// A suspended function body.
pub struct Generator {
    id: ObjectId,
    name: Rc<str>,
    frames: RefCell<GeneratorFrames>,
}

impl Generator {
    pub(crate) fn new(name: Rc<str>, head: FrameId, tail: FrameId, pending: Value) -> Self {
        Self {
            id: ObjectId::next(),
            name,
            frames: RefCell::new(GeneratorFrames {
                head,
                tail,
                pending: Some(pending),
                state: GeneratorState::Suspended,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.frames.borrow().state == GeneratorState::Finished
    }

    pub(crate) fn frames(&self) -> &RefCell<GeneratorFrames> {
        &self.frames
    }

    /// Records a new suspension point after a later yield.
    pub(crate) fn suspend(&self, head: FrameId) {
        let mut frames = self.frames.borrow_mut();
        frames.head = head;
        frames.state = GeneratorState::Suspended;
    }

    pub(crate) fn finish(&self) {
        let mut frames = self.frames.borrow_mut();
        frames.state = GeneratorState::Finished;
        frames.pending = None;
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generator object {}>", self.name)
    }
}
