//! Generators by frame splicing.
//!
//! A `yield` detaches the generator's function frame (and any loop or try
//! frames above it) from the caller's chain. Resuming links that segment back
//! onto whichever frame drives the generator and makes its innermost frame
//! current again.

use std::rc::{Rc, Weak};

use super::{OnFinish, Vm, frame::FrameId};
use crate::{
    bytecode::NO_OPERAND,
    exception_private::{ExcType, RunError, RunResult},
    types::{Generator, generator::GeneratorState},
    value::Value,
};

impl Vm {
    /// `Yield`: suspends the current function frame and hands `value` to its driver.
    ///
    /// The first yield of a body wraps its frames in a new generator and hands
    /// the generator to the original caller; `value` stays buffered until the
    /// first resume.
    pub(super) fn exec_yield(&mut self, frame: FrameId, dest: u32, value: Value) -> RunResult<()> {
        if dest != NO_OPERAND {
            // nothing can be sent into a generator
            self.store(frame, dest, Value::None)?;
        }
        let head = self
            .current
            .ok_or_else(|| RunError::internal("yield without a frame"))?;
        let function = self.frames.function_mut(frame)?;
        let target = function
            .on_finish
            .take()
            .ok_or_else(|| RunError::internal("generator frame has no result target"))?;
        let existing = function.generator.clone();
        let name = function.name.clone();
        self.current = self.frames.frame_mut(frame)?.parent.take();
        self.tracer.on_yield(&name);

        match existing {
            Some(weak) => {
                if let Some(generator) = weak.upgrade() {
                    generator.suspend(head);
                }
                self.deliver(target, Ok(value))
            }
            None => {
                let generator = Rc::new(Generator::new(name, head, frame, value));
                self.frames.function_mut(frame)?.generator = Some(Rc::downgrade(&generator));
                self.deliver(target, Ok(Value::Generator(generator)))
            }
        }
    }

    /// Produces the next value of `generator` into `target`.
    ///
    /// A value buffered by the creating yield is delivered at once; otherwise
    /// the generator's frames are spliced above the current frame and the
    /// value arrives when the body yields again. A finished body raises
    /// `StopIteration`.
    pub(crate) fn resume_generator(&mut self, generator: &Rc<Generator>, target: OnFinish) -> RunResult<()> {
        let mut frames = generator.frames().borrow_mut();
        if let Some(value) = frames.pending.take() {
            drop(frames);
            return self.deliver(target, Ok(value));
        }
        match frames.state {
            GeneratorState::Finished => return Err(ExcType::stop_iteration()),
            GeneratorState::Running => return Err(ExcType::value_error_generator_running()),
            GeneratorState::Suspended => frames.state = GeneratorState::Running,
        }
        let (head, tail) = (frames.head, frames.tail);
        drop(frames);

        let depth = match self.current_function() {
            Some(id) => self.frames.function(id)?.depth + 1,
            None => 1,
        };
        self.frames.frame_mut(tail)?.parent = self.current;
        let function = self.frames.function_mut(tail)?;
        function.on_finish = Some(target);
        function.depth = depth;
        self.current = Some(head);
        self.tracer.on_resume(generator.name());
        Ok(())
    }

    /// Whether `frame` is the function frame of a generator that is still referenced.
    pub(super) fn owned_by_live_generator(&self, frame: FrameId) -> bool {
        self.frames
            .function(frame)
            .ok()
            .and_then(|function| function.generator.as_ref().and_then(Weak::upgrade))
            .is_some()
    }

    /// Drops detached frame chains whose generator object no longer exists.
    pub(super) fn sweep_detached(&mut self) {
        let doomed: Vec<FrameId> = self
            .frames
            .live_ids()
            .into_iter()
            .filter(|id| !self.owned_by_live_generator(self.frames.root(*id)))
            .collect();
        if !doomed.is_empty() {
            tracing::debug!(frames = doomed.len(), "swept detached generator frames");
        }
        for id in doomed {
            self.frames.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        Interpreter,
        bytecode::{FunctionBuilder, FunctionType, Literal, ModuleBuilder, Program},
        value::Value,
    };

    /// `def gen(): yield 1; yield 2` followed by three `next(g)` calls in a `try`.
    fn generator_program() -> Program {
        let mut module = ModuleBuilder::new("main");
        let gen_index = module.reserve_function();
        let mut gen_body = FunctionBuilder::new("gen", FunctionType::Plain);
        let one = gen_body.load_int(&mut module, 1);
        gen_body.yield_value(None, Some(one));
        let two = gen_body.load_int(&mut module, 2);
        gen_body.yield_value(None, Some(two));
        module.set_function(gen_index, gen_body.finish());

        let mut main = FunctionBuilder::new("main", FunctionType::Module);
        let function = main.make_function(gen_index);
        let generator = main.call(function, &[]);
        let next = main.load_name(&mut module, "next");
        let first = main.call(next, &[generator]);
        let second = main.call(next, &[generator]);
        let values = main.build_list(&[first, second]);
        main.assign_name(&mut module, "values", values);
        let stopped = main.load_literal(&mut module, Literal::Bool(false));
        main.assign_name(&mut module, "stopped", stopped);

        let handlers = main.new_label();
        let handlers_end = main.new_label();
        let handler_body = main.new_label();
        let end = main.new_label();
        main.try_begin(handlers, handlers_end, None, end);
        main.call_into(None, next, &[generator], &[]);
        main.emit(crate::bytecode::Opcode::TryEnd, &[]);
        main.bind(handlers);
        main.except_handler(&mut module, Some("StopIteration"), handler_body, None);
        main.bind(handlers_end);
        main.bind(handler_body);
        let yes = main.load_literal(&mut module, Literal::Bool(true));
        main.assign_name(&mut module, "stopped", yes);
        main.emit(crate::bytecode::Opcode::ExceptEnd, &[]);
        main.bind(end);
        module.add_function(main.finish());

        let mut program = Program::new();
        program.add_module(module.build());
        program
    }

    #[test]
    fn yields_in_order_then_stops() {
        let mut interpreter = Interpreter::new(generator_program());
        interpreter.run_module("main").unwrap();
        assert!(interpreter.unhandled_exception().is_none());
        let scope = interpreter.global_scope().unwrap();
        assert_eq!(
            scope.get_local("values"),
            Some(Value::list(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(scope.get_local("stopped"), Some(Value::Bool(true)));
    }
}
