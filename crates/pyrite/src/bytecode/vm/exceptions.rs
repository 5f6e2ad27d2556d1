//! Raising, materializing and run termination.

use std::rc::{Rc, Weak};

use super::{Completion, ContinueContext, HostCallback, OnFinish, Vm, frame::FrameKind};
use crate::{
    exception_private::{ErrorCode, ExcType, RunError},
    exception_public::ExceptionInfo,
    types::{Class, ExcRef, Instance},
    value::Value,
};

impl Vm {
    /// Hands an error raised by an instruction to the exception machine.
    pub(super) fn raise(&mut self, err: RunError) {
        let exc = self.materialize(err);
        self.tracer
            .on_exception_raised(exc.class().name(), &exc.exception_message());
        if self.current.is_none() {
            self.finish_run(Some(exc));
            return;
        }
        if let Err(err) = self.run_continue_context(ContinueContext::Exception(exc)) {
            self.abort(err);
        }
    }

    /// Turns an error into a raisable exception instance.
    ///
    /// Internal errors become `SystemError`s carrying the internal message.
    pub(crate) fn materialize(&mut self, err: RunError) -> ExcRef {
        match err {
            RunError::Raised(exc) => exc,
            RunError::Exc(exc) => self.exception_instance(exc.exc_type(), exc.code(), exc.params().to_vec()),
            RunError::Internal(message) => {
                tracing::error!(%message, "interpreter invariant violated");
                self.exception_instance(ExcType::SystemError, ErrorCode::Internal, vec![message.into_owned()])
            }
        }
    }

    fn exception_instance(&self, exc_type: ExcType, code: ErrorCode, params: Vec<String>) -> ExcRef {
        let class = self.exception_class(exc_type);
        let mro = class.mro().unwrap_or_else(|| vec![class.clone()]);
        let instance = Rc::new(Instance::new(class, Rc::from(mro)));
        let message = code.format(&params);
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![Value::from(message)]
        };
        instance.set_attr("args", Value::tuple(args));
        instance.set_exception_details(code, params);
        instance
    }

    /// The builtin class of `exc_type`, as materialized in the global scope.
    pub(crate) fn exception_class(&self, exc_type: ExcType) -> Rc<Class> {
        let name: &'static str = exc_type.into();
        match self.global.lookup(name) {
            Some(Value::Class(class)) => class,
            _ => Class::exception(exc_type, Vec::new()),
        }
    }

    /// Ends the run, keeping `exception` as the unhandled exception if there is one.
    pub(super) fn finish_run(&mut self, exception: Option<ExcRef>) {
        self.running = false;
        self.output.flush();
        match &exception {
            Some(exc) => tracing::info!(
                exc_type = exc.class().name(),
                message = %exc.exception_message(),
                "run ended with an unhandled exception"
            ),
            None => tracing::debug!("run finished"),
        }
        self.unhandled = exception;
        self.debug.clear_pause();
        self.sweep_detached();
    }

    /// Reports a host call that failed before any frame ran, ending the run.
    pub(crate) fn fail_host_start(&mut self, err: RunError, callback: &HostCallback) {
        let exc = self.materialize(err);
        let taken = callback.borrow_mut().take();
        if let Some(callback) = taken {
            callback(Completion::Raised(ExceptionInfo::from_instance(&exc)));
        }
        if self.current.is_none() {
            self.finish_run(Some(exc));
        } else {
            self.raise(RunError::Raised(exc));
        }
    }

    /// Abandons the run after the exception machine itself failed.
    fn abort(&mut self, err: RunError) {
        tracing::error!(%err, "unwinding failed; abandoning the run");
        self.continue_active = false;
        let exc = self.materialize(err);
        self.discard_active_chain(&Completion::Raised(ExceptionInfo::from_instance(&exc)));
        self.finish_run(Some(exc));
    }

    /// Pops every frame of the active chain, reporting `completion` to host callbacks on the way.
    pub(super) fn discard_active_chain(&mut self, completion: &Completion) {
        let chain: Vec<_> = self.frames.chain(self.current).collect();
        self.current = None;
        for id in chain {
            let Some(frame) = self.frames.remove(id) else { continue };
            let FrameKind::Function(mut function) = frame.kind else { continue };
            if let Some(generator) = function.generator.as_ref().and_then(Weak::upgrade) {
                generator.finish();
            }
            if let Some(OnFinish::Host(callback)) = function.on_finish.take() {
                let taken = callback.borrow_mut().take();
                if let Some(callback) = taken {
                    callback(completion.clone());
                }
            }
        }
    }
}
