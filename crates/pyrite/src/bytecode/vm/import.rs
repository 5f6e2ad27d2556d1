//! Module loading.
//!
//! Compiled modules run their entry body in a fresh module scope the first
//! time they are imported; the finished module is cached in `loaded`. A module
//! is in `loading` while its body runs, which is how circular imports are
//! detected.

use std::rc::Rc;

use super::{OnFinish, Vm};
use crate::{
    bytecode::CodeRef,
    exception_private::{ExcType, RunError, RunResult},
    namespace::{Scope, ScopeKind, ScopeRef},
    types::{Module, NativeFn, NativeFunction},
    value::Value,
};

impl Vm {
    /// `Import`: delivers module `name` to `target`, running its body first if needed.
    pub(super) fn import_module(&mut self, name: &str, target: OnFinish) -> RunResult<()> {
        if let Some(module) = self.loaded.get(name) {
            let module = module.clone();
            return self.deliver(target, Ok(module));
        }
        if self.loading.contains(name) {
            return Err(ExcType::import_error_circular(name));
        }
        if self.modules.contains_key(name) {
            return self.start_module(name, target).map(drop);
        }
        if let Some(module) = self.native_modules.get(name) {
            let module = module.clone();
            self.loaded.insert(name.to_owned(), module.clone());
            return self.deliver(target, Ok(module));
        }
        Err(ExcType::module_not_found_error(name))
    }

    /// Pushes the entry body of compiled module `name` in a new module scope.
    ///
    /// Returns the module scope so hosts can inspect it while the body runs.
    pub(crate) fn start_module(&mut self, name: &str, target: OnFinish) -> RunResult<ScopeRef> {
        let module = self
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| ExcType::module_not_found_error(name))?;
        let entry = module
            .entry()
            .ok_or_else(|| RunError::internal(format!("module '{name}' has no entry body")))?;
        let code = CodeRef::new(module, entry)?;
        let frame_name = Rc::from(code.body().name.as_str());
        let scope = Scope::child(&self.global, ScopeKind::Module, name);
        scope.set_local("__name__", Value::str(name));

        self.loading.insert(name.to_owned());
        if let Err(err) = self.push_function_frame(code, scope.clone(), frame_name, target) {
            self.loading.remove(name);
            return Err(err);
        }
        tracing::debug!(module = name, "module body started");
        Ok(scope)
    }

    /// Starts module `name` as the main module of a host run.
    pub(crate) fn start_main_module(&mut self, name: &str, target: OnFinish) -> RunResult<()> {
        let scope = self.start_module(name, target)?;
        self.main_scope = Some(scope);
        Ok(())
    }

    /// `ImportFrom`: reads `name` from an imported module.
    pub(super) fn import_from(&mut self, module: &Value, name: &str) -> RunResult<Value> {
        match module {
            Value::Module(module) => module
                .get_attr(name)
                .ok_or_else(|| ExcType::import_error_name(name, module.name())),
            other => Err(ExcType::import_error_name(name, &other.type_name())),
        }
    }

    /// Makes a module of native functions importable as `name`.
    ///
    /// Compiled modules of the same name take precedence.
    pub(crate) fn register_native_module(&mut self, name: &str, functions: Vec<(&str, NativeFn)>) {
        let scope = Scope::child(&self.global, ScopeKind::Module, name);
        scope.set_local("__name__", Value::str(name));
        for (function_name, func) in functions {
            let native = NativeFunction::new(format!("{name}.{function_name}"), func);
            scope.set_local(function_name, Value::Native(Rc::new(native)));
        }
        let module = Value::Module(Rc::new(Module::new(Rc::from(name), scope)));
        self.native_modules.insert(name.to_owned(), module);
    }
}
