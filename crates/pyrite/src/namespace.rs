//! Lexical scopes.
//!
//! Every function activation, class body and module body owns a [`Scope`];
//! scopes link to the scope they were created in, forming the static chain
//! that name lookup walks outward. The root of every chain is the global
//! scope, which materializes builtins on first access and memoizes them.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};

use crate::{
    builtins,
    exception_private::{ExcType, RunError, RunResult},
    value::{AttrMap, Value, new_attr_map},
};

/// Shared handle to a scope.
pub type ScopeRef = Rc<Scope>;

/// Stable identifier of a scope, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u64);

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// What created a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ScopeKind {
    /// The process-wide root holding builtins.
    Global,
    Module,
    Function,
    /// A class body; invisible to the methods defined inside it.
    Class,
}

/// How a variable reference chooses its target scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr, Serialize, Deserialize)]
#[repr(u32)]
pub enum Qualifier {
    /// Reads walk the chain; writes go to the current scope.
    #[default]
    Default = 0,
    /// Reads and writes target the enclosing module scope.
    Global = 1,
    /// Reads and writes target the nearest enclosing function scope holding the name.
    NonLocal = 2,
}

impl Qualifier {
    pub(crate) fn from_operand(operand: u32) -> RunResult<Self> {
        Self::from_repr(operand).ok_or_else(|| RunError::internal(format!("invalid scope qualifier {operand}")))
    }
}

/// A mapping from identifier to value with a link to its lexical parent.
pub struct Scope {
    id: ScopeId,
    name: String,
    kind: ScopeKind,
    parent: Option<ScopeRef>,
    vars: RefCell<AttrMap>,
}

impl Scope {
    /// Creates a fresh global scope.
    ///
    /// Each interpreter owns one; builtins are materialized into it lazily.
    #[must_use]
    pub fn global() -> ScopeRef {
        Rc::new(Self {
            id: ScopeId::next(),
            name: "<global>".to_owned(),
            kind: ScopeKind::Global,
            parent: None,
            vars: RefCell::new(new_attr_map()),
        })
    }

    /// Creates a scope nested in `parent`.
    #[must_use]
    pub fn child(parent: &ScopeRef, kind: ScopeKind, name: impl Into<String>) -> ScopeRef {
        Rc::new(Self {
            id: ScopeId::next(),
            name: name.into(),
            kind,
            parent: Some(parent.clone()),
            vars: RefCell::new(new_attr_map()),
        })
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Human-readable name used in debugger views.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Reads a binding of this scope only.
    #[must_use]
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn contains_local(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    pub fn set_local(&self, name: impl Into<Rc<str>>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn remove_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().shift_remove(name)
    }

    /// Snapshot of this scope's bindings in insertion order.
    #[must_use]
    pub fn variables(&self) -> Vec<(Rc<str>, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub(crate) fn take_variables(&self) -> AttrMap {
        std::mem::replace(&mut *self.vars.borrow_mut(), new_attr_map())
    }

    /// Looks `name` up along the chain, materializing builtins at the root.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get_local(name) {
            return Some(value);
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None if self.kind == ScopeKind::Global => {
                let value = builtins::materialize(name, self)?;
                self.set_local(name, value.clone());
                Some(value)
            }
            None => None,
        }
    }

    /// The nearest enclosing module scope, or the root if the chain has none.
    #[must_use]
    pub fn module_scope(self: &Rc<Self>) -> ScopeRef {
        let mut scope = self.clone();
        loop {
            if matches!(scope.kind, ScopeKind::Module | ScopeKind::Global) {
                return scope;
            }
            match scope.parent.clone() {
                Some(parent) => scope = parent,
                None => return scope,
            }
        }
    }

    /// The nearest enclosing function scope (excluding this one) that binds `name`.
    ///
    /// Class bodies are skipped; the search stops before module and global scopes.
    fn nonlocal_scope(&self, name: &str) -> RunResult<ScopeRef> {
        let mut current = self.parent.clone();
        while let Some(scope) = current {
            match scope.kind {
                ScopeKind::Module | ScopeKind::Global => break,
                ScopeKind::Function if scope.contains_local(name) => return Ok(scope),
                ScopeKind::Function | ScopeKind::Class => current = scope.parent.clone(),
            }
        }
        Err(ExcType::nonlocal_not_found(name))
    }

    /// Resolves the scope a qualified write or delete of `name` targets.
    pub(crate) fn target_scope(self: &Rc<Self>, name: &str, qualifier: Qualifier) -> RunResult<ScopeRef> {
        match qualifier {
            Qualifier::Default => Ok(self.clone()),
            Qualifier::Global => Ok(self.module_scope()),
            Qualifier::NonLocal => self.nonlocal_scope(name),
        }
    }

    /// Reads `name` according to `qualifier`, raising `NameError` when unbound.
    pub(crate) fn load(self: &Rc<Self>, name: &str, qualifier: Qualifier) -> RunResult<Value> {
        let found = match qualifier {
            Qualifier::Default => self.lookup(name),
            Qualifier::Global => self.module_scope().lookup(name),
            Qualifier::NonLocal => self.nonlocal_scope(name)?.get_local(name),
        };
        found.ok_or_else(|| ExcType::name_error(name))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward_and_materializes_builtins() {
        let global = Scope::global();
        let module = Scope::child(&global, ScopeKind::Module, "main");
        module.set_local("x", Value::Int(1));
        let func = Scope::child(&module, ScopeKind::Function, "f");
        assert_eq!(func.lookup("x"), Some(Value::Int(1)));
        assert!(matches!(func.lookup("len"), Some(Value::Native(_))));
        assert!(global.contains_local("len"));
        assert!(func.lookup("missing").is_none());
    }

    #[test]
    fn global_qualifier_targets_module_scope() {
        let global = Scope::global();
        let module = Scope::child(&global, ScopeKind::Module, "main");
        let func = Scope::child(&module, ScopeKind::Function, "f");
        let target = func.target_scope("x", Qualifier::Global).unwrap();
        assert_eq!(target.id(), module.id());
    }

    #[test]
    fn nonlocal_skips_classes_and_stops_at_module() {
        let global = Scope::global();
        let module = Scope::child(&global, ScopeKind::Module, "main");
        module.set_local("x", Value::Int(0));
        let outer = Scope::child(&module, ScopeKind::Function, "outer");
        outer.set_local("x", Value::Int(1));
        let class = Scope::child(&outer, ScopeKind::Class, "K");
        class.set_local("x", Value::Int(2));
        let inner = Scope::child(&class, ScopeKind::Function, "inner");
        let target = inner.target_scope("x", Qualifier::NonLocal).unwrap();
        assert_eq!(target.id(), outer.id());

        let top = Scope::child(&module, ScopeKind::Function, "top");
        let err = top.load("x", Qualifier::NonLocal).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::NameError);
    }
}
