use std::rc::Rc;

use crate::{
    namespace::ScopeRef,
    value::{ObjectId, Value},
};

/// A loaded module.
///
/// The module's attributes are the bindings of the scope its body ran in, so
/// later writes through `global` stay visible to importers.
#[derive(Debug)]
pub struct Module {
    id: ObjectId,
    name: Rc<str>,
    scope: ScopeRef,
}

impl Module {
    #[must_use]
    pub fn new(name: Rc<str>, scope: ScopeRef) -> Self {
        Self {
            id: ObjectId::next(),
            name,
            scope,
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
    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.scope.get_local(name)
    }
}
