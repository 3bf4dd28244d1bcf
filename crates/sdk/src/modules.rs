//! Modules capability and the host's directory of loaded modules.

use crate::Result;
use crate::error::check;
use policy::{Grants, Permission};
use std::sync::{Arc, PoisonError, RwLock};

/// Identifiers of the modules the host has finished instantiating.
///
/// Owned by the host; capability objects only read it.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectory {
    loaded: Arc<RwLock<Vec<String>>>,
}

impl ModuleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a module as loaded. Recording the same id twice is a no-op.
    pub fn publish(&self, module_id: &str) {
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if !loaded.iter().any(|id| id == module_id) {
            loaded.push(module_id.to_string());
        }
    }

    /// Forget every module, e.g. after an aborted startup.
    pub fn clear(&self) {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Loaded module ids in the order they finished loading.
    pub fn list(&self) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Introspection of the other loaded modules.
#[derive(Debug, Clone)]
pub struct Modules {
    module_id: Arc<str>,
    grants: Grants,
    directory: ModuleDirectory,
}

impl Modules {
    pub(crate) fn new(module_id: Arc<str>, grants: Grants, directory: ModuleDirectory) -> Self {
        Self {
            module_id,
            grants,
            directory,
        }
    }

    /// Identifiers of the other modules loaded so far. Requires `modules:list`.
    pub fn list_modules(&self) -> Result<Vec<String>> {
        check(&self.grants, Permission::ModulesList)?;
        Ok(self
            .directory
            .list()
            .into_iter()
            .filter(|id| id.as_str() != &*self.module_id)
            .collect())
    }
}
