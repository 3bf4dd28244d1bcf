//! The SDK object handed to an extension's constructor.

use crate::{Database, ModuleDirectory, ModuleLogger, Modules, Roles};
use policy::Grants;
use std::sync::Arc;
use storage::Backend;

/// Authentication capability.
///
/// Authentication is not exposed to extensions, so this type has no values:
/// [`Sdk::auth`] can only ever return `None`.
#[derive(Debug)]
pub enum Auth {}

/// Everything an extension may do, scoped to its manifest.
///
/// Built once per module by the loader and never reconfigured. Holding a
/// capability reveals nothing about what it permits; each operation checks
/// the module's grants when it is called.
#[derive(Debug)]
pub struct Sdk {
    module_id: Arc<str>,
    database: Database,
    roles: Roles,
    modules: Modules,
    logger: ModuleLogger,
}

impl Sdk {
    pub fn new(
        module_id: &str,
        grants: Grants,
        backend: Arc<dyn Backend>,
        directory: ModuleDirectory,
    ) -> Self {
        let module_id: Arc<str> = module_id.into();
        Self {
            database: Database::new(grants.clone(), Arc::clone(&backend)),
            roles: Roles::new(grants.clone(), backend),
            modules: Modules::new(Arc::clone(&module_id), grants, directory),
            logger: ModuleLogger::new(Arc::clone(&module_id)),
            module_id,
        }
    }

    /// The identifier this SDK was built for.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn modules(&self) -> &Modules {
        &self.modules
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    /// Always `None`: extensions cannot authenticate accounts.
    pub fn auth(&self) -> Option<&Auth> {
        None
    }

    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }
}
