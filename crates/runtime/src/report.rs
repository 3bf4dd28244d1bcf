//! Outcome of a loader run.

use crate::{Error, Extension, Result};
use policy::{GrantsHandle, Permission, PermissionSet};
use std::fmt;
use std::sync::Arc;

/// A module that was instantiated successfully.
pub struct LoadedModule {
    pub(crate) id: String,
    pub(crate) version: Option<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) soft_dependencies: Vec<String>,
    pub(crate) grants: GrantsHandle,
    pub(crate) instance: Box<dyn Extension>,
}

impl LoadedModule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Hard dependencies declared in the manifest (recorded, not enforced).
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Soft dependencies declared in the manifest (recorded, not enforced).
    pub fn soft_dependencies(&self) -> &[String] {
        &self.soft_dependencies
    }

    /// Permissions the module holds right now.
    pub fn permissions(&self) -> Arc<PermissionSet> {
        self.grants.grants().current()
    }

    /// Withdraw a permission from the running module.
    pub fn revoke(&self, permission: Permission) -> bool {
        let revoked = self.grants.revoke(permission);
        if revoked {
            tracing::warn!(module = %self.id, %permission, "permission revoked");
        }
        revoked
    }

    /// Stop the instance and release its capabilities.
    pub fn shutdown(mut self) {
        tracing::debug!(module = %self.id, "shutting down module");
        self.instance.shutdown();
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("permissions", &self.permissions())
            .finish_non_exhaustive()
    }
}

/// A module that did not load, and why.
#[derive(Debug)]
pub struct ModuleFailure {
    pub module: String,
    pub error: Error,
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.error)
    }
}

/// Structured result of a startup run.
///
/// The loader never terminates the process; the caller inspects the report
/// and decides.
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Modules that are running. Empty whenever `aborted` is set.
    pub loaded: Vec<LoadedModule>,
    /// Modules that failed, in the order their failures were observed.
    pub failures: Vec<ModuleFailure>,
    /// Set when a failure stopped the whole startup.
    pub aborted: bool,
}

impl StartupReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn module(&self, id: &str) -> Option<&LoadedModule> {
        self.loaded.iter().find(|m| m.id == id)
    }

    /// The running modules, or a [`Error::Startup`] naming every failure.
    ///
    /// On failure, modules that did load are shut down first so that no
    /// partial module set escapes.
    pub fn into_result(self) -> Result<Vec<LoadedModule>> {
        if self.failures.is_empty() {
            return Ok(self.loaded);
        }
        for module in self.loaded {
            module.shutdown();
        }
        Err(Error::Startup {
            failures: self.failures,
        })
    }

    /// Shut down every running module.
    pub fn shutdown(self) {
        for module in self.loaded {
            module.shutdown();
        }
    }
}
