//! Live, shared permission state for one module.

use crate::{Error, Permission, PermissionSet, Result};
use std::sync::{Arc, PoisonError, RwLock};

/// A module's permissions as seen by its capability objects.
///
/// Cloning a `Grants` clones the reference, not the set: every capability
/// object and handle of a module observes the same state, so a revocation made
/// through the owning [`GrantsHandle`] applies to the very next check.
#[derive(Debug, Clone)]
pub struct Grants {
    current: Arc<RwLock<Arc<PermissionSet>>>,
}

impl Grants {
    /// Check `permission` against the current state.
    pub fn contains(&self, permission: Permission) -> bool {
        self.current().contains(permission)
    }

    /// Fail with [`Error::PermissionDenied`] unless `permission` is granted.
    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.contains(permission) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(permission))
        }
    }

    /// The permission set in effect right now.
    pub fn current(&self) -> Arc<PermissionSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Host-side owner of a module's [`Grants`].
///
/// Only the host holds one of these; extensions receive plain `Grants` clones
/// that cannot change what they are allowed to do.
#[derive(Debug)]
pub struct GrantsHandle {
    grants: Grants,
}

impl GrantsHandle {
    pub fn new(set: PermissionSet) -> Self {
        Self {
            grants: Grants {
                current: Arc::new(RwLock::new(Arc::new(set))),
            },
        }
    }

    /// A read-only reference to hand to capability objects.
    pub fn grants(&self) -> Grants {
        self.grants.clone()
    }

    /// Withdraw `permission`. Returns whether it was granted before.
    pub fn revoke(&self, permission: Permission) -> bool {
        let mut current = self
            .grants
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !current.contains(permission) {
            return false;
        }
        *current = Arc::new(current.without(permission));
        true
    }
}
