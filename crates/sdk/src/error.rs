//! SDK error types.

use policy::Permission;
use thiserror::Error;

/// Errors returned to extensions by capability objects.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The module's manifest does not grant the permission the call needs.
    #[error("permission denied: requires {0}")]
    PermissionDenied(Permission),

    /// A document does not satisfy its model's schema.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A schema could not be encoded or a stored schema could not be read.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl Error {
    /// The permission that was missing, if this is a denial.
    pub fn denied_permission(&self) -> Option<Permission> {
        match self {
            Error::PermissionDenied(permission) => Some(*permission),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fail unless `grants` currently holds `permission`.
pub(crate) fn check(grants: &policy::Grants, permission: Permission) -> Result<()> {
    grants.require(permission).map_err(|_| {
        tracing::debug!(%permission, "capability call denied");
        Error::PermissionDenied(permission)
    })
}
