//! Policy error types.

use crate::Permission;
use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// An operation was attempted without the permission it requires.
    #[error("permission denied: requires {0}")]
    PermissionDenied(Permission),

    /// A manifest string is not part of the permission vocabulary.
    #[error("unknown permission token: {0:?}")]
    UnknownPermission(String),

    /// A module's metadata is missing one of the required manifest fields.
    #[error("{module}: manifest is missing required field `{field}`")]
    ManifestIncomplete { module: String, field: &'static str },

    /// A module's metadata is present but not well-formed.
    #[error("{module}: malformed manifest: {reason}")]
    ManifestMalformed { module: String, reason: String },
}

impl Error {
    /// Returns the module identifier for manifest errors.
    pub fn module(&self) -> Option<&str> {
        match self {
            Error::ManifestIncomplete { module, .. } | Error::ManifestMalformed { module, .. } => {
                Some(module)
            }
            Error::PermissionDenied(_) | Error::UnknownPermission(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
