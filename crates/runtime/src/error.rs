//! Loader error types.

use crate::ModuleFailure;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Loader errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The registry could not be read or is not a list of identifiers.
    #[error("module registry {} is unreadable: {reason}", .path.display())]
    RegistryUnreadable { path: PathBuf, reason: String },

    /// The resolver could not provide code for a module.
    #[error("{module}: import failed: {reason}")]
    Import { module: String, reason: String },

    /// Import and metadata read did not finish in time.
    #[error("{module}: import timed out after {after:?}")]
    ImportTimeout { module: String, after: Duration },

    /// The module's packaged metadata could not be read.
    #[error("{module}: metadata unreadable: {reason}")]
    Metadata { module: String, reason: String },

    /// The module's manifest is incomplete or malformed.
    #[error(transparent)]
    Manifest(#[from] policy::Error),

    /// The module's constructor failed or panicked.
    #[error("{module}: instantiation failed: {reason}")]
    Instantiate { module: String, reason: String },

    /// The module's constructor did not return in time.
    #[error("{module}: instantiation timed out after {after:?}")]
    InstantiateTimeout { module: String, after: Duration },

    /// One or more modules failed to load.
    #[error("startup failed: {}", describe(.failures))]
    Startup { failures: Vec<ModuleFailure> },
}

impl Error {
    /// The module this error is about, when it concerns a single module.
    pub fn module(&self) -> Option<&str> {
        match self {
            Error::Import { module, .. }
            | Error::ImportTimeout { module, .. }
            | Error::Metadata { module, .. }
            | Error::Instantiate { module, .. }
            | Error::InstantiateTimeout { module, .. } => Some(module),
            Error::Manifest(err) => err.module(),
            Error::RegistryUnreadable { .. } | Error::Startup { .. } => None,
        }
    }
}

fn describe(failures: &[ModuleFailure]) -> String {
    failures
        .iter()
        .map(|f| f.error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
