//! Permission vocabulary and manifest validation for extensions.
//!
//! Core principle: **every sensitive operation requires an explicit grant.**
//!
//! An extension declares the permissions it needs in its manifest. The loader
//! validates the manifest with [`Manifest::from_metadata`], turns the declared
//! tokens into a [`PermissionSet`], and wraps that set in [`Grants`], the
//! shared reference every capability object of the module checks against at
//! call time.

mod error;
mod grants;
mod manifest;
mod permission;

pub use error::{Error, Result};
pub use grants::{Grants, GrantsHandle};
pub use manifest::{Manifest, REQUIRED_FIELDS};
pub use permission::{Permission, PermissionSet};
