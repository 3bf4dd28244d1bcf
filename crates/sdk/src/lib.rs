//! The capability-scoped SDK handed to extensions.
//!
//! Every extension receives one [`Sdk`] at construction. It aggregates the
//! capability objects for one module:
//!
//! - [`Database`]: models ([`Model`]) and their documents ([`Document`]);
//! - [`Roles`]: role administration through [`Role`] handles;
//! - [`Modules`]: introspection of the other loaded modules;
//! - [`ModuleLogger`]: structured logging tagged with the module id.
//!
//! All of them share the module's [`policy::Grants`]. Nothing is checked when
//! a capability is built; each operation checks the permission it needs when
//! it is called and fails with [`Error::PermissionDenied`] otherwise.
//!
//! # Example
//!
//! ```
//! use policy::{GrantsHandle, Permission, PermissionSet};
//! use sdk::{ModuleDirectory, Sdk};
//! use std::sync::Arc;
//! use storage::SqliteStore;
//!
//! let grants = GrantsHandle::new(PermissionSet::from_tokens(["roles:create"])?);
//! let backend = Arc::new(SqliteStore::in_memory()?);
//! let sdk = Sdk::new("gradebook", grants.grants(), backend, ModuleDirectory::new());
//!
//! let role = sdk.roles().create("instructor")?;
//! assert_eq!(role.name(), "instructor");
//!
//! let denied = sdk.roles().list_roles().unwrap_err();
//! assert_eq!(denied.denied_permission(), Some(Permission::RolesList));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod database;
mod error;
mod facade;
mod logger;
mod modules;
mod roles;
mod schema;

pub use database::{Database, Document, Model};
pub use error::{Error, Result};
pub use facade::{Auth, Sdk};
pub use logger::ModuleLogger;
pub use modules::{ModuleDirectory, Modules};
pub use roles::{Role, RoleRef, Roles};
pub use schema::{Field, FieldKind, Schema};

pub use storage::{DocumentId, Filter};
