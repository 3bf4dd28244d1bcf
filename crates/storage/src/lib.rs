//! Persistence for extension models, documents and roles.
//!
//! Capability objects handed to extensions never talk to a database
//! directly: they delegate to a [`Backend`]. This crate defines that
//! interface and ships [`SqliteStore`], the SQLite implementation the host
//! uses by default.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Backend, Filter, SqliteStore, StoredDocument};
//!
//! let store = SqliteStore::open("capstan.db")?;
//!
//! let mut data = serde_json::Map::new();
//! data.insert("username".into(), "ada".into());
//! store.save(&StoredDocument::new("user", data))?;
//!
//! for doc in store.find("user", &Filter::new())? {
//!     println!("{}: {:?}", doc.id, doc.data);
//! }
//!
//! let admin = store.create_role("admin")?;
//! println!("created role {} ({})", admin.name, admin.id);
//! # Ok::<(), storage::Error>(())
//! ```

mod backend;
mod error;
mod record;
mod store;

pub use backend::Backend;
pub use error::{Error, Result};
pub use record::{DocumentId, Filter, RoleRecord, StoredDocument};
pub use store::SqliteStore;
