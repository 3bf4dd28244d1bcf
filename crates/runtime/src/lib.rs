//! Capstan runtime: discovering, validating and instantiating extensions.
//!
//! The runtime turns a registry of module identifiers into running extension
//! instances, each holding an SDK scoped to the permissions its manifest
//! declares.
//!
//! # Overview
//!
//! - **Registry**: the JSON list of module ids to load; duplicates are dropped
//!   before anything is imported.
//! - **ModuleResolver**: the boundary between the loader and extension code.
//!   [`StaticResolver`] is a table of constructors compiled into the host.
//! - **Loader**: runs one pipeline per module concurrently (import → metadata
//!   → manifest validation → scoped SDK → bounded instantiation) and returns a
//!   [`StartupReport`] instead of terminating the process.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{Extension, Loader, StaticResolver};
//! use std::sync::Arc;
//! use storage::SqliteStore;
//!
//! struct Gradebook;
//! impl Extension for Gradebook {}
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut resolver = StaticResolver::with_metadata_dir("extensions");
//! resolver.register("gradebook", |sdk| {
//!     sdk.logger().info("starting");
//!     Ok(Box::new(Gradebook))
//! });
//!
//! let loader = Loader::new(resolver, Arc::new(SqliteStore::open("capstan.db")?));
//! let modules = loader.load("modules.json").await?.into_result()?;
//! println!("{} modules running", modules.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod registry;
mod report;
mod resolver;

pub use error::{Error, Result};
pub use loader::{
    DEFAULT_IMPORT_TIMEOUT, DEFAULT_INSTANTIATE_TIMEOUT, FailureMode, Loader, LoaderConfig, LoaderState, ModuleCheck,
};
pub use registry::Registry;
pub use report::{LoadedModule, ModuleFailure, StartupReport};
pub use resolver::{
    BoxError, Extension, ExtensionFactory, METADATA_FILE, MetadataSource, ModuleResolver,
    StaticResolver, metadata_path,
};
