//! Resolving module identifiers to code and metadata.

use sdk::Sdk;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Error type for resolver and extension failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// File holding a module's manifest inside its directory.
pub const METADATA_FILE: &str = "extension.json";

/// A running extension instance.
///
/// The instance owns the [`Sdk`] it was constructed with; its capabilities
/// live exactly as long as the instance does.
pub trait Extension: Send + 'static {
    /// Called once when the host stops or discards the instance.
    fn shutdown(&mut self) {}
}

/// Constructor for one extension: receives the module's scoped SDK.
pub type ExtensionFactory = Arc<dyn Fn(Sdk) -> Result<Box<dyn Extension>, BoxError> + Send + Sync>;

/// Trait for module resolvers.
///
/// This is the boundary between the loader and however extension code is
/// linked into the host: a static table, dynamic libraries, subprocesses.
pub trait ModuleResolver: Send + Sync + 'static {
    /// Resolve the module's constructor.
    fn import(
        &self,
        module_id: &str,
    ) -> impl Future<Output = Result<ExtensionFactory, BoxError>> + Send;

    /// Read the module's packaged metadata.
    fn metadata(&self, module_id: &str) -> impl Future<Output = Result<Value, BoxError>> + Send;
}

/// Where a [`StaticResolver`] finds module metadata.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    /// `<root>/<module id>/extension.json`
    Directory(PathBuf),
    /// Metadata supplied with each registration.
    Inline,
}

/// A table of extension constructors compiled into the host.
pub struct StaticResolver {
    factories: HashMap<String, ExtensionFactory>,
    inline: HashMap<String, Value>,
    source: MetadataSource,
}

impl StaticResolver {
    /// A resolver reading metadata from `<root>/<module id>/extension.json`.
    pub fn with_metadata_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(MetadataSource::Directory(root.into()))
    }

    /// A resolver whose metadata is passed to [`register_with_metadata`](Self::register_with_metadata).
    pub fn inline() -> Self {
        Self::new(MetadataSource::Inline)
    }

    fn new(source: MetadataSource) -> Self {
        Self {
            factories: HashMap::new(),
            inline: HashMap::new(),
            source,
        }
    }

    /// Register a constructor under `module_id`.
    pub fn register<F>(&mut self, module_id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Sdk) -> Result<Box<dyn Extension>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(module_id.into(), Arc::new(factory));
        self
    }

    /// Register a constructor together with its metadata.
    pub fn register_with_metadata<F>(
        &mut self,
        module_id: impl Into<String>,
        metadata: Value,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(Sdk) -> Result<Box<dyn Extension>, BoxError> + Send + Sync + 'static,
    {
        let module_id = module_id.into();
        self.inline.insert(module_id.clone(), metadata);
        self.register(module_id, factory)
    }

    /// Identifiers with a registered constructor.
    pub fn known_modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResolver")
            .field("modules", &self.factories.keys().collect::<Vec<_>>())
            .field("source", &self.source)
            .finish()
    }
}

impl ModuleResolver for StaticResolver {
    async fn import(&self, module_id: &str) -> Result<ExtensionFactory, BoxError> {
        self.factories
            .get(module_id)
            .cloned()
            .ok_or_else(|| format!("no extension is registered as '{module_id}'").into())
    }

    async fn metadata(&self, module_id: &str) -> Result<Value, BoxError> {
        match &self.source {
            MetadataSource::Inline => self
                .inline
                .get(module_id)
                .cloned()
                .ok_or_else(|| format!("no metadata registered for '{module_id}'").into()),
            MetadataSource::Directory(root) => {
                let path = metadata_path(root, module_id)?;
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| format!("{}: {e}", path.display()))?;
                Ok(serde_json::from_str(&content)
                    .map_err(|e| format!("{}: {e}", path.display()))?)
            }
        }
    }
}

/// Path of a module's metadata file, refusing ids that escape `root`.
pub fn metadata_path(root: &Path, module_id: &str) -> Result<PathBuf, BoxError> {
    let mut components = Path::new(module_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(root.join(module_id).join(METADATA_FILE)),
        _ => Err(format!("'{module_id}' is not a valid module directory name").into()),
    }
}
