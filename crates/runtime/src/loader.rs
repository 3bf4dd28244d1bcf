//! Concurrent, permission-scoped module loading.

use crate::{
    BoxError, Error, ExtensionFactory, LoadedModule, ModuleFailure, ModuleResolver, Registry,
    Result, StartupReport,
};
use policy::{GrantsHandle, Manifest};
use sdk::{ModuleDirectory, Sdk};
use serde::Deserialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use storage::Backend;
use tokio::task::JoinSet;

/// Default bound on importing one module and reading its metadata.
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on one extension constructor.
pub const DEFAULT_INSTANTIATE_TIMEOUT: Duration = Duration::from_secs(30);

/// What a single module's failure does to the rest of the startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Record the failure and keep loading the other modules.
    #[default]
    Isolate,
    /// Abort every in-flight load and discard modules already instantiated.
    AllOrNothing,
}

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub failure_mode: FailureMode,
    pub import_timeout: Duration,
    /// Constructors still running after this are reported as failed and
    /// their eventual instance is dropped without `shutdown`.
    pub instantiate_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::default(),
            import_timeout: DEFAULT_IMPORT_TIMEOUT,
            instantiate_timeout: DEFAULT_INSTANTIATE_TIMEOUT,
        }
    }
}

/// Loader progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    RegistryRead,
    Deduplicated,
    Loading,
    AllSettled,
    Resolved,
    FatalAborted,
}

/// Result of validating one module without instantiating it.
#[derive(Debug)]
pub struct ModuleCheck {
    pub module: String,
    pub outcome: Result<Manifest>,
}

/// Loads the modules named by a registry.
///
/// Each distinct module runs its own pipeline on a tokio task: import, read
/// metadata, validate the manifest, build an [`Sdk`] scoped to the declared
/// permissions, and instantiate. Pipelines run concurrently and share nothing
/// but the storage backend and the module directory.
pub struct Loader<R> {
    resolver: Arc<R>,
    backend: Arc<dyn Backend>,
    directory: ModuleDirectory,
    config: LoaderConfig,
    state: Mutex<LoaderState>,
}

impl<R: ModuleResolver> Loader<R> {
    pub fn new(resolver: R, backend: Arc<dyn Backend>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            backend,
            directory: ModuleDirectory::new(),
            config: LoaderConfig::default(),
            state: Mutex::new(LoaderState::Idle),
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The directory `modules:list` reads from.
    pub fn directory(&self) -> &ModuleDirectory {
        &self.directory
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: LoaderState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::debug!(state = ?next, "loader state");
    }

    /// Read the registry file and load every module it names.
    ///
    /// Only an unreadable registry fails the call; per-module failures are
    /// reported in the [`StartupReport`].
    pub async fn load(&self, registry_path: impl AsRef<Path>) -> Result<StartupReport> {
        let registry = match Registry::read(registry_path).await {
            Ok(registry) => registry,
            Err(err) => {
                tracing::error!(error = %err, "cannot read module registry");
                self.transition(LoaderState::FatalAborted);
                return Err(err);
            }
        };
        Ok(self.load_registry(&registry).await)
    }

    /// Load every distinct module in `registry`.
    pub async fn load_registry(&self, registry: &Registry) -> StartupReport {
        self.transition(LoaderState::RegistryRead);
        tracing::info!(declared = registry.declared().len(), "module registry read");

        let modules = registry.deduplicated();
        self.transition(LoaderState::Deduplicated);

        let known: Arc<HashSet<String>> = Arc::new(modules.iter().cloned().collect());
        let mut tasks = JoinSet::new();
        for module_id in modules {
            let pipeline = Pipeline {
                resolver: Arc::clone(&self.resolver),
                backend: Arc::clone(&self.backend),
                directory: self.directory.clone(),
                known: Arc::clone(&known),
                import_timeout: self.config.import_timeout,
                instantiate_timeout: self.config.instantiate_timeout,
            };
            tasks.spawn(async move {
                let outcome = pipeline.run(&module_id).await;
                (module_id, outcome)
            });
        }
        self.transition(LoaderState::Loading);

        let mut report = StartupReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (module, outcome) = match joined {
                Ok(settled) => settled,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => panic::resume_unwind(err.into_panic()),
            };
            match outcome {
                Ok(loaded) => {
                    tracing::info!(module = %module, "module loaded");
                    report.loaded.push(loaded);
                }
                Err(error) => {
                    tracing::error!(module = %module, %error, "module failed to load");
                    report.failures.push(ModuleFailure { module, error });
                    if self.config.failure_mode == FailureMode::AllOrNothing && !report.aborted {
                        report.aborted = true;
                        tasks.abort_all();
                    }
                }
            }
        }
        self.transition(LoaderState::AllSettled);
        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "all modules settled"
        );

        if report.aborted {
            for module in report.loaded.drain(..) {
                module.shutdown();
            }
            self.directory.clear();
            self.transition(LoaderState::FatalAborted);
        } else {
            self.transition(LoaderState::Resolved);
        }
        report
    }

    /// Validate every module's manifest without instantiating anything.
    pub async fn check(&self, registry: &Registry) -> Vec<ModuleCheck> {
        let mut checks = Vec::new();
        for module in registry.deduplicated() {
            let outcome = self.check_one(&module).await;
            checks.push(ModuleCheck { module, outcome });
        }
        checks
    }

    async fn check_one(&self, module_id: &str) -> Result<Manifest> {
        require_named(module_id)?;
        let resolver = &self.resolver;
        let metadata = tokio::time::timeout(self.config.import_timeout, async {
            resolver
                .import(module_id)
                .await
                .map_err(|e| import_error(module_id, e))?;
            let metadata = resolver
                .metadata(module_id)
                .await
                .map_err(|e| metadata_error(module_id, e))?;
            Ok::<_, Error>(metadata)
        })
        .await
        .map_err(|_| Error::ImportTimeout {
            module: module_id.to_string(),
            after: self.config.import_timeout,
        })??;
        Ok(Manifest::from_metadata(module_id, &metadata)?)
    }
}

/// Everything one module's load needs, owned so it can move onto a task.
struct Pipeline<R> {
    resolver: Arc<R>,
    backend: Arc<dyn Backend>,
    directory: ModuleDirectory,
    known: Arc<HashSet<String>>,
    import_timeout: Duration,
    instantiate_timeout: Duration,
}

impl<R: ModuleResolver> Pipeline<R> {
    async fn run(self, module_id: &str) -> Result<LoadedModule> {
        require_named(module_id)?;
        let resolver = &self.resolver;
        let (factory, metadata) = tokio::time::timeout(self.import_timeout, async {
            let factory = resolver
                .import(module_id)
                .await
                .map_err(|e| import_error(module_id, e))?;
            let metadata = resolver
                .metadata(module_id)
                .await
                .map_err(|e| metadata_error(module_id, e))?;
            Ok::<_, Error>((factory, metadata))
        })
        .await
        .map_err(|_| Error::ImportTimeout {
            module: module_id.to_string(),
            after: self.import_timeout,
        })??;

        let manifest = Manifest::from_metadata(module_id, &metadata)?;
        for dependency in &manifest.dependencies {
            if !self.known.contains(dependency) {
                tracing::warn!(
                    module = module_id,
                    %dependency,
                    "hard dependency is not in the registry"
                );
            }
        }

        let grants = GrantsHandle::new(manifest.permissions);
        let sdk = Sdk::new(module_id, grants.grants(), self.backend, self.directory.clone());
        let instance = instantiate(module_id, factory, sdk, self.instantiate_timeout).await?;
        self.directory.publish(module_id);

        Ok(LoadedModule {
            id: module_id.to_string(),
            version: manifest.version,
            dependencies: manifest.dependencies,
            soft_dependencies: manifest.soft_dependencies,
            grants,
            instance,
        })
    }
}

/// Run the constructor on the blocking pool, bounded by `limit`.
async fn instantiate(
    module_id: &str,
    factory: ExtensionFactory,
    sdk: Sdk,
    limit: Duration,
) -> Result<Box<dyn crate::Extension>> {
    let failed = |reason: String| Error::Instantiate {
        module: module_id.to_string(),
        reason,
    };
    let construct = tokio::task::spawn_blocking(move || factory(sdk));
    match tokio::time::timeout(limit, construct).await {
        Err(_) => Err(Error::InstantiateTimeout {
            module: module_id.to_string(),
            after: limit,
        }),
        Ok(Ok(Ok(instance))) => Ok(instance),
        Ok(Ok(Err(err))) => Err(failed(err.to_string())),
        Ok(Err(join)) if join.is_panic() => Err(failed(format!(
            "constructor panicked: {}",
            panic_message(&*join.into_panic())
        ))),
        Ok(Err(join)) => Err(failed(join.to_string())),
    }
}

/// Blank ids fail as a single module rather than the whole registry.
fn require_named(module_id: &str) -> Result<()> {
    if module_id.trim().is_empty() {
        return Err(Error::Import {
            module: module_id.to_string(),
            reason: "blank module id".to_string(),
        });
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn import_error(module_id: &str, err: BoxError) -> Error {
    Error::Import {
        module: module_id.to_string(),
        reason: err.to_string(),
    }
}

fn metadata_error(module_id: &str, err: BoxError) -> Error {
    Error::Metadata {
        module: module_id.to_string(),
        reason: err.to_string(),
    }
}
