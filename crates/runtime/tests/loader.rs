use policy::Permission;
use runtime::{
    BoxError, Error, Extension, ExtensionFactory, FailureMode, Loader, LoaderConfig, LoaderState,
    METADATA_FILE, ModuleResolver, Registry, StartupReport, StaticResolver,
};
use sdk::{Modules, Role, Sdk};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use storage::SqliteStore;

fn manifest(permissions: &[&str]) -> Value {
    json!({
        "permissions": permissions,
        "userPermissions": [],
        "dependencies": [],
        "softDependencies": []
    })
}

fn backend() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().unwrap())
}

struct Tracked {
    stopped: Arc<AtomicBool>,
}

impl Extension for Tracked {
    fn shutdown(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Registers `id` with a constructor that counts its invocations.
fn counted(
    resolver: &mut StaticResolver,
    id: &str,
    metadata: Value,
) -> (Arc<AtomicUsize>, Arc<AtomicBool>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let (c, s) = (calls.clone(), stopped.clone());
    resolver.register_with_metadata(id, metadata, move |_sdk| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Tracked { stopped: s.clone() }))
    });
    (calls, stopped)
}

#[tokio::test]
async fn duplicate_ids_load_once_and_incomplete_manifest_is_reported() {
    let mut resolver = StaticResolver::inline();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let calls_a = Arc::new(AtomicUsize::new(0));
    {
        let observed = observed.clone();
        let calls_a = calls_a.clone();
        resolver.register_with_metadata("moduleA", manifest(&["database:read"]), move |sdk| {
            calls_a.fetch_add(1, Ordering::SeqCst);
            let mut seen = observed.lock().unwrap();
            seen.push(("model", sdk.database().model("grades").is_ok()));
            seen.push(("create", sdk.roles().create("admin").is_ok()));
            seen.push(("list", sdk.roles().list_roles().is_ok()));
            Ok(Box::new(Tracked {
                stopped: Arc::new(AtomicBool::new(false)),
            }))
        });
    }
    let mut incomplete = manifest(&[]);
    incomplete.as_object_mut().unwrap().remove("dependencies");
    let (calls_b, _) = counted(&mut resolver, "moduleB", incomplete);

    let loader = Loader::new(resolver, backend());
    let registry = Registry::new(["moduleA", "moduleA", "moduleB"]);
    let report = loader.load_registry(&registry).await;

    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 0);
    assert_eq!(
        *observed.lock().unwrap(),
        [("model", true), ("create", false), ("list", false)]
    );
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(report.loaded[0].id(), "moduleA");
    assert!(!report.aborted);
    assert_eq!(loader.state(), LoaderState::Resolved);

    let err = report.into_result().unwrap_err();
    let Error::Startup { failures } = &err else {
        panic!("expected startup failure, got {err}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].module, "moduleB");
    assert!(matches!(
        failures[0].error,
        Error::Manifest(policy::Error::ManifestIncomplete {
            field: "dependencies",
            ..
        })
    ));
    assert_eq!(failures[0].error.module(), Some("moduleB"));
    assert!(err.to_string().contains("moduleB"));
}

#[tokio::test]
async fn modules_list_only_grant() {
    let mut resolver = StaticResolver::inline();
    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    resolver.register_with_metadata("directory", manifest(&["modules:list"]), move |sdk| {
        let listed = sdk.modules().list_modules().unwrap();
        let denied = sdk.roles().create("admin").unwrap_err().denied_permission();
        *slot.lock().unwrap() = Some((listed, denied));
        Ok(Box::new(Tracked {
            stopped: Arc::new(AtomicBool::new(false)),
        }))
    });

    let loader = Loader::new(resolver, backend());
    let modules = loader
        .load_registry(&Registry::new(["directory"]))
        .await
        .into_result()
        .unwrap();
    assert_eq!(modules.len(), 1);

    let (listed, denied) = outcome.lock().unwrap().take().unwrap();
    assert!(listed.is_empty());
    assert_eq!(denied, Some(Permission::RolesCreate));
}

#[tokio::test]
async fn every_missing_field_fails_the_module() {
    for field in ["permissions", "userPermissions", "dependencies", "softDependencies"] {
        let mut metadata = manifest(&["database:read"]);
        metadata.as_object_mut().unwrap().remove(field);
        let mut resolver = StaticResolver::inline();
        let (calls, _) = counted(&mut resolver, "broken", metadata);

        let report = Loader::new(resolver, backend())
            .load_registry(&Registry::new(["broken"]))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "{field}");
        assert!(report.loaded.is_empty());
        assert!(matches!(
            report.failures[0].error,
            Error::Manifest(policy::Error::ManifestIncomplete { field: f, .. }) if f == field
        ));
    }
}

#[tokio::test]
async fn all_or_nothing_discards_loaded_modules() {
    let mut inner = StaticResolver::inline();
    let (calls_ok, stopped_ok) = counted(&mut inner, "good", manifest(&[]));
    inner.register_with_metadata("bad", manifest(&[]), |_sdk| Err("boom".into()));
    let resolver = DelayedResolver::new(inner, "bad", Duration::from_millis(200));

    let loader = Loader::new(resolver, backend()).with_config(LoaderConfig {
        failure_mode: FailureMode::AllOrNothing,
        ..LoaderConfig::default()
    });
    let report = loader.load_registry(&Registry::new(["good", "bad"])).await;

    assert!(report.aborted);
    assert!(report.loaded.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].error, Error::Instantiate { .. }));
    assert_eq!(loader.state(), LoaderState::FatalAborted);
    assert!(loader.directory().list().is_empty());
    assert_eq!(calls_ok.load(Ordering::SeqCst), 1);
    assert!(stopped_ok.load(Ordering::SeqCst));
}

#[tokio::test]
async fn isolate_keeps_siblings_running() {
    let mut resolver = StaticResolver::inline();
    let (calls_ok, stopped_ok) = counted(&mut resolver, "good", manifest(&[]));
    resolver.register_with_metadata("panics", manifest(&[]), |_sdk| panic!("constructor bug"));

    let loader = Loader::new(resolver, backend());
    let report = loader
        .load_registry(&Registry::new(["panics", "good", "missing"]))
        .await;

    assert_eq!(calls_ok.load(Ordering::SeqCst), 1);
    assert!(!stopped_ok.load(Ordering::SeqCst));
    assert!(report.module("good").is_some());
    assert_eq!(report.failures.len(), 2);

    match failure(&report, "panics") {
        Error::Instantiate { reason, .. } => assert!(reason.contains("constructor bug")),
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(failure(&report, "missing"), Error::Import { .. }));
    assert_eq!(loader.directory().list(), ["good"]);
}

fn failure<'r>(report: &'r StartupReport, module: &str) -> &'r Error {
    &report
        .failures
        .iter()
        .find(|f| f.module == module)
        .unwrap()
        .error
}

/// Resolver that holds back the import of one module.
struct DelayedResolver {
    inner: StaticResolver,
    delayed: &'static str,
    delay: Duration,
}

impl DelayedResolver {
    fn new(inner: StaticResolver, delayed: &'static str, delay: Duration) -> Self {
        Self {
            inner,
            delayed,
            delay,
        }
    }
}

impl ModuleResolver for DelayedResolver {
    async fn import(&self, module_id: &str) -> Result<ExtensionFactory, BoxError> {
        if module_id == self.delayed {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.import(module_id).await
    }

    async fn metadata(&self, module_id: &str) -> Result<Value, BoxError> {
        self.inner.metadata(module_id).await
    }
}

#[tokio::test]
async fn hung_import_times_out_without_stalling_siblings() {
    let mut inner = StaticResolver::inline();
    let (calls_fast, _) = counted(&mut inner, "fast", manifest(&[]));
    counted(&mut inner, "slow", manifest(&[]));

    let resolver = DelayedResolver::new(inner, "slow", Duration::from_secs(600));
    let loader = Loader::new(resolver, backend()).with_config(LoaderConfig {
        import_timeout: Duration::from_millis(100),
        ..LoaderConfig::default()
    });
    let report = loader.load_registry(&Registry::new(["slow", "fast"])).await;

    assert_eq!(calls_fast.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0].error,
        Error::ImportTimeout { module, .. } if module == "slow"
    ));
}

#[tokio::test]
async fn stuck_constructor_times_out_without_stalling_siblings() {
    let mut resolver = StaticResolver::inline();
    let (calls_fast, _) = counted(&mut resolver, "fast", manifest(&[]));
    let release = Arc::new(AtomicBool::new(false));
    let held = release.clone();
    resolver.register_with_metadata("stuck", manifest(&[]), move |_sdk| {
        let started = Instant::now();
        while !held.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(30) {
            std::thread::sleep(Duration::from_millis(10));
        }
        Err("released".into())
    });

    let loader = Loader::new(resolver, backend()).with_config(LoaderConfig {
        instantiate_timeout: Duration::from_millis(100),
        ..LoaderConfig::default()
    });
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        loader.load_registry(&Registry::new(["stuck", "fast"])),
    )
    .await
    .unwrap();
    release.store(true, Ordering::SeqCst);

    assert_eq!(calls_fast.load(Ordering::SeqCst), 1);
    assert!(report.module("fast").is_some());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        failure(&report, "stuck"),
        Error::InstantiateTimeout { after, .. } if *after == Duration::from_millis(100)
    ));
    assert_eq!(loader.directory().list(), ["fast"]);
}

#[tokio::test]
async fn blank_id_fails_only_that_module() {
    let mut resolver = StaticResolver::inline();
    let (calls, _) = counted(&mut resolver, "gradebook", manifest(&[]));

    let loader = Loader::new(resolver, backend());
    let registry = Registry::parse("modules.json", r#"["gradebook", " "]"#).unwrap();
    let report = loader.load_registry(&registry).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.loaded.len(), 1);
    assert!(matches!(
        failure(&report, " "),
        Error::Import { reason, .. } if reason.contains("blank")
    ));

    let checks = loader.check(&registry).await;
    assert!(checks[0].outcome.is_ok());
    assert!(matches!(checks[1].outcome, Err(Error::Import { .. })));
}

#[tokio::test]
async fn role_handles_observe_revocation_after_startup() {
    let mut resolver = StaticResolver::inline();
    let stash: Arc<Mutex<Option<Role>>> = Arc::new(Mutex::new(None));
    let slot = stash.clone();
    resolver.register_with_metadata(
        "admin-tools",
        manifest(&["roles:create", "roles:list", "roles:remove"]),
        move |sdk: Sdk| {
            let role = sdk.roles().create("temporary")?;
            *slot.lock().unwrap() = Some(role);
            Ok(Box::new(Tracked {
                stopped: Arc::new(AtomicBool::new(false)),
            }))
        },
    );

    let loader = Loader::new(resolver, backend());
    let report = loader.load_registry(&Registry::new(["admin-tools"])).await;
    let module = report.module("admin-tools").unwrap();
    assert!(module.permissions().contains(Permission::RolesRemove));

    assert!(module.revoke(Permission::RolesRemove));
    let role = stash.lock().unwrap().take().unwrap();
    let err = role.delete().unwrap_err();
    assert_eq!(err.denied_permission(), Some(Permission::RolesRemove));
    assert!(!module.permissions().contains(Permission::RolesRemove));
}

#[tokio::test]
async fn list_modules_sees_siblings_once_loaded() {
    let mut resolver = StaticResolver::inline();
    let handles: Arc<Mutex<HashMap<String, Modules>>> = Arc::default();
    for id in ["alpha", "beta"] {
        let handles = handles.clone();
        resolver.register_with_metadata(id, manifest(&["modules:list"]), move |sdk| {
            handles
                .lock()
                .unwrap()
                .insert(sdk.module_id().to_string(), sdk.modules().clone());
            Ok(Box::new(Tracked {
                stopped: Arc::new(AtomicBool::new(false)),
            }))
        });
    }

    let loader = Loader::new(resolver, backend());
    let report = loader.load_registry(&Registry::new(["alpha", "beta"])).await;
    assert!(report.is_success());

    let handles = handles.lock().unwrap();
    assert_eq!(handles["alpha"].list_modules().unwrap(), ["beta"]);
    assert_eq!(handles["beta"].list_modules().unwrap(), ["alpha"]);
}

#[tokio::test]
async fn unreadable_registry_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modules.json");
    std::fs::write(&path, r#"{"not": "a list"}"#).unwrap();

    let loader = Loader::new(StaticResolver::inline(), backend());
    let err = loader.load(&path).await.unwrap_err();
    assert!(matches!(err, Error::RegistryUnreadable { .. }));
    assert_eq!(loader.state(), LoaderState::FatalAborted);
}

#[tokio::test]
async fn loads_and_checks_from_metadata_directory() {
    let dir = tempfile::tempdir().unwrap();
    let write = |id: &str, metadata: Value| {
        let module_dir = dir.path().join("extensions").join(id);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join(METADATA_FILE), metadata.to_string()).unwrap();
    };
    write("gradebook", manifest(&["database:read", "database:write"]));
    write("calendar", json!({"permissions": ["calendar:write"]}));
    let registry_path = dir.path().join("modules.json");
    std::fs::write(&registry_path, r#"["gradebook", "calendar", "gradebook"]"#).unwrap();

    let mut resolver = StaticResolver::with_metadata_dir(dir.path().join("extensions"));
    let (calls, _) = counted(&mut resolver, "gradebook", Value::Null);
    counted(&mut resolver, "calendar", Value::Null);
    let loader = Loader::new(resolver, backend());

    let registry = Registry::read(&registry_path).await.unwrap();
    let checks = loader.check(&registry).await;
    assert_eq!(checks.len(), 2);
    assert!(checks[0].outcome.is_ok());
    assert!(matches!(
        checks[1].outcome,
        Err(Error::Manifest(policy::Error::ManifestIncomplete { .. }))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let report = loader.load(&registry_path).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(report.failures[0].module, "calendar");
}
