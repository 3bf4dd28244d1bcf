//! Extensions compiled into the `capstan` binary.
//!
//! Their manifests are not compiled in: each one still needs
//! `<extensions_dir>/<id>/extension.json`, and the loader grants exactly what
//! that file declares.

use runtime::{BoxError, Extension, StaticResolver};
use sdk::{FieldKind, Model, Schema, Sdk};
use serde_json::{Map, Value};
use std::path::Path;

/// Roles the role seeder makes sure exist.
const SEEDED_ROLES: [&str; 2] = ["admin", "member"];

/// A resolver knowing every built-in extension.
pub fn resolver(extensions_dir: &Path) -> StaticResolver {
    let mut resolver = StaticResolver::with_metadata_dir(extensions_dir);
    resolver
        .register(AuditLog::ID, AuditLog::start)
        .register(RoleSeeder::ID, RoleSeeder::start);
    resolver
}

/// Records module lifecycle events in the `audit_entries` model.
///
/// Needs `database:write`. With `modules:list` it also records which modules
/// were already running when it started.
pub struct AuditLog {
    sdk: Sdk,
    entries: Model,
}

impl AuditLog {
    pub const ID: &'static str = "audit-log";
    const MODEL: &'static str = "audit_entries";

    fn start(sdk: Sdk) -> Result<Box<dyn Extension>, BoxError> {
        let schema = Schema::new()
            .required("event", FieldKind::String)
            .required("module", FieldKind::String)
            .optional("peers", FieldKind::Array);
        let entries = sdk.database().register_model(Self::MODEL, schema)?;

        // No `peers` field: modules:list not granted. `[]`: nothing else running.
        let peers = match sdk.modules().list_modules() {
            Ok(peers) => Some(peers),
            Err(err) if err.denied_permission().is_some() => {
                sdk.logger().debug("modules:list not granted, skipping peers");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let audit = Self { sdk, entries };
        audit.record("started", peers)?;
        audit.sdk.logger().info("audit log ready");
        Ok(Box::new(audit))
    }

    fn record(&self, event: &str, peers: Option<Vec<String>>) -> sdk::Result<()> {
        let mut data = Map::new();
        data.insert("event".into(), event.into());
        data.insert("module".into(), self.sdk.module_id().into());
        if let Some(peers) = peers {
            data.insert("peers".into(), Value::from(peers));
        }
        self.entries.new_document(data)?;
        Ok(())
    }
}

impl Extension for AuditLog {
    fn shutdown(&mut self) {
        if let Err(err) = self.record("stopped", None) {
            self.sdk
                .logger()
                .warn(format!("could not record shutdown: {err}"));
        }
    }
}

/// Creates the default roles when they are missing.
///
/// Needs `roles:list` and `roles:create`.
pub struct RoleSeeder;

impl RoleSeeder {
    pub const ID: &'static str = "role-seeder";

    fn start(sdk: Sdk) -> Result<Box<dyn Extension>, BoxError> {
        let roles = sdk.roles();
        for name in SEEDED_ROLES {
            if roles.role(name)?.is_none() {
                let role = roles.create(name)?;
                sdk.logger()
                    .info(format!("seeded role {} (id {})", role.name(), role.id()));
            }
        }
        Ok(Box::new(RoleSeeder))
    }
}

impl Extension for RoleSeeder {}
