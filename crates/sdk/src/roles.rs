//! Roles capability.

use crate::Result;
use crate::error::check;
use policy::{Grants, Permission};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use storage::{Backend, RoleRecord};

/// How a role is looked up: by numeric id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    Id(i64),
    Name(String),
}

impl From<i64> for RoleRef {
    fn from(id: i64) -> Self {
        RoleRef::Id(id)
    }
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        RoleRef::Name(name.to_string())
    }
}

impl From<String> for RoleRef {
    fn from(name: String) -> Self {
        RoleRef::Name(name)
    }
}

/// Role administration.
#[derive(Clone)]
pub struct Roles {
    grants: Grants,
    backend: Arc<dyn Backend>,
}

impl Roles {
    pub(crate) fn new(grants: Grants, backend: Arc<dyn Backend>) -> Self {
        Self { grants, backend }
    }

    /// Create a role. Requires `roles:create`.
    pub fn create(&self, name: &str) -> Result<Role> {
        check(&self.grants, Permission::RolesCreate)?;
        let record = self.backend.create_role(name)?;
        tracing::info!(role = %record.name, id = record.id, "created role");
        Ok(self.wrap(record))
    }

    /// Look up one role. Requires `roles:list`.
    pub fn role(&self, identifier: impl Into<RoleRef>) -> Result<Option<Role>> {
        check(&self.grants, Permission::RolesList)?;
        let record = match identifier.into() {
            RoleRef::Id(id) => self.backend.role_by_id(id)?,
            RoleRef::Name(name) => self.backend.role_by_name(&name)?,
        };
        Ok(record.map(|r| self.wrap(r)))
    }

    /// All roles. Requires `roles:list`.
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        check(&self.grants, Permission::RolesList)?;
        let records = self.backend.list_roles()?;
        Ok(records.into_iter().map(|r| self.wrap(r)).collect())
    }

    fn wrap(&self, record: RoleRecord) -> Role {
        Role {
            record,
            grants: self.grants.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl fmt::Debug for Roles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Roles").finish_non_exhaustive()
    }
}

/// A handle on one role.
///
/// `name`, `id` and `permissions` read the loaded copy. Mutations are checked
/// against the owning module's grants at call time, not at lookup time.
pub struct Role {
    record: RoleRecord,
    grants: Grants,
    backend: Arc<dyn Backend>,
}

impl Role {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.record.permissions
    }

    /// Rename the role. Requires `roles:create`.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        check(&self.grants, Permission::RolesCreate)?;
        self.backend.rename_role(self.record.id, name)?;
        self.record.name = name.to_string();
        Ok(())
    }

    /// Delete the role. Requires `roles:remove`.
    pub fn delete(&self) -> Result<()> {
        check(&self.grants, Permission::RolesRemove)?;
        self.backend.delete_role(self.record.id)?;
        tracing::info!(role = %self.record.name, id = self.record.id, "deleted role");
        Ok(())
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .finish_non_exhaustive()
    }
}
