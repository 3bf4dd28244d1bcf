use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Permissions an extension can declare in its manifest.
///
/// Each variant gates exactly one family of operations. Tokens are matched
/// exactly: there is no wildcard or hierarchy between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "database:read")]
    DatabaseRead,
    #[serde(rename = "database:write")]
    DatabaseWrite,
    #[serde(rename = "roles:create")]
    RolesCreate,
    #[serde(rename = "roles:list")]
    RolesList,
    #[serde(rename = "roles:remove")]
    RolesRemove,
    #[serde(rename = "modules:list")]
    ModulesList,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::DatabaseRead,
        Permission::DatabaseWrite,
        Permission::RolesCreate,
        Permission::RolesList,
        Permission::RolesRemove,
        Permission::ModulesList,
    ];

    /// The manifest token for this permission.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::DatabaseRead => "database:read",
            Permission::DatabaseWrite => "database:write",
            Permission::RolesCreate => "roles:create",
            Permission::RolesList => "roles:list",
            Permission::RolesRemove => "roles:remove",
            Permission::ModulesList => "modules:list",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == token)
            .ok_or_else(|| Error::UnknownPermission(token.to_string()))
    }
}

/// An immutable set of permissions granted to one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    inner: BTreeSet<Permission>,
}

impl PermissionSet {
    /// An empty set: every gated operation is denied.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a set from manifest tokens. Any token outside the vocabulary fails.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = tokens
            .into_iter()
            .map(|t| t.as_ref().parse())
            .collect::<Result<_>>()?;
        Ok(Self { inner })
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.inner.contains(&permission)
    }

    /// Exact, case-sensitive token membership.
    pub fn contains_token(&self, token: &str) -> bool {
        token.parse().is_ok_and(|p| self.contains(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.inner.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A copy of this set without `permission`. The original is untouched.
    pub(crate) fn without(&self, permission: Permission) -> Self {
        let mut inner = self.inner.clone();
        inner.remove(&permission);
        Self { inner }
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
