//! Extension manifest declaration and validation.

use crate::{Error, PermissionSet, Result};
use serde_json::{Map, Value};

/// Fields every manifest must declare, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 4] = [
    "permissions",
    "userPermissions",
    "dependencies",
    "softDependencies",
];

/// Validated per-module metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Operations the module may perform.
    pub permissions: PermissionSet,
    /// Reserved for per-end-user scoping; recorded, never enforced.
    pub user_permissions: Vec<String>,
    /// Hard requirements on other modules.
    pub dependencies: Vec<String>,
    /// Optional requirements on other modules.
    pub soft_dependencies: Vec<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl Manifest {
    /// Parse and validate a manifest from JSON text.
    pub fn parse(module: &str, json: &str) -> Result<Self> {
        let metadata: Value = serde_json::from_str(json).map_err(|e| Error::ManifestMalformed {
            module: module.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_metadata(module, &metadata)
    }

    /// Validate already-parsed metadata for `module`.
    ///
    /// A field that is absent or `null` makes the manifest incomplete; an
    /// explicitly empty list is valid.
    pub fn from_metadata(module: &str, metadata: &Value) -> Result<Self> {
        let malformed = |reason: String| Error::ManifestMalformed {
            module: module.to_string(),
            reason,
        };

        let object = metadata
            .as_object()
            .ok_or_else(|| malformed("metadata is not a JSON object".to_string()))?;

        if let Some(field) = REQUIRED_FIELDS
            .into_iter()
            .find(|f| object.get(*f).is_none_or(Value::is_null))
        {
            return Err(Error::ManifestIncomplete {
                module: module.to_string(),
                field,
            });
        }

        let permissions = string_list(object, "permissions").map_err(&malformed)?;
        let permissions =
            PermissionSet::from_tokens(&permissions).map_err(|e| malformed(e.to_string()))?;

        Ok(Self {
            permissions,
            user_permissions: string_list(object, "userPermissions").map_err(&malformed)?,
            dependencies: string_list(object, "dependencies").map_err(&malformed)?,
            soft_dependencies: string_list(object, "softDependencies").map_err(&malformed)?,
            version: optional_string(object, "version").map_err(&malformed)?,
            description: optional_string(object, "description").map_err(&malformed)?,
        })
    }
}

fn string_list(object: &Map<String, Value>, field: &str) -> std::result::Result<Vec<String>, String> {
    let Some(Value::Array(items)) = object.get(field) else {
        return Err(format!("`{field}` must be a list of strings"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("`{field}` contains a non-string entry: {item}"))
        })
        .collect()
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<String>, String> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("`{field}` must be a string, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Permission;
    use serde_json::json;

    fn complete() -> Value {
        json!({
            "permissions": ["database:read", "roles:list"],
            "userPermissions": [],
            "dependencies": ["core-accounts"],
            "softDependencies": [],
            "version": "1.2.0"
        })
    }

    #[test]
    fn accepts_complete_manifest() {
        let manifest = Manifest::from_metadata("gradebook", &complete()).unwrap();
        assert!(manifest.permissions.contains(Permission::DatabaseRead));
        assert!(manifest.permissions.contains(Permission::RolesList));
        assert_eq!(manifest.dependencies, vec!["core-accounts".to_string()]);
        assert!(manifest.soft_dependencies.is_empty());
        assert_eq!(manifest.version.as_deref(), Some("1.2.0"));
        assert_eq!(manifest.description, None);
    }

    #[test]
    fn every_missing_field_is_incomplete() {
        for field in REQUIRED_FIELDS {
            let mut metadata = complete();
            metadata.as_object_mut().unwrap().remove(field);
            let err = Manifest::from_metadata("gradebook", &metadata).unwrap_err();
            assert_eq!(
                err,
                Error::ManifestIncomplete {
                    module: "gradebook".into(),
                    field,
                }
            );
            assert_eq!(err.module(), Some("gradebook"));
        }
    }

    #[test]
    fn null_field_counts_as_missing() {
        let mut metadata = complete();
        metadata["softDependencies"] = Value::Null;
        let err = Manifest::from_metadata("m", &metadata).unwrap_err();
        assert!(matches!(
            err,
            Error::ManifestIncomplete {
                field: "softDependencies",
                ..
            }
        ));
    }

    #[test]
    fn empty_lists_are_valid() {
        let metadata = json!({
            "permissions": [],
            "userPermissions": [],
            "dependencies": [],
            "softDependencies": []
        });
        let manifest = Manifest::from_metadata("m", &metadata).unwrap();
        assert!(manifest.permissions.is_empty());
    }

    #[test]
    fn rejects_non_string_entries() {
        let mut metadata = complete();
        metadata["dependencies"] = json!(["a", 3]);
        let err = Manifest::from_metadata("m", &metadata).unwrap_err();
        assert!(matches!(err, Error::ManifestMalformed { .. }));
    }

    #[test]
    fn rejects_scalar_field() {
        let mut metadata = complete();
        metadata["permissions"] = json!("database:read");
        let err = Manifest::from_metadata("m", &metadata).unwrap_err();
        assert!(matches!(err, Error::ManifestMalformed { .. }));
    }

    #[test]
    fn rejects_unknown_permission() {
        let mut metadata = complete();
        metadata["permissions"] = json!(["roles:*"]);
        let err = Manifest::from_metadata("m", &metadata).unwrap_err();
        let Error::ManifestMalformed { module, reason } = err else {
            panic!("expected malformed manifest");
        };
        assert_eq!(module, "m");
        assert!(reason.contains("roles:*"));
    }

    #[test]
    fn rejects_non_object_metadata() {
        let err = Manifest::parse("m", "[1, 2]").unwrap_err();
        assert!(matches!(err, Error::ManifestMalformed { .. }));
        let err = Manifest::parse("m", "{ not json").unwrap_err();
        assert!(matches!(err, Error::ManifestMalformed { .. }));
    }
}
