//! The list of modules the host should load.

use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Module identifiers in the order the registry declares them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    modules: Vec<String>,
}

impl Registry {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a registry file: a JSON array of module identifiers.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::RegistryUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        Self::parse(path, &content)
    }

    /// Parse registry content. `path` is only used in error messages.
    pub fn parse(path: impl AsRef<Path>, content: &str) -> Result<Self> {
        let unreadable = |reason: String| Error::RegistryUnreadable {
            path: path.as_ref().to_path_buf(),
            reason,
        };
        let modules: Vec<String> = serde_json::from_str(content)
            .map_err(|e| unreadable(format!("expected a JSON array of module ids: {e}")))?;
        Ok(Self { modules })
    }

    /// Identifiers as declared, duplicates included.
    pub fn declared(&self) -> &[String] {
        &self.modules
    }

    /// Distinct identifiers, keeping the first occurrence of each.
    pub fn deduplicated(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.modules
            .iter()
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect()
    }
}
