//! Configuration loading from capstan.toml.

use runtime::{DEFAULT_IMPORT_TIMEOUT, DEFAULT_INSTANTIATE_TIMEOUT, FailureMode, LoaderConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
///
/// Relative paths are resolved against the directory holding the config file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// JSON file listing the module ids to load.
    #[serde(default = "default_registry")]
    pub registry: PathBuf,

    /// Directory holding `<module id>/extension.json`.
    #[serde(default = "default_extensions_dir")]
    pub extensions_dir: PathBuf,

    /// SQLite database file. Defaults to the user data directory.
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub loader: LoaderSection,

    #[serde(default)]
    pub log: LogSection,
}

/// `[loader]` table.
#[derive(Debug, Deserialize)]
pub struct LoaderSection {
    #[serde(default)]
    pub failure_mode: FailureMode,

    /// Bound on importing one module and reading its metadata.
    #[serde(default = "default_import_timeout_secs")]
    pub import_timeout_secs: u64,

    /// Bound on one extension constructor.
    #[serde(default = "default_instantiate_timeout_secs")]
    pub instantiate_timeout_secs: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::default(),
            import_timeout_secs: default_import_timeout_secs(),
            instantiate_timeout_secs: default_instantiate_timeout_secs(),
        }
    }
}

/// `[log]` table.
#[derive(Debug, Deserialize)]
pub struct LogSection {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_registry() -> PathBuf {
    PathBuf::from("modules.json")
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

fn default_import_timeout_secs() -> u64 {
    DEFAULT_IMPORT_TIMEOUT.as_secs()
}

fn default_instantiate_timeout_secs() -> u64 {
    DEFAULT_INSTANTIATE_TIMEOUT.as_secs()
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        Ok(match path.parent() {
            Some(base) => config.relative_to(base),
            None => config,
        })
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for (key, secs) in [
            ("import_timeout_secs", config.loader.import_timeout_secs),
            ("instantiate_timeout_secs", config.loader.instantiate_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "loader.{key} must be greater than zero"
                )));
            }
        }
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        Self {
            registry: default_registry(),
            extensions_dir: default_extensions_dir(),
            database: None,
            loader: LoaderSection::default(),
            log: LogSection::default(),
        }
    }

    /// Settings for the module loader.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            failure_mode: self.loader.failure_mode,
            import_timeout: Duration::from_secs(self.loader.import_timeout_secs),
            instantiate_timeout: Duration::from_secs(self.loader.instantiate_timeout_secs),
        }
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let anchor = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        self.registry = anchor(self.registry);
        self.extensions_dir = anchor(self.extensions_dir);
        self.database = self.database.map(anchor);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.registry, PathBuf::from("modules.json"));
        assert_eq!(config.extensions_dir, PathBuf::from("extensions"));
        assert!(config.database.is_none());
        assert_eq!(config.loader.failure_mode, FailureMode::Isolate);
        assert_eq!(config.loader_config().import_timeout, DEFAULT_IMPORT_TIMEOUT);
        assert_eq!(
            config.loader_config().instantiate_timeout,
            DEFAULT_INSTANTIATE_TIMEOUT
        );
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn parses_every_key() {
        let config = Config::parse(
            r#"
            registry = "conf/modules.json"
            extensions_dir = "/opt/capstan/extensions"
            database = "data/capstan.db"

            [loader]
            failure_mode = "all_or_nothing"
            import_timeout_secs = 5
            instantiate_timeout_secs = 2

            [log]
            level = "capstan=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.registry, PathBuf::from("conf/modules.json"));
        assert_eq!(config.database, Some(PathBuf::from("data/capstan.db")));
        let loader = config.loader_config();
        assert_eq!(loader.failure_mode, FailureMode::AllOrNothing);
        assert_eq!(loader.import_timeout, Duration::from_secs(5));
        assert_eq!(loader.instantiate_timeout, Duration::from_secs(2));
        assert_eq!(config.log.level, "capstan=debug");
    }

    #[test]
    fn rejects_unknown_failure_mode() {
        let err = Config::parse("[loader]\nfailure_mode = \"halt\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::parse("[loader]\nimport_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = Config::parse("[loader]\ninstantiate_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("instantiate_timeout_secs"));
    }

    #[test]
    fn load_anchors_relative_paths_to_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capstan.toml");
        std::fs::write(
            &path,
            "registry = \"modules.json\"\nextensions_dir = \"/srv/extensions\"\ndatabase = \"capstan.db\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry, dir.path().join("modules.json"));
        assert_eq!(config.extensions_dir, PathBuf::from("/srv/extensions"));
        assert_eq!(config.database, Some(dir.path().join("capstan.db")));
    }
}
