//! Startup configuration for hosts embedding the core.
//!
//! # Responsibility
//! - Parse one JSON document describing logging, storage and sref prefixes.
//! - Turn it into a ready registry, logger and database connection.
//!
//! # Invariants
//! - Missing keys fall back to defaults; unknown keys are rejected.
//! - No side effects happen while parsing.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{default_log_level, init_logging};
use crate::registry::{RegistryError, SrefRegistry};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Core configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute log directory. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    /// SQLite file. An in-memory database is used when unset.
    pub database_path: Option<PathBuf>,
    /// Scope name → sref prefix.
    pub sref_prefixes: BTreeMap<String, String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            database_path: None,
            sref_prefixes: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Registry(RegistryError),
    Logging(String),
    Db(DbError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Logging(message) => write!(f, "logging init failed: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Logging(_) => None,
        }
    }
}

impl From<RegistryError> for ConfigError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl CoreConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Builds a registry holding every configured prefix.
    pub fn build_registry(&self) -> Result<SrefRegistry, ConfigError> {
        let mut registry = SrefRegistry::new();
        for (scope, prefix) in &self.sref_prefixes {
            registry.register(scope, prefix)?;
        }
        Ok(registry)
    }

    /// Starts file logging when `log_dir` is set.
    ///
    /// Returns whether logging was configured.
    pub fn init_logging(&self) -> Result<bool, ConfigError> {
        let Some(log_dir) = self.log_dir.as_deref() else {
            return Ok(false);
        };
        let log_dir = log_dir.to_str().ok_or_else(|| {
            ConfigError::Logging(format!("log_dir `{}` is not UTF-8", log_dir.display()))
        })?;
        init_logging(&self.log_level, log_dir).map_err(ConfigError::Logging)?;
        Ok(true)
    }

    /// Opens the configured database with migrations applied.
    pub fn open_database(&self) -> Result<Connection, ConfigError> {
        let conn = match self.database_path.as_deref() {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use crate::logging::default_log_level;
    use crate::registry::RegistryError;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").expect("empty config");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.log_level, default_log_level());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_json_str(r#"{"log_levle": "info"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn registry_is_built_from_prefixes() {
        let config = CoreConfig::from_json_str(
            r#"{"sref_prefixes": {"accounts.user": "user", "accounts.team": "team"}}"#,
        )
        .expect("valid config");
        let registry = config.build_registry().expect("valid registry");
        assert_eq!(registry.prefix("accounts.user"), Ok("user"));
        assert_eq!(registry.prefix("accounts.team"), Ok("team"));
    }

    #[test]
    fn conflicting_prefixes_fail_registry_build() {
        let config = CoreConfig::from_json_str(r#"{"sref_prefixes": {"a": "same", "b": "same"}}"#)
            .expect("valid config");
        let err = config.build_registry().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Registry(RegistryError::DuplicatePrefix { .. })
        ));
    }

    #[test]
    fn logging_is_skipped_without_log_dir() {
        let config = CoreConfig::default();
        assert!(!config.init_logging().expect("no-op logging"));
    }

    #[test]
    fn database_defaults_to_memory() {
        let config = CoreConfig::default();
        let conn = config.open_database().expect("in-memory database");
        crate::db::migrations::ensure_migrated(&conn).expect("migrated");
    }
}
