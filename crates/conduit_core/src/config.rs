//! Core configuration.
//!
//! # Responsibility
//! - Describe every tunable the core needs (backend choice, storage path,
//!   list paging bounds, logging).
//! - Load values from `.env` files and `CONDUIT_*` environment variables.
//!
//! # Invariants
//! - Core code receives `CoreConfig` explicitly; nothing below the binary
//!   reads the process environment.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CONDUIT";
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Storage backend selected at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SQLite relational store.
    Sql,
    /// Embedded document store.
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnvironment {
    Development,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_environment")]
    pub environment: RunEnvironment,

    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// SQLite file path, or `:memory:`. Ignored by the document backend.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a writer waits for the SQLite write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Page size used when a list request does not specify one.
    #[serde(default = "default_list_limit")]
    pub list_default_limit: u32,

    /// Upper bound applied to any requested page size.
    #[serde(default = "default_list_max_limit")]
    pub list_max_limit: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Absolute directory for rolling log files; logging stays off when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            backend: default_backend(),
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            list_default_limit: default_list_limit(),
            list_max_limit: default_list_max_limit(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Loads `.env` (when present) and `CONDUIT_*` environment variables.
    ///
    /// A missing `.env` is fine; an unreadable or malformed one is an error.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        accept_dotenv(dotenvy::dotenv())?;
        Self::from_environment(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Builds the configuration from an explicit environment source.
    pub fn from_environment(source: Environment) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Resolves the effective page size for a list request.
    ///
    /// Missing or zero limits use the default; larger ones are clamped.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.list_default_limit.min(self.list_max_limit),
            Some(value) => value.min(self.list_max_limit),
        }
    }
}

fn accept_dotenv<T>(result: Result<T, dotenvy::Error>) -> Result<(), config::ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(config::ConfigError::Foreign(Box::new(err))),
    }
}

fn default_environment() -> RunEnvironment {
    RunEnvironment::Development
}

fn default_backend() -> BackendKind {
    BackendKind::Sql
}

fn default_database_path() -> String {
    IN_MEMORY_PATH.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_list_limit() -> u32 {
    20
}

fn default_list_max_limit() -> u32 {
    100
}

fn default_log_level() -> String {
    crate::logging::default_log_level().to_string()
}

#[cfg(test)]
mod tests {
    use super::{accept_dotenv, BackendKind, CoreConfig};
    use config::Environment;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> CoreConfig {
        let source: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CoreConfig::from_environment(
            Environment::with_prefix("CONDUIT")
                .try_parsing(true)
                .source(Some(source)),
        )
        .unwrap()
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = from_pairs(&[
            ("CONDUIT_BACKEND", "document"),
            ("CONDUIT_LIST_MAX_LIMIT", "50"),
            ("CONDUIT_DATABASE_PATH", "/tmp/conduit.db"),
        ]);
        assert_eq!(config.backend, BackendKind::Document);
        assert_eq!(config.list_max_limit, 50);
        assert_eq!(config.database_path, "/tmp/conduit.db");
    }

    #[test]
    fn page_limit_defaults_and_clamps() {
        let config = CoreConfig::default();
        assert_eq!(config.page_limit(None), 20);
        assert_eq!(config.page_limit(Some(0)), 20);
        assert_eq!(config.page_limit(Some(3)), 3);
        assert_eq!(config.page_limit(Some(500)), 100);
    }

    #[test]
    fn missing_dotenv_is_ignored_but_malformed_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(accept_dotenv(dotenvy::from_path(dir.path().join("absent.env"))).is_ok());

        let broken = dir.path().join("broken.env");
        std::fs::write(&broken, "CONDUIT_UNUSED_BROKEN='unterminated\n").unwrap();
        let err = accept_dotenv(dotenvy::from_path(&broken)).unwrap_err();
        assert!(matches!(err, config::ConfigError::Foreign(_)));
    }
}
