//! Store connection configuration.
//!
//! # Responsibility
//! - Resolve which store instance and collection a session binds to.
//!
//! # Invariants
//! - Explicit overrides win over environment values, which win over defaults.
//! - Project and collection ids match `[a-z0-9_-]+`.
//! - These values are identifiers, not secrets; they may be logged.

use crate::store::is_valid_identifier;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_PROJECT_ID: &str = "NOTEFEED_PROJECT_ID";
pub const ENV_COLLECTION: &str = "NOTEFEED_COLLECTION";
pub const ENV_DB_PATH: &str = "NOTEFEED_DB_PATH";

pub const DEFAULT_PROJECT_ID: &str = "notefeed";
pub const DEFAULT_COLLECTION: &str = "notes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidProjectId(String),
    InvalidCollection(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidProjectId(value) => {
                write!(f, "project id `{value}` must match [a-z0-9_-]+")
            }
            Self::InvalidCollection(value) => {
                write!(f, "collection `{value}` must match [a-z0-9_-]+")
            }
        }
    }
}

impl Error for ConfigError {}

/// Caller-supplied values that take precedence over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub project_id: Option<String>,
    pub collection: Option<String>,
    pub db_path: Option<PathBuf>,
}

/// Resolved store binding for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub project_id: String,
    pub collection: String,
    /// SQLite file backing the project.
    pub db_path: PathBuf,
}

impl StoreConfig {
    /// Resolves configuration from overrides and process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves configuration using `lookup` for environment values.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let project_id = overrides
            .project_id
            .or_else(|| env(ENV_PROJECT_ID))
            .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());
        if !is_valid_identifier(&project_id) {
            return Err(ConfigError::InvalidProjectId(project_id));
        }

        let collection = overrides
            .collection
            .or_else(|| env(ENV_COLLECTION))
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        if !is_valid_identifier(&collection) {
            return Err(ConfigError::InvalidCollection(collection));
        }

        let db_path = overrides
            .db_path
            .or_else(|| env(ENV_DB_PATH).map(PathBuf::from))
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{project_id}.sqlite3")));

        Ok(Self {
            project_id,
            collection,
            db_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = StoreConfig::resolve_with(ConfigOverrides::default(), lookup(&[])).unwrap();
        assert_eq!(config.project_id, DEFAULT_PROJECT_ID);
        assert_eq!(config.collection, DEFAULT_COLLECTION);
        assert!(config.db_path.ends_with("notefeed.sqlite3"));
    }

    #[test]
    fn environment_fills_gaps_and_overrides_win() {
        let env = lookup(&[
            (ENV_PROJECT_ID, "team-a"),
            (ENV_COLLECTION, " shared "),
            (ENV_DB_PATH, "/var/lib/notefeed/a.sqlite3"),
        ]);
        let overrides = ConfigOverrides {
            collection: Some("mine".to_string()),
            ..ConfigOverrides::default()
        };
        let config = StoreConfig::resolve_with(overrides, env).unwrap();
        assert_eq!(config.project_id, "team-a");
        assert_eq!(config.collection, "mine");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/notefeed/a.sqlite3"));
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        let err = StoreConfig::resolve_with(
            ConfigOverrides::default(),
            lookup(&[(ENV_COLLECTION, "My Notes")]),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidCollection("My Notes".to_string()));

        let overrides = ConfigOverrides {
            project_id: Some("../etc".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            StoreConfig::resolve_with(overrides, lookup(&[])),
            Err(ConfigError::InvalidProjectId(_))
        ));
    }
}
