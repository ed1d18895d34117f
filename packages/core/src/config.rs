//! Runtime configuration
//!
//! `AppConfig` is built once at startup from environment variables, with a
//! default for everything:
//!
//! | Variable | Default |
//! |---|---|
//! | `RETROSPACE_DB_PATH` | `~/.retrospace/database/retrospace.db` |
//! | `RETROSPACE_SUGGESTION_LIMIT` | `5` (1 to 8) |
//! | `RETROSPACE_EVENT_CAPACITY` | `128` |
//! | `RETROSPACE_NOTICE_CAPACITY` | `50` |

use crate::db::DEFAULT_EVENT_CAPACITY;
use crate::feedback::DEFAULT_NOTICE_CAPACITY;
use std::path::PathBuf;
use thiserror::Error;

pub const DB_PATH_VAR: &str = "RETROSPACE_DB_PATH";
pub const SUGGESTION_LIMIT_VAR: &str = "RETROSPACE_SUGGESTION_LIMIT";
pub const EVENT_CAPACITY_VAR: &str = "RETROSPACE_EVENT_CAPACITY";
pub const NOTICE_CAPACITY_VAR: &str = "RETROSPACE_NOTICE_CAPACITY";

pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;
pub const MAX_SUGGESTION_LIMIT: usize = 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: String, value: String },

    #[error("Suggestion limit must be between 1 and {max}, got {value}")]
    SuggestionLimitOutOfRange { value: usize, max: usize },

    #[error("{0} must be greater than 0")]
    ZeroCapacity(String),

    #[error("Cannot determine home directory for the default database path")]
    NoHomeDirectory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// libsql database file
    pub database_path: PathBuf,

    /// Cap on mention autocomplete suggestions
    pub suggestion_limit: usize,

    /// Buffered change events per subscriber before lagging
    pub event_capacity: usize,

    /// Notices kept by the notice board
    pub notice_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path()
                .unwrap_or_else(|_| PathBuf::from("retrospace.db")),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(|var| std::env::var(var).ok())
    }

    /// Build configuration from a variable lookup
    ///
    /// Unset or blank variables take their default; the result is validated.
    pub fn from_env<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        let database_path = match get(DB_PATH_VAR) {
            Some(path) => {
                tracing::info!("Using database path from {}: {}", DB_PATH_VAR, path);
                PathBuf::from(path)
            }
            None => default_database_path()?,
        };

        let config = Self {
            database_path,
            suggestion_limit: parse_number(SUGGESTION_LIMIT_VAR, get(SUGGESTION_LIMIT_VAR))?
                .unwrap_or(DEFAULT_SUGGESTION_LIMIT),
            event_capacity: parse_number(EVENT_CAPACITY_VAR, get(EVENT_CAPACITY_VAR))?
                .unwrap_or(DEFAULT_EVENT_CAPACITY),
            notice_capacity: parse_number(NOTICE_CAPACITY_VAR, get(NOTICE_CAPACITY_VAR))?
                .unwrap_or(DEFAULT_NOTICE_CAPACITY),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suggestion_limit == 0 || self.suggestion_limit > MAX_SUGGESTION_LIMIT {
            return Err(ConfigError::SuggestionLimitOutOfRange {
                value: self.suggestion_limit,
                max: MAX_SUGGESTION_LIMIT,
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity(EVENT_CAPACITY_VAR.to_string()));
        }
        if self.notice_capacity == 0 {
            return Err(ConfigError::ZeroCapacity(NOTICE_CAPACITY_VAR.to_string()));
        }
        Ok(())
    }
}

/// `~/.retrospace/database/retrospace.db`
pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(home_dir
        .join(".retrospace")
        .join("database")
        .join("retrospace.db"))
}

fn parse_number(var: &str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: raw.clone(),
                })
        })
        .transpose()
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` controls verbosity and defaults to `info`. Calling this twice
/// is harmless; the second call does nothing.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = AppConfig::from_env(lookup(&[
            (DB_PATH_VAR, "/tmp/retro.db"),
            (SUGGESTION_LIMIT_VAR, "8"),
            (EVENT_CAPACITY_VAR, "16"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/retro.db"));
        assert_eq!(config.suggestion_limit, 8);
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.notice_capacity, DEFAULT_NOTICE_CAPACITY);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = AppConfig::from_env(lookup(&[
            (DB_PATH_VAR, "/tmp/retro.db"),
            (SUGGESTION_LIMIT_VAR, "  "),
        ]))
        .unwrap();
        assert_eq!(config.suggestion_limit, DEFAULT_SUGGESTION_LIMIT);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = AppConfig::from_env(lookup(&[
            (DB_PATH_VAR, "/tmp/retro.db"),
            (SUGGESTION_LIMIT_VAR, "nine"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let err = AppConfig::from_env(lookup(&[
            (DB_PATH_VAR, "/tmp/retro.db"),
            (SUGGESTION_LIMIT_VAR, "12"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::SuggestionLimitOutOfRange { value: 12, max: 8 }
        );

        let err = AppConfig::from_env(lookup(&[
            (DB_PATH_VAR, "/tmp/retro.db"),
            (NOTICE_CAPACITY_VAR, "0"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity(NOTICE_CAPACITY_VAR.to_string()));
    }
}
