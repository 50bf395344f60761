//! Runtime configuration.
//!
//! Resolved once at startup from the process environment, after loading a
//! `.env` file if one is present.

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DATABASE_PATH_VAR: &str = "CLINIC_DATABASE_PATH";
pub const LIST_PER_PAGE_VAR: &str = "CLINIC_LIST_PER_PAGE";
pub const LOG_VAR: &str = "CLINIC_LOG";

/// Rows per changelist page unless configured otherwise.
pub const DEFAULT_LIST_PER_PAGE: usize = 100;
pub const DEFAULT_LOG_FILTER: &str = "clinic_core=info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },

    #[error("Invalid log filter {filter:?}: {message}")]
    InvalidLogFilter { filter: String, message: String },
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicConfig {
    pub database: DatabaseLocation,
    pub list_per_page: usize,
    /// `EnvFilter` directives for log output
    pub log_filter: String,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::InMemory,
            list_per_page: DEFAULT_LIST_PER_PAGE,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClinicConfig {
    /// Load `.env`, then read the `CLINIC_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(DATABASE_PATH_VAR) {
            let path = path.trim();
            config.database = match path {
                "" => return Err(ConfigError::Empty { var: DATABASE_PATH_VAR }),
                ":memory:" => DatabaseLocation::InMemory,
                _ => DatabaseLocation::File(PathBuf::from(path)),
            };
        }

        if let Some(value) = lookup(LIST_PER_PAGE_VAR) {
            config.list_per_page = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: LIST_PER_PAGE_VAR,
                        value,
                    })
                }
            };
        }

        if let Some(filter) = lookup(LOG_VAR) {
            if filter.trim().is_empty() {
                return Err(ConfigError::Empty { var: LOG_VAR });
            }
            EnvFilter::try_new(&filter).map_err(|e| ConfigError::InvalidLogFilter {
                filter: filter.clone(),
                message: e.to_string(),
            })?;
            config.log_filter = filter;
        }

        Ok(config)
    }
}

/// Install a global `fmt` subscriber filtered by `filter`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(filter: &str) -> Result<bool, ConfigError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|e| ConfigError::InvalidLogFilter {
        filter: filter.to_string(),
        message: e.to_string(),
    })?;

    Ok(tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClinicConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClinicConfig::default());
        assert_eq!(config.list_per_page, 100);
        assert_eq!(config.database, DatabaseLocation::InMemory);
    }

    #[test]
    fn test_reads_variables() {
        let config = ClinicConfig::from_lookup(lookup(&[
            (DATABASE_PATH_VAR, "/var/lib/clinic/clinic.db"),
            (LIST_PER_PAGE_VAR, "25"),
            (LOG_VAR, "clinic_core=debug"),
        ]))
        .unwrap();

        assert_eq!(
            config.database,
            DatabaseLocation::File(PathBuf::from("/var/lib/clinic/clinic.db"))
        );
        assert_eq!(config.list_per_page, 25);
        assert_eq!(config.log_filter, "clinic_core=debug");
    }

    #[test]
    fn test_memory_path() {
        let config = ClinicConfig::from_lookup(lookup(&[(DATABASE_PATH_VAR, ":memory:")])).unwrap();
        assert_eq!(config.database, DatabaseLocation::InMemory);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ClinicConfig::from_lookup(lookup(&[(LIST_PER_PAGE_VAR, "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ClinicConfig::from_lookup(lookup(&[(LIST_PER_PAGE_VAR, "ten")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ClinicConfig::from_lookup(lookup(&[(DATABASE_PATH_VAR, "  ")])),
            Err(ConfigError::Empty { .. })
        ));
    }

    #[test]
    fn test_init_tracing_rejects_bad_filter() {
        assert!(init_tracing("clinic_core=loud").is_err());
    }
}
