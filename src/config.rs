//! Search configuration, loaded from a JSON file.
//!
//! The configuration tells the validation pass which keys expect which kind
//! of value, optionally restricts the set of searchable keys, and carries the
//! colour theme used by the terminal highlighter. Every field is optional in
//! the file; missing fields fall back to the built-in defaults.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::theme::Theme;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The kind of value a key expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Numeric,
    Duration,
    Date,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Keys whose value must be a number, optionally with a k/m/b suffix.
    pub numeric_keys: HashSet<String>,
    /// Keys whose value must be a number with a duration unit.
    pub duration_keys: HashSet<String>,
    /// Keys whose value must be an ISO 8601 date or a relative date.
    pub date_keys: HashSet<String>,
    pub boolean_keys: HashSet<String>,
    /// When set, any other simple key is reported as unsupported.
    pub allowed_keys: Option<HashSet<String>>,
    pub theme: Theme,
}

fn key_set(keys: &[&str]) -> HashSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            numeric_keys: key_set(&[
                "project_id",
                "project.id",
                "issue.id",
                "times_seen",
                "stack.colno",
                "stack.lineno",
                "stack.stack_level",
            ]),
            duration_keys: key_set(&["transaction.duration"]),
            date_keys: key_set(&[
                "start",
                "end",
                "age",
                "firstSeen",
                "lastSeen",
                "time",
                "timestamp",
                "event.timestamp",
            ]),
            boolean_keys: key_set(&[
                "error.handled",
                "error.unhandled",
                "stack.in_app",
                "team_key_transaction",
            ]),
            allowed_keys: None,
            theme: Theme::default(),
        }
    }
}

impl SearchConfig {
    /// Loads the configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SearchConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            path = %path.display(),
            numeric = config.numeric_keys.len(),
            duration = config.duration_keys.len(),
            date = config.date_keys.len(),
            boolean = config.boolean_keys.len(),
            "loaded search config"
        );
        Ok(config)
    }

    /// The expected value type of `key`, if it is typed at all.
    pub fn key_type(&self, key: &str) -> Option<KeyType> {
        if self.numeric_keys.contains(key) {
            Some(KeyType::Numeric)
        } else if self.duration_keys.contains(key) {
            Some(KeyType::Duration)
        } else if self.date_keys.contains(key) {
            Some(KeyType::Date)
        } else if self.boolean_keys.contains(key) {
            Some(KeyType::Boolean)
        } else {
            None
        }
    }

    pub fn is_key_allowed(&self, key: &str) -> bool {
        match &self.allowed_keys {
            Some(allowed) => allowed.contains(key),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::theme::Rgb;

    #[test]
    fn test_load_valid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r##"{{
                "numeric_keys": ["count"],
                "date_keys": ["seen"],
                "allowed_keys": ["count", "seen", "is"],
                "theme": {{"blue300": "#000080"}}
            }}"##
        )
        .unwrap();

        let config = SearchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.key_type("count"), Some(KeyType::Numeric));
        assert_eq!(config.key_type("seen"), Some(KeyType::Date));
        assert_eq!(config.key_type("age"), None);
        // Omitted fields keep their defaults.
        assert_eq!(config.key_type("stack.in_app"), Some(KeyType::Boolean));
        assert!(config.is_key_allowed("is"));
        assert!(!config.is_key_allowed("level"));
        assert_eq!(config.theme.blue300, Rgb(0, 0, 0x80));
        assert_eq!(config.theme.red300, Theme::default().red300);
    }

    #[test]
    fn test_invalid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = SearchConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_colour_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"theme": {{"red300": "red"}}}}"#).unwrap();

        let err = SearchConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid colour"), "{}", err);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SearchConfig::from_json_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.key_type("age"), Some(KeyType::Date));
        assert_eq!(config.key_type("transaction.duration"), Some(KeyType::Duration));
        assert_eq!(config.key_type("times_seen"), Some(KeyType::Numeric));
        assert_eq!(config.key_type("level"), None);
        assert!(config.is_key_allowed("anything"));
    }
}
