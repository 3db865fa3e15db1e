use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::pipeline::processing::normalize::DEFAULT_THRESHOLD;
use crate::storage::validate_table_name;

pub const DEFAULT_CONFIG_FILE: &str = "annual_ingest.toml";
pub const CONFIG_PATH_VAR: &str = "ANNUAL_INGEST_CONFIG";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite database file; parent directories are created on open.
    pub database_path: PathBuf,
    pub table: String,
    /// Fraction of a row's columns allowed to be placeholders.
    pub threshold: f64,
    pub delimiter: char,
    pub busy_timeout_ms: u64,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db/mi_base.db"),
            table: "mi_tabla".to_string(),
            threshold: DEFAULT_THRESHOLD,
            delimiter: ',',
            busy_timeout_ms: 5_000,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load from the optional TOML file, then apply environment overrides.
    ///
    /// The file is `$ANNUAL_INGEST_CONFIG` when set (and must exist), else
    /// `annual_ingest.toml` in the working directory if present.
    pub fn load() -> Result<Self> {
        let config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `ANNUAL_INGEST_*` overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("ANNUAL_INGEST_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(table) = lookup("ANNUAL_INGEST_TABLE") {
            self.table = table;
        }
        if let Some(raw) = lookup("ANNUAL_INGEST_THRESHOLD") {
            self.threshold = raw.trim().parse().map_err(|_| {
                IngestError::Config(format!("ANNUAL_INGEST_THRESHOLD is not a number: '{}'", raw))
            })?;
        }
        if let Some(dir) = lookup("ANNUAL_INGEST_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table)?;
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(IngestError::Config(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if !self.delimiter.is_ascii() {
            return Err(IngestError::Config(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII; fall back to a comma otherwise
        u8::try_from(self.delimiter).unwrap_or(b',')
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.table, "mi_tabla");
        assert_eq!(config.database_path, PathBuf::from("db/mi_base.db"));
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.delimiter_byte(), b',');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("table = \"ventas\"\nthreshold = 0.25\ndelimiter = \";\"\n")
            .unwrap();
        assert_eq!(config.table, "ventas");
        assert_eq!(config.threshold, 0.25);
        assert_eq!(config.delimiter_byte(), b';');
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("tabel = \"x\""),
            Err(IngestError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ANNUAL_INGEST_DB", "/tmp/other.db"),
            ("ANNUAL_INGEST_TABLE", "datos"),
            ("ANNUAL_INGEST_THRESHOLD", "0.75"),
        ]
        .into_iter()
        .collect();
        let config = Config::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.table, "datos");
        assert_eq!(config.threshold, 0.75);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_bad_threshold_override() {
        let result = Config::default().with_overrides(|k| {
            (k == "ANNUAL_INGEST_THRESHOLD").then(|| "half".to_string())
        });
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.table = "drop table".to_string();
        assert!(matches!(config.validate(), Err(IngestError::InvalidTableName(_))));

        let mut config = Config::default();
        config.delimiter = 'é';
        assert!(config.validate().is_err());
    }
}
