use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no year (1900-2099) found in identifier '{identifier}'")]
    NoYearFound { identifier: String },

    #[error("failed to read input file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open database {path}: {source}")]
    StorageOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("existence query on table '{table}' failed: {source}")]
    StorageQuery {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("append to table '{table}' failed: {source}")]
    StorageWrite {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid table name: '{0}'")]
    InvalidTableName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
