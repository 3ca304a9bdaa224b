use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("unknown solver option: {0}")]
    UnknownOption(String),

    #[error("invalid value for solver option {name}: {reason}")]
    InvalidOptionValue { name: String, reason: String },

    #[error("unknown solver kind: {0}")]
    UnknownSolverKind(String),

    #[error("dataset directory not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("invalid problem metadata ({}): {reason}", .path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("invalid filter clause '{clause}': {reason}")]
    InvalidFilter { clause: String, reason: String },

    #[error("unsupported results table format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("no results path given and the ledger has no default path")]
    NoResultsPath,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dataset import failed: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl BenchError {
    pub(crate) fn invalid_value(name: &str, reason: impl Into<String>) -> Self {
        BenchError::InvalidOptionValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
