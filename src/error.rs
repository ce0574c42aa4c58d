use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers. Per-row and per-batch problems never show up
/// here; they are recovered locally and recorded in the validation report.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Not a single batch could be loaded.
    #[error("no data available: none of the {attempted} batch source(s) could be loaded")]
    NoData { attempted: usize },

    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
