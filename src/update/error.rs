use crate::store::error::StoreError;
use crate::types::lifecycle::LifecycleState;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("No download source is configured for dataset '{0}'")]
    NotConfigured(String),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download or decompression of {0} failed")]
    StreamIo(String, #[source] std::io::Error),

    #[error("I/O error processing CSV data from {url}")]
    CsvReadIo {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing error processing CSV data from {url}")]
    CsvReadPolars {
        url: String,
        #[source]
        source: PolarsError,
    },

    #[error("I/O error writing download target '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing download target '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("Data for bucket {bucket} is not available: {reason}")]
    Unavailable { bucket: String, reason: String },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to open '{0}' for formatting")]
    FileOpen(PathBuf, #[source] std::io::Error),

    #[error("Failed to read parquet file '{0}'")]
    ParquetRead(PathBuf, #[source] PolarsError),

    #[error("I/O error writing formatted file '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing formatted file '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("Missing required column '{column}' in '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("None of the configured factors are present in '{0}'")]
    NoFactors(PathBuf),

    #[error("Both release sides of column '{column}' carry data for the same time steps in '{path}'")]
    AmbiguousRelease { path: PathBuf, column: String },

    #[error("Neither release side of column '{column}' carries data in '{path}'")]
    EmptyRelease { path: PathBuf, column: String },

    #[error("'{path}' only carries {found} data but the bucket must become {required}")]
    ReleaseMismatch {
        path: PathBuf,
        required: LifecycleState,
        found: LifecycleState,
    },

    #[error("Polars operation failed while formatting '{path}': {source}")]
    Polars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}

/// Failure while bringing one bucket up to date.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// An in-flight `_UNFORMATTED` or `_FORMATTED` file was removed before it could
    /// be finalized, typically by a concurrent cleanup.
    #[error("In-flight file '{0}' disappeared before it could be finalized")]
    ArtifactMissing(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
