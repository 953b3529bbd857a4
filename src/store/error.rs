use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create repository directory '{0}'")]
    DirectoryCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read repository directory '{0}'")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to delete repository file '{0}'")]
    Deletion(PathBuf, #[source] std::io::Error),

    #[error("Failed to purge repository directory '{0}'")]
    Purge(PathBuf, #[source] std::io::Error),

    #[error("Failed to rename '{from}' to '{to}'")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Repository file '{0}' does not exist")]
    FileNotFound(PathBuf),

    #[error("Failed to open repository file '{0}'")]
    FileOpen(PathBuf, #[source] std::io::Error),

    #[error("Failed to read parquet file '{0}'")]
    ParquetRead(PathBuf, #[source] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
