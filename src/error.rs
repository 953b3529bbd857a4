use crate::config::error::ConfigError;
use crate::store::error::StoreError;
use crate::types::scope::RepositoryScope;
use chrono::NaiveDateTime;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Nothing is stored for the requested period. `scope` tells whether the period lies
    /// outside of what the repository keeps at all, or is in range but not downloaded.
    #[error("Repository '{repository}' holds no data between {begin} and {end} (repository scope is {scope})")]
    NoDataForPeriod {
        repository: String,
        begin: NaiveDateTime,
        end: NaiveDateTime,
        scope: RepositoryScope,
    },

    #[error("Repository '{repository}' is misconfigured: {reason}")]
    Misconfigured { repository: String, reason: String },

    #[error("Invalid period: begin {begin} lies after end {end}")]
    InvalidPeriod {
        begin: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("At least one location is required")]
    NoLocations,

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
