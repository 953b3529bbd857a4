use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse configuration file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Could not determine a repository root: set WEATHER_REPOSITORY_ROOT or `root` in the configuration")]
    RootResolution,

    #[error("No dataset named '{0}' is configured")]
    UnknownDataset(String),
}
