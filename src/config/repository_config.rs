use crate::config::dataset::DatasetConfig;
use crate::config::error::ConfigError;
use crate::utils::default_root_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured repository root.
pub const ROOT_ENV_VAR: &str = "WEATHER_REPOSITORY_ROOT";

/// The set of dataset repositories a process manages, and where they live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory; each dataset lives in its own subfolder below it.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            datasets: vec![
                DatasetConfig::era5_single_levels(),
                DatasetConfig::harmonie_arome(),
            ],
        }
    }
}

impl RepositoryConfig {
    /// Reads a JSON configuration file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: RepositoryConfig = serde_json::from_slice(&raw)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        debug!(
            "Loaded {} dataset configuration(s) from {:?}",
            config.datasets.len(),
            path
        );
        Ok(config)
    }

    /// The repository root: `WEATHER_REPOSITORY_ROOT` when set, then the configured
    /// root, then the platform data directory.
    pub fn resolve_root(&self) -> Result<PathBuf, ConfigError> {
        self.resolve_root_with(std::env::var_os(ROOT_ENV_VAR).map(PathBuf::from))
    }

    fn resolve_root_with(&self, env_root: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        env_root
            .filter(|root| !root.as_os_str().is_empty())
            .or_else(|| self.root.clone())
            .or_else(default_root_dir)
            .ok_or(ConfigError::RootResolution)
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig, ConfigError> {
        self.datasets
            .iter()
            .find(|dataset| dataset.name == name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()))
    }
}
