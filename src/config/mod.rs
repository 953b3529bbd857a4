pub mod dataset;
pub mod error;
pub mod repository_config;
