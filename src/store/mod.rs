pub mod error;
pub mod repository_store;
