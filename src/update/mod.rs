pub mod downloader;
pub mod error;
pub mod formatter;
pub mod scheduler;
