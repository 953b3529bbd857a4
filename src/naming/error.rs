use thiserror::Error;

/// A file name that does not follow the repository naming convention.
///
/// Never surfaced to callers: the store treats such files as foreign and removes them
/// during cleanup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("File '{file}' does not carry the expected extension '.{extension}'")]
    Extension { file: String, extension: String },

    #[error("File '{file}' does not start with the repository prefix '{prefix}_'")]
    MissingPrefix { file: String, prefix: String },

    #[error("File '{file}' is missing bucket field {position}")]
    MissingField { file: String, position: usize },

    #[error("File '{file}' has a malformed bucket field '{value}' (expected {width} digits)")]
    MalformedField {
        file: String,
        value: String,
        width: usize,
    },

    #[error("File '{file}' names a bucket that does not exist or is not aligned")]
    InvalidBucket { file: String },

    #[error("File '{file}' carries unknown suffix '{suffix}'")]
    UnknownSuffix { file: String, suffix: String },
}
