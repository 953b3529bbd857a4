//! Encoding and decoding of repository file names.
//!
//! Every file in a repository is named
//! `{prefix}_{YYYY}_{MM}[_{DD}_{HH}][_{SUFFIX}].{extension}`, where the date fields
//! are the bucket key (zero padded, fixed width) and the optional suffix encodes the
//! file's lifecycle state. No suffix means permanent data.

use crate::naming::error::DecodeError;
use crate::types::bucket::{BucketKey, Granularity};
use crate::types::lifecycle::FileState;
use std::path::{Path, PathBuf};

pub const UNFORMATTED_SUFFIX: &str = "UNFORMATTED";
pub const FORMATTED_SUFFIX: &str = "FORMATTED";

/// Width, in digits, of each bucket field in a file name (year, month, day, hour).
const FIELD_WIDTHS: [usize; 4] = [4, 2, 2, 2];

/// The naming convention of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    prefix: String,
    granularity: Granularity,
    extension: String,
    provisional_suffix: String,
    incomplete_suffix: String,
}

impl FileNaming {
    pub fn new(
        prefix: impl Into<String>,
        granularity: Granularity,
        extension: impl Into<String>,
        provisional_suffix: impl Into<String>,
        incomplete_suffix: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            granularity,
            extension: extension.into(),
            provisional_suffix: provisional_suffix.into(),
            incomplete_suffix: incomplete_suffix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Whether a file name falls under this repository's ownership (it starts with the
    /// prefix). Owned files that fail to [`decode`](Self::decode) are non-conforming.
    pub fn owns(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.prefix)
    }

    /// The suffix a state is written with; `None` for permanent files.
    pub fn suffix_for(&self, state: FileState) -> Option<&str> {
        match state {
            FileState::Permanent => None,
            FileState::Provisional => Some(&self.provisional_suffix),
            FileState::Incomplete => Some(&self.incomplete_suffix),
            FileState::Unformatted => Some(UNFORMATTED_SUFFIX),
            FileState::Formatted => Some(FORMATTED_SUFFIX),
        }
    }

    fn state_for_suffix(&self, suffix: &str) -> Option<FileState> {
        match suffix {
            UNFORMATTED_SUFFIX => Some(FileState::Unformatted),
            FORMATTED_SUFFIX => Some(FileState::Formatted),
            s if s == self.provisional_suffix => Some(FileState::Provisional),
            s if s == self.incomplete_suffix => Some(FileState::Incomplete),
            _ => None,
        }
    }

    /// Builds the file name for a bucket in the given state.
    pub fn encode(&self, key: BucketKey, state: FileState) -> String {
        let mut name = self.prefix.clone();
        for (value, width) in self
            .granularity
            .fields_of(key)
            .into_iter()
            .zip(FIELD_WIDTHS)
        {
            name.push_str(&format!("_{:0width$}", value, width = width));
        }
        if let Some(suffix) = self.suffix_for(state) {
            name.push('_');
            name.push_str(suffix);
        }
        name.push('.');
        name.push_str(&self.extension);
        name
    }

    /// Full path of a bucket's file in `directory`.
    pub fn path_for(&self, directory: &Path, key: BucketKey, state: FileState) -> PathBuf {
        directory.join(self.encode(key, state))
    }

    /// Parses a file name back into its bucket key and state.
    pub fn decode(&self, file_name: &str) -> Result<(BucketKey, FileState), DecodeError> {
        let stem = file_name
            .strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| DecodeError::Extension {
                file: file_name.to_string(),
                extension: self.extension.clone(),
            })?;

        let rest = stem
            .strip_prefix(self.prefix.as_str())
            .and_then(|s| s.strip_prefix('_'))
            .ok_or_else(|| DecodeError::MissingPrefix {
                file: file_name.to_string(),
                prefix: self.prefix.clone(),
            })?;

        let mut parts = rest.split('_');
        let field_count = self.granularity.field_count();
        let mut fields = Vec::with_capacity(field_count);
        for (position, width) in FIELD_WIDTHS.iter().take(field_count).enumerate() {
            let part = parts.next().ok_or_else(|| DecodeError::MissingField {
                file: file_name.to_string(),
                position,
            })?;
            let malformed = || DecodeError::MalformedField {
                file: file_name.to_string(),
                value: part.to_string(),
                width: *width,
            };
            if part.len() != *width || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            fields.push(part.parse::<u32>().map_err(|_| malformed())?);
        }

        let key = self
            .granularity
            .key_from_fields(&fields)
            .ok_or_else(|| DecodeError::InvalidBucket {
                file: file_name.to_string(),
            })?;

        let remainder: Vec<&str> = parts.collect();
        let state = match remainder.as_slice() {
            [] => FileState::Permanent,
            [suffix] => {
                self.state_for_suffix(suffix)
                    .ok_or_else(|| DecodeError::UnknownSuffix {
                        file: file_name.to_string(),
                        suffix: suffix.to_string(),
                    })?
            }
            more => {
                return Err(DecodeError::UnknownSuffix {
                    file: file_name.to_string(),
                    suffix: more.join("_"),
                })
            }
        };

        Ok((key, state))
    }
}
