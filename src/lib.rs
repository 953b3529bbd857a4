mod clock;
mod config;
mod error;
mod lifecycle;
mod naming;
mod period;
mod repository;
mod store;
mod types;
mod update;
mod utils;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, SystemClock};
pub use error::RepositoryError;
pub use repository::*;

pub use config::dataset::{DatasetConfig, DownloadConfig, ReleaseMarkers};
pub use config::error::ConfigError;
pub use config::repository_config::{RepositoryConfig, ROOT_ENV_VAR};

pub use lifecycle::classifier::LifecycleClassifier;
pub use naming::error::DecodeError;
pub use naming::file_naming::{FileNaming, FORMATTED_SUFFIX, UNFORMATTED_SUFFIX};
pub use store::error::StoreError;
pub use store::repository_store::{CleanupSummary, RepositoryStore, StoredFile};

pub use period::filtering::RepositoryFrameFilterExt;
pub use period::grid::{GridSnapper, RegularGrid};

pub use update::downloader::{BulkCsvDownloader, DownloadRequest, Downloader};
pub use update::error::{DownloadError, FormatError, UpdateError};
pub use update::formatter::{DatasetFormatter, FrameFormatter, LAT_COLUMN, LON_COLUMN, TIME_COLUMN};
pub use update::scheduler::{UpdateReport, UpdateResult};

pub use types::bucket::{BucketKey, Granularity};
pub use types::factor::{Conversion, Factor};
pub use types::lifecycle::{FileState, LifecycleState};
pub use types::location::LatLon;
pub use types::scope::RepositoryScope;

pub use utils::default_root_dir;
