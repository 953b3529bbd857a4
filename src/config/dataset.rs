//! Per-dataset repository configuration.

use crate::error::RepositoryError;
use crate::lifecycle::classifier::LifecycleClassifier;
use crate::naming::file_naming::{FileNaming, FORMATTED_SUFFIX, UNFORMATTED_SUFFIX};
use crate::period::grid::RegularGrid;
use crate::types::bucket::Granularity;
use crate::types::factor::Factor;
use crate::types::scope::RepositoryScope;
use bon::Builder;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_EXTENSION: &str = "parquet";
pub const DEFAULT_PROVISIONAL_SUFFIX: &str = "TEMP";
pub const DEFAULT_INCOMPLETE_SUFFIX: &str = "INCOMPLETE";
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.3;

/// Column that tells provisional rows from permanent rows in a download, with the
/// marker value of each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarkers {
    pub column: String,
    pub permanent: i64,
    pub provisional: i64,
}

/// Where [`BulkCsvDownloader`](crate::update::downloader::BulkCsvDownloader) fetches a
/// bucket from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// URL with `{year}`, `{month}`, `{day}`, `{hour}` and `{factors}` placeholders.
    pub url_template: String,
    /// Whether the response body is gzip compressed.
    #[serde(default)]
    pub gzip: bool,
}

/// Everything that describes one dataset's repository.
///
/// # Examples
///
/// ```
/// use weather_repository::{DatasetConfig, Factor, Granularity, RegularGrid};
///
/// let config = DatasetConfig::builder()
///     .name("station_grid")
///     .subfolder("STATION_GRID")
///     .file_prefix("GRID")
///     .granularity(Granularity::Monthly)
///     .retention_months(24)
///     .age_of_permanence(2)
///     .runtime_limit_secs(600)
///     .initial_estimate_secs(60)
///     .factors([("t2m".to_string(), Factor::renamed("temperature"))].into())
///     .grid(RegularGrid::new((0.1, 0.1), (0.0, 0.0)))
///     .build();
/// assert_eq!(config.extension, "parquet");
/// assert_eq!(config.failure_threshold, 0.3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct DatasetConfig {
    /// Identifier used on the command line and in log and error messages.
    #[builder(into)]
    pub name: String,
    /// Directory under the repository root holding this dataset's files.
    #[builder(into)]
    pub subfolder: String,
    #[builder(into)]
    pub file_prefix: String,
    #[builder(into, default = DEFAULT_EXTENSION.to_string())]
    #[serde(default = "default_extension")]
    pub extension: String,
    pub granularity: Granularity,
    /// How far back, in months, the repository reaches from its newest bucket.
    pub retention_months: u32,
    /// How far behind the wall clock the newest bucket lags.
    #[builder(default)]
    #[serde(default)]
    pub lag_hours: u32,
    /// Number of buckets after which provisional data is considered final.
    pub age_of_permanence: u32,
    pub runtime_limit_secs: u64,
    /// Assumed time per bucket before an update has measured any.
    pub initial_estimate_secs: u64,
    #[builder(into, default = DEFAULT_PROVISIONAL_SUFFIX.to_string())]
    #[serde(default = "default_provisional_suffix")]
    pub provisional_suffix: String,
    #[builder(into, default = DEFAULT_INCOMPLETE_SUFFIX.to_string())]
    #[serde(default = "default_incomplete_suffix")]
    pub incomplete_suffix: String,
    /// Raw factor name in a download, mapped to how it is stored.
    pub factors: BTreeMap<String, Factor>,
    #[serde(default)]
    pub release: Option<ReleaseMarkers>,
    #[serde(default)]
    pub download: Option<DownloadConfig>,
    /// Share of processed buckets allowed to fail before an update reports failure.
    #[builder(default = DEFAULT_FAILURE_THRESHOLD)]
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    pub grid: RegularGrid,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_provisional_suffix() -> String {
    DEFAULT_PROVISIONAL_SUFFIX.to_string()
}

fn default_incomplete_suffix() -> String {
    DEFAULT_INCOMPLETE_SUFFIX.to_string()
}

fn default_failure_threshold() -> f64 {
    DEFAULT_FAILURE_THRESHOLD
}

impl DatasetConfig {
    /// ERA5 single levels reanalysis: monthly files, twelve years of history, five days
    /// behind real time, final after three months.
    pub fn era5_single_levels() -> Self {
        let factors = [
            ("t2m", "2m_temperature"),
            ("d2m", "2m_dewpoint_temperature"),
            ("u10", "10m_u_component_of_wind"),
            ("v10", "10m_v_component_of_wind"),
            ("sp", "surface_pressure"),
            ("tp", "total_precipitation"),
            ("ssrd", "surface_solar_radiation_downwards"),
            ("tcc", "total_cloud_cover"),
        ]
        .into_iter()
        .map(|(raw, name)| (raw.to_string(), Factor::renamed(name)))
        .collect();

        DatasetConfig::builder()
            .name("era5sl")
            .subfolder("ERA5_SL")
            .file_prefix("ERA5SL")
            .granularity(Granularity::Monthly)
            .retention_months(12 * 12)
            .lag_hours(5 * 24)
            .age_of_permanence(3)
            .runtime_limit_secs(3 * 60 * 60)
            .initial_estimate_secs(20 * 60)
            .factors(factors)
            .release(ReleaseMarkers {
                column: "expver".to_string(),
                permanent: 1,
                provisional: 5,
            })
            .grid(RegularGrid::new((0.25, 0.25), (50.75, 3.2)))
            .build()
    }

    /// HARMONIE-AROME forecasts: one file per six-hourly run, one year of history.
    /// Runs never change once published, so only the running bucket is temporary.
    pub fn harmonie_arome() -> Self {
        let factors = [
            ("temperature", "temperature"),
            ("dewpoint", "dewpoint_temperature"),
            ("wind_speed", "wind_speed"),
            ("wind_direction", "wind_direction"),
            ("pressure", "air_pressure_at_sea_level"),
            ("precipitation", "precipitation"),
            ("global_radiation", "global_radiation"),
            ("cloud_cover", "cloud_cover"),
        ]
        .into_iter()
        .map(|(raw, name)| (raw.to_string(), Factor::renamed(name)))
        .collect();

        DatasetConfig::builder()
            .name("arome")
            .subfolder("AROME")
            .file_prefix("AROME")
            .granularity(Granularity::SixHourly)
            .retention_months(12)
            .lag_hours(5)
            .age_of_permanence(0)
            .runtime_limit_secs(3 * 60 * 60)
            .initial_estimate_secs(5 * 60)
            .factors(factors)
            .grid(RegularGrid::new((0.023, 0.037), (49.0, 0.0)))
            .build()
    }

    pub fn naming(&self) -> FileNaming {
        FileNaming::new(
            self.file_prefix.clone(),
            self.granularity,
            self.extension.clone(),
            self.provisional_suffix.clone(),
            self.incomplete_suffix.clone(),
        )
    }

    pub fn runtime_limit(&self) -> Duration {
        Duration::seconds(i64::try_from(self.runtime_limit_secs).unwrap_or(i64::MAX))
    }

    pub fn initial_estimate(&self) -> Duration {
        Duration::seconds(i64::try_from(self.initial_estimate_secs).unwrap_or(i64::MAX))
    }

    /// The buckets this repository keeps at `now`.
    pub fn scope_at(&self, now: DateTime<Utc>) -> Result<RepositoryScope, RepositoryError> {
        let anchor = now
            .naive_utc()
            .checked_sub_signed(Duration::hours(i64::from(self.lag_hours)))
            .ok_or_else(|| self.misconfigured("lag reaches before the start of the calendar"))?;
        let oldest = anchor
            .checked_sub_months(Months::new(self.retention_months))
            .ok_or_else(|| {
                self.misconfigured("retention reaches before the start of the calendar")
            })?;
        Ok(RepositoryScope {
            first: self.granularity.bucket_of(oldest),
            last: self.granularity.bucket_of(anchor),
        })
    }

    /// Lifecycle rules for a scope: its newest bucket is "now", and everything at least
    /// `age_of_permanence` buckets older is final.
    pub fn classifier_for(
        &self,
        scope: &RepositoryScope,
    ) -> Result<LifecycleClassifier, RepositoryError> {
        let cutoff = self
            .granularity
            .step_back(scope.last, self.age_of_permanence)
            .ok_or_else(|| self.misconfigured("age of permanence reaches before the calendar"))?;
        Ok(LifecycleClassifier::new(scope.last, cutoff))
    }

    pub(crate) fn misconfigured(&self, reason: impl Into<String>) -> RepositoryError {
        RepositoryError::Misconfigured {
            repository: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Checks the configuration for values the repository cannot operate with.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.name.trim().is_empty() {
            return Err(self.misconfigured("name must not be empty"));
        }
        if self.subfolder.is_empty()
            || self.subfolder == "."
            || self.subfolder == ".."
            || self.subfolder.contains(['/', '\\'])
        {
            return Err(self.misconfigured(format!(
                "subfolder '{}' must be a single directory name",
                self.subfolder
            )));
        }
        if self.file_prefix.is_empty() || self.file_prefix.contains(['_', '.', '/', '\\']) {
            return Err(self.misconfigured(format!(
                "file prefix '{}' must be non-empty and free of '_', '.' and path separators",
                self.file_prefix
            )));
        }
        if self.extension.is_empty() || self.extension.contains(['.', '/', '\\']) {
            return Err(self.misconfigured(format!(
                "extension '{}' must be non-empty and free of '.' and path separators",
                self.extension
            )));
        }
        for suffix in [&self.provisional_suffix, &self.incomplete_suffix] {
            let valid = !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_alphanumeric())
                && !suffix.chars().all(|c| c.is_ascii_digit());
            if !valid {
                return Err(self.misconfigured(format!(
                    "suffix '{}' must be alphanumeric and contain a letter",
                    suffix
                )));
            }
            if suffix == UNFORMATTED_SUFFIX || suffix == FORMATTED_SUFFIX {
                return Err(self.misconfigured(format!(
                    "suffix '{}' is reserved for update artifacts",
                    suffix
                )));
            }
        }
        if self.provisional_suffix == self.incomplete_suffix {
            return Err(self.misconfigured(format!(
                "provisional and incomplete files share the suffix '{}'",
                self.provisional_suffix
            )));
        }
        if self.runtime_limit_secs == 0 {
            return Err(self.misconfigured("runtime limit must be positive"));
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(self.misconfigured(format!(
                "failure threshold {} must lie in (0, 1]",
                self.failure_threshold
            )));
        }
        if self.factors.is_empty() {
            return Err(self.misconfigured("at least one factor must be configured"));
        }
        let (lat_res, lon_res) = self.grid.resolution;
        if !(lat_res > 0.0 && lon_res > 0.0) {
            return Err(self.misconfigured("grid resolution must be positive"));
        }
        if let Some(release) = &self.release {
            if release.permanent == release.provisional {
                return Err(self.misconfigured(format!(
                    "release column '{}' uses the same marker for both sides",
                    release.column
                )));
            }
        }
        if let Some(download) = &self.download {
            if download.url_template.trim().is_empty() {
                return Err(self.misconfigured("download URL template must not be empty"));
            }
        }

        let scope = self.scope_at(now)?;
        let classifier = self.classifier_for(&scope)?;
        if classifier.oldest_permanent_cutoff() < scope.first {
            return Err(self.misconfigured(format!(
                "age of permanence ({} buckets) reaches beyond the retention window {}",
                self.age_of_permanence, scope
            )));
        }
        Ok(())
    }
}
