//! The entry point for working with one dataset's repository on disk.

use crate::clock::{Clock, SystemClock};
use crate::config::dataset::DatasetConfig;
use crate::error::RepositoryError;
use crate::period::assembler::PeriodAssembler;
use crate::period::grid::{GridSnapper, RegularGrid};
use crate::store::repository_store::{CleanupSummary, RepositoryStore};
use crate::types::location::LatLon;
use crate::types::scope::RepositoryScope;
use crate::update::downloader::{BulkCsvDownloader, Downloader};
use crate::update::formatter::{DatasetFormatter, FrameFormatter};
use crate::update::scheduler::{UpdateReport, UpdateScheduler};
use bon::bon;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One dataset's repository: its files, the rules that keep them current and the
/// collaborators that fetch, format and locate data.
///
/// Files live in `{root}/{subfolder}`. Every operation recomputes the repository scope
/// from the clock and re-reads the directory, so nothing on disk is cached between calls.
/// Only one process should run [`update`](Self::update) or
/// [`purge_repository`](Self::purge_repository) on a directory at a time.
///
/// # Examples
///
/// ```rust,no_run
/// # use weather_repository::{DatasetConfig, LatLon, RepositoryError, WeatherRepository};
/// # use chrono::NaiveDate;
/// # async fn run() -> Result<(), RepositoryError> {
/// let repository = WeatherRepository::open(
///     DatasetConfig::era5_single_levels(),
///     "/var/lib/weather_repository",
/// )?;
///
/// let report = repository.update().await?;
/// println!("update {}", report.result);
///
/// let begin = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(23, 0, 0).unwrap();
/// let frame = repository
///     .gather_period()
///     .begin(begin)
///     .end(end)
///     .locations(vec![LatLon(52.10, 5.18)])
///     .call()
///     .await?;
/// println!("{}", frame);
/// # Ok(())
/// # }
/// ```
pub struct WeatherRepository<
    D = BulkCsvDownloader,
    F = FrameFormatter,
    G = RegularGrid,
    C = SystemClock,
> {
    dataset: DatasetConfig,
    store: RepositoryStore,
    downloader: D,
    formatter: Arc<F>,
    grid: G,
    clock: C,
}

impl WeatherRepository {
    /// Opens a repository below `root` with the collaborators the dataset configuration
    /// describes: a [`BulkCsvDownloader`], a [`FrameFormatter`] and the configured
    /// [`RegularGrid`], on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Misconfigured`] when the configuration fails
    /// [`DatasetConfig::validate`].
    pub fn open(dataset: DatasetConfig, root: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        WeatherRepository::builder()
            .downloader(BulkCsvDownloader::for_dataset(&dataset))
            .formatter(FrameFormatter::for_dataset(&dataset))
            .grid(dataset.grid)
            .clock(SystemClock)
            .root(root.as_ref().to_path_buf())
            .dataset(dataset)
            .build()
    }
}

#[bon]
impl<D, F, G, C> WeatherRepository<D, F, G, C>
where
    D: Downloader,
    F: DatasetFormatter,
    G: GridSnapper,
    C: Clock,
{
    /// Creates a repository from explicit collaborators.
    ///
    /// The configuration is validated against the clock's current time. The directory
    /// is not touched until the first operation.
    #[builder]
    pub fn new(
        dataset: DatasetConfig,
        root: PathBuf,
        downloader: D,
        formatter: F,
        grid: G,
        clock: C,
    ) -> Result<Self, RepositoryError> {
        dataset.validate(clock.now())?;
        let store = RepositoryStore::new(root.join(&dataset.subfolder), dataset.naming());
        Ok(Self {
            dataset,
            store,
            downloader,
            formatter: Arc::new(formatter),
            grid,
            clock,
        })
    }

    pub fn dataset(&self) -> &DatasetConfig {
        &self.dataset
    }

    pub fn directory(&self) -> &Path {
        self.store.directory()
    }

    /// The buckets the repository keeps right now.
    pub fn scope(&self) -> Result<RepositoryScope, RepositoryError> {
        self.dataset.scope_at(self.clock.now())
    }

    /// Removes non-conforming, out-of-scope and duplicate files.
    pub async fn cleanup(&self) -> Result<CleanupSummary, RepositoryError> {
        let scope = self.scope()?;
        Ok(self.store.cleanup(&scope).await?)
    }

    /// Runs one update pass, newest bucket first, within the configured runtime limit.
    ///
    /// Download and format failures of single buckets do not raise; they are counted in
    /// the returned [`UpdateReport`].
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Store`] when a file cannot be deleted or renamed, or
    /// the directory cannot be read.
    pub async fn update(&self) -> Result<UpdateReport, RepositoryError> {
        UpdateScheduler::new(
            &self.dataset,
            &self.store,
            &self.downloader,
            &self.formatter,
            &self.clock,
        )
        .update()
        .await
    }

    /// Collects the data between `begin` and `end` (both inclusive) at the grid points
    /// nearest to `locations`.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.begin(NaiveDateTime)`: **Required.** First moment (UTC) to include.
    /// * `.end(NaiveDateTime)`: **Required.** Last moment (UTC) to include.
    /// * `.locations(Vec<LatLon>)`: **Required.** Locations to snap to the dataset grid.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NoDataForPeriod`] when no stored file overlaps the
    /// period, [`RepositoryError::InvalidPeriod`] when `begin` lies after `end` and
    /// [`RepositoryError::NoLocations`] for an empty location list.
    #[builder]
    pub async fn gather_period(
        &self,
        begin: NaiveDateTime,
        end: NaiveDateTime,
        locations: Vec<LatLon>,
    ) -> Result<DataFrame, RepositoryError> {
        let scope = self.scope()?;
        PeriodAssembler::new(&self.dataset, &self.store, &self.grid)
            .gather_period(&scope, begin, end, &locations)
            .await
    }

    /// Deletes the repository directory with everything in it and recreates it empty.
    /// Irreversible.
    pub async fn purge_repository(&self) -> Result<(), RepositoryError> {
        Ok(self.store.purge().await?)
    }

    /// Reads one repository file into memory.
    pub async fn load_file(&self, path: &Path) -> Result<DataFrame, RepositoryError> {
        Ok(self.store.load(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_utils::{grid_frame, naive, utc, write_parquet};
    use crate::types::bucket::Granularity;
    use crate::types::factor::Factor;
    use crate::update::downloader::DownloadRequest;
    use crate::update::error::DownloadError;
    use crate::update::scheduler::UpdateResult;
    use tempfile::tempdir;

    /// Serves every bucket with hourly rows on a 2x2 grid around De Bilt.
    struct GridDownloader;

    impl Downloader for GridDownloader {
        async fn download(&self, request: &DownloadRequest, target: &Path) -> Result<(), DownloadError> {
            let mut moments = Vec::new();
            let mut moment = request.start;
            while moment < request.end {
                moments.push(moment);
                moment += chrono::Duration::hours(6);
            }
            let points = [(52.0, 5.0), (52.0, 5.25), (52.25, 5.0), (52.25, 5.25)];
            write_parquet(target, &mut grid_frame(&moments, &points));
            Ok(())
        }
    }

    fn dataset() -> DatasetConfig {
        DatasetConfig::builder()
            .name("grid")
            .subfolder("GRID")
            .file_prefix("GRID")
            .granularity(Granularity::Monthly)
            .retention_months(3)
            .age_of_permanence(1)
            .runtime_limit_secs(3600)
            .initial_estimate_secs(1)
            .factors([("temperature".to_string(), Factor::renamed("temperature"))].into())
            .grid(RegularGrid::new((0.25, 0.25), (0.0, 0.0)))
            .build()
    }

    fn repository(
        root: &Path,
        dataset: DatasetConfig,
    ) -> WeatherRepository<GridDownloader, FrameFormatter, RegularGrid, ManualClock> {
        WeatherRepository::builder()
            .formatter(FrameFormatter::for_dataset(&dataset))
            .grid(dataset.grid)
            .dataset(dataset)
            .root(root.to_path_buf())
            .downloader(GridDownloader)
            .clock(ManualClock::new(utc(2024, 6, 15, 12)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn update_then_gather_a_period() {
        let root = tempdir().unwrap();
        let repository = repository(root.path(), dataset());

        let report = repository.update().await.unwrap();
        assert_eq!(report.result, UpdateResult::Completed);
        assert_eq!(report.processed, 4);
        assert_eq!(repository.directory(), root.path().join("GRID"));

        let df = repository
            .gather_period()
            .begin(naive(2024, 5, 31, 0))
            .end(naive(2024, 6, 1, 6))
            .locations(vec![LatLon(52.1, 5.2), LatLon(52.05, 5.15)])
            .call()
            .await
            .unwrap();

        // May 31st 00/06/12/18 and June 1st 00/06, at one grid point.
        assert_eq!(df.height(), 6);
    }

    #[tokio::test]
    async fn gather_outside_scope_reports_the_scope() {
        let root = tempdir().unwrap();
        let repository = repository(root.path(), dataset());
        repository.update().await.unwrap();

        let result = repository
            .gather_period()
            .begin(naive(2020, 1, 1, 0))
            .end(naive(2020, 2, 1, 0))
            .locations(vec![LatLon(52.0, 5.0)])
            .call()
            .await;

        match result {
            Err(RepositoryError::NoDataForPeriod { scope, .. }) => {
                assert_eq!(scope, repository.scope().unwrap());
            }
            other => panic!("expected NoDataForPeriod, got {:?}", other.map(|df| df.height())),
        }
    }

    #[tokio::test]
    async fn purge_and_load_file() {
        let root = tempdir().unwrap();
        let repository = repository(root.path(), dataset());
        repository.update().await.unwrap();
        let key = Granularity::Monthly.key_from_fields(&[2024, 3]).unwrap();
        let path = repository
            .store
            .path_for(key, crate::types::lifecycle::FileState::Permanent);

        let df = repository.load_file(&path).await.unwrap();
        assert_eq!(df.height(), 31 * 4 * 4);

        repository.purge_repository().await.unwrap();
        assert!(matches!(
            repository.load_file(&path).await,
            Err(RepositoryError::Store(_))
        ));
        assert_eq!(std::fs::read_dir(repository.directory()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cleanup_removes_foreign_prefixed_files() {
        let root = tempdir().unwrap();
        let repository = repository(root.path(), dataset());
        repository.cleanup().await.unwrap();
        std::fs::write(repository.directory().join("GRID_2024.parquet"), b"").unwrap();
        std::fs::write(repository.directory().join("GRID_2010_01.parquet"), b"").unwrap();

        let summary = repository.cleanup().await.unwrap();

        assert_eq!((summary.non_conforming, summary.out_of_scope), (1, 1));
    }

    #[test]
    fn misconfiguration_is_raised_at_construction() {
        let root = tempdir().unwrap();
        let mut dataset = dataset();
        dataset.age_of_permanence = 10;

        let result = WeatherRepository::builder()
            .formatter(FrameFormatter::for_dataset(&dataset))
            .grid(dataset.grid)
            .dataset(dataset)
            .root(root.path().to_path_buf())
            .downloader(GridDownloader)
            .clock(ManualClock::new(utc(2024, 6, 15, 12)))
            .build();

        assert!(matches!(result, Err(RepositoryError::Misconfigured { .. })));
    }
}
