use crate::config::dataset::DatasetConfig;
use crate::error::RepositoryError;
use crate::period::filtering::RepositoryFrameFilterExt;
use crate::period::grid::GridSnapper;
use crate::store::repository_store::{RepositoryStore, StoredFile};
use crate::types::location::LatLon;
use crate::types::scope::RepositoryScope;
use crate::update::formatter::{LAT_COLUMN, LON_COLUMN, TIME_COLUMN};
use chrono::NaiveDateTime;
use log::{debug, info};
use polars::prelude::*;
use tokio::task;

/// Reassembles a time and location slice from the files of one repository.
pub struct PeriodAssembler<'a, G> {
    dataset: &'a DatasetConfig,
    store: &'a RepositoryStore,
    grid: &'a G,
}

impl<'a, G: GridSnapper> PeriodAssembler<'a, G> {
    pub fn new(dataset: &'a DatasetConfig, store: &'a RepositoryStore, grid: &'a G) -> Self {
        Self {
            dataset,
            store,
            grid,
        }
    }

    /// Stored files whose bucket overlaps `[begin, end]`, oldest first.
    async fn files_for_period(
        &self,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<StoredFile>, RepositoryError> {
        let granularity = self.dataset.granularity;
        Ok(self
            .store
            .stored_files()
            .await?
            .into_iter()
            .filter(|file| file.key.start() <= end && granularity.end_of(file.key) > begin)
            .collect())
    }

    /// Loads every file overlapping `[begin, end]`, keeps the grid points nearest to
    /// `locations` and the rows inside the period, and merges the result. Where files
    /// overlap, the row of the oldest file wins.
    pub async fn gather_period(
        &self,
        scope: &RepositoryScope,
        begin: NaiveDateTime,
        end: NaiveDateTime,
        locations: &[LatLon],
    ) -> Result<DataFrame, RepositoryError> {
        if begin > end {
            return Err(RepositoryError::InvalidPeriod { begin, end });
        }
        if locations.is_empty() {
            return Err(RepositoryError::NoLocations);
        }

        self.store.cleanup(scope).await?;

        let files = self.files_for_period(begin, end).await?;
        if files.is_empty() {
            return Err(RepositoryError::NoDataForPeriod {
                repository: self.dataset.name.clone(),
                begin,
                end,
                scope: *scope,
            });
        }

        let grid_points = self.grid.get_grid_coordinates(locations);
        debug!(
            "Gathering {} file(s) of '{}' for {} grid point(s)",
            files.len(),
            self.dataset.name,
            grid_points.len()
        );

        let mut frames = Vec::with_capacity(files.len());
        for file in &files {
            let df = self.store.load(&file.path).await?;
            frames.push(df.lazy().filter_locations(&grid_points));
        }

        let merged = concat_lf_diagonal(frames, UnionArgs::default())?
            .filter_period(begin, end)
            .unique_stable(
                Some(vec![TIME_COLUMN.into(), LAT_COLUMN.into(), LON_COLUMN.into()]),
                UniqueKeepStrategy::First,
            );
        let df = task::spawn_blocking(move || merged.collect()).await??;

        info!(
            "Gathered {} rows of '{}' between {} and {}",
            df.height(),
            self.dataset.name,
            begin,
            end
        );
        Ok(df)
    }
}
