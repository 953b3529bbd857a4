use crate::clock::Clock;
use crate::config::dataset::DatasetConfig;
use crate::error::RepositoryError;
use crate::store::error::StoreError;
use crate::store::repository_store::RepositoryStore;
use crate::types::bucket::BucketKey;
use crate::types::lifecycle::{FileState, LifecycleState};
use crate::update::downloader::{DownloadRequest, Downloader};
use crate::update::error::UpdateError;
use crate::update::formatter::DatasetFormatter;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// Every bucket in scope was visited.
    Completed,
    /// Stopped early to stay within the runtime limit. The next update resumes the work,
    /// since up-to-date buckets are skipped.
    TimedOut,
    /// Too many of the processed buckets failed.
    Failed,
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateResult::Completed => "completed",
            UpdateResult::TimedOut => "timed out",
            UpdateResult::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub result: UpdateResult,
    /// Buckets that needed an update and were attempted.
    pub processed: usize,
    /// Attempted buckets that failed.
    pub failed: usize,
    /// Buckets that were already up to date.
    pub skipped: usize,
}

/// Walks a repository's scope from the newest bucket to the oldest, bringing every
/// bucket that needs it through download, format and finalize.
///
/// Work is strictly sequential. Before each bucket the scheduler estimates whether it
/// can finish within the runtime limit, using the average time per processed bucket so
/// far, and stops when it cannot.
pub struct UpdateScheduler<'a, D, F, C> {
    dataset: &'a DatasetConfig,
    store: &'a RepositoryStore,
    downloader: &'a D,
    formatter: &'a Arc<F>,
    clock: &'a C,
}

impl<'a, D, F, C> UpdateScheduler<'a, D, F, C>
where
    D: Downloader,
    F: DatasetFormatter,
    C: Clock,
{
    pub fn new(
        dataset: &'a DatasetConfig,
        store: &'a RepositoryStore,
        downloader: &'a D,
        formatter: &'a Arc<F>,
        clock: &'a C,
    ) -> Self {
        Self {
            dataset,
            store,
            downloader,
            formatter,
            clock,
        }
    }

    fn average_per_bucket(&self, started: DateTime<Utc>, now: DateTime<Utc>, processed: usize) -> Duration {
        if processed == 0 {
            return self.dataset.initial_estimate();
        }
        (now - started) / i32::try_from(processed).unwrap_or(i32::MAX)
    }

    pub async fn update(&self) -> Result<UpdateReport, RepositoryError> {
        let started = self.clock.now();
        let scope = self.dataset.scope_at(started)?;
        let classifier = self.dataset.classifier_for(&scope)?;
        let granularity = self.dataset.granularity;

        self.store.cleanup(&scope).await?;

        let forced_end = started + self.dataset.runtime_limit();
        info!(
            "Updating '{}' over {} until {}",
            self.dataset.name, scope, forced_end
        );

        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut timed_out = false;
        let mut current = Some(scope.last);

        while let Some(key) = current.filter(|key| *key >= scope.first) {
            let now = self.clock.now();
            let average = self.average_per_bucket(started, now, processed);
            if now + average > forced_end {
                info!(
                    "Stopping update of '{}' at bucket {}: expected to need {}s, only {}s left",
                    self.dataset.name,
                    key,
                    average.num_seconds(),
                    (forced_end - now).num_seconds()
                );
                timed_out = true;
                break;
            }

            let existing = self.store.existing_state(key).await?;
            if classifier.needs_update(existing, key) {
                processed += 1;
                let required = classifier.required_state_for(key);
                debug!(
                    "Bucket {} of '{}' needs an update ({:?} -> {})",
                    key, self.dataset.name, existing, required
                );
                match self.update_bucket(key, required).await {
                    Ok(()) => debug!("Bucket {} of '{}' is now {}", key, self.dataset.name, required),
                    Err(UpdateError::Store(e)) => return Err(e.into()),
                    Err(UpdateError::TaskJoin(e)) => return Err(e.into()),
                    Err(e) => {
                        failed += 1;
                        warn!("Failed to update bucket {} of '{}': {}", key, self.dataset.name, e);
                    }
                }
            } else {
                skipped += 1;
            }

            current = granularity.previous(key);
        }

        let result = if timed_out {
            UpdateResult::TimedOut
        } else if processed > 1
            && failed as f64 / processed as f64 > self.dataset.failure_threshold
        {
            UpdateResult::Failed
        } else {
            UpdateResult::Completed
        };

        let report = UpdateReport {
            result,
            processed,
            failed,
            skipped,
        };
        match result {
            UpdateResult::Failed => warn!(
                "Update of '{}' failed: {} of {} processed buckets failed",
                self.dataset.name, failed, processed
            ),
            _ if failed > 0 => warn!(
                "Update of '{}' {} with {} of {} processed buckets failing",
                self.dataset.name, result, failed, processed
            ),
            _ => info!(
                "Update of '{}' {}: {} processed, {} up to date",
                self.dataset.name, result, processed, skipped
            ),
        }
        Ok(report)
    }

    async fn update_bucket(&self, key: BucketKey, required: LifecycleState) -> Result<(), UpdateError> {
        let unformatted = self.store.path_for(key, FileState::Unformatted);
        let formatted = self.store.path_for(key, FileState::Formatted);

        let request = DownloadRequest {
            dataset: self.dataset.name.clone(),
            bucket: key,
            start: key.start(),
            end: self.dataset.granularity.end_of(key),
            factors: self.dataset.factors.keys().cloned().collect(),
        };
        self.downloader.download(&request, &unformatted).await?;

        let formatter = Arc::clone(self.formatter);
        let path = unformatted.clone();
        task::spawn_blocking(move || formatter.format(&path, required)).await??;

        self.move_artifact(&unformatted, &formatted).await?;
        self.finalize(key, required, &formatted).await
    }

    /// Renames an in-flight file. A source that vanished fails the bucket only; any
    /// other rename failure stays a store error.
    async fn move_artifact(&self, from: &Path, to: &Path) -> Result<(), UpdateError> {
        match self.store.rename(from, to).await {
            Err(StoreError::Rename { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Err(UpdateError::ArtifactMissing(from.to_path_buf()))
            }
            result => Ok(result?),
        }
    }

    /// Replaces whatever temporary file the bucket had with the formatted file.
    async fn finalize(
        &self,
        key: BucketKey,
        required: LifecycleState,
        formatted: &Path,
    ) -> Result<(), UpdateError> {
        if !self.store.exists(formatted).await {
            return Err(UpdateError::ArtifactMissing(formatted.to_path_buf()));
        }
        for state in [FileState::Provisional, FileState::Incomplete] {
            let outdated = self.store.path_for(key, state);
            if self.store.exists(&outdated).await {
                self.store.safe_delete(&outdated).await?;
            }
        }
        let target = self.store.path_for(key, required.into());
        self.move_artifact(formatted, &target).await
    }
}
