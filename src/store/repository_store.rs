use crate::naming::file_naming::FileNaming;
use crate::store::error::StoreError;
use crate::types::bucket::BucketKey;
use crate::types::lifecycle::FileState;
use crate::types::scope::RepositoryScope;
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::{fs, task};

/// A conforming file found in the repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub key: BucketKey,
    pub state: FileState,
}

/// What one [`RepositoryStore::cleanup`] pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Files that failed to decode, plus leftover transient artifacts.
    pub non_conforming: usize,
    pub out_of_scope: usize,
    /// Losers of the one-file-per-bucket tie-break.
    pub excess: usize,
}

impl CleanupSummary {
    pub fn total(&self) -> usize {
        self.non_conforming + self.out_of_scope + self.excess
    }
}

/// Owns one repository directory and every file in it whose name starts with the
/// repository prefix. Files with other names are never touched.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    directory: PathBuf,
    naming: FileNaming,
}

impl RepositoryStore {
    pub fn new(directory: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            directory: directory.into(),
            naming,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn naming(&self) -> &FileNaming {
        &self.naming
    }

    pub fn path_for(&self, key: BucketKey, state: FileState) -> PathBuf {
        self.naming.path_for(&self.directory, key, state)
    }

    /// Names and paths of the regular files owned by this repository. A missing
    /// directory is an empty repository.
    async fn owned_files(&self) -> Result<Vec<(String, PathBuf)>, StoreError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::DirectoryRead(self.directory.clone(), e)),
        };

        let mut owned = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::DirectoryRead(self.directory.clone(), e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::DirectoryRead(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if self.naming.owns(&name) {
                owned.push((name, entry.path()));
            }
        }
        owned.sort();
        Ok(owned)
    }

    /// Decoded listing of every conforming file, sorted chronologically (and by
    /// retention rank within a bucket, best first).
    pub async fn stored_files(&self) -> Result<Vec<StoredFile>, StoreError> {
        let mut files: Vec<StoredFile> = self
            .owned_files()
            .await?
            .into_iter()
            .filter_map(|(name, path)| {
                self.naming
                    .decode(&name)
                    .ok()
                    .map(|(key, state)| StoredFile { path, key, state })
            })
            .collect();
        files.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then(b.state.retention_rank().cmp(&a.state.retention_rank()))
        });
        Ok(files)
    }

    /// The state of the file present for `key`, read fresh from disk.
    ///
    /// Only the names `key` can carry are probed, so the cost does not grow with the
    /// directory. Transient artifacts are reported ahead of persistent files, since they
    /// mean an earlier run stopped mid-bucket. Otherwise the tie-break winner is reported.
    pub async fn existing_state(&self, key: BucketKey) -> Result<Option<FileState>, StoreError> {
        const LOOKUP_ORDER: [FileState; 5] = [
            FileState::Unformatted,
            FileState::Formatted,
            FileState::Permanent,
            FileState::Provisional,
            FileState::Incomplete,
        ];

        for state in LOOKUP_ORDER {
            let path = self.path_for(key, state);
            let present = fs::try_exists(&path)
                .await
                .map_err(|e| StoreError::DirectoryRead(path.clone(), e))?;
            if present {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    /// Brings the directory back to a consistent state:
    ///
    /// 1. create the directory (and its parents) when absent,
    /// 2. delete files that do not decode, and transient leftovers of a crashed run,
    /// 3. delete files whose bucket lies outside of `scope`,
    /// 4. keep the best file of every bucket and delete the others.
    ///
    /// Calling it twice in a row changes nothing the second time.
    pub async fn cleanup(&self, scope: &RepositoryScope) -> Result<CleanupSummary, StoreError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| StoreError::DirectoryCreation(self.directory.clone(), e))?;

        let mut summary = CleanupSummary::default();
        let mut by_bucket: BTreeMap<BucketKey, Vec<StoredFile>> = BTreeMap::new();

        for (name, path) in self.owned_files().await? {
            match self.naming.decode(&name) {
                Ok((_, state)) if state.is_transient() => {
                    debug!("Removing leftover {} artifact {:?}", state, path);
                    self.safe_delete(&path).await?;
                    summary.non_conforming += 1;
                }
                Ok((key, _)) if !scope.contains(key) => {
                    debug!("Removing {:?}: bucket {} is outside of {}", path, key, scope);
                    self.safe_delete(&path).await?;
                    summary.out_of_scope += 1;
                }
                Ok((key, state)) => {
                    by_bucket
                        .entry(key)
                        .or_default()
                        .push(StoredFile { path, key, state });
                }
                Err(e) => {
                    debug!("Removing non-conforming file {:?}: {}", path, e);
                    self.safe_delete(&path).await?;
                    summary.non_conforming += 1;
                }
            }
        }

        for (key, mut files) in by_bucket {
            if files.len() < 2 {
                continue;
            }
            files.sort_by_key(|file| std::cmp::Reverse(file.state.retention_rank()));
            for loser in &files[1..] {
                debug!(
                    "Removing {:?}: bucket {} already has a {} file",
                    loser.path, key, files[0].state
                );
                self.safe_delete(&loser.path).await?;
                summary.excess += 1;
            }
        }

        if summary.total() > 0 {
            info!(
                "Cleaned up {:?}: {} non-conforming, {} out of scope, {} excess",
                self.directory, summary.non_conforming, summary.out_of_scope, summary.excess
            );
        }
        Ok(summary)
    }

    /// Removes one file. Fails when the file cannot be removed, including when it is
    /// already gone.
    pub async fn safe_delete(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path)
            .await
            .map_err(|e| StoreError::Deletion(path.to_path_buf(), e))
    }

    /// Atomic rename within the repository directory.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        fs::rename(from, to).await.map_err(|e| StoreError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Deletes the whole directory, including files this repository does not own, and
    /// recreates it empty. Irreversible.
    pub async fn purge(&self) -> Result<(), StoreError> {
        warn!("Purging repository directory {:?}", self.directory);
        match fs::remove_dir_all(&self.directory).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::Purge(self.directory.clone(), e)),
        }
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| StoreError::DirectoryCreation(self.directory.clone(), e))
    }

    /// Reads one repository file fully into memory.
    pub async fn load(&self, path: &Path) -> Result<DataFrame, StoreError> {
        if !self.exists(path).await {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || {
            let file = std::fs::File::open(&path_buf).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    StoreError::FileNotFound(path_buf.clone())
                } else {
                    StoreError::FileOpen(path_buf.clone(), e)
                }
            })?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| StoreError::ParquetRead(path_buf, e))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_parquet;
    use crate::types::bucket::Granularity;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn naming() -> FileNaming {
        FileNaming::new("X", Granularity::Monthly, "nc", "TEMP", "INCOMPLETE")
    }

    fn month(y: u32, m: u32) -> BucketKey {
        Granularity::Monthly.key_from_fields(&[y, m]).unwrap()
    }

    fn scope() -> RepositoryScope {
        RepositoryScope {
            first: month(2023, 6),
            last: month(2024, 6),
        }
    }

    async fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").await.unwrap();
    }

    async fn listing(dir: &Path) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut entries = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        names
    }

    #[tokio::test]
    async fn cleanup_creates_missing_directory() {
        let root = tempdir().unwrap();
        let directory = root.path().join("nested").join("X");
        let store = RepositoryStore::new(&directory, naming());

        let summary = store.cleanup(&scope()).await.unwrap();

        assert_eq!(summary, CleanupSummary::default());
        assert!(directory.is_dir());
        assert!(listing(&directory).await.is_empty());
    }

    #[tokio::test]
    async fn permanent_file_beats_every_suffix() {
        let dir = tempdir().unwrap();
        for name in [
            "X_2024_01.nc",
            "X_2024_01_TEMP.nc",
            "X_2024_01_INCOMPLETE.nc",
            "X_2024_01_UNFORMATTED.nc",
            "X_2024_01_FORMATTED.nc",
        ] {
            touch(dir.path(), name).await;
        }
        let store = RepositoryStore::new(dir.path(), naming());

        let summary = store.cleanup(&scope()).await.unwrap();

        assert_eq!(listing(dir.path()).await, BTreeSet::from(["X_2024_01.nc".to_string()]));
        assert_eq!(summary.non_conforming, 2);
        assert_eq!(summary.excess, 2);
    }

    #[tokio::test]
    async fn provisional_beats_incomplete() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "X_2024_02_TEMP.nc").await;
        touch(dir.path(), "X_2024_02_INCOMPLETE.nc").await;
        let store = RepositoryStore::new(dir.path(), naming());

        store.cleanup(&scope()).await.unwrap();

        assert_eq!(
            listing(dir.path()).await,
            BTreeSet::from(["X_2024_02_TEMP.nc".to_string()])
        );
    }

    #[tokio::test]
    async fn out_of_scope_and_non_conforming_files_are_removed() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "X_2023_05.nc").await;
        touch(dir.path(), "X_2024_07_INCOMPLETE.nc").await;
        touch(dir.path(), "X_2023_06.nc").await;
        touch(dir.path(), "X_2024_6.nc").await;
        touch(dir.path(), "X_2024_03_BACKUP.nc").await;
        touch(dir.path(), "notes.txt").await;
        let store = RepositoryStore::new(dir.path(), naming());

        let summary = store.cleanup(&scope()).await.unwrap();

        assert_eq!(
            listing(dir.path()).await,
            BTreeSet::from(["X_2023_06.nc".to_string(), "notes.txt".to_string()])
        );
        assert_eq!(summary.out_of_scope, 2);
        assert_eq!(summary.non_conforming, 2);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempdir().unwrap();
        for name in [
            "X_2024_01.nc",
            "X_2024_01_TEMP.nc",
            "X_2024_02_INCOMPLETE.nc",
            "X_2024_03_FORMATTED.nc",
            "X_1999_01.nc",
            "X_garbage.nc",
        ] {
            touch(dir.path(), name).await;
        }
        let store = RepositoryStore::new(dir.path(), naming());

        store.cleanup(&scope()).await.unwrap();
        let after_first = listing(dir.path()).await;
        let second = store.cleanup(&scope()).await.unwrap();

        assert_eq!(second, CleanupSummary::default());
        assert_eq!(listing(dir.path()).await, after_first);
        let files = store.stored_files().await.unwrap();
        let keys: BTreeSet<BucketKey> = files.iter().map(|f| f.key).collect();
        assert_eq!(keys.len(), files.len());
    }

    #[tokio::test]
    async fn existing_state_reports_transient_artifacts_first() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "X_2024_01_TEMP.nc").await;
        touch(dir.path(), "X_2024_01_INCOMPLETE.nc").await;
        let store = RepositoryStore::new(dir.path(), naming());

        assert_eq!(
            store.existing_state(month(2024, 1)).await.unwrap(),
            Some(FileState::Provisional)
        );
        assert_eq!(store.existing_state(month(2024, 2)).await.unwrap(), None);

        touch(dir.path(), "X_2024_01_UNFORMATTED.nc").await;
        assert_eq!(
            store.existing_state(month(2024, 1)).await.unwrap(),
            Some(FileState::Unformatted)
        );
    }

    #[tokio::test]
    async fn existing_state_prefers_permanent_and_ignores_foreign_names() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "X_2024_01_TEMP.nc").await;
        touch(dir.path(), "X_2024_01.nc").await;
        touch(dir.path(), "X_2024_01_OLD.nc").await;
        touch(dir.path(), "X_2024_02_garbage.nc").await;
        let store = RepositoryStore::new(dir.path(), naming());

        assert_eq!(
            store.existing_state(month(2024, 1)).await.unwrap(),
            Some(FileState::Permanent)
        );
        assert_eq!(store.existing_state(month(2024, 2)).await.unwrap(), None);
        // A missing directory is an empty repository.
        let absent = RepositoryStore::new(dir.path().join("absent"), naming());
        assert_eq!(absent.existing_state(month(2024, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn safe_delete_fails_when_file_is_gone() {
        let dir = tempdir().unwrap();
        let store = RepositoryStore::new(dir.path(), naming());
        let path = store.path_for(month(2024, 1), FileState::Permanent);

        let result = store.safe_delete(&path).await;

        assert!(matches!(result, Err(StoreError::Deletion(p, _)) if p == path));
    }

    #[tokio::test]
    async fn purge_leaves_an_empty_directory() {
        let dir = tempdir().unwrap();
        let directory = dir.path().join("X");
        let store = RepositoryStore::new(&directory, naming());
        store.purge().await.unwrap();
        touch(&directory, "X_2024_01.nc").await;
        touch(&directory, "other.bin").await;

        store.purge().await.unwrap();

        assert!(directory.is_dir());
        assert!(listing(&directory).await.is_empty());
    }

    #[tokio::test]
    async fn load_reads_a_parquet_file() {
        let dir = tempdir().unwrap();
        let naming = FileNaming::new("X", Granularity::Monthly, "parquet", "TEMP", "INCOMPLETE");
        let store = RepositoryStore::new(dir.path(), naming);
        let path = store.path_for(month(2024, 1), FileState::Permanent);
        let mut df = df!("temperature" => [1.5f64, 2.5, 3.5]).unwrap();
        write_parquet(&path, &mut df);

        let loaded = store.load(&path).await.unwrap();

        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded, df);
    }

    #[tokio::test]
    async fn load_of_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let store = RepositoryStore::new(dir.path(), naming());
        let path = store.path_for(month(2024, 1), FileState::Permanent);

        let result = store.load(&path).await;

        assert!(matches!(result, Err(StoreError::FileNotFound(p)) if p == path));
    }
}
