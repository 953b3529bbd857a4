use crate::types::bucket::BucketKey;
use crate::types::lifecycle::{FileState, LifecycleState};

/// Decides which lifecycle state a bucket's file should be in, and whether the file
/// currently on disk has to be fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleClassifier {
    now_bucket: BucketKey,
    oldest_permanent_cutoff: BucketKey,
}

impl LifecycleClassifier {
    /// `oldest_permanent_cutoff` is the newest bucket whose data is considered final;
    /// everything between it and `now_bucket` is provisional.
    pub fn new(now_bucket: BucketKey, oldest_permanent_cutoff: BucketKey) -> Self {
        Self {
            now_bucket,
            oldest_permanent_cutoff,
        }
    }

    pub fn now_bucket(&self) -> BucketKey {
        self.now_bucket
    }

    pub fn oldest_permanent_cutoff(&self) -> BucketKey {
        self.oldest_permanent_cutoff
    }

    pub fn required_state_for(&self, key: BucketKey) -> LifecycleState {
        if key == self.now_bucket {
            LifecycleState::Incomplete
        } else if self.oldest_permanent_cutoff < key && key < self.now_bucket {
            LifecycleState::Provisional
        } else {
            LifecycleState::Permanent
        }
    }

    /// Whether the bucket must be (re)downloaded given the state of its current file.
    ///
    /// A provisional file is only replaced once its bucket is strictly older than the
    /// cutoff, so a bucket sitting exactly on the cutoff keeps its provisional file for
    /// one more period.
    pub fn needs_update(&self, existing: Option<FileState>, key: BucketKey) -> bool {
        match existing {
            None => true,
            Some(FileState::Permanent) => false,
            Some(FileState::Provisional) => key < self.oldest_permanent_cutoff,
            Some(FileState::Incomplete) => true,
            Some(FileState::Unformatted) | Some(FileState::Formatted) => true,
        }
    }
}
