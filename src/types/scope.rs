use crate::types::bucket::BucketKey;
use std::fmt;

/// The rolling window of buckets a repository retains, `[first, last]` inclusive.
///
/// The scope is recomputed from the clock on every operation; anything on disk outside
/// of it is pruned by the next cleanup. `last` is also the bucket considered "now" by
/// the lifecycle classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryScope {
    pub first: BucketKey,
    pub last: BucketKey,
}

impl RepositoryScope {
    pub fn contains(&self, key: BucketKey) -> bool {
        self.first <= key && key <= self.last
    }
}

impl fmt::Display for RepositoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.first, self.last)
    }
}
