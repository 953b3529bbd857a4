//! Lifecycle states a repository file moves through, from download artifact to
//! permanent data.

use std::fmt;

/// How final the data for one bucket is believed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// The bucket is still running (it contains "now"); its file is retried on every update.
    Incomplete,
    /// The bucket has ended but its data is unvalidated and will be replaced once it ages
    /// past the age of permanence.
    Provisional,
    /// Final data; never fetched again.
    Permanent,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Incomplete => "incomplete",
            LifecycleState::Provisional => "provisional",
            LifecycleState::Permanent => "permanent",
        };
        write!(f, "{}", name)
    }
}

/// The state a file on disk is in, as read back from its suffix.
///
/// On top of the three persistent [`LifecycleState`]s this includes the two transient
/// artifacts of an update in progress. Transient files never survive a cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    Permanent,
    Provisional,
    Incomplete,
    /// Raw download, not yet formatted.
    Unformatted,
    /// Formatted, waiting to be renamed to its lifecycle suffix.
    Formatted,
}

impl FileState {
    pub fn is_transient(&self) -> bool {
        matches!(self, FileState::Unformatted | FileState::Formatted)
    }

    /// The persistent lifecycle this file represents, if any.
    pub fn lifecycle(&self) -> Option<LifecycleState> {
        match self {
            FileState::Permanent => Some(LifecycleState::Permanent),
            FileState::Provisional => Some(LifecycleState::Provisional),
            FileState::Incomplete => Some(LifecycleState::Incomplete),
            FileState::Unformatted | FileState::Formatted => None,
        }
    }

    /// Tie-break rank when several files exist for one bucket: higher wins.
    /// Permanent beats everything, provisional beats incomplete.
    pub(crate) fn retention_rank(&self) -> u8 {
        match self {
            FileState::Permanent => 3,
            FileState::Provisional => 2,
            FileState::Incomplete => 1,
            FileState::Unformatted | FileState::Formatted => 0,
        }
    }
}

impl From<LifecycleState> for FileState {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Incomplete => FileState::Incomplete,
            LifecycleState::Provisional => FileState::Provisional,
            LifecycleState::Permanent => FileState::Permanent,
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lifecycle() {
            Some(state) => state.fmt(f),
            None if *self == FileState::Unformatted => write!(f, "unformatted"),
            None => write!(f, "formatted"),
        }
    }
}
