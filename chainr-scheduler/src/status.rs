//! Wire-shape types returned by the scheduler, independent of how they are
//! produced (used by both the in-process [`crate::scheduler::Scheduler`]
//! and the HTTP layer that serializes them).

use serde::{Deserialize, Serialize};

/// A job's name and current status, as nested in a [`RunStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub name: String,
    pub status: String,
}

/// The full status of one run: its uid, its own status, and every job's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub uid: String,
    pub run: String,
    pub jobs: Vec<JobStatus>,
}

/// One entry in a [`StatusList`], the answer to `StatusList()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListItem {
    pub uid: String,
    pub status: String,
}
