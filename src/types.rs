//! Core types for sidra-fetch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single unit of work for the worker pool: fetch `url`, write the body to `destination`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchTask {
    /// Absolute URL to request
    pub url: String,
    /// File the response body is written to
    pub destination: PathBuf,
}

impl FetchTask {
    /// Create a new task
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

/// Why a task was not fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination already present and overwrite is off
    AlreadyExists,
    /// The pool was stopped before the task was picked up
    PoolStopped,
}

/// Final state of one task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Body fetched and written
    Fetched {
        /// Number of bytes written
        bytes: u64,
        /// Attempts used, including the successful one
        attempts: u32,
    },

    /// Fetch failed after retries (or with a non-retryable error)
    Failed {
        /// Attempts used
        attempts: u32,
        /// Last error message
        error: String,
    },

    /// Body fetched but the destination could not be written
    WriteFailed {
        /// Error message
        error: String,
    },

    /// Task was never fetched
    Skipped {
        /// Why
        reason: SkipReason,
    },
}

impl TaskOutcome {
    /// True for [`TaskOutcome::Fetched`]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Fetched { .. })
    }
}

/// Report broadcast by the worker pool once a task is done
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskReport {
    /// The task this report is about
    pub task: FetchTask,
    /// What happened to it
    pub outcome: TaskOutcome,
}

/// Running counters of a worker pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Tasks accepted by `submit`
    pub submitted: u64,
    /// Tasks fetched and written
    pub fetched: u64,
    /// Tasks that exhausted their retries
    pub failed: u64,
    /// Tasks whose write failed
    pub write_failed: u64,
    /// Tasks skipped (already cached or pool stopped)
    pub skipped: u64,
    /// Bytes written across all fetched tasks
    pub bytes_written: u64,
    /// Submitted tasks not yet marked done
    pub pending: usize,
}
