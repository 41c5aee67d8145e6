//! Bulk-level progress derived from a job snapshot.
//!
//! Aggregation is a pure function of an immutable snapshot: no locks, no
//! I/O, safe to call at any rate from any number of observers.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::status::{BulkJob, MigrationState};

/// Derived bulk-level progress for one job.
///
/// The four counts are mutually exclusive and always sum to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateProgress {
    /// Total repositories in the job.
    pub total: usize,
    /// Repositories not yet picked up.
    pub pending: usize,
    /// Repositories currently cloning, pushing, or completing.
    pub in_progress: usize,
    /// Repositories that finished successfully.
    pub completed: usize,
    /// Repositories that failed.
    pub failed: usize,
    /// Mean of per-repository progress, rounded, 0-100.
    pub overall_progress: u8,
    /// Seconds since the job started, frozen at the end timestamp once
    /// terminal.
    pub elapsed_secs: u64,
}

impl AggregateProgress {
    /// Whether every repository is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// Compute bulk-level progress from a job snapshot.
///
/// An empty job aggregates as 100% complete: there is nothing left to do.
#[must_use]
pub fn aggregate(job: &BulkJob) -> AggregateProgress {
    let total = job.repos.len();
    let mut pending = 0;
    let mut in_progress = 0;
    let mut completed = 0;
    let mut failed = 0;
    let mut progress_sum: u64 = 0;

    for status in job.repos.values() {
        match status.state {
            MigrationState::Pending => pending += 1,
            MigrationState::Cloning | MigrationState::Pushing | MigrationState::Completing => {
                in_progress += 1;
            }
            MigrationState::Completed => completed += 1,
            MigrationState::Failed => failed += 1,
        }
        progress_sum += u64::from(status.progress);
    }

    let overall_progress = if total == 0 {
        100
    } else {
        ((progress_sum as f64 / total as f64).round() as u64).min(100) as u8
    };

    let end = job.ended_at.unwrap_or_else(Utc::now);
    let elapsed_secs = (end - job.started_at).num_seconds().max(0) as u64;

    AggregateProgress {
        total,
        pending,
        in_progress,
        completed,
        failed,
        overall_progress,
        elapsed_secs,
    }
}
