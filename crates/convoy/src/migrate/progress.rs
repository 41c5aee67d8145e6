//! Progress reporting types for migration runs.
//!
//! This module provides a unified progress event system used by the batch
//! scheduler and the per-repository workers to report step-level progress
//! to the UI. Events are fire-and-forget: the engine emits, observers
//! render or log.

use crate::status::RepoKey;
use crate::transfer::PushComponent;

/// Progress events emitted during a bulk migration run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MigrateProgress {
    /// Establishing reusable provider connections before the first batch.
    WarmingUp,

    /// Warm-up failed; workers will connect lazily instead.
    WarmupFailed {
        /// Error message.
        error: String,
    },

    /// The batch plan has been computed and workers are about to start.
    PlanReady {
        /// Number of batches in the plan.
        batches: usize,
        /// Total repositories in the job.
        repos: usize,
    },

    /// A batch acquired its concurrency permit and started.
    BatchStarted {
        /// Zero-based batch index.
        index: usize,
        /// Number of repositories in the batch.
        size: usize,
    },

    /// Every repository in a batch reached a terminal state.
    BatchComplete {
        /// Zero-based batch index.
        index: usize,
    },

    /// A worker picked up a repository.
    RepoStarted {
        /// Source and target identifiers.
        key: RepoKey,
    },

    /// Fetching from the source started.
    CloneStarted {
        /// Source and target identifiers.
        key: RepoKey,
        /// Best-effort source size in KB, if known.
        size_kb: Option<u64>,
    },

    /// Fetching from the source finished.
    CloneComplete {
        /// Source and target identifiers.
        key: RepoKey,
        /// Number of branches fetched.
        branches: usize,
        /// Number of tags fetched.
        tags: usize,
    },

    /// Pushing one ref group to the target started.
    PushStarted {
        /// Source and target identifiers.
        key: RepoKey,
        /// Which ref group is being pushed.
        component: PushComponent,
    },

    /// Pushing one ref group to the target finished.
    PushComplete {
        /// Source and target identifiers.
        key: RepoKey,
        /// Which ref group finished.
        component: PushComponent,
    },

    /// Verifying the target repository.
    Verifying {
        /// Source and target identifiers.
        key: RepoKey,
    },

    /// A repository reached `Completed`.
    RepoCompleted {
        /// Source and target identifiers.
        key: RepoKey,
    },

    /// A repository reached `Failed`.
    RepoFailed {
        /// Source and target identifiers.
        key: RepoKey,
        /// Error message recorded on the status.
        error: String,
    },

    /// A transient failure is being retried after a backoff delay.
    RetryBackoff {
        /// Source and target identifiers.
        key: RepoKey,
        /// Step label the retry applies to.
        step: String,
        /// Time to wait before the retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Non-fatal scheduler warning (workspace allocation, cleanup).
    Warning {
        /// Warning message.
        message: String,
    },

    /// Every repository in the job reached a terminal state.
    JobComplete {
        /// Number of repositories that completed.
        completed: usize,
        /// Number of repositories that failed.
        failed: usize,
    },
}

/// Callback for progress updates during a migration run.
pub type ProgressCallback = Box<dyn Fn(MigrateProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// Convenience to avoid repetitive `if let Some(cb) = ...` at every call
/// site.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MigrateProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
