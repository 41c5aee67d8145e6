use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use thiserror::Error;

use super::types::{BulkJob, JobId, RepoKey, RepoStatus};

/// Errors surfaced by the status store.
///
/// These are the only hard errors the orchestration engine produces:
/// repository-level failures are recorded as `Failed` status values and
/// never reach this type.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No job with this id exists in the store.
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    /// The job exists but does not contain this repository key.
    #[error("Unknown repository {key} in job {job}")]
    UnknownRepo { job: JobId, key: RepoKey },

    /// A job with this caller-supplied id already exists.
    #[error("Duplicate job id: {0}")]
    DuplicateJob(JobId),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Lock-guarded source of truth for all in-flight and completed jobs.
///
/// The outer map is only touched when jobs are created or enumerated; each
/// job carries its own mutex, so updates to one job never contend with
/// readers of another. All mutations commit as whole-record replacements
/// under the job lock, and `get` hands out full clones, so a reader can
/// never observe a half-applied update. Locks are never held across await
/// points; every critical section is a short, synchronous mutation.
#[derive(Debug, Default)]
pub struct StatusStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<BulkJob>>>>,
}

impl StatusStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job with a generated id; every repository starts `Pending`.
    pub fn create_job(&self, keys: Vec<RepoKey>) -> JobId {
        let id = JobId::new();
        let job = BulkJob::new(id, keys);
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(Mutex::new(job)));
        id
    }

    /// Create a job with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateJob` if the id is already taken.
    pub fn create_job_with_id(&self, id: JobId, keys: Vec<RepoKey>) -> Result<JobId> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&id) {
            return Err(StoreError::DuplicateJob(id));
        }
        jobs.insert(id, Arc::new(Mutex::new(BulkJob::new(id, keys))));
        Ok(id)
    }

    /// Whether a job with this id exists.
    #[must_use]
    pub fn contains(&self, job: &JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(job)
    }

    /// All job ids currently held by the store.
    #[must_use]
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Return an immutable snapshot (full clone) of a job.
    ///
    /// The clone is taken under the job lock, so the caller can iterate or
    /// serialize it without racing concurrent mutation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` for an id the store has never seen.
    pub fn get(&self, job: &JobId) -> Result<BulkJob> {
        let handle = self.job_handle(job)?;
        let guard = handle.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    /// Mutate one repository's status under the job lock.
    ///
    /// Progress regressions are clamped: a stale write can never move the
    /// published progress backwards. If this mutation turns the last
    /// non-terminal repository terminal, the job's end timestamp is set in
    /// the same critical section, so exactly one caller ever wins that
    /// race. Returns whether this call made the job terminal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` / `StoreError::UnknownRepo` when
    /// the id or key is not present.
    pub fn update_repo<F>(&self, job: &JobId, key: &RepoKey, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut RepoStatus),
    {
        let handle = self.job_handle(job)?;
        let mut guard = handle.lock().unwrap_or_else(|e| e.into_inner());

        let status = guard
            .repos
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownRepo {
                job: *job,
                key: key.clone(),
            })?;

        let progress_before = status.progress;
        mutate(status);
        if status.progress < progress_before {
            status.progress = progress_before;
        }

        let mut became_terminal = false;
        if guard.ended_at.is_none() && guard.repos.values().all(RepoStatus::is_terminal) {
            guard.ended_at = Some(Utc::now());
            became_terminal = true;
        }

        Ok(became_terminal)
    }

    /// Stamp the job's end timestamp if every repository is terminal and it
    /// is not already set. Returns whether this call stamped it.
    ///
    /// The normal path stamps the timestamp inside [`update_repo`]; this
    /// covers jobs that never receive a repository update (an empty key
    /// set) without weakening the exactly-once guarantee.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` for an id the store has never seen.
    pub fn finalize(&self, job: &JobId) -> Result<bool> {
        let handle = self.job_handle(job)?;
        let mut guard = handle.lock().unwrap_or_else(|e| e.into_inner());
        if guard.ended_at.is_none() && guard.repos.values().all(RepoStatus::is_terminal) {
            guard.ended_at = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    fn job_handle(&self, job: &JobId) -> Result<Arc<Mutex<BulkJob>>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job)
            .cloned()
            .ok_or(StoreError::UnknownJob(*job))
    }
}
