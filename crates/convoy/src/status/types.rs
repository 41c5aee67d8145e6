use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one bulk migration job.
///
/// Generated ids are random v4 UUIDs; callers may also supply their own.
/// Ids are unique for the lifetime of the process, not across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap a caller-supplied UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source and target remote identifiers for one repository migration.
///
/// Both sides are opaque remote identifiers (an https URL, an scp-like
/// `git@host:owner/name`, or whatever the configured transfer client
/// understands).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    /// Where the repository is migrated from.
    pub source: String,
    /// Where the repository is migrated to.
    pub target: String,
}

impl RepoKey {
    /// Create a new key from source and target identifiers.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// State machine for a single repository migration.
///
/// Transitions run `Pending -> Cloning -> Pushing -> Completing ->
/// Completed`; `Failed` is reachable from every non-terminal state.
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Created, not yet picked up by a worker.
    Pending,
    /// Fetching repository content from the source provider.
    Cloning,
    /// Pushing refs to the target provider.
    Pushing,
    /// Verifying the target and releasing resources.
    Completing,
    /// Migration finished successfully.
    Completed,
    /// Migration failed; the status carries an error message.
    Failed,
}

impl MigrationState {
    /// Whether no further transitions can occur.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a worker is actively driving this repository.
    #[inline]
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Cloning | Self::Pushing | Self::Completing)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Pushing => "pushing",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Accounted pipeline steps per repository: clone, default branch,
/// branches, tags, verify.
pub const STEPS_TOTAL: u8 = 5;

/// Live status record for a single repository migration.
///
/// Mutated only by the worker that owns the key; read concurrently through
/// store snapshots. `progress` is monotone non-decreasing for the life of
/// the record (the store clamps regressions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStatus {
    /// Source and target identifiers.
    pub key: RepoKey,
    /// Current state machine position.
    pub state: MigrationState,
    /// Human-readable label of the current step.
    pub step: String,
    /// Overall progress, 0-100.
    pub progress: u8,
    /// Pipeline steps finished so far.
    pub steps_done: u8,
    /// Total accounted pipeline steps.
    pub steps_total: u8,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure message; set if and only if `state` is `Failed`.
    pub error: Option<String>,
    /// Best-effort source size for display, in KB.
    pub size_kb: Option<u64>,
    /// The target already existed and was force-overwritten.
    pub overwritten: bool,
    /// Transient retries consumed across all operations.
    pub retries: u32,
}

impl RepoStatus {
    /// Create a fresh record in the initial `Pending` state.
    #[must_use]
    pub fn pending(key: RepoKey) -> Self {
        Self {
            key,
            state: MigrationState::Pending,
            step: "queued".to_string(),
            progress: 0,
            steps_done: 0,
            steps_total: STEPS_TOTAL,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            size_kb: None,
            overwritten: false,
            retries: 0,
        }
    }

    /// Whether no further transitions can occur.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition to `Failed`, preserving the step counter so observers
    /// can see how far the migration got.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.state = MigrationState::Failed;
        self.error = Some(if message.is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
        self.ended_at = Some(Utc::now());
    }

    /// Transition to `Completed`: progress forced to 100, end stamped.
    pub fn complete(&mut self) {
        self.state = MigrationState::Completed;
        self.step = "done".to_string();
        self.progress = 100;
        self.steps_done = self.steps_total;
        self.error = None;
        self.ended_at = Some(Utc::now());
    }
}

/// One bulk migration request: a fixed set of repository keys plus their
/// live status records.
///
/// The key set is fixed at creation; only status values mutate afterwards.
/// `ended_at` is set exactly once, when the last repository turns terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJob {
    /// Job identifier.
    pub id: JobId,
    /// Repository keys in submission order. Order defines batch
    /// partitioning, not priority.
    pub keys: Vec<RepoKey>,
    /// When the job was accepted.
    pub started_at: DateTime<Utc>,
    /// When every repository reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Status record per repository key.
    #[serde(with = "repo_map")]
    pub repos: HashMap<RepoKey, RepoStatus>,
}

/// Serialize the status map as a sorted list. JSON object keys must be
/// strings, and each record already carries its key.
mod repo_map {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{RepoKey, RepoStatus};

    pub fn serialize<S: Serializer>(
        map: &HashMap<RepoKey, RepoStatus>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut values: Vec<&RepoStatus> = map.values().collect();
        values.sort_by(|a, b| a.key.cmp(&b.key));
        values.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<RepoKey, RepoStatus>, D::Error> {
        let values = Vec::<RepoStatus>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|status| (status.key.clone(), status))
            .collect())
    }
}

impl BulkJob {
    /// Create a job with all repositories in the initial `Pending` state.
    ///
    /// Duplicate keys are dropped, keeping the first occurrence.
    #[must_use]
    pub fn new(id: JobId, keys: Vec<RepoKey>) -> Self {
        let mut seen = Vec::with_capacity(keys.len());
        let mut repos = HashMap::with_capacity(keys.len());
        for key in keys {
            if repos.contains_key(&key) {
                continue;
            }
            repos.insert(key.clone(), RepoStatus::pending(key.clone()));
            seen.push(key);
        }
        Self {
            id,
            keys: seen,
            started_at: Utc::now(),
            ended_at: None,
            repos,
        }
    }

    /// Whether every repository is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.repos.values().all(RepoStatus::is_terminal)
    }

    /// Status record for a single repository, if the key belongs to this job.
    #[must_use]
    pub fn repo(&self, key: &RepoKey) -> Option<&RepoStatus> {
        self.repos.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> RepoKey {
        RepoKey::new(
            format!("https://old.example.com/org/repo{n}.git"),
            format!("https://new.example.com/org/repo{n}.git"),
        )
    }

    #[test]
    fn test_repo_key_display() {
        let k = RepoKey::new("a", "b");
        assert_eq!(k.to_string(), "a -> b");
    }

    #[test]
    fn test_state_terminal_predicates() {
        assert!(!MigrationState::Pending.is_terminal());
        assert!(!MigrationState::Cloning.is_terminal());
        assert!(!MigrationState::Pushing.is_terminal());
        assert!(!MigrationState::Completing.is_terminal());
        assert!(MigrationState::Completed.is_terminal());
        assert!(MigrationState::Failed.is_terminal());
    }

    #[test]
    fn test_state_in_progress_predicates() {
        assert!(!MigrationState::Pending.is_in_progress());
        assert!(MigrationState::Cloning.is_in_progress());
        assert!(MigrationState::Pushing.is_in_progress());
        assert!(MigrationState::Completing.is_in_progress());
        assert!(!MigrationState::Completed.is_in_progress());
        assert!(!MigrationState::Failed.is_in_progress());
    }

    #[test]
    fn test_pending_status_initial_values() {
        let status = RepoStatus::pending(key(1));
        assert_eq!(status.state, MigrationState::Pending);
        assert_eq!(status.progress, 0);
        assert_eq!(status.steps_done, 0);
        assert_eq!(status.steps_total, STEPS_TOTAL);
        assert!(status.ended_at.is_none());
        assert!(status.error.is_none());
        assert!(!status.overwritten);
        assert_eq!(status.retries, 0);
    }

    #[test]
    fn test_fail_sets_error_and_end() {
        let mut status = RepoStatus::pending(key(1));
        status.steps_done = 3;
        status.fail("tags rejected");

        assert_eq!(status.state, MigrationState::Failed);
        assert_eq!(status.error.as_deref(), Some("tags rejected"));
        assert!(status.ended_at.is_some());
        // Step counter preserved so observers can see how far it got.
        assert_eq!(status.steps_done, 3);
    }

    #[test]
    fn test_fail_never_leaves_empty_message() {
        let mut status = RepoStatus::pending(key(1));
        status.fail("");
        assert_eq!(status.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_complete_forces_progress_to_100() {
        let mut status = RepoStatus::pending(key(1));
        status.progress = 90;
        status.complete();

        assert_eq!(status.state, MigrationState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.steps_done, status.steps_total);
        assert!(status.ended_at.is_some());
        assert!(status.error.is_none());
    }

    #[test]
    fn test_bulk_job_creates_pending_records() {
        let job = BulkJob::new(JobId::new(), vec![key(1), key(2), key(3)]);
        assert_eq!(job.keys.len(), 3);
        assert_eq!(job.repos.len(), 3);
        assert!(job.repos.values().all(|r| r.state == MigrationState::Pending));
        assert!(job.ended_at.is_none());
    }

    #[test]
    fn test_bulk_job_dedups_keys_preserving_order() {
        let job = BulkJob::new(JobId::new(), vec![key(1), key(2), key(1), key(3)]);
        assert_eq!(job.keys, vec![key(1), key(2), key(3)]);
        assert_eq!(job.repos.len(), 3);
    }

    #[test]
    fn test_bulk_job_terminal_only_when_all_repos_terminal() {
        let mut job = BulkJob::new(JobId::new(), vec![key(1), key(2)]);
        assert!(!job.is_terminal());

        job.repos.get_mut(&key(1)).unwrap().complete();
        assert!(!job.is_terminal());

        job.repos.get_mut(&key(2)).unwrap().fail("boom");
        assert!(job.is_terminal());
    }

    #[test]
    fn test_empty_job_is_trivially_terminal() {
        let job = BulkJob::new(JobId::new(), Vec::new());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_job_id_display_roundtrip() {
        let id = JobId::new();
        let parsed = Uuid::parse_str(&id.to_string()).unwrap();
        assert_eq!(JobId::from_uuid(parsed), id);
    }

    #[test]
    fn test_status_serializes_state_as_snake_case() {
        let status = RepoStatus::pending(key(1));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "pending");
    }

    #[test]
    fn test_bulk_job_json_roundtrip() {
        let mut job = BulkJob::new(JobId::new(), vec![key(1), key(2)]);
        job.repos.get_mut(&key(1)).unwrap().complete();
        job.repos.get_mut(&key(2)).unwrap().fail("boom");

        let json = serde_json::to_value(&job).unwrap();
        // Status records serialize as a list, sorted by key.
        assert!(json["repos"].is_array());
        assert_eq!(json["repos"].as_array().unwrap().len(), 2);

        let restored: BulkJob = serde_json::from_value(json).unwrap();
        assert_eq!(restored, job);
    }
}
