//! Shared migration options, constants, and the batch plan.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::status::RepoKey;

/// Default number of repositories per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of batches running concurrently.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 5;

/// Default number of repositories migrating concurrently within one batch.
pub const DEFAULT_PER_BATCH_CONCURRENCY: usize = 4;

/// Default timeout for a single network operation within a unit.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Options for a bulk migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Repositories per batch. The last batch may be shorter.
    pub batch_size: usize,
    /// Batches running concurrently.
    pub max_concurrent_batches: usize,
    /// Repositories migrating concurrently within one batch. Total
    /// in-flight transfers never exceed
    /// `max_concurrent_batches * per_batch_concurrency`.
    pub per_batch_concurrency: usize,
    /// Timeout applied to each network operation; exceeding it counts as
    /// a transient failure.
    pub operation_timeout: Duration,
    /// Retry policy for transient transfer failures.
    pub retry: RetryConfig,
    /// Force-overwrite refs on targets that already exist. Caller-level
    /// policy, passed through to the transfer client untouched.
    pub force: bool,
    /// Root directory for job workspaces. Defaults to
    /// `<system temp>/convoy`.
    pub work_root: Option<PathBuf>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            per_batch_concurrency: DEFAULT_PER_BATCH_CONCURRENCY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            retry: RetryConfig::default(),
            force: false,
            work_root: None,
        }
    }
}

impl MigrateOptions {
    /// Effective workspace root for this run.
    #[must_use]
    pub fn effective_work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("convoy"))
    }
}

/// Partition a job's ordered keys into consecutive fixed-size batches.
///
/// Built once at job start and used only to bound scheduling concurrency;
/// the plan is never stored as state. A `batch_size` of zero is treated
/// as one.
#[must_use]
pub fn plan_batches(keys: &[RepoKey], batch_size: usize) -> Vec<Vec<RepoKey>> {
    keys.chunks(batch_size.max(1))
        .map(<[RepoKey]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<RepoKey> {
        (0..n)
            .map(|i| RepoKey::new(format!("src/{i}"), format!("dst/{i}")))
            .collect()
    }

    #[test]
    fn test_default_options() {
        let options = MigrateOptions::default();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.max_concurrent_batches, DEFAULT_MAX_CONCURRENT_BATCHES);
        assert_eq!(options.per_batch_concurrency, DEFAULT_PER_BATCH_CONCURRENCY);
        assert_eq!(options.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
        assert!(!options.force);
        assert!(options.work_root.is_none());
    }

    #[test]
    fn test_plan_splits_into_consecutive_batches() {
        let keys = keys(3);
        let plan = plan_batches(&keys, 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], keys[0..2].to_vec());
        assert_eq!(plan[1], keys[2..3].to_vec());
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = plan_batches(&keys(10), 5);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|b| b.len() == 5));
    }

    #[test]
    fn test_plan_empty_input() {
        let plan = plan_batches(&[], 10);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_zero_batch_size_treated_as_one() {
        let plan = plan_batches(&keys(3), 0);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_plan_preserves_submission_order() {
        let keys = keys(7);
        let plan = plan_batches(&keys, 3);
        let flattened: Vec<RepoKey> = plan.into_iter().flatten().collect();
        assert_eq!(flattened, keys);
    }

    #[test]
    fn test_effective_work_root_defaults_under_temp() {
        let options = MigrateOptions::default();
        assert!(
            options
                .effective_work_root()
                .starts_with(std::env::temp_dir())
        );

        let custom = MigrateOptions {
            work_root: Some(PathBuf::from("/srv/migrations")),
            ..MigrateOptions::default()
        };
        assert_eq!(
            custom.effective_work_root(),
            PathBuf::from("/srv/migrations")
        );
    }
}
