//! Migration context: the caller-facing front door.
//!
//! Bundles the transfer client, an injected status store, options, and
//! optional progress/shutdown hooks behind a builder, and exposes the
//! caller contract: create a job, poll it, stream it, or drive it to a
//! terminal state. Runs start lazily and exactly once per job, no matter
//! how many subscribers attach.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;

use crate::publish::{self, JobSubscription};
use crate::status::{BulkJob, JobId, RepoKey, StatusStore, StoreError};
use crate::transfer::TransferClient;

use super::aggregate::{AggregateProgress, aggregate};
use super::engine;
use super::progress::ProgressCallback;
use super::types::MigrateOptions;

/// Error type for context operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Missing required field in builder.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// Status store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Builder for creating a [`MigrationContext`].
pub struct MigrationContextBuilder<C> {
    client: Option<C>,
    store: Option<Arc<StatusStore>>,
    options: Option<MigrateOptions>,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<C> Default for MigrationContextBuilder<C> {
    fn default() -> Self {
        Self {
            client: None,
            store: None,
            options: None,
            progress: None,
            shutdown_flag: None,
        }
    }
}

impl<C: TransferClient + Clone + 'static> MigrationContextBuilder<C> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transfer client (required).
    #[must_use]
    pub fn client(mut self, client: C) -> Self {
        self.client = Some(client);
        self
    }

    /// Inject a status store. Defaults to a fresh instance; inject a
    /// shared one to serve status queries from outside the context.
    #[must_use]
    pub fn store(mut self, store: Arc<StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set migration options.
    #[must_use]
    pub fn options(mut self, options: MigrateOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn progress(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Set the abort flag. When raised, not-yet-started units are skipped;
    /// in-flight units run to completion.
    #[must_use]
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Build the migration context.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::MissingField` if the client is not set.
    pub fn build(self) -> Result<MigrationContext<C>> {
        let client = self
            .client
            .ok_or(ContextError::MissingField { field: "client" })?;

        Ok(MigrationContext {
            client,
            store: self.store.unwrap_or_default(),
            options: self.options.unwrap_or_default(),
            progress: self.progress,
            shutdown_flag: self.shutdown_flag,
            runs: Mutex::new(HashMap::new()),
        })
    }
}

/// Caller-facing surface over the orchestration engine.
pub struct MigrationContext<C> {
    client: C,
    store: Arc<StatusStore>,
    options: MigrateOptions,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    /// One entry per started run; the receiver resolves to `true` when the
    /// run reaches a terminal state.
    runs: Mutex<HashMap<JobId, watch::Receiver<bool>>>,
}

impl<C: TransferClient + Clone + 'static> MigrationContext<C> {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> MigrationContextBuilder<C> {
        MigrationContextBuilder::new()
    }

    /// Get a reference to the transfer client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get a reference to the options.
    pub fn options(&self) -> &MigrateOptions {
        &self.options
    }

    /// Get a handle to the status store.
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Accept a bulk request: registers the job with every repository in
    /// the initial `Pending` state and returns its id. Nothing runs until
    /// the first `run_job` or `subscribe` call.
    pub fn create_job(&self, keys: Vec<RepoKey>) -> JobId {
        self.store.create_job(keys)
    }

    /// Accept a bulk request under a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateJob` (wrapped) if the id is taken.
    pub fn create_job_with_id(&self, id: JobId, keys: Vec<RepoKey>) -> Result<JobId> {
        Ok(self.store.create_job_with_id(id, keys)?)
    }

    /// Single-shot status poll: an immutable snapshot plus its aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` (wrapped) for an unknown id.
    pub fn snapshot(&self, job: &JobId) -> Result<(BulkJob, AggregateProgress)> {
        let snapshot = self.store.get(job)?;
        let agg = aggregate(&snapshot);
        Ok((snapshot, agg))
    }

    /// Drive a job to a terminal state and return the terminal snapshot.
    ///
    /// Idempotent: concurrent callers (and subscribers) share a single
    /// underlying run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` (wrapped) for an unknown id.
    pub async fn run_job(&self, job: &JobId) -> Result<BulkJob> {
        let mut done = self.ensure_started(job)?;
        // A dropped sender means the run task aborted; the store still
        // reflects how far it got.
        let _ = done.wait_for(|done| *done).await;
        Ok(self.store.get(job)?)
    }

    /// Subscribe to a job's live status stream.
    ///
    /// The first subscription to a not-yet-started job starts the run;
    /// additional subscribers attach to the same run. A subscriber
    /// attaching after the job is terminal receives exactly one event (the
    /// terminal snapshot) before the stream closes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownJob` (wrapped) for an unknown id.
    pub fn subscribe(&self, job: &JobId) -> Result<JobSubscription> {
        self.ensure_started(job)?;
        Ok(publish::subscribe(Arc::clone(&self.store), *job))
    }

    /// Check if an external abort has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Start the run for a job exactly once; later calls return the
    /// existing completion receiver.
    fn ensure_started(&self, job: &JobId) -> Result<watch::Receiver<bool>> {
        if !self.store.contains(job) {
            return Err(StoreError::UnknownJob(*job).into());
        }

        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rx) = runs.get(job) {
            return Ok(rx.clone());
        }

        let (tx, rx) = watch::channel(false);
        runs.insert(*job, rx.clone());

        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        let options = self.options.clone();
        let shutdown = self.shutdown_flag.clone();
        let progress = self.progress.clone();
        let job = *job;

        tokio::spawn(async move {
            if let Err(e) =
                engine::run_bulk(&client, &store, &job, &options, shutdown, progress).await
            {
                tracing::error!(job = %job, error = %e, "Bulk run failed");
            }
            let _ = tx.send(true);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::publish::JobEvent;
    use crate::retry::RetryConfig;
    use crate::transfer::{FetchInfo, PushComponent, TransferError};

    /// Always-succeeding client that counts warm-ups, one per run.
    #[derive(Clone, Default)]
    struct CountingTransfer {
        warmups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransferClient for CountingTransfer {
        async fn warm_up(&self) -> std::result::Result<(), TransferError> {
            self.warmups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_size(&self, _source: &str) -> std::result::Result<u64, TransferError> {
            Ok(1)
        }

        async fn fetch_source(
            &self,
            _source: &str,
            _work_dir: &Path,
        ) -> std::result::Result<FetchInfo, TransferError> {
            Ok(FetchInfo::default())
        }

        async fn push_target(
            &self,
            _target: &str,
            _work_dir: &Path,
            _component: PushComponent,
            _force: bool,
        ) -> std::result::Result<(), TransferError> {
            Ok(())
        }

        async fn verify_target(&self, _target: &str) -> std::result::Result<(), TransferError> {
            Ok(())
        }
    }

    fn keys(n: usize) -> Vec<RepoKey> {
        (0..n)
            .map(|i| RepoKey::new(format!("src/{i}"), format!("dst/{i}")))
            .collect()
    }

    fn test_context(base: &Path) -> MigrationContext<CountingTransfer> {
        MigrationContext::builder()
            .client(CountingTransfer::default())
            .options(MigrateOptions {
                retry: RetryConfig::new(Duration::from_millis(1), Duration::from_millis(5), 2)
                    .with_jitter(false),
                work_root: Some(base.to_path_buf()),
                ..MigrateOptions::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_client() {
        let err = MigrationContextBuilder::<CountingTransfer>::new()
            .build()
            .err()
            .expect("builder should require client");

        match err {
            ContextError::MissingField { field } => assert_eq!(field, "client"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn test_builder_defaults_store_and_options() {
        let ctx = MigrationContext::builder()
            .client(CountingTransfer::default())
            .build()
            .unwrap();

        assert!(ctx.store().job_ids().is_empty());
        assert_eq!(
            ctx.options().batch_size,
            MigrateOptions::default().batch_size
        );
        assert!(!ctx.is_shutdown_requested());
    }

    #[test]
    fn test_shutdown_flag_reflects_external_state() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = MigrationContext::builder()
            .client(CountingTransfer::default())
            .shutdown_flag(Arc::clone(&flag))
            .build()
            .unwrap();

        assert!(!ctx.is_shutdown_requested());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_job_errors() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let err = ctx.snapshot(&JobId::new()).unwrap_err();
        assert!(matches!(
            err,
            ContextError::Store(StoreError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_create_job_registers_pending_snapshot() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let job = ctx.create_job(keys(3));

        let (snapshot, agg) = ctx.snapshot(&job).unwrap();
        assert_eq!(snapshot.keys.len(), 3);
        assert_eq!(agg.pending, 3);
        assert_eq!(agg.total, 3);
        // Nothing started yet.
        assert_eq!(ctx.client().warmups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_job_drives_to_terminal() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let job = ctx.create_job(keys(2));

        let result = ctx.run_job(&job).await.unwrap();
        assert!(result.is_terminal());
        assert!(result.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_two_subscribers_share_one_run() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let job = ctx.create_job(keys(2));

        let mut first = ctx.subscribe(&job).unwrap();
        let mut second = ctx.subscribe(&job).unwrap();

        // Drain both streams to completion.
        while first.next().await.is_some() {}
        while second.next().await.is_some() {}

        assert_eq!(ctx.client().warmups.load(Ordering::SeqCst), 1);

        let (snapshot, agg) = ctx.snapshot(&job).unwrap();
        assert!(snapshot.is_terminal());
        assert_eq!(agg.completed, 2);
    }

    #[tokio::test]
    async fn test_run_job_is_idempotent_with_subscribers() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let job = ctx.create_job(keys(1));

        let mut sub = ctx.subscribe(&job).unwrap();
        let result = ctx.run_job(&job).await.unwrap();
        assert!(result.is_terminal());

        while sub.next().await.is_some() {}
        assert_eq!(ctx.client().warmups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_terminal_snapshot_only() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let job = ctx.create_job(keys(1));

        ctx.run_job(&job).await.unwrap();

        let mut sub = ctx.subscribe(&job).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("timed out")
            .expect("expected one event");
        match event {
            JobEvent::Update { aggregate, .. } => assert!(aggregate.is_terminal()),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(sub.next().await.is_none());

        // Still a single underlying run.
        assert_eq!(ctx.client().warmups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_job_errors() {
        let base = tempfile::tempdir().unwrap();
        let ctx = test_context(base.path());
        let err = ctx.subscribe(&JobId::new()).unwrap_err();
        assert!(matches!(
            err,
            ContextError::Store(StoreError::UnknownJob(_))
        ));
    }
}
