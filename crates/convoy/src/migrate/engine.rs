//! Batch scheduler: drives a bulk job to a terminal state.
//!
//! Partitions the job's keys into fixed-size batches and runs them under
//! two nested concurrency ceilings (batches, and repositories within a
//! batch), both enforced by counting semaphores. Repository failures are
//! recorded in the status store and never abort siblings; when `run_bulk`
//! returns, every repository is terminal and the job end timestamp is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::status::{BulkJob, JobId, RepoKey, StatusStore, StoreError};
use crate::transfer::TransferClient;
use crate::workdir::JobWorkspace;

use super::aggregate::aggregate;
use super::progress::{MigrateProgress, ProgressCallback, emit};
use super::types::{MigrateOptions, plan_batches};
use super::unit;

/// Hard errors from scheduling itself.
///
/// Repository-level failures never surface here; they resolve to `Failed`
/// status records. The only way a run errors is a status-store lookup for
/// an id the store has never seen.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Status store rejected a job lookup.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run a bulk job to a terminal state.
///
/// Idempotent over terminal jobs: re-running a job whose repositories are
/// all terminal returns the stored snapshot without touching the transfer
/// client.
///
/// # Errors
///
/// Returns `EngineError::Store` when `job_id` is unknown to the store.
pub async fn run_bulk<C>(
    client: &C,
    store: &Arc<StatusStore>,
    job_id: &JobId,
    options: &MigrateOptions,
    shutdown: Option<Arc<AtomicBool>>,
    on_progress: Option<Arc<ProgressCallback>>,
) -> Result<BulkJob, EngineError>
where
    C: TransferClient + Clone + 'static,
{
    let snapshot = store.get(job_id)?;
    if snapshot.is_terminal() {
        store.finalize(job_id)?;
        return Ok(store.get(job_id)?);
    }

    let batches = plan_batches(&snapshot.keys, options.batch_size);
    emit(
        on_progress.as_deref(),
        MigrateProgress::PlanReady {
            batches: batches.len(),
            repos: snapshot.keys.len(),
        },
    );

    // Warm-up: establish reusable provider connections so the first
    // transfer in each batch does not pay cold-connection cost. Failures
    // never block the run; workers connect lazily.
    emit(on_progress.as_deref(), MigrateProgress::WarmingUp);
    match tokio::time::timeout(options.operation_timeout, client.warm_up()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Provider warm-up failed");
            emit(
                on_progress.as_deref(),
                MigrateProgress::WarmupFailed {
                    error: e.to_string(),
                },
            );
        }
        Err(_) => {
            tracing::warn!("Provider warm-up timed out");
            emit(
                on_progress.as_deref(),
                MigrateProgress::WarmupFailed {
                    error: "warm-up timed out".to_string(),
                },
            );
        }
    }

    let work_root = options.effective_work_root();
    let workspace = match JobWorkspace::create(&work_root, job_id) {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(error = %e, "Job workspace allocation failed");
            emit(
                on_progress.as_deref(),
                MigrateProgress::Warning {
                    message: format!("workspace allocation failed: {e}"),
                },
            );
            JobWorkspace::at(&work_root, job_id)
        }
    };
    let workspace = Arc::new(workspace);

    let batch_sem = Arc::new(Semaphore::new(options.max_concurrent_batches.max(1)));
    let mut batch_handles = Vec::with_capacity(batches.len());

    for (index, batch) in batches.into_iter().enumerate() {
        let client = client.clone();
        let store = Arc::clone(store);
        let workspace = Arc::clone(&workspace);
        let options = options.clone();
        let shutdown = shutdown.clone();
        let progress = on_progress.clone();
        let batch_sem = Arc::clone(&batch_sem);
        let job_id = *job_id;

        let handle = tokio::spawn(async move {
            let _batch_permit = match batch_sem.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    for key in &batch {
                        unit::fail_repo(
                            &store,
                            &job_id,
                            key,
                            "scheduler semaphore closed unexpectedly".to_string(),
                            progress.as_deref(),
                        );
                    }
                    return;
                }
            };

            emit(
                progress.as_deref(),
                MigrateProgress::BatchStarted {
                    index,
                    size: batch.len(),
                },
            );

            let unit_sem = Arc::new(Semaphore::new(options.per_batch_concurrency.max(1)));
            let mut unit_handles: Vec<(RepoKey, tokio::task::JoinHandle<()>)> =
                Vec::with_capacity(batch.len());

            for key in batch {
                let client = client.clone();
                let store = Arc::clone(&store);
                let workspace = Arc::clone(&workspace);
                let options = options.clone();
                let shutdown = shutdown.clone();
                let progress = progress.clone();
                let unit_sem = Arc::clone(&unit_sem);
                let task_key = key.clone();

                let handle = tokio::spawn(async move {
                    let _unit_permit = match unit_sem.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            unit::fail_repo(
                                &store,
                                &job_id,
                                &task_key,
                                "scheduler semaphore closed unexpectedly".to_string(),
                                progress.as_deref(),
                            );
                            return;
                        }
                    };

                    // Nearest cancellation point: before the unit starts.
                    if shutdown.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
                        unit::skip_repo(&store, &job_id, &task_key, progress.as_deref());
                        return;
                    }

                    unit::migrate_repo(
                        &client,
                        &store,
                        &job_id,
                        &task_key,
                        &workspace,
                        &options,
                        progress.as_deref(),
                    )
                    .await;
                });

                unit_handles.push((key, handle));
            }

            for (key, handle) in unit_handles {
                if let Err(e) = handle.await {
                    // A panicked worker must not leave its repository
                    // non-terminal, or the job would never terminate.
                    unit::fail_repo(
                        &store,
                        &job_id,
                        &key,
                        format!("worker task panicked: {e}"),
                        progress.as_deref(),
                    );
                }
            }

            emit(progress.as_deref(), MigrateProgress::BatchComplete { index });
        });

        batch_handles.push(handle);
    }

    for handle in batch_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Batch task panicked");
        }
    }

    // Release the job workspace after every child released its own
    // directory. All batch tasks are joined, so this unwrap cannot race.
    match Arc::try_unwrap(workspace) {
        Ok(ws) => {
            if let Err(e) = ws.release() {
                tracing::warn!(error = %e, "Failed to release job workspace");
            }
        }
        Err(ws) => {
            tracing::warn!(path = %ws.path().display(), "Job workspace still shared after join");
        }
    }

    // Normally stamped by the last worker's status update; covers jobs
    // with an empty key set.
    store.finalize(job_id)?;

    let job = store.get(job_id)?;
    let agg = aggregate(&job);
    emit(
        on_progress.as_deref(),
        MigrateProgress::JobComplete {
            completed: agg.completed,
            failed: agg.failed,
        },
    );
    tracing::info!(
        job = %job_id,
        completed = agg.completed,
        failed = agg.failed,
        elapsed_secs = agg.elapsed_secs,
        "Bulk migration finished"
    );

    Ok(job)
}
