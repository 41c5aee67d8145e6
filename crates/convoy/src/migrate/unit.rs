//! Per-repository migration worker.
//!
//! Drives one repository through the pipeline state machine:
//! `Pending -> Cloning -> Pushing -> Completing -> {Completed | Failed}`.
//! Every outcome, including a worker-local error, resolves to a terminal
//! status record; nothing propagates upward into siblings or the
//! scheduler.

use std::future::Future;
use std::time::Duration;

use crate::retry::with_retry;
use crate::status::{JobId, MigrationState, RepoKey, StatusStore};
use crate::transfer::{PushComponent, TransferClient, TransferError};
use crate::workdir::JobWorkspace;

use super::progress::{MigrateProgress, ProgressCallback, emit};
use super::types::MigrateOptions;

/// Progress checkpoints for the pipeline. Values only ever move forward;
/// the store clamps any regression.
const PROGRESS_CLONE_STARTED: u8 = 5;
const PROGRESS_CLONED: u8 = 30;
const PROGRESS_AFTER_PUSH: [u8; 3] = [55, 75, 85];
const PROGRESS_VERIFYING: u8 = 90;

/// Step label for the clone phase.
pub(crate) const STEP_CLONE: &str = "clone";
/// Step label for the verification phase.
pub(crate) const STEP_VERIFY: &str = "verify";

/// Drive a single repository to a terminal state.
///
/// The status record is mutated through the store after every phase; the
/// unit owns its working directory and releases it on every exit path.
pub(crate) async fn migrate_repo<C: TransferClient>(
    client: &C,
    store: &StatusStore,
    job: &JobId,
    key: &RepoKey,
    workspace: &JobWorkspace,
    options: &MigrateOptions,
    on_progress: Option<&ProgressCallback>,
) {
    emit(on_progress, MigrateProgress::RepoStarted { key: key.clone() });

    let work_dir = match workspace.unit_dir(key) {
        Ok(dir) => dir,
        Err(e) => {
            fail_repo(
                store,
                job,
                key,
                format!("working directory allocation failed: {e}"),
                on_progress,
            );
            return;
        }
    };

    // Pending -> Cloning.
    let force = options.force;
    update(store, job, key, |s| {
        s.state = MigrationState::Cloning;
        s.step = STEP_CLONE.to_string();
        s.progress = PROGRESS_CLONE_STARTED;
        s.overwritten = force;
    });

    // Best-effort size lookup, display only.
    let size_kb = timed(client.get_size(&key.source), options.operation_timeout)
        .await
        .ok();
    if let Some(kb) = size_kb {
        update(store, job, key, |s| s.size_kb = Some(kb));
    }
    emit(
        on_progress,
        MigrateProgress::CloneStarted {
            key: key.clone(),
            size_kb,
        },
    );

    // Cloning.
    let (fetch_result, retries) = with_retry(
        &options.retry,
        || timed(client.fetch_source(&key.source, work_dir.path()), options.operation_timeout),
        key,
        STEP_CLONE,
        on_progress,
    )
    .await;
    if retries > 0 {
        update(store, job, key, |s| s.retries += retries);
    }

    let info = match fetch_result {
        Ok(info) => info,
        Err(e) => {
            fail_repo(store, job, key, e.to_string(), on_progress);
            return;
        }
    };

    update(store, job, key, |s| {
        s.steps_done = 1;
        s.progress = PROGRESS_CLONED;
        s.state = MigrationState::Pushing;
        if s.size_kb.is_none() {
            s.size_kb = info.size_kb;
        }
    });
    emit(
        on_progress,
        MigrateProgress::CloneComplete {
            key: key.clone(),
            branches: info.branches,
            tags: info.tags,
        },
    );

    // Pushing: default branch, then branches, then tags. A component
    // failure is terminal with the step counter preserved at the furthest
    // completed component.
    for (index, component) in PushComponent::ORDER.into_iter().enumerate() {
        update(store, job, key, |s| s.step = component.label().to_string());
        emit(
            on_progress,
            MigrateProgress::PushStarted {
                key: key.clone(),
                component,
            },
        );

        let (push_result, retries) = with_retry(
            &options.retry,
            || {
                timed(
                    client.push_target(&key.target, work_dir.path(), component, options.force),
                    options.operation_timeout,
                )
            },
            key,
            component.label(),
            on_progress,
        )
        .await;
        if retries > 0 {
            update(store, job, key, |s| s.retries += retries);
        }

        if let Err(e) = push_result {
            fail_repo(store, job, key, e.to_string(), on_progress);
            return;
        }

        update(store, job, key, |s| {
            s.steps_done = 2 + index as u8;
            s.progress = PROGRESS_AFTER_PUSH[index];
        });
        emit(
            on_progress,
            MigrateProgress::PushComplete {
                key: key.clone(),
                component,
            },
        );
    }

    // Completing: verify the target, release the working directory.
    update(store, job, key, |s| {
        s.state = MigrationState::Completing;
        s.step = STEP_VERIFY.to_string();
        s.progress = PROGRESS_VERIFYING;
    });
    emit(on_progress, MigrateProgress::Verifying { key: key.clone() });

    if let Err(e) = timed(client.verify_target(&key.target), options.operation_timeout).await {
        fail_repo(store, job, key, e.to_string(), on_progress);
        return;
    }

    if let Err(e) = work_dir.release() {
        tracing::warn!(repo = %key, error = %e, "Failed to release unit directory");
    }

    update(store, job, key, |s| s.complete());
    emit(
        on_progress,
        MigrateProgress::RepoCompleted { key: key.clone() },
    );
}

/// Record a terminal failure for a repository the scheduler decided not to
/// start (external abort). The status still reaches a terminal state so
/// the job terminates cleanly.
pub(crate) fn skip_repo(
    store: &StatusStore,
    job: &JobId,
    key: &RepoKey,
    on_progress: Option<&ProgressCallback>,
) {
    fail_repo(
        store,
        job,
        key,
        "aborted before start".to_string(),
        on_progress,
    );
}

/// Record a terminal failure and report it. A record that is already
/// terminal is left untouched (a worker can fail late, after its
/// repository completed, e.g. out of the scheduler's panic handler).
pub(crate) fn fail_repo(
    store: &StatusStore,
    job: &JobId,
    key: &RepoKey,
    message: String,
    on_progress: Option<&ProgressCallback>,
) {
    let mut recorded = false;
    update(store, job, key, |s| {
        if !s.is_terminal() {
            s.fail(message.clone());
            recorded = true;
        }
    });

    if recorded {
        tracing::warn!(repo = %key, error = %message, "Repository migration failed");
        emit(
            on_progress,
            MigrateProgress::RepoFailed {
                key: key.clone(),
                error: message,
            },
        );
    }
}

/// Apply a status mutation, logging (rather than propagating) store
/// errors: the engine only hands workers keys that exist.
fn update<F>(store: &StatusStore, job: &JobId, key: &RepoKey, mutate: F)
where
    F: FnOnce(&mut crate::status::RepoStatus),
{
    if let Err(e) = store.update_repo(job, key, mutate) {
        tracing::error!(repo = %key, error = %e, "Status update failed");
    }
}

/// Run a transfer operation under the operation-level timeout. Exceeding
/// the timeout counts as a transient failure.
async fn timed<T, Fut>(fut: Fut, timeout: Duration) -> Result<T, TransferError>
where
    Fut: Future<Output = Result<T, TransferError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransferError::timeout(timeout.as_secs())),
    }
}
