//! Event publisher: live status streams for job observers.
//!
//! Each subscription is fed by its own poller task that snapshots the
//! status store, suppresses no-change emissions by structural comparison,
//! and closes the stream after delivering the terminal snapshot. Publisher
//! failures are confined to the subscription: they never reach the
//! scheduler or the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::migrate::{AggregateProgress, aggregate};
use crate::status::{BulkJob, JobId, StatusStore};

/// How often a subscription polls the store for changes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Buffered events per subscription. A slow subscriber backpressures its
/// own poller, nothing else.
pub const EVENT_CHANNEL_BUFFER: usize = 64;

/// One element of a job's status stream.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The job snapshot changed.
    Update {
        /// Immutable snapshot of the job.
        job: BulkJob,
        /// Bulk-level progress derived from the snapshot.
        aggregate: AggregateProgress,
    },
    /// The publisher failed internally; the stream ends after this event.
    Error {
        /// What went wrong.
        message: String,
    },
}

/// A live status stream for one job.
///
/// The stream yields an event for every structural change of the job
/// snapshot and closes after the terminal snapshot (or a single `Error`
/// event). Dropping the subscription stops its poller.
#[derive(Debug)]
pub struct JobSubscription {
    rx: mpsc::Receiver<JobEvent>,
}

impl JobSubscription {
    /// Receive the next event, or `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    /// Unwrap into the underlying channel receiver.
    #[must_use]
    pub fn into_receiver(self) -> mpsc::Receiver<JobEvent> {
        self.rx
    }
}

/// Subscribe to a job's status stream at the default poll interval.
///
/// The subscription observes whatever the store holds; it does not start
/// the run. Use [`MigrationContext::subscribe`](crate::MigrationContext)
/// for lazy-start semantics.
#[must_use]
pub fn subscribe(store: Arc<StatusStore>, job: JobId) -> JobSubscription {
    subscribe_with_interval(store, job, POLL_INTERVAL)
}

/// Subscribe with a custom poll interval.
#[must_use]
pub fn subscribe_with_interval(
    store: Arc<StatusStore>,
    job: JobId,
    poll: Duration,
) -> JobSubscription {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

    tokio::spawn(async move {
        let mut last: Option<BulkJob> = None;
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let snapshot = match store.get(&job) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(job = %job, error = %e, "Status stream failed");
                    let _ = tx
                        .send(JobEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            // The job end timestamp is only ever set after every
            // repository is terminal, so closing on it can never skip the
            // terminal transition.
            let terminal = snapshot.ended_at.is_some();

            if last.as_ref() != Some(&snapshot) {
                let aggregate = aggregate(&snapshot);
                if tx
                    .send(JobEvent::Update {
                        job: snapshot.clone(),
                        aggregate,
                    })
                    .await
                    .is_err()
                {
                    // Subscriber went away.
                    return;
                }
                last = Some(snapshot);
            }

            if terminal {
                return;
            }
        }
    });

    JobSubscription { rx }
}
