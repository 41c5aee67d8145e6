//! Convoy - bulk repository migration orchestration.
//!
//! This library drives many repository migrations concurrently, each
//! through a fixed clone/push/verify pipeline, while maintaining a
//! lock-guarded status model that any number of observers can poll or
//! stream. Individual failures resolve to per-repository `Failed` records;
//! the bulk job always reaches a terminal state.
//!
//! # Features
//!
//! - `git` (default) - Enables [`git::GitTransferClient`], a reference
//!   transfer client that shells out to the `git` binary.
//!
//! # Example
//!
//! ```ignore
//! use convoy::{GitTransferClient, MigrationContext, RepoKey};
//!
//! let ctx = MigrationContext::builder()
//!     .client(GitTransferClient::new())
//!     .build()?;
//!
//! let job = ctx.create_job(vec![RepoKey::new(
//!     "https://old.example.com/org/repo.git",
//!     "https://new.example.com/org/repo.git",
//! )]);
//!
//! // Drive the job and wait for the terminal snapshot...
//! let terminal = ctx.run_job(&job).await?;
//!
//! // ...or stream live updates; the first subscriber starts the run.
//! let mut stream = ctx.subscribe(&job)?;
//! while let Some(event) = stream.next().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod migrate;
pub mod publish;
pub mod retry;
pub mod status;
pub mod transfer;
pub mod workdir;

#[cfg(feature = "git")]
pub mod git;

#[cfg(feature = "git")]
pub use git::GitTransferClient;
pub use migrate::{
    AggregateProgress, ContextError, EngineError, MigrateOptions, MigrateProgress,
    MigrationContext, MigrationContextBuilder, ProgressCallback, aggregate, plan_batches,
    run_bulk,
};
pub use publish::{JobEvent, JobSubscription};
pub use retry::RetryConfig;
pub use status::{
    BulkJob, JobId, MigrationState, RepoKey, RepoStatus, StatusStore, StoreError,
};
pub use transfer::{FetchInfo, PushComponent, TransferClient, TransferError};
