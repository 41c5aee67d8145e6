//! The migration orchestration engine.
//!
//! # Module structure
//!
//! - [`types`] - Options, concurrency defaults, and the batch plan
//! - [`progress`] - Progress events: `MigrateProgress`, `ProgressCallback`, `emit()`
//! - [`aggregate`] - Bulk-level progress derived from job snapshots
//! - [`engine`] - The batch scheduler: `run_bulk()`
//! - [`context`] - Builder-based caller surface: `MigrationContext`
//!
//! # Example
//!
//! ```ignore
//! use convoy::{MigrationContext, MigrateOptions, RepoKey};
//!
//! let ctx = MigrationContext::builder()
//!     .client(git_client)
//!     .options(MigrateOptions::default())
//!     .build()?;
//!
//! let job = ctx.create_job(vec![RepoKey::new(
//!     "https://old.example.com/org/repo.git",
//!     "https://new.example.com/org/repo.git",
//! )]);
//!
//! let mut stream = ctx.subscribe(&job)?;
//! while let Some(event) = stream.next().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod aggregate;
pub mod context;
pub mod engine;
mod progress;
mod types;
mod unit;

// Re-export types
pub use types::{MigrateOptions, plan_batches};

// Re-export constants
pub use types::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_BATCHES, DEFAULT_OPERATION_TIMEOUT,
    DEFAULT_PER_BATCH_CONCURRENCY,
};

// Re-export progress types
pub use progress::{MigrateProgress, ProgressCallback, emit};

// Re-export the aggregator and engine entry points
pub use aggregate::{AggregateProgress, aggregate};
pub use context::{ContextError, MigrationContext, MigrationContextBuilder};
pub use engine::{EngineError, run_bulk};
