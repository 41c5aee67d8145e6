//! Status model and lock-guarded status store.
//!
//! The status store is the single shared mutable structure in the engine:
//! every worker mutates its own repository record through it, and every
//! reader (aggregator, publisher, pollers) takes immutable snapshots from
//! it.

mod store;
mod types;

pub use store::{Result, StatusStore, StoreError};
pub use types::{BulkJob, JobId, MigrationState, RepoKey, RepoStatus, STEPS_TOTAL};
