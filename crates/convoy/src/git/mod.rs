//! Reference transfer client built on the `git` binary.
//!
//! The orchestration engine only consumes the
//! [`TransferClient`](crate::transfer::TransferClient) contract; this
//! module provides the default implementation for it. Provider REST
//! features (size lookups) are intentionally absent: the plain git
//! transport cannot answer them, and the engine treats them as
//! best-effort.

mod client;
mod error;

pub use client::GitTransferClient;
