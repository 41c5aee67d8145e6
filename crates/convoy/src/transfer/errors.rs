use std::time::Duration;

use thiserror::Error;

use super::types::PushComponent;

/// Errors reported by a transfer client.
///
/// The engine's retry policy keys off a two-tier taxonomy: transient
/// errors (network blips, timeouts, rate limits) are retried with backoff,
/// fatal errors (authentication, not-found, permission) fail the
/// repository immediately.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// An operation exceeded its timeout.
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The provider rate-limited the operation.
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Authentication against a provider failed.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Source or target repository not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The credentials lack permission for the operation.
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// A compound push partially succeeded before failing.
    #[error("Partial transfer (completed through {done}): {message}")]
    Partial { done: PushComponent, message: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TransferError {
    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[inline]
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create an authentication error.
    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a permission error.
    #[inline]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the retry policy should attempt this operation again.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// Whether the error fails the repository without retry.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which is useful for errors
/// that wrap multi-line tool output. This keeps progress reporting and
/// status records concise.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransferError::network("connection reset").is_transient());
        assert!(TransferError::timeout(30).is_transient());
        assert!(
            TransferError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TransferError::auth("bad token").is_fatal());
        assert!(TransferError::not_found("org/repo").is_fatal());
        assert!(TransferError::permission("read-only token").is_fatal());
        assert!(TransferError::internal("unexpected state").is_fatal());
        assert!(
            TransferError::Partial {
                done: PushComponent::Branches,
                message: "tags rejected".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = TransferError::network("connection refused");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("connection refused"));

        let err = TransferError::timeout(300);
        assert!(err.to_string().contains("300"));

        let err = TransferError::not_found("org/repo");
        assert!(err.to_string().contains("org/repo"));
    }

    #[test]
    fn test_short_error_message_multiline() {
        let err = std::io::Error::other("first line\nsecond line");
        assert_eq!(short_error_message(&err), "first line");
    }
}
