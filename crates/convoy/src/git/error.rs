//! Classification of `git` command failures.
//!
//! The retry policy needs transient and fatal failures distinguished, but
//! the `git` binary only gives us an exit status and stderr text, so the
//! mapping is pattern-based. Unknown failures classify as fatal: retrying
//! an error we cannot identify wastes the backoff budget.

use crate::transfer::TransferError;

/// Map a failed git invocation to the transfer error taxonomy.
///
/// `context` names the resource the command operated on (remote URL or a
/// description) for not-found messages.
pub(crate) fn classify_git_failure(context: &str, stderr: &str) -> TransferError {
    let lower = stderr.to_lowercase();
    let message = first_line(stderr);

    // ssh reports auth failures as "Permission denied (publickey)";
    // check before the generic permission patterns.
    if lower.contains("permission denied (publickey")
        || lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
        || lower.contains("invalid username or token")
        || lower.contains("http 401")
    {
        return TransferError::auth(message);
    }

    if lower.contains("http 403")
        || lower.contains("permission denied")
        || (lower.contains("permission to") && lower.contains("denied"))
    {
        return TransferError::permission(message);
    }

    if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
        || lower.contains("http 404")
        || lower.contains("not found")
    {
        return TransferError::not_found(context.to_string());
    }

    if lower.contains("http 429") || lower.contains("rate limit") {
        return TransferError::RateLimited { retry_after: None };
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("connection timed out")
        || lower.contains("operation timed out")
        || lower.contains("early eof")
        || lower.contains("the remote end hung up")
        || lower.contains("rpc failed")
        || lower.contains("could not connect")
    {
        return TransferError::network(message);
    }

    TransferError::internal(message)
}

fn first_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if line.is_empty() {
        "git command failed".to_string()
    } else {
        line.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_classify_as_auth() {
        let err = classify_git_failure(
            "https://x/y.git",
            "fatal: Authentication failed for 'https://x/y.git'",
        );
        assert!(matches!(err, TransferError::Auth { .. }));

        let err = classify_git_failure("git@x:y.git", "git@x: Permission denied (publickey).");
        assert!(matches!(err, TransferError::Auth { .. }));

        let err = classify_git_failure(
            "https://x/y.git",
            "fatal: could not read Username for 'https://x': terminal prompts disabled",
        );
        assert!(matches!(err, TransferError::Auth { .. }));
    }

    #[test]
    fn test_permission_failures_classify_as_permission() {
        let err = classify_git_failure(
            "https://x/y.git",
            "remote: Permission to org/repo.git denied to user.",
        );
        assert!(matches!(err, TransferError::PermissionDenied { .. }));
    }

    #[test]
    fn test_missing_repository_classifies_as_not_found() {
        let err = classify_git_failure("https://x/gone.git", "remote: Repository not found.");
        match err {
            TransferError::NotFound { resource } => assert_eq!(resource, "https://x/gone.git"),
            other => panic!("unexpected: {other:?}"),
        }

        let err = classify_git_failure(
            "/tmp/nope",
            "fatal: '/tmp/nope' does not appear to be a git repository",
        );
        assert!(matches!(err, TransferError::NotFound { .. }));
    }

    #[test]
    fn test_network_failures_are_transient() {
        for stderr in [
            "fatal: unable to access 'https://x/': Could not resolve host: x",
            "fatal: unable to access 'https://x/': Connection refused",
            "error: RPC failed; curl 18 transfer closed with outstanding read data remaining",
            "fatal: the remote end hung up unexpectedly",
            "fatal: early EOF",
        ] {
            let err = classify_git_failure("https://x/", stderr);
            assert!(err.is_transient(), "expected transient for: {stderr}");
        }
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify_git_failure(
            "https://x/y.git",
            "error: The requested URL returned error: HTTP 429",
        );
        assert!(matches!(err, TransferError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_failures_are_fatal() {
        let err = classify_git_failure(
            "https://x/y.git",
            "error: failed to push some refs to 'https://x/y.git'",
        );
        assert!(matches!(err, TransferError::Internal { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_message_is_first_non_empty_line() {
        let err = classify_git_failure("ctx", "\nerror: something broke\ndetail line");
        match err {
            TransferError::Internal { message } => {
                assert_eq!(message, "error: something broke");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_stderr_gets_placeholder_message() {
        let err = classify_git_failure("ctx", "");
        match err {
            TransferError::Internal { message } => assert_eq!(message, "git command failed"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
