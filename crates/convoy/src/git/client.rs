//! Reference transfer client backed by the `git` binary.
//!
//! Fetches with `clone --mirror` into the unit's working directory and
//! pushes ref groups with explicit refspecs. The client never interprets
//! pack data; everything on the wire is git's business.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::classify_git_failure;
use crate::transfer::{FetchInfo, PushComponent, Result, TransferClient, TransferError};

/// Directory name of the mirror clone inside a unit working directory.
const MIRROR_DIR: &str = "mirror.git";

/// Transfer client that shells out to the `git` binary.
///
/// Credentials are whatever the ambient git configuration provides
/// (credential helpers, ssh agent); the client itself never stores any.
/// Terminal prompts are disabled so a missing credential fails fast
/// instead of hanging a worker.
#[derive(Debug, Clone)]
pub struct GitTransferClient {
    git_bin: PathBuf,
}

impl GitTransferClient {
    /// Create a client using `git` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            git_bin: PathBuf::from("git"),
        }
    }

    /// Create a client using an explicit git binary.
    #[must_use]
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            git_bin: path.into(),
        }
    }

    /// Run a git command and return its stdout, classifying failures into
    /// the transfer error taxonomy.
    async fn run_git(&self, args: &[&str], cwd: Option<&Path>, context: &str) -> Result<String> {
        let mut cmd = Command::new(&self.git_bin);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(?args, "Running git");
        let output = cmd
            .output()
            .await
            .map_err(|e| TransferError::internal(format!("failed to spawn git: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_git_failure(context, &stderr))
        }
    }

    fn mirror_path(work_dir: &Path) -> PathBuf {
        work_dir.join(MIRROR_DIR)
    }

    /// Name of the mirror's default branch, if it has one.
    async fn default_branch(&self, mirror: &Path) -> Option<String> {
        self.run_git(
            &["symbolic-ref", "--short", "HEAD"],
            Some(mirror),
            "default branch lookup",
        )
        .await
        .ok()
        .map(|out| out.trim().to_string())
        .filter(|name| !name.is_empty())
    }

    /// Count refs under a prefix (`refs/heads`, `refs/tags`).
    async fn count_refs(&self, mirror: &Path, prefix: &str) -> usize {
        self.run_git(
            &["for-each-ref", "--format=%(refname)", prefix],
            Some(mirror),
            "ref listing",
        )
        .await
        .map(|out| out.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
    }
}

impl Default for GitTransferClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferClient for GitTransferClient {
    async fn warm_up(&self) -> Result<()> {
        // The git CLI opens a fresh connection per command, so there is
        // nothing to keep warm; confirm the binary is runnable instead.
        self.run_git(&["version"], None, "git binary check")
            .await
            .map(|_| ())
    }

    async fn get_size(&self, _source: &str) -> Result<u64> {
        // Size lookups need a provider API; the plain git transport
        // cannot answer them. Callers treat this as "unknown".
        Err(TransferError::internal(
            "size lookup not supported by the git transport",
        ))
    }

    async fn fetch_source(&self, source: &str, work_dir: &Path) -> Result<FetchInfo> {
        let mirror = Self::mirror_path(work_dir);

        // A leftover mirror from an interrupted attempt would make the
        // clone fail outright.
        if mirror.exists() {
            let _ = tokio::fs::remove_dir_all(&mirror).await;
        }

        let mirror_str = mirror
            .to_str()
            .ok_or_else(|| TransferError::internal("working directory path is not UTF-8"))?;

        self.run_git(&["clone", "--mirror", source, mirror_str], None, source)
            .await?;

        let default_branch = self.default_branch(&mirror).await;
        let branches = self.count_refs(&mirror, "refs/heads").await;
        let tags = self.count_refs(&mirror, "refs/tags").await;
        let size_kb = dir_size_kb(&mirror).await;

        Ok(FetchInfo {
            default_branch,
            branches,
            tags,
            size_kb,
        })
    }

    async fn push_target(
        &self,
        target: &str,
        work_dir: &Path,
        component: PushComponent,
        force: bool,
    ) -> Result<()> {
        let mirror = Self::mirror_path(work_dir);
        if !mirror.is_dir() {
            return Err(TransferError::internal("no fetched content to push"));
        }

        let refspec = match component {
            PushComponent::DefaultBranch => match self.default_branch(&mirror).await {
                Some(branch) => format!("refs/heads/{branch}:refs/heads/{branch}"),
                // Unborn HEAD (empty source repository): nothing to push.
                None => return Ok(()),
            },
            PushComponent::Branches => {
                if self.count_refs(&mirror, "refs/heads").await == 0 {
                    return Ok(());
                }
                "refs/heads/*:refs/heads/*".to_string()
            }
            PushComponent::Tags => {
                if self.count_refs(&mirror, "refs/tags").await == 0 {
                    return Ok(());
                }
                "refs/tags/*:refs/tags/*".to_string()
            }
        };

        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(target);
        args.push(&refspec);

        self.run_git(&args, Some(&mirror), target).await.map(|_| ())
    }

    async fn verify_target(&self, target: &str) -> Result<()> {
        let out = self.run_git(&["ls-remote", target], None, target).await?;
        if out.trim().is_empty() {
            return Err(TransferError::internal(format!(
                "target repository has no refs: {target}"
            )));
        }
        Ok(())
    }
}

/// Best-effort recursive directory size, in KB.
async fn dir_size_kb(path: &Path) -> Option<u64> {
    fn walk(path: &Path) -> u64 {
        let Ok(entries) = std::fs::read_dir(path) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                match entry.metadata() {
                    Ok(meta) if meta.is_dir() => walk(&path),
                    Ok(meta) => meta.len(),
                    Err(_) => 0,
                }
            })
            .sum()
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || walk(&path) / 1024)
        .await
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_path_is_under_work_dir() {
        let work_dir = Path::new("/work/unit");
        assert_eq!(
            GitTransferClient::mirror_path(work_dir),
            Path::new("/work/unit/mirror.git")
        );
    }

    #[test]
    fn test_default_uses_git_from_path() {
        let client = GitTransferClient::default();
        assert_eq!(client.git_bin, PathBuf::from("git"));

        let custom = GitTransferClient::with_binary("/opt/git/bin/git");
        assert_eq!(custom.git_bin, PathBuf::from("/opt/git/bin/git"));
    }

    #[tokio::test]
    async fn test_push_without_fetched_content_fails() {
        let work_dir = tempfile::tempdir().unwrap();
        let client = GitTransferClient::new();

        let err = client
            .push_target(
                "https://x.example.com/org/repo.git",
                work_dir.path(),
                PushComponent::Branches,
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_dir_size_of_missing_path_is_zero() {
        let size = dir_size_kb(Path::new("/definitely/not/here")).await;
        assert_eq!(size, Some(0));
    }

    #[tokio::test]
    #[ignore = "requires the git binary"]
    async fn test_local_repo_roundtrip() {
        async fn git(args: &[&str], cwd: &Path) {
            let status = Command::new("git")
                .args(args)
                .current_dir(cwd)
                .status()
                .await
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        }

        let base = tempfile::tempdir().unwrap();
        let source = base.path().join("source");
        let target = base.path().join("target.git");
        let work = base.path().join("work");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&["init", "-b", "main"], &source).await;
        git(&["config", "user.email", "t@example.com"], &source).await;
        git(&["config", "user.name", "t"], &source).await;
        std::fs::write(source.join("README"), "hello").unwrap();
        git(&["add", "."], &source).await;
        git(&["commit", "-m", "init"], &source).await;
        git(&["tag", "v1"], &source).await;
        git(
            &["init", "--bare", target.to_str().unwrap()],
            base.path(),
        )
        .await;

        let client = GitTransferClient::new();
        let info = client
            .fetch_source(source.to_str().unwrap(), &work)
            .await
            .unwrap();
        assert_eq!(info.default_branch.as_deref(), Some("main"));
        assert_eq!(info.branches, 1);
        assert_eq!(info.tags, 1);

        for component in PushComponent::ORDER {
            client
                .push_target(target.to_str().unwrap(), &work, component, false)
                .await
                .unwrap();
        }

        client.verify_target(target.to_str().unwrap()).await.unwrap();
    }
}
