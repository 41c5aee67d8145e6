use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Which ref group a push operation covers.
///
/// The engine pushes the default branch first, then all branches, then all
/// tags, so a partial failure always has a well-defined "furthest
/// completed" component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushComponent {
    /// The repository's default branch only.
    DefaultBranch,
    /// All branches.
    Branches,
    /// All tags.
    Tags,
}

impl PushComponent {
    /// Push order mandated by the pipeline.
    pub const ORDER: [PushComponent; 3] = [Self::DefaultBranch, Self::Branches, Self::Tags];

    /// Step label used in status records and progress events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DefaultBranch => "push default branch",
            Self::Branches => "push branches",
            Self::Tags => "push tags",
        }
    }
}

impl fmt::Display for PushComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata reported by a successful fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchInfo {
    /// Name of the default branch, if the source reports one.
    pub default_branch: Option<String>,
    /// Number of branches fetched.
    pub branches: usize,
    /// Number of tags fetched.
    pub tags: usize,
    /// On-disk size of the fetched content in KB, if known.
    pub size_kb: Option<u64>,
}

/// Contract for the component that actually moves repository content.
///
/// The orchestration engine treats implementations as opaque: it never
/// touches the git wire protocol or provider credentials itself. A
/// reference implementation that shells out to the `git` binary lives
/// behind the `git` cargo feature.
///
/// # Implementation notes
///
/// Implementors should:
/// - Distinguish transient from fatal failures via the
///   [`TransferError`](super::TransferError) taxonomy; the retry policy
///   depends on it.
/// - Treat `work_dir` as exclusively owned by the caller for the duration
///   of one repository's migration.
/// - Keep `get_size` cheap; it is display-only and its failures are
///   swallowed.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Establish reusable authenticated connections to the source and
    /// target providers, so the first real transfer does not pay
    /// cold-connection cost. Best-effort: a failure is logged by the
    /// scheduler and never blocks the run.
    async fn warm_up(&self) -> Result<()>;

    /// Best-effort source repository size in KB, for display only.
    async fn get_size(&self, source: &str) -> Result<u64>;

    /// Fetch the full repository content from `source` into `work_dir`.
    async fn fetch_source(&self, source: &str, work_dir: &Path) -> Result<FetchInfo>;

    /// Push one ref group from `work_dir` to `target`. `force` overwrites
    /// existing refs on the target (existing-repository migrations).
    async fn push_target(
        &self,
        target: &str,
        work_dir: &Path,
        component: PushComponent,
        force: bool,
    ) -> Result<()>;

    /// Confirm the target repository is reachable and non-empty.
    async fn verify_target(&self, target: &str) -> Result<()>;
}
