//! Scoped working directories for migration runs.
//!
//! The batch scheduler owns one workspace root per job; each repository
//! worker owns one directory underneath it. Both are guard types: explicit
//! `release()` on the happy path, best-effort removal on `Drop` so
//! directories are reclaimed on every exit path, including panics inside a
//! worker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use crate::status::{JobId, RepoKey};

/// Workspace root for one bulk job.
///
/// Unit directories are created underneath it; the root is removed only
/// after all children have been released.
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    released: bool,
}

impl JobWorkspace {
    /// Create the workspace root for a job under `base`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory cannot be
    /// created. Callers treat this as non-fatal: `unit_dir` re-attempts
    /// the full path creation for each repository.
    pub fn create(base: &Path, job: &JobId) -> io::Result<Self> {
        let root = base.join(job.to_string());
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            released: false,
        })
    }

    /// Build a handle without touching the filesystem.
    ///
    /// Used when the scheduler's upfront creation failed: `unit_dir`
    /// creates the full path lazily, so units still acquire their own
    /// resources.
    #[must_use]
    pub fn at(base: &Path, job: &JobId) -> Self {
        Self {
            root: base.join(job.to_string()),
            released: false,
        }
    }

    /// Path of the workspace root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Allocate the working directory for one repository.
    ///
    /// Creates the full path (including the root, if an earlier creation
    /// failed), so units acquire their own resources even after a
    /// scheduler-level allocation failure.
    pub fn unit_dir(&self, key: &RepoKey) -> io::Result<UnitDir> {
        let path = self.root.join(unit_dir_name(key));
        std::fs::create_dir_all(&path)?;
        Ok(UnitDir {
            path,
            released: false,
        })
    }

    /// Remove the workspace root and everything left underneath it.
    ///
    /// Safe to call after all units released: a missing root is not an
    /// error.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_dir_if_present(&self.root)
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = remove_dir_if_present(&self.root)
        {
            tracing::warn!(path = %self.root.display(), error = %e, "Failed to clean up job workspace");
        }
    }
}

/// Working directory exclusively owned by one repository worker.
#[derive(Debug)]
pub struct UnitDir {
    path: PathBuf,
    released: bool,
}

impl UnitDir {
    /// Path of the unit directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory. A missing directory is not an error.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_dir_if_present(&self.path)
    }
}

impl Drop for UnitDir {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = remove_dir_if_present(&self.path)
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to clean up unit directory");
        }
    }
}

/// Directory name for a repository key: a readable slug plus a hash so two
/// keys that sanitize identically never collide.
fn unit_dir_name(key: &RepoKey) -> String {
    let slug: String = key
        .source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let tail: String = slug.chars().rev().take(40).collect();
    let tail: String = tail.chars().rev().collect();

    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{}-{:016x}", tail, hasher.finish())
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
