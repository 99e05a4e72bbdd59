//! On-disk repository cache.
//!
//! Working copies live under `<cache>/repos/<owner>_<name>`. Two clone
//! strategies share one primitive, [`clone_repository`]:
//!
//! - [`CloneStrategy::EnsureClone`] reuses an existing copy after refreshing
//!   it, and only clones when the copy is missing or the refresh fails.
//! - [`CloneStrategy::ForceCleanClone`] always removes the target first.
//!
//! Checkouts mutate a working copy in place, so evaluations against the same
//! cached copy must be serialized: callers hold a [`RepositoryLease`] for as
//! long as they depend on the checked-out state, or move to a private
//! [`EphemeralWorkspace`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tempfile::TempDir;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{git, validate_repo_name, RepositoryHandle};
use crate::error::RepositoryError;

/// How [`clone_repository`] treats an existing target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStrategy {
    /// Refresh an existing working copy; clone only if it is missing or
    /// cannot be refreshed.
    EnsureClone,
    /// Remove whatever is at the target, then clone.
    ForceCleanClone,
}

/// Clones `url` into `dest` according to `strategy`.
///
/// A clone failure is reported as [`RepositoryError::Unavailable`] and is not
/// retried.
pub async fn clone_repository(
    repo: &str,
    url: &str,
    dest: &Path,
    strategy: CloneStrategy,
) -> Result<(), RepositoryError> {
    if dest.exists() {
        match strategy {
            CloneStrategy::EnsureClone => {
                let refreshed = if git::is_repository(dest) {
                    git::fetch_all(dest).await
                } else {
                    Err(RepositoryError::Unavailable {
                        repo: repo.to_string(),
                        reason: format!("{} is not a git working copy", dest.display()),
                    })
                };
                match refreshed {
                    Ok(()) => {
                        debug!(repo, path = %dest.display(), "Refreshed cached repository");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(repo, error = %e, "Cached repository unusable, re-cloning");
                        tokio::fs::remove_dir_all(dest).await?;
                    }
                }
            }
            CloneStrategy::ForceCleanClone => {
                info!(repo, path = %dest.display(), "Repository already exists, removing");
                tokio::fs::remove_dir_all(dest).await?;
            }
        }
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(repo, url, path = %dest.display(), "Cloning repository");
    git::clone(url, dest)
        .await
        .map_err(|e| RepositoryError::Unavailable {
            repo: repo.to_string(),
            reason: e.to_string(),
        })
}

/// Exclusive hold on one repository's cached working copy.
///
/// Released on drop.
pub struct RepositoryLease {
    repo: String,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for RepositoryLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryLease")
            .field("repo", &self.repo)
            .finish()
    }
}

/// A private worktree of a cached repository, deleted on drop.
#[derive(Debug)]
pub struct EphemeralWorkspace {
    handle: RepositoryHandle,
    _dir: TempDir,
}

impl EphemeralWorkspace {
    /// Handle pointing at the private worktree.
    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }
}

/// Maps repository names to cached working copies.
pub struct RepositoryCache {
    repos_dir: PathBuf,
    remote_base: String,
    leases: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepositoryCache {
    /// Creates a cache rooted at `repos_dir`, cloning from `remote_base`.
    pub fn new(repos_dir: impl Into<PathBuf>, remote_base: impl Into<String>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            remote_base: remote_base.into(),
            leases: StdMutex::new(HashMap::new()),
        }
    }

    /// Canonical remote location of `repo`.
    pub fn repo_url(&self, repo: &str) -> String {
        format!("{}/{}.git", self.remote_base.trim_end_matches('/'), repo)
    }

    /// Cache directory for `repo`.
    pub fn cache_path(&self, repo: &str) -> PathBuf {
        self.repos_dir.join(repo.replace('/', "_"))
    }

    /// Ensures a fresh working copy of `repo` exists in the cache.
    pub async fn materialize(&self, repo: &str) -> Result<RepositoryHandle, RepositoryError> {
        validate_repo_name(repo)?;
        let path = self.cache_path(repo);
        clone_repository(repo, &self.repo_url(repo), &path, CloneStrategy::EnsureClone).await?;

        if let Err(e) = git::worktree_prune(&path).await {
            debug!(repo, error = %e, "worktree prune failed");
        }
        Ok(RepositoryHandle::new(repo, path))
    }

    /// Waits for exclusive use of `repo`'s cached working copy.
    pub async fn lease(&self, repo: &str) -> RepositoryLease {
        let slot = {
            let mut leases = self
                .leases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            leases.entry(repo.to_string()).or_default().clone()
        };
        RepositoryLease {
            repo: repo.to_string(),
            _guard: slot.lock_owned().await,
        }
    }

    /// Creates a private worktree of a materialized repository.
    ///
    /// The worktree shares the cached object store, so every commit the cache
    /// has fetched is reachable, but checkouts inside it never touch the
    /// shared working copy.
    pub async fn ephemeral(
        &self,
        handle: &RepositoryHandle,
    ) -> Result<EphemeralWorkspace, RepositoryError> {
        let dir = tempfile::Builder::new().prefix("swe-verify-").tempdir()?;
        let path = dir.path().join("worktree");
        git::worktree_add(handle.path(), &path).await?;
        debug!(repo = handle.repo(), path = %path.display(), "Created ephemeral worktree");
        Ok(EphemeralWorkspace {
            handle: RepositoryHandle::new(handle.repo(), path),
            _dir: dir,
        })
    }
}
