//! Repository state management.
//!
//! - [`git`]: thin async wrappers over the `git` CLI
//! - [`cache`]: the on-disk repository cache, clone strategies, leases and
//!   ephemeral worktrees
//!
//! Repository names and refs are validated here before they are handed to
//! git, so a dataset row can never smuggle flags into a git invocation.

use std::path::{Path, PathBuf};

use crate::error::RepositoryError;

pub mod cache;
pub mod git;

pub use cache::{
    clone_repository, CloneStrategy, EphemeralWorkspace, RepositoryCache, RepositoryLease,
};

/// A local working copy and the logical repository it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    repo: String,
    path: PathBuf,
}

impl RepositoryHandle {
    /// Creates a handle for `repo` checked out at `path`.
    pub fn new(repo: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            path: path.into(),
        }
    }

    /// Repository name in `owner/name` form.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Working-copy directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validate a git ref (commit SHA, branch name) before passing it to git.
///
/// Accepts hex SHAs and standard ref names (alphanumeric, `/`, `.`, `-`, `_`,
/// `~`, `^`). Rejects `..` sequences and refs starting with `-` (flag
/// injection).
pub fn validate_git_ref(s: &str) -> Result<(), RepositoryError> {
    let invalid = |reason: String| RepositoryError::InvalidRef {
        reference: s.to_string(),
        reason,
    };
    if s.is_empty() {
        return Err(invalid("git ref is empty".to_string()));
    }
    if s.len() > 256 {
        return Err(invalid(format!("too long ({} chars, max 256)", s.len())));
    }
    if s.starts_with('-') {
        return Err(invalid("must not start with '-'".to_string()));
    }
    if s.contains("..") {
        return Err(invalid("must not contain '..'".to_string()));
    }
    if let Some(ch) = s
        .chars()
        .find(|ch| !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '/' | '.' | '-' | '_' | '~' | '^'))
    {
        return Err(invalid(format!("invalid character '{ch}'")));
    }
    Ok(())
}

/// Validate a repository name in `owner/name` form.
///
/// Both parts must be non-empty, must not start with `.` or `-`, and may only
/// contain alphanumerics, `-`, `_` and `.`.
pub fn validate_repo_name(s: &str) -> Result<(), RepositoryError> {
    let invalid = |reason: String| RepositoryError::InvalidName {
        name: s.to_string(),
        reason,
    };
    if s.is_empty() {
        return Err(invalid("repository name is empty".to_string()));
    }
    if s.len() > 256 {
        return Err(invalid(format!("too long ({} chars, max 256)", s.len())));
    }
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return Err(invalid("expected 'owner/repo' format".to_string()));
    }
    for part in &parts {
        if part.is_empty() {
            return Err(invalid("owner and repo must be non-empty".to_string()));
        }
        if part.starts_with('.') || part.starts_with('-') {
            return Err(invalid("parts must not start with '.' or '-'".to_string()));
        }
        if let Some(ch) = part
            .chars()
            .find(|ch| !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
        {
            return Err(invalid(format!("invalid character '{ch}'")));
        }
    }
    Ok(())
}
