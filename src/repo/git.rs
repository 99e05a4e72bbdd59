//! Async wrappers over the `git` CLI.
//!
//! Every call runs `git` as a subprocess with terminal prompts disabled, so a
//! missing or private remote fails fast instead of waiting for credentials.
//! A non-zero exit becomes [`RepositoryError::Git`] carrying the trimmed
//! stderr.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::RepositoryError;
use crate::utils::truncate;

/// Longest stderr excerpt kept in an error.
const MAX_STDERR: usize = 2000;

fn git_command(dir: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `git <args>` in `dir` and returns stdout.
async fn run<S: AsRef<OsStr>>(dir: Option<&Path>, args: &[S]) -> Result<String, RepositoryError> {
    let command = describe(args);
    debug!(command = %command, dir = ?dir, "git");

    let output = git_command(dir).args(args).output().await?;
    if !output.status.success() {
        return Err(RepositoryError::Git {
            command,
            path: dir.map(|d| d.display().to_string()).unwrap_or_default(),
            stderr: truncate(String::from_utf8_lossy(&output.stderr).trim(), MAX_STDERR),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs `git <args>` in `dir`, feeding `input` on stdin.
async fn run_with_stdin(dir: &Path, args: &[&str], input: &str) -> Result<String, RepositoryError> {
    let command = describe(args);
    debug!(command = %command, dir = %dir.display(), "git (stdin)");

    let mut child = git_command(Some(dir))
        .args(args)
        .stdin(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await?;
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(RepositoryError::Git {
            command,
            path: dir.display().to_string(),
            stderr: truncate(String::from_utf8_lossy(&output.stderr).trim(), MAX_STDERR),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether `path` is the top of a git working copy.
///
/// Only `path/.git` counts; a directory nested inside some other repository
/// is not a working copy of its own.
pub fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

/// `git clone <url> <dest>`.
pub async fn clone(url: &str, dest: &Path) -> Result<(), RepositoryError> {
    run(
        None,
        &[
            OsStr::new("clone"),
            OsStr::new("--"),
            OsStr::new(url),
            dest.as_os_str(),
        ],
    )
    .await?;
    Ok(())
}

/// `git fetch --all`: refresh every remote reference.
pub async fn fetch_all(repo: &Path) -> Result<(), RepositoryError> {
    run(Some(repo), &["fetch", "--all", "--tags", "--quiet"]).await?;
    Ok(())
}

/// Resolves `reference` to a commit id.
///
/// Branches that only exist on the remote are found under
/// `refs/remotes/origin/`.
pub async fn resolve_commit(repo: &Path, reference: &str) -> Result<String, RepositoryError> {
    let candidates = [
        format!("{reference}^{{commit}}"),
        format!("refs/remotes/origin/{reference}^{{commit}}"),
    ];
    for candidate in &candidates {
        let resolved = run(
            Some(repo),
            &["rev-parse", "--verify", "--quiet", candidate.as_str()],
        )
        .await;
        if let Ok(commit) = resolved {
            let commit = commit.trim();
            if !commit.is_empty() {
                return Ok(commit.to_string());
            }
        }
    }
    Err(RepositoryError::UnknownRevision {
        reference: reference.to_string(),
        path: repo.display().to_string(),
    })
}

/// Forced, detached checkout of `reference`, discarding local modifications.
/// Returns the commit id that was checked out.
pub async fn checkout_force(repo: &Path, reference: &str) -> Result<String, RepositoryError> {
    let commit = resolve_commit(repo, reference).await?;
    run(Some(repo), &["checkout", "--force", "--detach", commit.as_str()]).await?;
    Ok(commit)
}

/// Files touched by `commit` relative to its first parent; every tracked file
/// for a root commit. Both sides of a rename are reported.
pub async fn changed_files(repo: &Path, commit: &str) -> Result<Vec<String>, RepositoryError> {
    let parents = run(Some(repo), &["rev-list", "--parents", "-n", "1", commit]).await?;
    let first_parent = parents.split_whitespace().nth(1).map(str::to_string);

    let listing = match first_parent {
        Some(parent) => {
            run(
                Some(repo),
                &["diff", "--name-only", "--no-renames", parent.as_str(), commit],
            )
            .await?
        }
        None => run(Some(repo), &["ls-tree", "-r", "--name-only", commit]).await?,
    };
    Ok(unique_lines(&listing))
}

/// Files a unified diff would touch, without applying it.
pub async fn patch_files(repo: &Path, patch: &str) -> Result<Vec<String>, RepositoryError> {
    let numstat = run_with_stdin(repo, &["apply", "--numstat", "-"], patch).await?;
    Ok(unique_lines(
        &numstat
            .lines()
            .filter_map(|line| line.splitn(3, '\t').nth(2))
            .collect::<Vec<_>>()
            .join("\n"),
    ))
}

/// Applies a unified diff to the working tree.
pub async fn apply_patch(repo: &Path, patch: &str) -> Result<(), RepositoryError> {
    run_with_stdin(repo, &["apply", "-"], patch)
        .await
        .map_err(|e| match e {
            RepositoryError::Git { stderr, .. } => RepositoryError::PatchFailed(stderr),
            other => other,
        })?;
    Ok(())
}

/// Adds a detached worktree of `repo` at `dest`.
pub async fn worktree_add(repo: &Path, dest: &Path) -> Result<(), RepositoryError> {
    run(
        Some(repo),
        &[
            OsStr::new("worktree"),
            OsStr::new("add"),
            OsStr::new("--detach"),
            OsStr::new("--force"),
            dest.as_os_str(),
            OsStr::new("HEAD"),
        ],
    )
    .await?;
    Ok(())
}

/// Drops bookkeeping for worktrees whose directories are gone.
pub async fn worktree_prune(repo: &Path) -> Result<(), RepositoryError> {
    run(Some(repo), &["worktree", "prune"]).await?;
    Ok(())
}

fn unique_lines(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
