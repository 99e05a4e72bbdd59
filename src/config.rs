//! Configuration for evaluation runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default benchmark dataset on HuggingFace.
pub const DEFAULT_DATASET: &str = "princeton-nlp/SWE-bench_Verified";

/// Default split to read problems from.
pub const DEFAULT_SPLIT: &str = "test";

/// Default remote that `owner/name` repositories are cloned from.
pub const DEFAULT_REMOTE_BASE: &str = "https://github.com";

/// Default per-test timeout in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 300;

/// Directory name of the cache under the user's home directory.
const CACHE_DIR_NAME: &str = ".swebench_evaluator";

/// How an evaluation obtains the working copy it checks out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// Check out in place in the shared cached copy, under an exclusive
    /// per-repository lease.
    #[default]
    Shared,
    /// Check out in a private worktree that is deleted after the evaluation.
    Ephemeral,
}

impl std::fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Configuration for an [`Evaluator`](crate::evaluator::Evaluator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Root of the on-disk cache (`repos/` and `datasets/` live below it).
    pub cache_dir: PathBuf,
    /// Wall-clock budget for a single test invocation.
    pub test_timeout: Duration,
    /// Base URL repositories are cloned from (`<base>/<owner>/<name>.git`).
    pub remote_base: String,
    /// Shared or ephemeral working copies.
    pub workspace_mode: WorkspaceMode,
    /// Truncate captured stdout/stderr to this many bytes, if set.
    pub max_output_bytes: Option<usize>,
}

impl EvaluatorConfig {
    /// Creates a configuration rooted at the given cache directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            test_timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            remote_base: DEFAULT_REMOTE_BASE.to_string(),
            workspace_mode: WorkspaceMode::Shared,
            max_output_bytes: None,
        }
    }

    /// `~/.swebench_evaluator`, or `./.swebench_evaluator` when no home
    /// directory can be determined.
    pub fn default_cache_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CACHE_DIR_NAME)
    }

    /// Sets the per-test timeout.
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Sets the remote base URL.
    pub fn with_remote_base(mut self, remote_base: impl Into<String>) -> Self {
        self.remote_base = remote_base.into();
        self
    }

    /// Sets the workspace mode.
    pub fn with_workspace_mode(mut self, mode: WorkspaceMode) -> Self {
        self.workspace_mode = mode;
        self
    }

    /// Caps captured test output.
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = Some(max);
        self
    }

    /// Directory holding cached working copies.
    pub fn repos_dir(&self) -> PathBuf {
        self.cache_dir.join("repos")
    }

    /// Directory holding cached dataset snapshots.
    pub fn datasets_dir(&self) -> PathBuf {
        self.cache_dir.join("datasets")
    }

    /// Root of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::new(Self::default_cache_dir())
    }
}
