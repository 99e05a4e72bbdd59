//! Test runner.
//!
//! Runs each test identifier as its own `<python> -m pytest <id> -v`
//! subprocess inside a working copy, one after another. The interpreter is
//! taken from a virtual environment inside the working copy when one exists.
//!
//! A single test never aborts the batch: timeouts and spawn failures are
//! recorded on that test's [`TestOutcome`] and the runner moves on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::repo::RepositoryHandle;
use crate::utils::truncate;

pub mod outcome;

pub use outcome::{TestErrorKind, TestOutcome};

/// Virtual-environment directories probed inside a working copy, in order.
pub const VENV_DIRS: [&str; 3] = [".venv", "venv", "env"];

/// Interpreter used when no virtual environment is found.
pub const FALLBACK_INTERPRETER: &str = "python";

/// Finds the Python interpreter to run tests with.
///
/// For each of [`VENV_DIRS`], checks `bin/python` (Unix layout) and then
/// `Scripts/python.exe` (Windows layout). Falls back to `python` on `PATH`.
pub fn discover_interpreter(repo_path: &Path) -> PathBuf {
    for dir in VENV_DIRS {
        let venv = repo_path.join(dir);
        if !venv.is_dir() {
            continue;
        }
        for candidate in [
            venv.join("bin").join("python"),
            venv.join("Scripts").join("python.exe"),
        ] {
            if candidate.exists() {
                // Relative program paths resolve against an unspecified cwd.
                return std::path::absolute(&candidate).unwrap_or(candidate);
            }
        }
    }
    PathBuf::from(FALLBACK_INTERPRETER)
}

/// Sequential per-test subprocess runner.
#[derive(Debug, Clone)]
pub struct TestRunner {
    timeout: Duration,
    max_output_bytes: Option<usize>,
}

impl TestRunner {
    /// Creates a runner with the given per-test timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_output_bytes: None,
        }
    }

    /// Truncates captured stdout/stderr to `max` bytes.
    pub fn with_max_output_bytes(mut self, max: Option<usize>) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Per-test timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `tests` against `handle` with the runner's timeout.
    pub async fn run(
        &self,
        handle: &RepositoryHandle,
        tests: &[String],
    ) -> BTreeMap<String, TestOutcome> {
        self.run_with_timeout(handle, tests, self.timeout).await
    }

    /// Runs `tests` against `handle`, each bounded by `timeout`.
    pub async fn run_with_timeout(
        &self,
        handle: &RepositoryHandle,
        tests: &[String],
        timeout: Duration,
    ) -> BTreeMap<String, TestOutcome> {
        let interpreter = discover_interpreter(handle.path());
        info!(
            repo = handle.repo(),
            interpreter = %interpreter.display(),
            tests = tests.len(),
            "Running tests"
        );

        let mut results = BTreeMap::new();
        for test in tests {
            let outcome = self
                .run_test(&interpreter, handle.path(), test, timeout)
                .await;
            match outcome.error_kind {
                Some(TestErrorKind::Timeout) => {
                    warn!(test = %test, timeout_secs = timeout.as_secs_f64(), "Test timed out")
                }
                Some(TestErrorKind::ExecutionError) => {
                    warn!(test = %test, error = ?outcome.error, "Error running test")
                }
                None => info!(
                    test = %test,
                    status = if outcome.passed { "PASSED" } else { "FAILED" },
                    duration_secs = outcome.duration,
                    "Test finished"
                ),
            }
            results.insert(test.clone(), outcome);
        }
        results
    }

    /// Runs a single test identifier.
    pub async fn run_test(
        &self,
        interpreter: &Path,
        cwd: &Path,
        test: &str,
        timeout: Duration,
    ) -> TestOutcome {
        let mut cmd = Command::new(interpreter);
        cmd.args(["-m", "pytest"])
            .arg(test)
            .arg("-v")
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(test, interpreter = %interpreter.display(), "Spawning test process");
        let start = Instant::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return TestOutcome::execution_error(format!(
                    "failed to spawn {}: {}",
                    interpreter.display(),
                    e
                ))
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let (stdout, stderr) = match self.max_output_bytes {
                    Some(max) => (truncate(&stdout, max), truncate(&stderr, max)),
                    None => (stdout.into_owned(), stderr.into_owned()),
                };
                TestOutcome::completed(output.status.code(), stdout, stderr, start.elapsed())
            }
            Ok(Err(e)) => TestOutcome::execution_error(format!("process error: {e}")),
            Err(_) => TestOutcome::timed_out(timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_interpreter_fallback() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_interpreter(dir.path()), PathBuf::from("python"));
    }

    #[test]
    fn test_discover_interpreter_priority() {
        let dir = tempfile::tempdir().unwrap();
        for venv in ["venv", "env"] {
            let bin = dir.path().join(venv).join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("python"), "").unwrap();
        }
        assert_eq!(
            discover_interpreter(dir.path()),
            dir.path().join("venv").join("bin").join("python")
        );

        let dot_venv = dir.path().join(".venv").join("bin");
        std::fs::create_dir_all(&dot_venv).unwrap();
        std::fs::write(dot_venv.join("python"), "").unwrap();
        assert_eq!(discover_interpreter(dir.path()), dot_venv.join("python"));
    }

    #[test]
    fn test_discover_interpreter_windows_layout() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("env").join("Scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("python.exe"), "").unwrap();
        assert_eq!(discover_interpreter(dir.path()), scripts.join("python.exe"));
    }

    #[test]
    fn test_empty_venv_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".venv")).unwrap();
        let bin = dir.path().join("env").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("python"), "").unwrap();
        assert_eq!(discover_interpreter(dir.path()), bin.join("python"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_recorded_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TestRunner::new(Duration::from_secs(5));
        let outcome = runner
            .run_test(
                &dir.path().join("no-such-python"),
                dir.path(),
                "tests/test_x.py::test_y",
                Duration::from_secs(5),
            )
            .await;
        assert!(!outcome.passed);
        assert_eq!(outcome.error_kind, Some(TestErrorKind::ExecutionError));
        assert_eq!(outcome.duration, 0.0);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes a fake interpreter that passes tests listed in `passing.txt`
        /// and sleeps on ids containing `slow`.
        fn fake_venv(root: &Path) {
            let bin = root.join(".venv").join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            let script = bin.join("python");
            std::fs::write(
                &script,
                "#!/bin/sh\ncase \"$3\" in *slow*) sleep 10 ;; esac\necho \"running $3\"\ngrep -qxF \"$3\" passing.txt\n",
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            std::fs::write(root.join("passing.txt"), "t.py::test_ok\n").unwrap();
        }

        #[tokio::test]
        async fn test_run_records_every_test() {
            let dir = tempfile::tempdir().unwrap();
            fake_venv(dir.path());
            let handle = RepositoryHandle::new("acme/widget", dir.path());
            let runner = TestRunner::new(Duration::from_secs(5));

            let tests = vec!["t.py::test_ok".to_string(), "t.py::test_bad".to_string()];
            let results = runner.run(&handle, &tests).await;

            assert_eq!(results.len(), 2);
            let ok = &results["t.py::test_ok"];
            assert!(ok.passed);
            assert_eq!(ok.returncode, Some(0));
            assert!(ok.stdout.contains("running t.py::test_ok"));
            let bad = &results["t.py::test_bad"];
            assert!(!bad.passed);
            assert_eq!(bad.returncode, Some(1));
            assert!(bad.error.is_none());
        }

        #[tokio::test]
        async fn test_timeout_does_not_abort_batch() {
            let dir = tempfile::tempdir().unwrap();
            fake_venv(dir.path());
            let handle = RepositoryHandle::new("acme/widget", dir.path());
            let runner = TestRunner::new(Duration::from_millis(500));

            let tests = vec!["t.py::test_slow".to_string(), "t.py::test_ok".to_string()];
            let started = Instant::now();
            let results = runner.run(&handle, &tests).await;

            assert!(started.elapsed() < Duration::from_secs(5));
            let slow = &results["t.py::test_slow"];
            assert!(!slow.passed);
            assert_eq!(slow.error.as_deref(), Some("timeout"));
            assert_eq!(slow.duration, 0.5);
            assert!(results["t.py::test_ok"].passed);
        }

        #[tokio::test]
        async fn test_output_truncation() {
            let dir = tempfile::tempdir().unwrap();
            fake_venv(dir.path());
            let runner = TestRunner::new(Duration::from_secs(5)).with_max_output_bytes(Some(4));
            let outcome = runner
                .run_test(
                    &discover_interpreter(dir.path()),
                    dir.path(),
                    "t.py::test_ok",
                    Duration::from_secs(5),
                )
                .await;
            assert_eq!(outcome.stdout, "runn... [truncated]");
        }
    }
}
