//! Per-test outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a test produced no usable exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestErrorKind {
    /// The test exceeded its time budget and was killed.
    Timeout,
    /// The test could not be run (interpreter missing, spawn or wait failure).
    ExecutionError,
}

impl std::fmt::Display for TestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ExecutionError => write!(f, "execution_error"),
        }
    }
}

/// Result of running one test identifier once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Exit status was zero.
    pub passed: bool,
    /// Process exit code, when the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Wall-clock seconds.
    pub duration: f64,
    /// `"timeout"` or the execution error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TestErrorKind>,
}

impl TestOutcome {
    /// The process ran to completion.
    pub fn completed(returncode: Option<i32>, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            passed: returncode == Some(0),
            returncode,
            stdout,
            stderr,
            duration: elapsed.as_secs_f64(),
            error: None,
            error_kind: None,
        }
    }

    /// The process was killed after `timeout`.
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            passed: false,
            returncode: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: timeout.as_secs_f64(),
            error: Some(TestErrorKind::Timeout.to_string()),
            error_kind: Some(TestErrorKind::Timeout),
        }
    }

    /// The process could not be run.
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            returncode: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: 0.0,
            error: Some(message.into()),
            error_kind: Some(TestErrorKind::ExecutionError),
        }
    }
}
