//! Error types for swe-verify operations.
//!
//! One enum per subsystem:
//! - Problem catalog lookup and dataset loading
//! - Repository cache and git plumbing
//! - Evaluation pipeline (everything that aborts an evaluation)
//!
//! Per-test failures (timeouts, spawn errors) are not errors at this level;
//! they are recorded on the test outcome and never abort a batch.

use thiserror::Error;

/// Errors that can occur while loading or querying the problem catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Instance ID {0} not found in the dataset")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    #[error("Failed to parse dataset: {0}")]
    ParseError(String),

    #[error("Invalid problem record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while materializing or manipulating a working copy.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Invalid repository name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid git ref '{reference}': {reason}")]
    InvalidRef { reference: String, reason: String },

    #[error("Unknown revision '{reference}' in {path}")]
    UnknownRevision { reference: String, path: String },

    #[error("Repository {repo} unavailable: {reason}")]
    Unavailable { repo: String, reason: String },

    #[error("git {command} failed in {path}: {stderr}")]
    Git {
        command: String,
        path: String,
        stderr: String,
    },

    #[error("Failed to apply patch: {0}")]
    PatchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort an evaluation or a development setup.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
