//! swe-verify: differential evaluation of SWE-bench candidate fixes.
//!
//! This library loads SWE-bench problems, keeps a cache of their
//! repositories, and measures a candidate fix by running the problem's tests
//! on the base commit and on the candidate.

// Core modules
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod repo;
pub mod runner;
pub mod utils;

// Re-export commonly used error types
pub use error::{CatalogError, EvaluationError, RepositoryError};

// Re-export the evaluation entry points
pub use catalog::{Catalog, CatalogSource, ProblemRecord};
pub use config::{EvaluatorConfig, WorkspaceMode};
pub use evaluator::{
    Candidate, EvaluationResult, EvaluationStatus, Evaluator, Metrics, PhaseSnapshot, SetupInfo,
};
pub use repo::{RepositoryCache, RepositoryHandle};
pub use runner::{TestOutcome, TestRunner};
