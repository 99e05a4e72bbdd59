//! Differential evaluation of candidate fixes.
//!
//! For one problem the evaluator checks out the base commit, runs the
//! `fail_to_pass` and `pass_to_pass` lists, checks out the candidate, runs
//! both lists again and diffs the two snapshots:
//!
//! - **fixed**: a `fail_to_pass` test that did not pass before and passes after
//! - **broken**: a `pass_to_pass` test that passed before and does not pass after
//!
//! An unknown instance id is the only failure returned as an `Err`. Anything
//! that goes wrong once the problem is known (clone, checkout, patch) stops
//! the remaining steps and is recorded on the returned [`EvaluationResult`]
//! together with whatever was measured up to that point.

use tracing::{error, info, warn};

use crate::catalog::{Catalog, ProblemRecord};
use crate::config::{EvaluatorConfig, WorkspaceMode};
use crate::error::{CatalogError, EvaluationError};
use crate::repo::{git, validate_git_ref, RepositoryCache, RepositoryHandle};
use crate::runner::TestRunner;

pub mod batch;
pub mod result;
pub mod setup;

pub use batch::{load_batch_config, BatchEntry, BatchSummary};
pub use result::{EvaluationResult, EvaluationStatus, Metrics, PhaseSnapshot};
pub use setup::{SetupInfo, DEFAULT_SETUP_DIR};

/// The revision under evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A commit id, tag or branch name. Branches that only exist on the
    /// remote are resolved through `origin`.
    Commit(String),
    /// A unified diff applied on top of the base commit.
    Patch { label: String, diff: String },
}

impl Candidate {
    pub fn commit(reference: impl Into<String>) -> Self {
        Self::Commit(reference.into())
    }

    pub fn patch(label: impl Into<String>, diff: impl Into<String>) -> Self {
        Self::Patch {
            label: label.into(),
            diff: diff.into(),
        }
    }

    /// Value recorded as `solution_commit`.
    pub fn label(&self) -> &str {
        match self {
            Self::Commit(reference) => reference,
            Self::Patch { label, .. } => label,
        }
    }
}

/// Runs differential evaluations against a loaded catalog.
pub struct Evaluator {
    catalog: Catalog,
    cache: RepositoryCache,
    runner: TestRunner,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(catalog: Catalog, config: EvaluatorConfig) -> Self {
        let cache = RepositoryCache::new(config.repos_dir(), config.remote_base.clone());
        let runner =
            TestRunner::new(config.test_timeout).with_max_output_bytes(config.max_output_bytes);
        Self {
            catalog,
            cache,
            runner,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluates `solution_commit` as a fix for `instance_id`.
    pub async fn evaluate(
        &self,
        instance_id: &str,
        solution_commit: &str,
    ) -> Result<EvaluationResult, CatalogError> {
        self.evaluate_candidate(instance_id, &Candidate::commit(solution_commit))
            .await
    }

    /// Evaluates any [`Candidate`] as a fix for `instance_id`.
    pub async fn evaluate_candidate(
        &self,
        instance_id: &str,
        candidate: &Candidate,
    ) -> Result<EvaluationResult, CatalogError> {
        let record = self.catalog.get(instance_id)?;
        info!(
            instance_id,
            repo = %record.repo,
            base_commit = %record.base_commit,
            candidate = candidate.label(),
            mode = %self.config.workspace_mode,
            "Starting evaluation"
        );

        let mut result = EvaluationResult::new(record, candidate.label());
        if let Err(e) = self.run_phases(record, candidate, &mut result).await {
            error!(instance_id, error = %e, "Evaluation aborted");
            result.error = Some(e.to_string());
        }
        result.finalize(record);

        info!(
            instance_id,
            status = %result.status,
            fixed = result.metrics.fixed_tests,
            broken = result.metrics.broken_tests,
            success_rate = result.metrics.success_rate,
            "Evaluation finished"
        );
        Ok(result)
    }

    async fn run_phases(
        &self,
        record: &ProblemRecord,
        candidate: &Candidate,
        result: &mut EvaluationResult,
    ) -> Result<(), EvaluationError> {
        validate_git_ref(&record.base_commit)?;
        if let Candidate::Commit(reference) = candidate {
            validate_git_ref(reference)?;
        }

        let lease = self.cache.lease(&record.repo).await;
        let cached = self.cache.materialize(&record.repo).await?;

        match self.config.workspace_mode {
            WorkspaceMode::Shared => self.differential(record, candidate, &cached, result).await,
            WorkspaceMode::Ephemeral => {
                let workspace = self.cache.ephemeral(&cached).await?;
                drop(lease);
                self.differential(record, candidate, workspace.handle(), result)
                    .await
            }
        }
    }

    async fn differential(
        &self,
        record: &ProblemRecord,
        candidate: &Candidate,
        handle: &RepositoryHandle,
        result: &mut EvaluationResult,
    ) -> Result<(), EvaluationError> {
        info!(instance_id = %record.instance_id, commit = %record.base_commit, "Checking out base commit");
        git::checkout_force(handle.path(), &record.base_commit).await?;
        result.before = self.run_lists(record, handle).await;

        match candidate {
            Candidate::Commit(reference) => {
                info!(instance_id = %record.instance_id, commit = %reference, "Checking out solution commit");
                let commit = git::checkout_force(handle.path(), reference).await?;
                result.changed_files = git::changed_files(handle.path(), &commit).await?;
            }
            Candidate::Patch { label, diff } => {
                info!(instance_id = %record.instance_id, patch = %label, "Applying candidate patch");
                git::checkout_force(handle.path(), &record.base_commit).await?;
                result.changed_files = git::patch_files(handle.path(), diff).await?;
                git::apply_patch(handle.path(), diff).await?;
            }
        }
        if result.changed_files.is_empty() {
            warn!(instance_id = %record.instance_id, "Candidate changes no files");
        }

        result.after = self.run_lists(record, handle).await;
        Ok(())
    }

    async fn run_lists(&self, record: &ProblemRecord, handle: &RepositoryHandle) -> PhaseSnapshot {
        PhaseSnapshot {
            fail_to_pass: self.runner.run(handle, &record.fail_to_pass).await,
            pass_to_pass: self.runner.run(handle, &record.pass_to_pass).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProblemRecord {
        ProblemRecord {
            instance_id: "acme__widget-1".into(),
            repo: "acme/widget".into(),
            base_commit: "abc123".into(),
            problem_statement: "broken".into(),
            fail_to_pass: vec!["t.py::test_a".into()],
            pass_to_pass: vec![],
            hints_text: None,
            patch: None,
            test_patch: None,
            created_at: None,
            version: None,
            environment_setup_commit: None,
        }
    }

    fn evaluator(cache: &std::path::Path, remote: &std::path::Path) -> Evaluator {
        let config = EvaluatorConfig::new(cache).with_remote_base(remote.to_string_lossy());
        Evaluator::new(Catalog::from_records(vec![record()]), config)
    }

    #[test]
    fn test_candidate_label() {
        assert_eq!(Candidate::commit("deadbeef").label(), "deadbeef");
        assert_eq!(Candidate::patch("fix.diff", "diff --git").label(), "fix.diff");
    }

    #[tokio::test]
    async fn test_unknown_instance_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), dir.path());
        let err = eval.evaluate("nope__nope-1", "deadbeef").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(ref id) if id == "nope__nope-1"));
    }

    #[tokio::test]
    async fn test_invalid_candidate_ref_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), dir.path());
        let result = eval.evaluate("acme__widget-1", "--upload-pack=x").await.unwrap();
        assert_eq!(result.status, EvaluationStatus::Error);
        assert!(result.error.unwrap().contains("--upload-pack=x"));
        assert!(result.before.is_empty());
        assert!(result.after.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_repository_yields_partial_result() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(&dir.path().join("cache"), &dir.path().join("remotes"));
        let result = eval.evaluate("acme__widget-1", "deadbeef").await.unwrap();

        assert_eq!(result.status, EvaluationStatus::Error);
        assert!(result.error.as_deref().unwrap().contains("acme/widget unavailable"));
        assert!(result.before.is_empty());
        assert_eq!(result.metrics.fixed_tests, 0);
        assert_eq!(result.metrics.success_rate, 0.0);
    }
}
