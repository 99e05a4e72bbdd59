//! Development setup: a fresh clone of a problem's repository at its base
//! commit, for working on a fix by hand.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Evaluator;
use crate::error::EvaluationError;
use crate::repo::{clone_repository, git, validate_git_ref, validate_repo_name, CloneStrategy};

/// Default parent directory for development clones.
pub const DEFAULT_SETUP_DIR: &str = "swebench_workdir";

/// Where a development clone was placed and what to run in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupInfo {
    pub instance_id: String,
    pub repo_path: PathBuf,
    pub base_commit: String,
    pub fail_to_pass_tests: Vec<String>,
    pub pass_to_pass_tests: Vec<String>,
}

impl Evaluator {
    /// Clones the repository of `instance_id` into `<output_dir>/<name>` and
    /// checks out its base commit.
    ///
    /// Anything already at the target directory is removed first. The
    /// repository cache is not used.
    pub async fn setup(
        &self,
        instance_id: &str,
        output_dir: Option<&Path>,
    ) -> Result<SetupInfo, EvaluationError> {
        let record = self.catalog.get(instance_id)?;
        validate_repo_name(&record.repo)?;
        validate_git_ref(&record.base_commit)?;

        let output_dir = output_dir.unwrap_or(Path::new(DEFAULT_SETUP_DIR));
        let name = record
            .repo
            .rsplit('/')
            .next()
            .unwrap_or(record.repo.as_str());
        let dest = std::path::absolute(output_dir.join(name))?;

        info!(instance_id, repo = %record.repo, path = %dest.display(), "Setting up development clone");
        clone_repository(
            &record.repo,
            &self.cache.repo_url(&record.repo),
            &dest,
            CloneStrategy::ForceCleanClone,
        )
        .await?;
        git::checkout_force(&dest, &record.base_commit).await?;

        Ok(SetupInfo {
            instance_id: record.instance_id.clone(),
            repo_path: dest,
            base_commit: record.base_commit.clone(),
            fail_to_pass_tests: record.fail_to_pass.clone(),
            pass_to_pass_tests: record.pass_to_pass.clone(),
        })
    }
}
