//! Problem record types and the raw SWE-bench row format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// One benchmark task: a bug in a repository plus the tests that judge a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    /// Unique instance identifier (e.g. `django__django-11099`).
    pub instance_id: String,
    /// Repository in `owner/name` form.
    pub repo: String,
    /// Commit exhibiting the bug.
    pub base_commit: String,
    /// Issue text describing the bug.
    pub problem_statement: String,
    /// Tests expected to fail on the base commit and pass after a fix.
    pub fail_to_pass: Vec<String>,
    /// Tests expected to pass both before and after.
    pub pass_to_pass: Vec<String>,
    /// Hints from the issue discussion.
    pub hints_text: Option<String>,
    /// Reference (gold) patch.
    pub patch: Option<String>,
    /// Patch adding the evaluation tests.
    pub test_patch: Option<String>,
    /// Creation timestamp as provided by the dataset.
    pub created_at: Option<String>,
    /// Repository version label.
    pub version: Option<String>,
    /// Commit used to build the environment.
    pub environment_setup_commit: Option<String>,
}

/// A `FAIL_TO_PASS` / `PASS_TO_PASS` field.
///
/// Upstream stores these as JSON-encoded strings (`"[\"a\", \"b\"]"`); some
/// exports already decode them into arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestIdList {
    Encoded(String),
    List(Vec<String>),
}

impl TestIdList {
    /// Decodes the field into an ordered list of test identifiers.
    pub fn decode(&self) -> Result<Vec<String>, serde_json::Error> {
        match self {
            Self::List(ids) => Ok(ids.clone()),
            Self::Encoded(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Self::Encoded(raw) => serde_json::from_str(raw.trim()),
        }
    }
}

/// A dataset row as served by the HuggingFace rows API or a local export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProblemRow {
    pub instance_id: Option<String>,
    pub repo: Option<String>,
    pub base_commit: Option<String>,
    #[serde(default)]
    pub problem_statement: Option<String>,
    #[serde(rename = "FAIL_TO_PASS", default)]
    pub fail_to_pass: Option<TestIdList>,
    #[serde(rename = "PASS_TO_PASS", default)]
    pub pass_to_pass: Option<TestIdList>,
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub test_patch: Option<String>,
    #[serde(default)]
    pub hints_text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment_setup_commit: Option<String>,
}

impl TryFrom<RawProblemRow> for ProblemRecord {
    type Error = CatalogError;

    fn try_from(row: RawProblemRow) -> Result<Self, Self::Error> {
        let instance_id = row.instance_id.ok_or_else(|| CatalogError::InvalidRecord {
            id: "<unknown>".to_string(),
            reason: "missing instance_id".to_string(),
        })?;
        let invalid = |reason: String| CatalogError::InvalidRecord {
            id: instance_id.clone(),
            reason,
        };

        let repo = row.repo.ok_or_else(|| invalid("missing repo".to_string()))?;
        let base_commit = row
            .base_commit
            .ok_or_else(|| invalid("missing base_commit".to_string()))?;
        let fail_to_pass = match &row.fail_to_pass {
            Some(list) => list
                .decode()
                .map_err(|e| invalid(format!("FAIL_TO_PASS is not a JSON array: {e}")))?,
            None => Vec::new(),
        };
        let pass_to_pass = match &row.pass_to_pass {
            Some(list) => list
                .decode()
                .map_err(|e| invalid(format!("PASS_TO_PASS is not a JSON array: {e}")))?,
            None => Vec::new(),
        };

        Ok(Self {
            instance_id,
            repo,
            base_commit,
            problem_statement: row.problem_statement.unwrap_or_default(),
            fail_to_pass,
            pass_to_pass,
            hints_text: row.hints_text,
            patch: row.patch,
            test_patch: row.test_patch,
            created_at: row.created_at,
            version: row.version,
            environment_setup_commit: row.environment_setup_commit,
        })
    }
}

/// Human-facing view of one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub instance_id: String,
    pub repo: String,
    pub problem_statement: String,
    pub base_commit: String,
    /// fail_to_pass tests grouped by file (`path::name` ids only).
    pub failing_tests: BTreeMap<String, Vec<String>>,
    pub fail_to_pass_tests: Vec<String>,
    pub pass_to_pass_tests: Vec<String>,
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_patch: Option<String>,
}

/// Overview of the loaded benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BenchmarkSummary {
    /// Every problem id of one repository.
    Repository {
        repo: String,
        problem_ids: Vec<String>,
    },
    /// Counts, repositories and a few sample ids for the whole benchmark.
    Overview {
        total_problems: usize,
        repositories: Vec<String>,
        sample_problems: Vec<String>,
    },
}

/// Groups `path::name` test ids by file, keeping first-seen order per file.
///
/// Everything after the first `::` is the test name, so parametrized and
/// class-scoped ids (`a.py::Class::test[x]`) keep their full suffix.
pub fn group_tests_by_file(tests: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for test in tests {
        if let Some((file, name)) = test.split_once("::") {
            grouped
                .entry(file.to_string())
                .or_default()
                .push(name.to_string());
        }
    }
    grouped
}
