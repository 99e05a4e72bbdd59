//! Evaluation results and the before/after diff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::ProblemRecord;
use crate::runner::TestOutcome;

/// Outcomes of both test lists on one revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub fail_to_pass: BTreeMap<String, TestOutcome>,
    pub pass_to_pass: BTreeMap<String, TestOutcome>,
}

impl PhaseSnapshot {
    /// Number of recorded outcomes across both lists.
    pub fn len(&self) -> usize {
        self.fail_to_pass.len() + self.pass_to_pass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate counts derived from a before/after pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// fail_to_pass tests that did not pass before and pass after.
    pub fixed_tests: usize,
    /// pass_to_pass tests that passed before and do not pass after.
    pub broken_tests: usize,
    /// `|fail_to_pass| + |pass_to_pass|`.
    pub total_tests: usize,
    /// `fixed_tests / |fail_to_pass|`, or 1.0 when there is nothing to fix.
    pub success_rate: f64,
}

impl Metrics {
    /// Diffs `before` against `after` over the problem's test lists.
    ///
    /// A test missing from a snapshot counts as not passed.
    pub fn compute(
        fail_to_pass: &[String],
        pass_to_pass: &[String],
        before: &PhaseSnapshot,
        after: &PhaseSnapshot,
    ) -> Self {
        let passed = |map: &BTreeMap<String, TestOutcome>, test: &String| {
            map.get(test).is_some_and(|o| o.passed)
        };

        let fixed_tests = fail_to_pass
            .iter()
            .filter(|t| !passed(&before.fail_to_pass, t) && passed(&after.fail_to_pass, t))
            .count();
        let broken_tests = pass_to_pass
            .iter()
            .filter(|t| passed(&before.pass_to_pass, t) && !passed(&after.pass_to_pass, t))
            .count();

        let success_rate = if fail_to_pass.is_empty() {
            1.0
        } else {
            fixed_tests as f64 / fail_to_pass.len() as f64
        };

        Self {
            fixed_tests,
            broken_tests,
            total_tests: fail_to_pass.len() + pass_to_pass.len(),
            success_rate,
        }
    }
}

/// Overall verdict of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Resolved,
    Unresolved,
    Error,
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Unresolved => write!(f, "unresolved"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Full record of one differential evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    /// Candidate commit, or the label of a patch candidate.
    pub solution_commit: String,
    /// Unix seconds at which the evaluation started.
    pub timestamp: f64,
    pub before: PhaseSnapshot,
    pub after: PhaseSnapshot,
    pub metrics: Metrics,
    pub status: EvaluationStatus,
    /// Files touched by the candidate relative to its parent.
    #[serde(default)]
    pub changed_files: Vec<String>,
    /// Why the evaluation stopped early, if it did.
    pub error: Option<String>,
}

impl EvaluationResult {
    /// An empty result for `record` against `solution`, stamped now.
    pub fn new(record: &ProblemRecord, solution: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            instance_id: record.instance_id.clone(),
            repo: record.repo.clone(),
            base_commit: record.base_commit.clone(),
            solution_commit: solution.into(),
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            before: PhaseSnapshot::default(),
            after: PhaseSnapshot::default(),
            metrics: Metrics::compute(
                &record.fail_to_pass,
                &record.pass_to_pass,
                &PhaseSnapshot::default(),
                &PhaseSnapshot::default(),
            ),
            status: EvaluationStatus::Error,
            changed_files: Vec::new(),
            error: None,
        }
    }

    /// Recomputes metrics and status from the snapshots gathered so far.
    pub fn finalize(&mut self, record: &ProblemRecord) {
        for test in &record.fail_to_pass {
            if !self.before.fail_to_pass.contains_key(test)
                && self.after.fail_to_pass.get(test).is_some_and(|o| o.passed)
            {
                warn!(instance_id = %self.instance_id, test = %test, "Counting test as fixed without a baseline outcome");
            }
        }
        self.metrics = Metrics::compute(
            &record.fail_to_pass,
            &record.pass_to_pass,
            &self.before,
            &self.after,
        );
        self.status = if self.error.is_some() {
            EvaluationStatus::Error
        } else {
            let all_pass = |tests: &[String], map: &BTreeMap<String, TestOutcome>| {
                tests.iter().all(|t| map.get(t).is_some_and(|o| o.passed))
            };
            if all_pass(&record.fail_to_pass, &self.after.fail_to_pass)
                && all_pass(&record.pass_to_pass, &self.after.pass_to_pass)
            {
                EvaluationStatus::Resolved
            } else {
                EvaluationStatus::Unresolved
            }
        };
    }

    /// Whether the candidate resolved the problem.
    pub fn is_resolved(&self) -> bool {
        self.status == EvaluationStatus::Resolved
    }
}
