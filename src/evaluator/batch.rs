//! Batch evaluation from a JSON list of `{instance_id, solution_commit}`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{EvaluationStatus, Evaluator};
use crate::error::{CatalogError, EvaluationError};
use crate::utils::to_pretty_json;

/// One line item of a batch configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub instance_id: String,
    pub solution_commit: String,
}

/// Outcome counts for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub error: usize,
    /// Entries whose instance id is not in the catalog.
    pub not_found: Vec<String>,
    /// Report files written, in entry order.
    pub reports: Vec<PathBuf>,
}

/// Reads a batch configuration: a JSON array of [`BatchEntry`].
pub fn load_batch_config(path: &Path) -> Result<Vec<BatchEntry>, EvaluationError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `<instance_id>_<unix seconds>.json`
fn report_file_name(instance_id: &str, timestamp: f64) -> String {
    format!("{}_{}.json", instance_id, timestamp as i64)
}

impl Evaluator {
    /// Evaluates every entry in order and writes one report per evaluation
    /// into `output_dir`.
    ///
    /// An unknown instance id is logged and skipped; any other failure is
    /// already part of that entry's report.
    pub async fn run_batch(
        &self,
        entries: &[BatchEntry],
        output_dir: &Path,
    ) -> Result<BatchSummary, EvaluationError> {
        fs::create_dir_all(output_dir)?;
        info!(entries = entries.len(), output = %output_dir.display(), "Starting batch evaluation");

        let mut summary = BatchSummary {
            total: entries.len(),
            ..Default::default()
        };

        for (i, entry) in entries.iter().enumerate() {
            info!(
                instance_id = %entry.instance_id,
                progress = %format!("{}/{}", i + 1, entries.len()),
                "Evaluating batch entry"
            );
            let result = match self.evaluate(&entry.instance_id, &entry.solution_commit).await {
                Ok(result) => result,
                Err(e @ CatalogError::NotFound(_)) => {
                    warn!(instance_id = %entry.instance_id, error = %e, "Skipping batch entry");
                    summary.not_found.push(entry.instance_id.clone());
                    continue;
                }
                Err(e) => {
                    error!(instance_id = %entry.instance_id, error = %e, "Batch entry failed");
                    summary.error += 1;
                    continue;
                }
            };

            match result.status {
                EvaluationStatus::Resolved => summary.resolved += 1,
                EvaluationStatus::Unresolved => summary.unresolved += 1,
                EvaluationStatus::Error => summary.error += 1,
            }

            let path = output_dir.join(report_file_name(&result.instance_id, result.timestamp));
            fs::write(&path, to_pretty_json(&result)?)?;
            info!(instance_id = %result.instance_id, path = %path.display(), "Wrote evaluation report");
            summary.reports.push(path);
        }

        info!(
            total = summary.total,
            resolved = summary.resolved,
            unresolved = summary.unresolved,
            error = summary.error,
            not_found = summary.not_found.len(),
            "Batch evaluation finished"
        );
        Ok(summary)
    }
}
