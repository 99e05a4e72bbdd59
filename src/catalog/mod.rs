//! Problem catalog: the benchmark dataset as a read-only lookup table.
//!
//! Records come from the HuggingFace datasets server (cached on disk after
//! the first download) or from a local `.json` / `.jsonl` export. Once
//! loaded, the catalog is immutable; the evaluator only ever reads from it.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::CatalogError;

pub mod huggingface;
pub mod types;

pub use huggingface::{HuggingFaceConfig, HuggingFaceDataset};
pub use types::{
    group_tests_by_file, BenchmarkSummary, ProblemDetails, ProblemRecord, RawProblemRow,
    TestIdList,
};

/// Number of sample ids reported by [`Catalog::summary`].
const SAMPLE_PROBLEMS: usize = 5;

/// Where the catalog's records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// A dataset split on HuggingFace.
    HuggingFace { dataset: String, split: String },
    /// A local JSON array or JSON-lines file of SWE-bench rows.
    LocalFile(PathBuf),
}

impl CatalogSource {
    /// HuggingFace source for the given dataset and split.
    pub fn hugging_face(dataset: impl Into<String>, split: impl Into<String>) -> Self {
        Self::HuggingFace {
            dataset: dataset.into(),
            split: split.into(),
        }
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HuggingFace { dataset, split } => write!(f, "{dataset} [{split}]"),
            Self::LocalFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Immutable, id-indexed collection of problem records.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<ProblemRecord>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog from already-decoded records. Later duplicates of an
    /// instance id are ignored.
    pub fn from_records(records: Vec<ProblemRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.instance_id) {
                warn!(instance_id = %record.instance_id, "Duplicate instance id in dataset, keeping first");
                continue;
            }
            index.insert(record.instance_id.clone(), kept.len());
            kept.push(record);
        }
        Self {
            records: kept,
            index,
        }
    }

    /// Builds a catalog from raw dataset rows, skipping rows that cannot be
    /// decoded.
    pub fn from_rows(rows: Vec<RawProblemRow>) -> Self {
        let records = rows
            .into_iter()
            .filter_map(|row| match ProblemRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed dataset row");
                    None
                }
            })
            .collect();
        Self::from_records(records)
    }

    /// Loads the catalog from `source`, using `datasets_dir` as the download
    /// cache for HuggingFace sources.
    pub async fn load(source: &CatalogSource, datasets_dir: &Path) -> Result<Self, CatalogError> {
        match source {
            CatalogSource::LocalFile(path) => Self::load_file(path),
            CatalogSource::HuggingFace { dataset, split } => {
                let cache_file = datasets_dir.join(cache_file_name(dataset, split));
                if let Some(catalog) = read_snapshot(&cache_file) {
                    return Ok(catalog);
                }

                let rows = HuggingFaceDataset::new(dataset.as_str(), split.as_str())?
                    .fetch_all()
                    .await?;
                write_snapshot(datasets_dir, &cache_file, &rows)?;
                info!(path = %cache_file.display(), "Cached dataset snapshot");
                Ok(Self::from_rows(rows))
            }
        }
    }

    /// Loads a local export: a JSON array of rows, or one row per line.
    pub fn load_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let rows = parse_rows(&content).map_err(|e| {
            CatalogError::ParseError(format!("{}: {}", path.display(), e))
        })?;
        let catalog = Self::from_rows(rows);
        info!(
            problems = catalog.len(),
            path = %path.display(),
            "Loaded benchmark dataset"
        );
        Ok(catalog)
    }

    /// Number of problems.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog holds no problems.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in dataset order.
    pub fn records(&self) -> &[ProblemRecord] {
        &self.records
    }

    /// Looks up a problem by instance id.
    pub fn get(&self, instance_id: &str) -> Result<&ProblemRecord, CatalogError> {
        self.index
            .get(instance_id)
            .map(|&i| &self.records[i])
            .ok_or_else(|| CatalogError::NotFound(instance_id.to_string()))
    }

    /// Summarizes the benchmark, or lists one repository's problem ids.
    pub fn summary(&self, repo: Option<&str>) -> BenchmarkSummary {
        if let Some(repo) = repo {
            return BenchmarkSummary::Repository {
                repo: repo.to_string(),
                problem_ids: self
                    .records
                    .iter()
                    .filter(|r| r.repo == repo)
                    .map(|r| r.instance_id.clone())
                    .collect(),
            };
        }

        let repositories: BTreeSet<&str> = self.records.iter().map(|r| r.repo.as_str()).collect();
        BenchmarkSummary::Overview {
            total_problems: self.records.len(),
            repositories: repositories.into_iter().map(String::from).collect(),
            sample_problems: self
                .records
                .iter()
                .take(SAMPLE_PROBLEMS)
                .map(|r| r.instance_id.clone())
                .collect(),
        }
    }

    /// Detailed view of one problem; patches only when asked for.
    pub fn details(
        &self,
        instance_id: &str,
        include_patch: bool,
    ) -> Result<ProblemDetails, CatalogError> {
        let record = self.get(instance_id)?;
        let hints = record
            .hints_text
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from);

        Ok(ProblemDetails {
            instance_id: record.instance_id.clone(),
            repo: record.repo.clone(),
            problem_statement: record.problem_statement.trim().to_string(),
            base_commit: record.base_commit.clone(),
            failing_tests: group_tests_by_file(&record.fail_to_pass),
            fail_to_pass_tests: record.fail_to_pass.clone(),
            pass_to_pass_tests: record.pass_to_pass.clone(),
            created_at: record.created_at.clone(),
            hints,
            patch: include_patch.then(|| record.patch.clone().unwrap_or_default()),
            test_patch: include_patch.then(|| record.test_patch.clone().unwrap_or_default()),
        })
    }
}

/// File name of the on-disk snapshot for a dataset split.
fn cache_file_name(dataset: &str, split: &str) -> String {
    format!("{}__{}.json", dataset.replace('/', "__"), split)
}

/// Loads a cached snapshot. An unreadable snapshot is deleted so the next
/// load downloads it again.
fn read_snapshot(path: &Path) -> Option<Catalog> {
    if !path.exists() {
        return None;
    }
    debug!(path = %path.display(), "Using cached dataset snapshot");
    match Catalog::load_file(path) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable dataset snapshot");
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove dataset snapshot");
            }
            None
        }
    }
}

/// Writes `rows` to `path` through a temporary file in `dir`, so readers
/// never see a partial snapshot.
fn write_snapshot(dir: &Path, path: &Path, rows: &[RawProblemRow]) -> Result<(), CatalogError> {
    fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, rows)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parse_rows(content: &str) -> Result<Vec<RawProblemRow>, serde_json::Error> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed);
    }
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str::<RawProblemRow>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, repo: &str) -> ProblemRecord {
        ProblemRecord {
            instance_id: id.to_string(),
            repo: repo.to_string(),
            base_commit: "abc123".to_string(),
            problem_statement: "  Something is broken.\n".to_string(),
            fail_to_pass: vec![
                "tests/test_core.py::test_fix".to_string(),
                "tests/test_core.py::TestSuite::test_edge".to_string(),
            ],
            pass_to_pass: vec!["tests/test_other.py::test_ok".to_string()],
            hints_text: Some("   ".to_string()),
            patch: Some("diff --git a/core.py b/core.py\n".to_string()),
            test_patch: Some("diff --git a/tests/test_core.py b/tests/test_core.py\n".to_string()),
            created_at: Some("2023-01-01T00:00:00Z".to_string()),
            version: None,
            environment_setup_commit: None,
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_records(vec![
            record("django__django-1", "django/django"),
            record("django__django-2", "django/django"),
            record("psf__requests-1", "psf/requests"),
            record("sympy__sympy-1", "sympy/sympy"),
            record("sympy__sympy-2", "sympy/sympy"),
            record("sympy__sympy-3", "sympy/sympy"),
        ])
    }

    #[test]
    fn test_get_existing_and_missing() {
        let catalog = catalog();
        assert_eq!(catalog.get("psf__requests-1").unwrap().repo, "psf/requests");
        let err = catalog.get("nope").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(id) if id == "nope"));
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut second = record("a", "x/first");
        second.repo = "x/second".to_string();
        let catalog = Catalog::from_records(vec![record("a", "x/first"), second]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().repo, "x/first");
    }

    #[test]
    fn test_summary_overview() {
        match catalog().summary(None) {
            BenchmarkSummary::Overview {
                total_problems,
                repositories,
                sample_problems,
            } => {
                assert_eq!(total_problems, 6);
                assert_eq!(repositories, vec!["django/django", "psf/requests", "sympy/sympy"]);
                assert_eq!(sample_problems.len(), 5);
                assert_eq!(sample_problems[0], "django__django-1");
            }
            other => panic!("Expected overview, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_for_repo() {
        match catalog().summary(Some("sympy/sympy")) {
            BenchmarkSummary::Repository { repo, problem_ids } => {
                assert_eq!(repo, "sympy/sympy");
                assert_eq!(problem_ids, vec!["sympy__sympy-1", "sympy__sympy-2", "sympy__sympy-3"]);
            }
            other => panic!("Expected repository summary, got {other:?}"),
        }
    }

    #[test]
    fn test_details_without_patch() {
        let details = catalog().details("psf__requests-1", false).unwrap();
        assert_eq!(details.problem_statement, "Something is broken.");
        assert_eq!(
            details.failing_tests["tests/test_core.py"],
            vec!["test_fix", "TestSuite::test_edge"]
        );
        assert!(details.hints.is_none(), "blank hints are dropped");
        assert!(details.patch.is_none());
        let json = serde_json::to_value(&details).unwrap();
        assert!(json.get("patch").is_none());
        assert!(json.get("hints").is_none());
    }

    #[test]
    fn test_details_with_patch_and_hints() {
        let mut r = record("x__y-1", "x/y");
        r.hints_text = Some("\nLook at core.py\n".to_string());
        let catalog = Catalog::from_records(vec![r]);
        let details = catalog.details("x__y-1", true).unwrap();
        assert_eq!(details.hints.as_deref(), Some("Look at core.py"));
        assert!(details.patch.unwrap().starts_with("diff --git"));
        assert!(details.test_patch.is_some());
    }

    #[test]
    fn test_load_file_json_array_and_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let row = serde_json::json!({
            "instance_id": "a__b-1",
            "repo": "a/b",
            "base_commit": "deadbeef",
            "problem_statement": "bug",
            "FAIL_TO_PASS": "[\"t.py::test_a\"]",
            "PASS_TO_PASS": ["t.py::test_b"]
        });

        let array_path = dir.path().join("rows.json");
        fs::write(&array_path, serde_json::to_string(&vec![row.clone()]).unwrap()).unwrap();
        let catalog = Catalog::load_file(&array_path).unwrap();
        assert_eq!(catalog.get("a__b-1").unwrap().pass_to_pass, vec!["t.py::test_b"]);

        let lines_path = dir.path().join("rows.jsonl");
        let bad = serde_json::json!({"instance_id": "broken"});
        fs::write(&lines_path, format!("{row}\n\n{bad}\n")).unwrap();
        let catalog = Catalog::load_file(&lines_path).unwrap();
        assert_eq!(catalog.len(), 1, "rows missing required fields are skipped");
    }

    #[test]
    fn test_load_file_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        fs::write(&path, "[{").unwrap();
        assert!(matches!(
            Catalog::load_file(&path),
            Err(CatalogError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_load_prefers_cached_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join(cache_file_name("org/bench", "test"));
        let rows = serde_json::json!([{
            "instance_id": "org__repo-7",
            "repo": "org/repo",
            "base_commit": "cafe",
            "FAIL_TO_PASS": "[]",
            "PASS_TO_PASS": "[]"
        }]);
        fs::write(&snapshot, rows.to_string()).unwrap();

        let source = CatalogSource::hugging_face("org/bench", "test");
        let catalog = Catalog::load(&source, dir.path()).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("org__repo-7").is_ok());
    }

    #[test]
    fn test_unreadable_snapshot_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join(cache_file_name("org/bench", "test"));
        fs::write(&snapshot, "[{\"instance_id\": \"org__re").unwrap();

        assert!(read_snapshot(&snapshot).is_none());
        assert!(!snapshot.exists());
        assert!(read_snapshot(&snapshot).is_none());
    }

    #[test]
    fn test_write_snapshot_round_trips_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let datasets = dir.path().join("datasets");
        let snapshot = datasets.join(cache_file_name("org/bench", "test"));
        let rows: Vec<RawProblemRow> = serde_json::from_value(serde_json::json!([{
            "instance_id": "org__repo-7",
            "repo": "org/repo",
            "base_commit": "cafe",
            "FAIL_TO_PASS": "[\"t.py::test_a\"]",
            "PASS_TO_PASS": "[]"
        }]))
        .unwrap();

        write_snapshot(&datasets, &snapshot, &rows).unwrap();

        let catalog = read_snapshot(&snapshot).unwrap();
        assert_eq!(catalog.get("org__repo-7").unwrap().fail_to_pass, vec!["t.py::test_a"]);
        let entries: Vec<_> = fs::read_dir(&datasets).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_cache_file_name() {
        assert_eq!(
            cache_file_name("princeton-nlp/SWE-bench_Verified", "test"),
            "princeton-nlp__SWE-bench_Verified__test.json"
        );
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            CatalogSource::hugging_face("princeton-nlp/SWE-bench_Verified", "test").to_string(),
            "princeton-nlp/SWE-bench_Verified [test]"
        );
    }
}
