//! CLI command definitions for swe-verify.
//!
//! Every command loads the problem catalog first (from the HuggingFace
//! datasets server, the on-disk snapshot of it, or a local export), then
//! runs against an [`Evaluator`] built from the shared flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::catalog::{BenchmarkSummary, Catalog, CatalogSource, ProblemDetails};
use crate::config::{
    EvaluatorConfig, WorkspaceMode, DEFAULT_DATASET, DEFAULT_REMOTE_BASE, DEFAULT_SPLIT,
    DEFAULT_TEST_TIMEOUT_SECS,
};
use crate::evaluator::{
    load_batch_config, BatchSummary, Candidate, EvaluationResult, Evaluator, DEFAULT_SETUP_DIR,
};
use crate::utils::{to_pretty_json, write_json_file};

/// Default output directory for batch reports.
const DEFAULT_BATCH_OUTPUT_DIR: &str = "./results";

/// Differential evaluator for SWE-bench problems.
#[derive(Parser)]
#[command(name = "swe-verify")]
#[command(about = "Evaluate candidate fixes for SWE-bench problems")]
#[command(version)]
#[command(
    long_about = "swe-verify runs a problem's FAIL_TO_PASS and PASS_TO_PASS tests on the base commit and on a candidate fix, then reports which tests were fixed and which were broken.\n\nExample usage:\n  swe-verify details django__django-11099\n  swe-verify evaluate django__django-11099 <commit> -o result.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Where problems and repositories come from.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Cache directory for repositories and dataset snapshots
    /// (default: ~/.swebench_evaluator).
    #[arg(long, env = "SWEBENCH_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// HuggingFace dataset to load problems from.
    #[arg(long, default_value = DEFAULT_DATASET, global = true)]
    pub dataset: String,

    /// Dataset split.
    #[arg(long, default_value = DEFAULT_SPLIT, global = true)]
    pub split: String,

    /// Local JSON / JSONL export to load instead of the HuggingFace dataset.
    #[arg(long, global = true)]
    pub dataset_file: Option<PathBuf>,

    /// Base URL repositories are cloned from.
    #[arg(long, env = "SWEBENCH_REMOTE_BASE", default_value = DEFAULT_REMOTE_BASE, global = true)]
    pub remote_base: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Summarize the benchmark, or list one repository's problems.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show a problem's statement, tests and (optionally) patches.
    #[command(alias = "show")]
    Details(DetailsArgs),

    /// Clone a problem's repository at its base commit for development.
    Setup(SetupArgs),

    /// Evaluate a candidate commit or patch against a problem.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Evaluate every entry of a JSON batch file.
    Batch(BatchArgs),
}

/// Arguments for `swe-verify list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list problems of this repository (owner/name).
    #[arg(long)]
    pub repo: Option<String>,

    /// Write the summary as JSON to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `swe-verify details`.
#[derive(Parser, Debug)]
pub struct DetailsArgs {
    /// Problem instance id.
    pub instance_id: String,

    /// Include the reference patch and the test patch.
    #[arg(short = 'p', long)]
    pub include_patch: bool,

    /// Write the details as JSON to this file instead of printing them.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `swe-verify setup`.
#[derive(Parser, Debug)]
pub struct SetupArgs {
    /// Problem instance id.
    pub instance_id: String,

    /// Parent directory of the clone.
    #[arg(short = 'o', long, default_value = DEFAULT_SETUP_DIR)]
    pub output: PathBuf,
}

/// Arguments for `swe-verify evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Problem instance id.
    pub instance_id: String,

    /// Candidate commit. With --patch-file, only used as the result label.
    #[arg(required_unless_present = "patch_file")]
    pub solution_commit: Option<String>,

    /// Apply this unified diff on top of the base commit instead of checking
    /// out a commit.
    #[arg(long)]
    pub patch_file: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Write the result as JSON to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `swe-verify batch`.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSON array of {"instance_id", "solution_commit"} entries.
    pub config: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,

    /// Directory for per-evaluation reports.
    #[arg(short = 'o', long, default_value = DEFAULT_BATCH_OUTPUT_DIR)]
    pub output: PathBuf,
}

/// Test execution options shared by `evaluate` and `batch`.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Per-test timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TEST_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Evaluate in a private worktree instead of the shared cached copy.
    #[arg(long)]
    pub isolated: bool,

    /// Truncate captured test output to this many bytes.
    #[arg(long)]
    pub max_output_bytes: Option<usize>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let source = cli.source;
    match cli.command {
        Commands::List(args) => run_list_command(&source, args).await,
        Commands::Details(args) => run_details_command(&source, args).await,
        Commands::Setup(args) => run_setup_command(&source, args).await,
        Commands::Evaluate(args) => run_evaluate_command(&source, args).await,
        Commands::Batch(args) => run_batch_command(&source, args).await,
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn base_config(source: &SourceArgs) -> EvaluatorConfig {
    let cache_dir = source
        .cache_dir
        .clone()
        .unwrap_or_else(EvaluatorConfig::default_cache_dir);
    EvaluatorConfig::new(cache_dir).with_remote_base(source.remote_base.clone())
}

fn apply_run_args(config: EvaluatorConfig, run: &RunArgs) -> EvaluatorConfig {
    let mode = if run.isolated {
        WorkspaceMode::Ephemeral
    } else {
        WorkspaceMode::Shared
    };
    let config = config
        .with_test_timeout(Duration::from_secs(run.timeout))
        .with_workspace_mode(mode);
    match run.max_output_bytes {
        Some(max) => config.with_max_output_bytes(max),
        None => config,
    }
}

fn catalog_source(source: &SourceArgs) -> CatalogSource {
    match &source.dataset_file {
        Some(path) => CatalogSource::LocalFile(path.clone()),
        None => CatalogSource::hugging_face(source.dataset.clone(), source.split.clone()),
    }
}

async fn load_catalog(source: &SourceArgs, config: &EvaluatorConfig) -> anyhow::Result<Catalog> {
    let catalog_source = catalog_source(source);
    info!(source = %catalog_source, "Loading problem catalog");
    let catalog = Catalog::load(&catalog_source, &config.datasets_dir()).await?;
    Ok(catalog)
}

async fn build_evaluator(source: &SourceArgs, config: EvaluatorConfig) -> anyhow::Result<Evaluator> {
    let catalog = load_catalog(source, &config).await?;
    Ok(Evaluator::new(catalog, config))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_list_command(source: &SourceArgs, args: ListArgs) -> anyhow::Result<()> {
    let config = base_config(source);
    let catalog = load_catalog(source, &config).await?;
    let summary = catalog.summary(args.repo.as_deref());

    log_summary(&summary);
    if let Some(output) = &args.output {
        write_json_file(output, &summary)?;
        println!("Summary saved to {}", output.display());
    } else {
        println!("{}", to_pretty_json(&summary)?);
    }
    Ok(())
}

async fn run_details_command(source: &SourceArgs, args: DetailsArgs) -> anyhow::Result<()> {
    let config = base_config(source);
    let catalog = load_catalog(source, &config).await?;
    let details = catalog.details(&args.instance_id, args.include_patch)?;

    if let Some(output) = &args.output {
        write_json_file(output, &details)?;
        println!("Details saved to {}", output.display());
    } else {
        print!("{}", render_details(&details));
    }
    Ok(())
}

async fn run_setup_command(source: &SourceArgs, args: SetupArgs) -> anyhow::Result<()> {
    let evaluator = build_evaluator(source, base_config(source)).await?;
    let info = evaluator
        .setup(&args.instance_id, Some(&args.output))
        .await?;

    info!(
        repo_path = %info.repo_path.display(),
        base_commit = %info.base_commit,
        fail_to_pass = info.fail_to_pass_tests.len(),
        pass_to_pass = info.pass_to_pass_tests.len(),
        "Development environment ready"
    );
    println!("{}", to_pretty_json(&info)?);
    Ok(())
}

async fn run_evaluate_command(source: &SourceArgs, args: EvaluateArgs) -> anyhow::Result<()> {
    let config = apply_run_args(base_config(source), &args.run);
    let evaluator = build_evaluator(source, config).await?;

    let candidate = match &args.patch_file {
        Some(path) => Candidate::patch(
            patch_label(args.solution_commit.as_deref(), path),
            std::fs::read_to_string(path)?,
        ),
        None => match &args.solution_commit {
            Some(commit) => Candidate::commit(commit.clone()),
            None => anyhow::bail!("a solution commit or --patch-file is required"),
        },
    };

    let result = evaluator
        .evaluate_candidate(&args.instance_id, &candidate)
        .await?;

    if let Some(output) = &args.output {
        write_json_file(output, &result)?;
        print!("{}", render_result(&result));
        println!("Result saved to {}", output.display());
    } else {
        println!("{}", to_pretty_json(&result)?);
    }
    Ok(())
}

async fn run_batch_command(source: &SourceArgs, args: BatchArgs) -> anyhow::Result<()> {
    let entries = load_batch_config(&args.config)?;
    let config = apply_run_args(base_config(source), &args.run);
    let evaluator = build_evaluator(source, config).await?;

    let summary = evaluator.run_batch(&entries, &args.output).await?;
    print!("{}", render_batch_summary(&summary, &args.output));
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn patch_label(solution_commit: Option<&str>, patch_file: &Path) -> String {
    solution_commit
        .map(String::from)
        .unwrap_or_else(|| patch_file.display().to_string())
}

fn log_summary(summary: &BenchmarkSummary) {
    match summary {
        BenchmarkSummary::Repository { repo, problem_ids } => {
            info!(repo = %repo, problems = problem_ids.len(), "Repository problems");
        }
        BenchmarkSummary::Overview {
            total_problems,
            repositories,
            ..
        } => {
            info!(
                problems = total_problems,
                repositories = repositories.len(),
                "Benchmark overview"
            );
        }
    }
}

fn render_details(details: &ProblemDetails) -> String {
    let mut out = String::new();
    out.push_str(&format!("Instance ID: {}\n", details.instance_id));
    out.push_str(&format!("Repository:  {}\n", details.repo));
    out.push_str(&format!("Base commit: {}\n", details.base_commit));
    if let Some(created_at) = &details.created_at {
        out.push_str(&format!("Created at:  {created_at}\n"));
    }
    out.push_str("\nProblem statement:\n");
    out.push_str(&details.problem_statement);
    out.push_str("\n\n");

    out.push_str(&format!(
        "Failing tests ({}):\n",
        details.fail_to_pass_tests.len()
    ));
    for (file, names) in &details.failing_tests {
        out.push_str(&format!("  {file}\n"));
        for name in names {
            out.push_str(&format!("    - {name}\n"));
        }
    }
    out.push_str(&format!(
        "Passing tests: {}\n",
        details.pass_to_pass_tests.len()
    ));

    if let Some(hints) = &details.hints {
        out.push_str("\nHints:\n");
        out.push_str(hints);
        out.push('\n');
    }
    if let Some(patch) = &details.patch {
        out.push_str("\nReference patch:\n");
        out.push_str(patch);
        out.push('\n');
    }
    if let Some(test_patch) = &details.test_patch {
        out.push_str("\nTest patch:\n");
        out.push_str(test_patch);
        out.push('\n');
    }
    out
}

fn render_result(result: &EvaluationResult) -> String {
    let mut out = String::new();
    out.push_str("\n=== Evaluation Result ===\n");
    out.push_str(&format!("Instance:      {}\n", result.instance_id));
    out.push_str(&format!("Solution:      {}\n", result.solution_commit));
    out.push_str(&format!("Status:        {}\n", result.status));
    out.push_str(&format!("Fixed tests:   {}\n", result.metrics.fixed_tests));
    out.push_str(&format!("Broken tests:  {}\n", result.metrics.broken_tests));
    out.push_str(&format!(
        "Success rate:  {:.1}%\n",
        result.metrics.success_rate * 100.0
    ));
    if !result.changed_files.is_empty() {
        out.push_str(&format!(
            "Changed files: {}\n",
            result.changed_files.join(", ")
        ));
    }
    if let Some(err) = &result.error {
        out.push_str(&format!("Error:         {err}\n"));
    }
    out
}

fn render_batch_summary(summary: &BatchSummary, output: &Path) -> String {
    let mut out = String::new();
    out.push_str("\n=== Batch Results ===\n");
    out.push_str(&format!("Total entries: {}\n", summary.total));
    out.push_str(&format!("Resolved:      {}\n", summary.resolved));
    out.push_str(&format!("Unresolved:    {}\n", summary.unresolved));
    out.push_str(&format!("Errors:        {}\n", summary.error));
    if !summary.not_found.is_empty() {
        out.push_str(&format!(
            "Not found:     {}\n",
            summary.not_found.join(", ")
        ));
    }
    out.push_str(&format!("Reports:       {}\n", output.display()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationStatus;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_command_defaults() {
        let args = vec!["swe-verify", "evaluate", "django__django-11099", "abc123"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.source.dataset, DEFAULT_DATASET);
        assert_eq!(cli.source.split, DEFAULT_SPLIT);
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.instance_id, "django__django-11099");
                assert_eq!(args.solution_commit.as_deref(), Some("abc123"));
                assert_eq!(args.run.timeout, DEFAULT_TEST_TIMEOUT_SECS);
                assert!(!args.run.isolated);
                assert!(args.patch_file.is_none());
                assert!(args.output.is_none());
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_evaluate_with_patch_file_needs_no_commit() {
        let args = vec![
            "swe-verify",
            "eval",
            "django__django-11099",
            "--patch-file",
            "fix.diff",
            "--timeout",
            "30",
            "--isolated",
            "-o",
            "out.json",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse with alias");
        match cli.command {
            Commands::Evaluate(args) => {
                assert!(args.solution_commit.is_none());
                assert_eq!(args.patch_file, Some(PathBuf::from("fix.diff")));
                assert_eq!(args.run.timeout, 30);
                assert!(args.run.isolated);
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_evaluate_requires_commit_or_patch() {
        let args = vec!["swe-verify", "evaluate", "django__django-11099"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_source_flags_after_subcommand() {
        let args = vec![
            "swe-verify",
            "details",
            "astropy__astropy-12907",
            "-p",
            "--dataset-file",
            "verified.jsonl",
            "--cache-dir",
            "/tmp/cache",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");
        assert_eq!(cli.source.dataset_file, Some(PathBuf::from("verified.jsonl")));
        assert_eq!(cli.source.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(
            catalog_source(&cli.source),
            CatalogSource::LocalFile(PathBuf::from("verified.jsonl"))
        );
        match cli.command {
            Commands::Details(args) => assert!(args.include_patch),
            _ => panic!("Expected Details command"),
        }
    }

    #[test]
    fn test_setup_and_batch_defaults() {
        let cli = Cli::try_parse_from(["swe-verify", "setup", "a__b-1"]).expect("should parse");
        match cli.command {
            Commands::Setup(args) => assert_eq!(args.output, PathBuf::from(DEFAULT_SETUP_DIR)),
            _ => panic!("Expected Setup command"),
        }

        let cli = Cli::try_parse_from(["swe-verify", "batch", "batch.json"]).expect("should parse");
        match cli.command {
            Commands::Batch(args) => {
                assert_eq!(args.config, PathBuf::from("batch.json"));
                assert_eq!(args.output, PathBuf::from(DEFAULT_BATCH_OUTPUT_DIR));
            }
            _ => panic!("Expected Batch command"),
        }
    }

    #[test]
    fn test_apply_run_args() {
        let run = RunArgs {
            timeout: 12,
            isolated: true,
            max_output_bytes: Some(1024),
        };
        let config = apply_run_args(EvaluatorConfig::new("/tmp/cache"), &run);
        assert_eq!(config.test_timeout, Duration::from_secs(12));
        assert_eq!(config.workspace_mode, WorkspaceMode::Ephemeral);
        assert_eq!(config.max_output_bytes, Some(1024));
    }

    #[test]
    fn test_patch_label() {
        assert_eq!(patch_label(Some("my-fix"), Path::new("fix.diff")), "my-fix");
        assert_eq!(patch_label(None, Path::new("fix.diff")), "fix.diff");
    }

    #[test]
    fn test_render_details_groups_tests() {
        let details = ProblemDetails {
            instance_id: "a__b-1".into(),
            repo: "a/b".into(),
            problem_statement: "It breaks.".into(),
            base_commit: "abc".into(),
            failing_tests: [(
                "tests/test_x.py".to_string(),
                vec!["test_one".to_string(), "test_two".to_string()],
            )]
            .into_iter()
            .collect(),
            fail_to_pass_tests: vec![
                "tests/test_x.py::test_one".into(),
                "tests/test_x.py::test_two".into(),
            ],
            pass_to_pass_tests: vec!["tests/test_x.py::test_ok".into()],
            created_at: None,
            hints: None,
            patch: None,
            test_patch: None,
        };
        let text = render_details(&details);
        assert!(text.contains("Failing tests (2):\n  tests/test_x.py\n    - test_one\n    - test_two\n"));
        assert!(text.contains("Passing tests: 1"));
        assert!(!text.contains("Hints:"));
        assert!(!text.contains("Reference patch:"));
    }

    #[test]
    fn test_render_result_shows_error() {
        let json = serde_json::json!({
            "instance_id": "a__b-1",
            "repo": "a/b",
            "base_commit": "abc",
            "solution_commit": "def",
            "timestamp": 1.0,
            "before": {"fail_to_pass": {}, "pass_to_pass": {}},
            "after": {"fail_to_pass": {}, "pass_to_pass": {}},
            "metrics": {"fixed_tests": 0, "broken_tests": 0, "total_tests": 1, "success_rate": 0.0},
            "status": "error",
            "changed_files": [],
            "error": "Repository a/b unavailable: not found"
        });
        let result: EvaluationResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.status, EvaluationStatus::Error);
        let text = render_result(&result);
        assert!(text.contains("Status:        error"));
        assert!(text.contains("Error:         Repository a/b unavailable"));
    }

    #[test]
    fn test_summary_and_setup_info_print_as_pretty_json() {
        let summary = BenchmarkSummary::Repository {
            repo: "psf/requests".into(),
            problem_ids: vec!["psf__requests-1".into()],
        };
        assert_eq!(
            to_pretty_json(&summary).unwrap(),
            "{\n  \"repo\": \"psf/requests\",\n  \"problem_ids\": [\n    \"psf__requests-1\"\n  ]\n}"
        );

        let info = crate::evaluator::SetupInfo {
            instance_id: "psf__requests-1".into(),
            repo_path: PathBuf::from("/work/requests"),
            base_commit: "abc".into(),
            fail_to_pass_tests: vec!["t.py::test_a".into()],
            pass_to_pass_tests: vec![],
        };
        let json = to_pretty_json(&info).unwrap();
        assert!(json.starts_with("{\n  \"instance_id\": \"psf__requests-1\",\n  \"repo_path\": \"/work/requests\""));
        assert!(json.contains("\n  \"pass_to_pass_tests\": []"));
    }
}
