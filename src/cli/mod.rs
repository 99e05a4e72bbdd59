//! Command-line interface for swe-verify.
//!
//! Provides commands for browsing the benchmark, preparing a development
//! checkout, and evaluating candidate fixes one at a time or in batches.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
