//! Command-line parsing for the credit-migration forecaster.
//!
//! Argument parsing stays separate from the numeric core; `app` turns these
//! structs into an `AnalysisConfig` and dispatches.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::chain::{
    DEFAULT_LBO_UPLIFT, DEFAULT_NUM_RUNS, DEFAULT_SHARDS, DEFAULT_STEP_CAP, DISCREPANCY_TOLERANCE,
};
use crate::domain::{FallbackTable, UnknownSectorPolicy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cmig", version, about = "Absorbing Markov-chain credit migration forecaster")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forecast default probabilities for one company.
    Analyze(AnalyzeArgs),
    /// Forecast a portfolio from a JSON file or a synthetic sample.
    Batch(BatchArgs),
    /// Print the adjusted one-period transition matrix for a sector.
    Matrix(MatrixArgs),
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Company name used in reports.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Composite risk score in [0, 100].
    #[arg(short = 's', long)]
    pub score: Option<f64>,

    /// Agency rating (e.g. B+, Caa1); takes precedence over the score.
    #[arg(long)]
    pub rating: Option<String>,

    /// Company is already in default.
    #[arg(long)]
    pub in_default: bool,

    #[arg(long)]
    pub sector: String,

    /// Company is LBO-backed.
    #[arg(long)]
    pub lbo: bool,

    /// As-of date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub simulation: SimulationArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    /// Snapshots JSON (array of company objects).
    #[arg(short = 'i', long, value_name = "JSON", conflicts_with = "synthetic")]
    pub input: Option<PathBuf>,

    /// Generate N synthetic companies instead of reading a file.
    #[arg(long, value_name = "N")]
    pub synthetic: Option<usize>,

    /// Seed for synthetic portfolio generation.
    #[arg(long, default_value_t = 42)]
    pub portfolio_seed: u64,

    /// As-of date for synthetic companies; defaults to today.
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Stop the batch at the first failing company.
    #[arg(long)]
    pub fail_fast: bool,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub simulation: SimulationArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct MatrixArgs {
    #[arg(long)]
    pub sector: String,

    #[arg(long)]
    pub lbo: bool,

    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Where the base matrix comes from and how it is adjusted.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Static table used when the live feed is unavailable.
    #[arg(long, value_enum, default_value_t = FallbackTable::Moodys)]
    pub fallback_table: FallbackTable,

    /// Skip the live feed and use the fallback table.
    #[arg(long)]
    pub offline: bool,

    /// JSON object of sector multipliers merged over the defaults.
    #[arg(long, value_name = "JSON")]
    pub sector_table: Option<PathBuf>,

    /// What to do with sectors missing from the table.
    #[arg(long, value_enum, default_value_t = UnknownSectorPolicy::Reject)]
    pub unknown_sector: UnknownSectorPolicy,

    /// Absolute uplift on each deterioration transition for LBO companies.
    #[arg(long, default_value_t = DEFAULT_LBO_UPLIFT)]
    pub lbo_uplift: f64,
}

#[derive(Debug, Args, Clone)]
pub struct SimulationArgs {
    /// Monte Carlo trajectories per company.
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUM_RUNS)]
    pub runs: usize,

    /// Maximum simulated months per trajectory.
    #[arg(long, default_value_t = DEFAULT_STEP_CAP)]
    pub step_cap: u32,

    /// Simulation shards (fixed for reproducibility).
    #[arg(long, default_value_t = DEFAULT_SHARDS)]
    pub shards: usize,

    /// Master seed; omit to draw one per run (reported on every result).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Closed-form vs. simulation tolerance.
    #[arg(long, default_value_t = DISCREPANCY_TOLERANCE)]
    pub tolerance: f64,
}

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Print JSON instead of the text report.
    #[arg(long)]
    pub json: bool,

    /// Also write JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}
