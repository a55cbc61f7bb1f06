//! Top-level application orchestration.
//!
//! `src/main.rs` only sets up logging and maps the exit code; this module:
//! - parses CLI arguments
//! - runs the requested pipeline
//! - prints text or JSON
//! - writes optional exports

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::chain::CancellationToken;
use crate::cli::{AnalyzeArgs, BatchArgs, Cli, Command, MatrixArgs, OutputArgs};
use crate::error::AppError;
use crate::io::{BatchReport, to_json_string, write_json};

pub mod pipeline;

/// Log filter from `RUST_LOG`, falling back to `info` when unset or empty.
pub fn log_filter() -> EnvFilter {
    log_filter_from(std::env::var("RUST_LOG").ok().as_deref())
}

/// Unparseable directives are dropped rather than failing startup.
pub fn log_filter_from(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Entry point for the `cmig` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => handle_analyze(&args),
        Command::Batch(args) => handle_batch(&args),
        Command::Matrix(args) => handle_matrix(&args),
    }
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<(), AppError> {
    let result = pipeline::run_analyze(args)?;
    emit(&args.output, &result, || crate::report::format_forecast(&result))
}

fn handle_batch(args: &BatchArgs) -> Result<(), AppError> {
    let cancel = CancellationToken::new();
    let outcome = pipeline::run_batch(args, &cancel)?;
    let report = BatchReport::from_outcome(&outcome);
    emit(&args.output, &report, || crate::report::format_batch(&outcome))?;

    match outcome.failed.first() {
        Some(first) => Err(AppError::new(
            first.error.exit_code(),
            format!(
                "{} of {} companies failed (first: {}: {})",
                outcome.failed.len(),
                outcome.total(),
                first.company,
                first.error
            ),
        )),
        None => Ok(()),
    }
}

fn handle_matrix(args: &MatrixArgs) -> Result<(), AppError> {
    let matrix = pipeline::run_matrix(args)?;
    emit(&args.output, &matrix, || crate::report::format_matrix(&matrix))
}

/// Print JSON or text, then export if requested.
fn emit<T, F>(output: &OutputArgs, value: &T, text: F) -> Result<(), AppError>
where
    T: serde::Serialize,
    F: FnOnce() -> String,
{
    if output.json {
        println!("{}", to_json_string(value)?);
    } else {
        println!("{}", text());
    }
    if let Some(path) = &output.export {
        write_json(path, value)?;
    }
    Ok(())
}
