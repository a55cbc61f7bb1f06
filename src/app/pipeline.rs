//! Shared pipeline steps behind the `cmig` subcommands.
//!
//! Everything with side effects (env, network, files) happens here, before the
//! numeric core is called:
//! CLI args -> config + sector table -> migration source -> orchestrator

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::chain::{
    AnalysisOrchestrator, BatchOutcome, CancellationToken, RatingMigrationSource, SectorTable,
    TransitionMatrix, TransitionMatrixBuilder, UnavailableSource,
};
use crate::cli::{AnalyzeArgs, BatchArgs, MatrixArgs, SimulationArgs, SourceArgs};
use crate::data::{MigrationClient, PortfolioConfig, generate_portfolio};
use crate::domain::{AnalysisConfig, CompanySnapshot, ForecastResult};
use crate::error::AppError;
use crate::io::{read_sector_table_json, read_snapshots_json};

pub fn config_from_args(source: &SourceArgs, simulation: Option<&SimulationArgs>) -> AnalysisConfig {
    let defaults = AnalysisConfig::default();
    let mut config = AnalysisConfig {
        lbo_uplift: source.lbo_uplift,
        fallback_table: source.fallback_table,
        unknown_sector: source.unknown_sector,
        ..defaults
    };
    if let Some(sim) = simulation {
        config.num_runs = sim.runs;
        config.step_cap = sim.step_cap;
        config.shards = sim.shards;
        config.seed = sim.seed;
        config.tolerance = sim.tolerance;
    }
    config
}

pub fn load_sector_table(source: &SourceArgs) -> Result<SectorTable, AppError> {
    match &source.sector_table {
        Some(path) => read_sector_table_json(path, source.unknown_sector),
        None => Ok(SectorTable::default().with_policy(source.unknown_sector)),
    }
}

/// Live feed when configured and reachable, otherwise an unavailable source so
/// the builder takes its fallback path.
pub fn resolve_source(offline: bool, sector: Option<&str>, as_of_date: NaiveDate) -> Box<dyn RatingMigrationSource> {
    if offline {
        return Box::new(UnavailableSource::new("live feed disabled (--offline)"));
    }
    let fetched = MigrationClient::from_env().and_then(|client| client.fetch_snapshot(sector, as_of_date));
    match fetched {
        Ok(source) => Box::new(source),
        Err(unavailable) => {
            warn!(reason = %unavailable.reason, "live migration feed unavailable");
            Box::new(UnavailableSource::new(unavailable.reason))
        }
    }
}

pub fn snapshot_from_args(args: &AnalyzeArgs, today: NaiveDate) -> CompanySnapshot {
    CompanySnapshot {
        name: args.name.clone(),
        risk_score: args.score,
        sector: args.sector.clone(),
        lbo_flag: args.lbo,
        rating: args.rating.clone(),
        in_default: args.in_default,
        as_of_date: args.as_of.unwrap_or(today),
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn orchestrator(config: AnalysisConfig, source: &SourceArgs) -> Result<AnalysisOrchestrator, AppError> {
    let sectors = load_sector_table(source)?;
    Ok(AnalysisOrchestrator::from_config(config, sectors)?)
}

pub fn run_analyze(args: &AnalyzeArgs) -> Result<ForecastResult, AppError> {
    let config = config_from_args(&args.source, Some(&args.simulation));
    let orchestrator = orchestrator(config, &args.source)?;
    let snapshot = snapshot_from_args(args, today());
    let source = resolve_source(args.source.offline, Some(&snapshot.sector), snapshot.as_of_date);
    Ok(orchestrator.analyze(&snapshot, source.as_ref())?)
}

pub fn run_batch(args: &BatchArgs, cancel: &CancellationToken) -> Result<BatchOutcome, AppError> {
    let config = config_from_args(&args.source, Some(&args.simulation));
    let orchestrator = orchestrator(config, &args.source)?;

    let snapshots = match (&args.input, args.synthetic) {
        (Some(path), _) => read_snapshots_json(path)?,
        (None, Some(count)) => {
            let as_of = args.as_of.unwrap_or_else(today);
            generate_portfolio(&PortfolioConfig::new(count, args.portfolio_seed, as_of))?
        }
        (None, None) => return Err(AppError::new(2, "Batch needs --input <JSON> or --synthetic <N>.")),
    };

    // One table for the whole batch, visible at the latest as-of date in it.
    let latest = snapshots
        .iter()
        .map(|s| s.as_of_date)
        .max()
        .unwrap_or_else(today);
    let source = resolve_source(args.source.offline, None, latest);

    info!(companies = snapshots.len(), source = source.source_id(), "starting batch");
    Ok(orchestrator.analyze_batch(&snapshots, source.as_ref(), cancel, args.fail_fast))
}

pub fn run_matrix(args: &MatrixArgs) -> Result<TransitionMatrix, AppError> {
    let config = config_from_args(&args.source, None);
    config.validate().map_err(crate::error::ForecastError::from)?;
    let builder = TransitionMatrixBuilder::from_config(&config, load_sector_table(&args.source)?);
    let as_of = args.as_of.unwrap_or_else(today);
    let source = resolve_source(args.source.offline, Some(&args.sector), as_of);
    Ok(builder.build(source.as_ref(), &args.sector, args.lbo, as_of)?)
}
