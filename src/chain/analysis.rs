//! Per-company analysis: classify, build, forecast, simulate, cross-validate.
//!
//! The orchestrator owns configuration only. Each call computes a fresh
//! [`ForecastResult`]; nothing is carried between companies except an optional
//! caller-supplied [`MatrixCache`].
//!
//! Delivery is all-or-nothing: a result always carries the 6/12/24-month
//! horizons together, or the call fails.
//!
//! The master seed is fixed when the orchestrator is built (drawn once if the
//! config leaves it unset). Batch companies get `master + (index << 32)`, so no
//! two companies share a shard stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::chain::builder::{SectorTable, TransitionMatrixBuilder};
use crate::chain::cache::MatrixCache;
use crate::chain::classify::classify_snapshot;
use crate::chain::forecast::{expected_time_to_absorption, n_step_probabilities};
use crate::chain::matrix::TransitionMatrix;
use crate::chain::simulation::{SimulationConfig, simulate, validate_against_closed_form};
use crate::chain::source::RatingMigrationSource;
use crate::domain::{
    AnalysisConfig, ClassificationBasis, CompanySnapshot, ExpectedTime, FORECAST_HORIZONS,
    ForecastResult, HorizonForecast, RiskState, STATE_COUNT,
};
use crate::error::ForecastError;

/// Cooperative cancellation shared across a batch. Checked between companies.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// One company that failed inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub company: String,
    pub error: ForecastError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub completed: Vec<ForecastResult>,
    pub failed: Vec<BatchFailure>,
    /// Companies never started because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    builder: TransitionMatrixBuilder,
    config: AnalysisConfig,
}

impl Default for AnalysisOrchestrator {
    fn default() -> Self {
        let config = with_master_seed(AnalysisConfig::default());
        Self {
            builder: TransitionMatrixBuilder::from_config(&config, SectorTable::default()),
            config,
        }
    }
}

/// Seed for the company at `index` within a batch. Index 0 keeps the master seed.
pub fn company_seed(master: u64, index: usize) -> u64 {
    master.wrapping_add((index as u64) << 32)
}

fn with_master_seed(mut config: AnalysisConfig) -> AnalysisConfig {
    config.seed.get_or_insert_with(rand::random::<u64>);
    config
}

impl AnalysisOrchestrator {
    /// Rejects an invalid configuration up front and fixes the master seed.
    pub fn new(builder: TransitionMatrixBuilder, config: AnalysisConfig) -> Result<Self, ForecastError> {
        config.validate()?;
        Ok(Self {
            builder,
            config: with_master_seed(config),
        })
    }

    pub fn from_config(config: AnalysisConfig, sectors: SectorTable) -> Result<Self, ForecastError> {
        let builder = TransitionMatrixBuilder::from_config(&config, sectors);
        Self::new(builder, config)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn builder(&self) -> &TransitionMatrixBuilder {
        &self.builder
    }

    pub fn master_seed(&self) -> u64 {
        self.config.seed.unwrap_or_default()
    }

    /// Full analysis with a freshly built matrix.
    pub fn analyze(
        &self,
        snapshot: &CompanySnapshot,
        source: &dyn RatingMigrationSource,
    ) -> Result<ForecastResult, ForecastError> {
        let (state, basis) = classify_snapshot(snapshot)?;
        let matrix = self.builder.build(
            source,
            &snapshot.sector,
            snapshot.lbo_flag,
            snapshot.as_of_date,
        )?;
        self.forecast(snapshot, state, basis, &matrix, self.master_seed())
    }

    /// Same as [`Self::analyze`] but reuses matrices through a caller-owned cache.
    pub fn analyze_cached(
        &self,
        snapshot: &CompanySnapshot,
        source: &dyn RatingMigrationSource,
        cache: &mut MatrixCache,
    ) -> Result<ForecastResult, ForecastError> {
        self.analyze_seeded(snapshot, source, cache, self.master_seed())
    }

    fn analyze_seeded(
        &self,
        snapshot: &CompanySnapshot,
        source: &dyn RatingMigrationSource,
        cache: &mut MatrixCache,
        seed: u64,
    ) -> Result<ForecastResult, ForecastError> {
        let (state, basis) = classify_snapshot(snapshot)?;
        let matrix = cache.get_or_build(
            &self.builder,
            source,
            &snapshot.sector,
            snapshot.lbo_flag,
            snapshot.as_of_date,
        )?;
        self.forecast(snapshot, state, basis, &matrix, seed)
    }

    /// Analysis against an already-built matrix (no sector or LBO handling).
    pub fn analyze_with_matrix(
        &self,
        snapshot: &CompanySnapshot,
        matrix: &TransitionMatrix,
    ) -> Result<ForecastResult, ForecastError> {
        let (state, basis) = classify_snapshot(snapshot)?;
        self.forecast(snapshot, state, basis, matrix, self.master_seed())
    }

    /// Analyse companies in order, checking `cancel` before each one.
    ///
    /// With `fail_fast`, the first failure cancels the token (and so the rest of
    /// the batch). Matrices are shared per `(sector, lbo, date)` within the batch.
    pub fn analyze_batch(
        &self,
        snapshots: &[CompanySnapshot],
        source: &dyn RatingMigrationSource,
        cancel: &CancellationToken,
        fail_fast: bool,
    ) -> BatchOutcome {
        let mut cache = MatrixCache::new();
        let mut outcome = BatchOutcome::default();

        for (index, snapshot) in snapshots.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                outcome.skipped = snapshots.len() - index;
                info!(skipped = outcome.skipped, "batch cancelled");
                break;
            }
            let seed = company_seed(self.master_seed(), index);
            match self.analyze_seeded(snapshot, source, &mut cache, seed) {
                Ok(result) => outcome.completed.push(result),
                Err(error) => {
                    warn!(company = snapshot.display_name(), %error, "analysis failed");
                    outcome.failed.push(BatchFailure {
                        index,
                        company: snapshot.display_name().to_string(),
                        error,
                    });
                    if fail_fast {
                        cancel.cancel();
                    }
                }
            }
            debug!(done = index + 1, total = snapshots.len(), "batch progress");
        }

        let (hits, misses) = cache.stats();
        info!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped,
            cache_hits = hits,
            cache_misses = misses,
            "batch finished"
        );
        outcome
    }

    fn forecast(
        &self,
        snapshot: &CompanySnapshot,
        state: RiskState,
        classified_by: ClassificationBasis,
        matrix: &TransitionMatrix,
        seed: u64,
    ) -> Result<ForecastResult, ForecastError> {
        let max_horizon = FORECAST_HORIZONS.iter().copied().max().unwrap_or(0);
        let simulation = simulate(
            matrix,
            state,
            max_horizon,
            &SimulationConfig::with_seed(&self.config, seed),
        )?;

        let mut approximate = false;

        let closed_form: Option<Vec<[f64; STATE_COUNT]>> = match FORECAST_HORIZONS
            .iter()
            .map(|&h| n_step_probabilities(matrix, state, h))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(dists) => Some(dists),
            Err(ForecastError::Numeric(err)) => {
                warn!(company = snapshot.display_name(), %err, "closed form failed, reporting simulated frequencies");
                approximate = true;
                None
            }
            Err(other) => return Err(other),
        };

        let expected_time = match expected_time_to_absorption(matrix, state) {
            Ok(t) => t,
            Err(ForecastError::Numeric(err)) => {
                warn!(company = snapshot.display_name(), %err, "using simulated mean absorption month");
                approximate = true;
                simulation
                    .mean_absorption_month()
                    .map_or(ExpectedTime::Undefined, ExpectedTime::Approximate)
            }
            Err(other) => return Err(other),
        };
        approximate |= expected_time.is_approximate();

        let horizons: Vec<HorizonForecast> = FORECAST_HORIZONS
            .iter()
            .enumerate()
            .map(|(k, &horizon_months)| {
                let empirical = simulation.default_frequency(horizon_months);
                let distribution = closed_form.as_ref().map(|d| d[k]);
                let closed = distribution.map(|d| d[RiskState::Default.index()].clamp(0.0, 1.0));
                HorizonForecast {
                    horizon_months,
                    prob_default: closed.unwrap_or(empirical),
                    closed_form: closed,
                    empirical,
                    confidence_interval: simulation.confidence_interval(horizon_months),
                    absorption_p05_p95: simulation.percentile_band(horizon_months),
                    state_distribution: distribution,
                    delta: closed.map(|c| (c - empirical).abs()),
                }
            })
            .collect();

        let [h6, h12, h24] = horizons.as_slice() else {
            return Err(incomplete(state, "expected exactly three horizons"));
        };
        let (h6, h12, h24) = (h6.clone(), h12.clone(), h24.clone());
        if horizons
            .iter()
            .any(|h| !(h.prob_default.is_finite() && (0.0..=1.0).contains(&h.prob_default)))
        {
            return Err(incomplete(state, "default probability outside [0, 1]"));
        }

        let (validated, discrepancy, warnings) = match &closed_form {
            Some(_) => {
                let pairs: Vec<(u32, f64)> = horizons
                    .iter()
                    .filter_map(|h| h.closed_form.map(|c| (h.horizon_months, c)))
                    .collect();
                let report = validate_against_closed_form(&pairs, &simulation, self.config.tolerance);
                (report.validated, report.discrepancy, report.warnings)
            }
            None => (false, 0.0, Vec::new()),
        };

        let result = ForecastResult {
            company: snapshot.display_name().to_string(),
            as_of_date: snapshot.as_of_date,
            state,
            classified_by,
            expected_time_to_default_months: expected_time,
            prob_default_6m: h6.prob_default,
            prob_default_12m: h12.prob_default,
            prob_default_24m: h24.prob_default,
            ci_6m: h6.confidence_interval,
            ci_12m: h12.confidence_interval,
            ci_24m: h24.confidence_interval,
            data_source: matrix.data_source().to_string(),
            adjustments: matrix.adjustments().to_vec(),
            monte_carlo_runs: simulation.num_runs(),
            seed: simulation.seed(),
            non_absorbed_runs: simulation.non_absorbed_runs(),
            mean_absorption_month: simulation.mean_absorption_month(),
            validated,
            discrepancy,
            approximate,
            warnings,
            horizons,
        };

        info!(
            company = %result.company,
            state = state.code(),
            p12 = result.prob_default_12m,
            validated,
            approximate,
            "analysis complete"
        );
        Ok(result)
    }
}

fn incomplete(state: RiskState, detail: &str) -> ForecastError {
    ForecastError::invalid_matrix(format!("forecast from {}", state.code()), detail)
}
