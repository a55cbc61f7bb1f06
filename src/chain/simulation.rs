//! Monte Carlo trajectories over the transition matrix.
//!
//! Each run starts in the initial state and moves one month at a time by drawing a
//! uniform `u ∈ [0, 1)` against the current row's cumulative distribution. A run
//! stops on reaching S4 or at the step cap; capped runs are kept as
//! "did not default within cap" (`None`), never dropped.
//!
//! Runs are split into a fixed number of shards. Shard `k` draws from
//! `StdRng::seed_from_u64(seed + k)`, shards run on rayon, and their absorption
//! times are concatenated in shard order, so a given `(matrix, state, seed, runs,
//! shards)` always yields the same outcome regardless of the thread pool.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::chain::matrix::TransitionMatrix;
use crate::domain::{
    AnalysisConfig, ConfidenceInterval, PercentileBand, RiskState, STATE_COUNT, ValidationWarning,
};
use crate::error::{ForecastError, InputError};

pub const DEFAULT_NUM_RUNS: usize = 10_000;
pub const DEFAULT_STEP_CAP: u32 = 240;
pub const DEFAULT_SHARDS: usize = 8;

/// Closed-form vs. empirical tolerance.
pub const DISCREPANCY_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub num_runs: usize,
    pub step_cap: u32,
    pub shards: usize,
    /// Master seed; shard `k` draws from `seed + k`.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_runs: DEFAULT_NUM_RUNS,
            step_cap: DEFAULT_STEP_CAP,
            shards: DEFAULT_SHARDS,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Run settings from `config` with an explicit master seed.
    pub fn with_seed(config: &AnalysisConfig, seed: u64) -> Self {
        Self {
            num_runs: config.num_runs,
            step_cap: config.step_cap,
            shards: config.shards,
            seed,
        }
    }
}

/// Cumulative rows for inverse-CDF sampling.
#[derive(Debug, Clone)]
pub struct TransitionSampler {
    cumulative: [[f64; STATE_COUNT]; STATE_COUNT],
    /// Last column with positive mass per row; absorbs draws lost to rounding.
    last_positive: [usize; STATE_COUNT],
}

impl TransitionSampler {
    pub fn new(matrix: &TransitionMatrix) -> Self {
        let mut cumulative = [[0.0; STATE_COUNT]; STATE_COUNT];
        let mut last_positive = [0; STATE_COUNT];
        for state in RiskState::ALL {
            let i = state.index();
            let mut acc = 0.0;
            for (j, p) in matrix.row(state).iter().enumerate() {
                acc += p;
                cumulative[i][j] = acc;
                if *p > 0.0 {
                    last_positive[i] = j;
                }
            }
        }
        Self {
            cumulative,
            last_positive,
        }
    }

    /// Next state for a uniform draw `u ∈ [0, 1)`.
    pub fn next_state(&self, from: RiskState, u: f64) -> RiskState {
        let i = from.index();
        let row = &self.cumulative[i];
        let prev = |j: usize| if j == 0 { 0.0 } else { row[j - 1] };
        let j = (0..STATE_COUNT)
            .find(|&j| u < row[j] && row[j] > prev(j))
            .unwrap_or(self.last_positive[i]);
        RiskState::ALL[j]
    }
}

/// Month of absorption for one trajectory, or `None` if still alive at the cap.
pub fn simulate_trajectory<R: Rng + ?Sized>(
    sampler: &TransitionSampler,
    initial: RiskState,
    step_cap: u32,
    rng: &mut R,
) -> Option<u32> {
    if initial.is_absorbing() {
        return Some(0);
    }
    let mut state = initial;
    for month in 1..=step_cap {
        state = sampler.next_state(state, rng.r#gen::<f64>());
        if state.is_absorbing() {
            return Some(month);
        }
    }
    None
}

/// Run `runs` trajectories against an injected generator.
pub fn simulate_runs<R: Rng + ?Sized>(
    sampler: &TransitionSampler,
    initial: RiskState,
    step_cap: u32,
    runs: usize,
    rng: &mut R,
) -> Vec<Option<u32>> {
    (0..runs)
        .map(|_| simulate_trajectory(sampler, initial, step_cap, &mut *rng))
        .collect()
}

/// Split `runs` into `shards` near-equal counts (earlier shards take the remainder).
pub fn shard_sizes(runs: usize, shards: usize) -> Vec<usize> {
    let shards = shards.max(1);
    let base = runs / shards;
    let extra = runs % shards;
    (0..shards).map(|k| base + usize::from(k < extra)).collect()
}

/// Simulate `config.num_runs` trajectories from `initial`.
///
/// The effective cap is `max(config.step_cap, horizon_months)` so the horizon is
/// always covered.
pub fn simulate(
    matrix: &TransitionMatrix,
    initial: RiskState,
    horizon_months: u32,
    config: &SimulationConfig,
) -> Result<SimulationOutcome, ForecastError> {
    if config.num_runs == 0 {
        return Err(InputError::InvalidConfig("num_runs must be > 0".into()).into());
    }
    if config.shards == 0 {
        return Err(InputError::InvalidConfig("shards must be > 0".into()).into());
    }

    let step_cap = config.step_cap.max(horizon_months);
    let seed = config.seed;
    let sampler = TransitionSampler::new(matrix);

    let absorption_months: Vec<Option<u32>> = shard_sizes(config.num_runs, config.shards)
        .into_par_iter()
        .enumerate()
        .map(|(k, runs)| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
            simulate_runs(&sampler, initial, step_cap, runs, &mut rng)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    let outcome = SimulationOutcome {
        initial,
        step_cap,
        seed,
        absorption_months,
    };
    debug!(
        state = initial.code(),
        runs = outcome.num_runs(),
        seed,
        non_absorbed = outcome.non_absorbed_runs(),
        "simulation complete"
    );
    Ok(outcome)
}

/// Raw simulation output plus per-horizon statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    initial: RiskState,
    step_cap: u32,
    seed: u64,
    absorption_months: Vec<Option<u32>>,
}

impl SimulationOutcome {
    pub fn initial(&self) -> RiskState {
        self.initial
    }

    pub fn step_cap(&self) -> u32 {
        self.step_cap
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_runs(&self) -> usize {
        self.absorption_months.len()
    }

    pub fn absorption_months(&self) -> &[Option<u32>] {
        &self.absorption_months
    }

    /// Runs that had not defaulted by the step cap.
    pub fn non_absorbed_runs(&self) -> usize {
        self.absorption_months.iter().filter(|t| t.is_none()).count()
    }

    fn absorbed_by(&self, horizon_months: u32) -> impl Iterator<Item = u32> + '_ {
        self.absorption_months
            .iter()
            .filter_map(move |t| t.filter(|m| *m <= horizon_months))
    }

    /// Fraction of all runs absorbed by `horizon_months`.
    pub fn default_frequency(&self, horizon_months: u32) -> f64 {
        if self.absorption_months.is_empty() {
            return 0.0;
        }
        self.absorbed_by(horizon_months).count() as f64 / self.num_runs() as f64
    }

    /// `[earliest, latest]` absorption month among runs absorbed by the horizon.
    pub fn confidence_interval(&self, horizon_months: u32) -> Option<ConfidenceInterval> {
        let (lo, hi) = self
            .absorbed_by(horizon_months)
            .fold(None, |acc: Option<(u32, u32)>, m| match acc {
                None => Some((m, m)),
                Some((lo, hi)) => Some((lo.min(m), hi.max(m))),
            })?;
        Some(ConfidenceInterval {
            earliest_month: lo,
            latest_month: hi,
        })
    }

    /// 5th/95th percentile of absorption months among runs absorbed by the horizon.
    pub fn percentile_band(&self, horizon_months: u32) -> Option<PercentileBand> {
        let mut months: Vec<u32> = self.absorbed_by(horizon_months).collect();
        if months.is_empty() {
            return None;
        }
        months.sort_unstable();
        Some(PercentileBand {
            p05_month: percentile(&months, 0.05),
            p95_month: percentile(&months, 0.95),
        })
    }

    /// Mean absorption month over runs that defaulted within the cap.
    pub fn mean_absorption_month(&self) -> Option<f64> {
        let absorbed: Vec<u32> = self.absorption_months.iter().flatten().copied().collect();
        if absorbed.is_empty() {
            return None;
        }
        Some(absorbed.iter().map(|m| f64::from(*m)).sum::<f64>() / absorbed.len() as f64)
    }
}

/// Linear-interpolated percentile of a sorted, non-empty slice.
fn percentile(sorted: &[u32], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let a = f64::from(sorted[lo]);
    let b = f64::from(sorted[hi]);
    a + (b - a) * (rank - lo as f64)
}

/// Result of comparing closed-form probabilities with simulated frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub validated: bool,
    /// Largest absolute delta across the compared horizons.
    pub discrepancy: f64,
    pub warnings: Vec<ValidationWarning>,
}

/// Flag every horizon where `|closed_form - empirical| > tolerance`. Never fails.
pub fn validate_against_closed_form(
    closed_form: &[(u32, f64)],
    outcome: &SimulationOutcome,
    tolerance: f64,
) -> ValidationReport {
    let mut discrepancy = 0.0_f64;
    let mut warnings = Vec::new();
    for &(horizon_months, expected) in closed_form {
        let empirical = outcome.default_frequency(horizon_months);
        let delta = (expected - empirical).abs();
        discrepancy = discrepancy.max(delta);
        if delta > tolerance {
            warn!(
                horizon_months,
                closed_form = expected,
                empirical,
                delta,
                "closed-form and simulated default probabilities disagree"
            );
            warnings.push(ValidationWarning {
                horizon_months,
                closed_form: expected,
                empirical,
                delta,
            });
        }
    }
    ValidationReport {
        validated: warnings.is_empty(),
        discrepancy,
        warnings,
    }
}
