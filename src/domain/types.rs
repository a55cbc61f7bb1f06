//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the numeric core and the service layer
//! - exported to JSON
//! - reloaded later for batch runs

use std::fmt;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::chain::{
    DEFAULT_LBO_UPLIFT, DEFAULT_NUM_RUNS, DEFAULT_SHARDS, DEFAULT_STEP_CAP, DISCREPANCY_TOLERANCE,
};
use crate::error::InputError;

/// Number of discrete states in the chain (four transient + default).
pub const STATE_COUNT: usize = 5;

/// Number of transient (non-absorbing) states.
pub const TRANSIENT_COUNT: usize = STATE_COUNT - 1;

/// Forecast horizons (months) reported on every [`ForecastResult`].
pub const FORECAST_HORIZONS: [u32; 3] = [6, 12, 24];

/// Discretized risk bucket.
///
/// Ordering follows severity: `Stable < Elevated < High < Critical < Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskState {
    #[serde(rename = "S0")]
    Stable,
    #[serde(rename = "S1")]
    Elevated,
    #[serde(rename = "S2")]
    High,
    #[serde(rename = "S3")]
    Critical,
    /// Absorbing.
    #[serde(rename = "S4")]
    Default,
}

impl RiskState {
    pub const ALL: [RiskState; STATE_COUNT] = [
        RiskState::Stable,
        RiskState::Elevated,
        RiskState::High,
        RiskState::Critical,
        RiskState::Default,
    ];

    pub const TRANSIENT: [RiskState; TRANSIENT_COUNT] = [
        RiskState::Stable,
        RiskState::Elevated,
        RiskState::High,
        RiskState::Critical,
    ];

    /// Row/column index in a transition matrix.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short code (`S0`..`S4`).
    pub fn code(self) -> &'static str {
        match self {
            RiskState::Stable => "S0",
            RiskState::Elevated => "S1",
            RiskState::High => "S2",
            RiskState::Critical => "S3",
            RiskState::Default => "S4",
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            RiskState::Stable => "Stable",
            RiskState::Elevated => "Elevated",
            RiskState::High => "High",
            RiskState::Critical => "Critical",
            RiskState::Default => "Default",
        }
    }

    /// Lowercase label used by migration-rate feeds (`stable_to_high`, ...).
    pub fn feed_label(self) -> &'static str {
        match self {
            RiskState::Stable => "stable",
            RiskState::Elevated => "elevated",
            RiskState::High => "high",
            RiskState::Critical => "critical",
            RiskState::Default => "default",
        }
    }

    pub fn is_absorbing(self) -> bool {
        self == RiskState::Default
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.display_name())
    }
}

/// Documented static migration tables used when no live source is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FallbackTable {
    /// Moody's-derived one-period frequencies (default).
    Moodys,
    /// S&P-derived one-period frequencies.
    Sp,
}

/// What to do with a sector that has no multiplier in the sector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSectorPolicy {
    /// Fail with `InputError::UnmappedSector`.
    Reject,
    /// Treat the sector as resilient (multiplier 0.0).
    Neutral,
}

/// Caller-supplied company state. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    #[serde(default)]
    pub name: String,
    /// Composite risk score in `[0, 100]`.
    #[serde(default)]
    pub risk_score: Option<f64>,
    pub sector: String,
    #[serde(default)]
    pub lbo_flag: bool,
    /// External agency rating (e.g. `B+`, `Caa1`).
    #[serde(default)]
    pub rating: Option<String>,
    /// Explicit default indicator; overrides score and rating.
    #[serde(default)]
    pub in_default: bool,
    pub as_of_date: NaiveDate,
}

impl CompanySnapshot {
    pub fn new(
        name: impl Into<String>,
        risk_score: f64,
        sector: impl Into<String>,
        lbo_flag: bool,
        as_of_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            risk_score: Some(risk_score),
            sector: sector.into(),
            lbo_flag,
            rating: None,
            in_default: false,
            as_of_date,
        }
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = Some(rating.into());
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<unnamed>"
        } else {
            &self.name
        }
    }
}

/// Which input determined the starting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    DefaultIndicator,
    Rating,
    Score,
}

/// Crude min/max band of observed absorption months among runs that defaulted
/// by a horizon. Not a percentile interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub earliest_month: u32,
    pub latest_month: u32,
}

/// 5th/95th percentile of absorption months among runs that defaulted by a horizon.
///
/// Reported next to [`ConfidenceInterval`], never in place of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p05_month: f64,
    pub p95_month: f64,
}

/// Expected periods until absorption in the default state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "months", rename_all = "lowercase")]
pub enum ExpectedTime {
    /// From the fundamental matrix.
    Exact(f64),
    /// From iterated powers or the simulation.
    Approximate(f64),
    /// Default is unreachable from the starting state.
    Undefined,
}

impl ExpectedTime {
    pub fn months(self) -> Option<f64> {
        match self {
            ExpectedTime::Exact(m) | ExpectedTime::Approximate(m) => Some(m),
            ExpectedTime::Undefined => None,
        }
    }

    pub fn is_approximate(self) -> bool {
        matches!(self, ExpectedTime::Approximate(_))
    }
}

/// Closed-form vs. simulated disagreement beyond tolerance. Non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub horizon_months: u32,
    pub closed_form: f64,
    pub empirical: f64,
    pub delta: f64,
}

/// Per-horizon detail behind the flat `prob_default_*` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub horizon_months: u32,
    /// Reported probability (closed form when available, else empirical).
    pub prob_default: f64,
    pub closed_form: Option<f64>,
    pub empirical: f64,
    pub confidence_interval: Option<ConfidenceInterval>,
    pub absorption_p05_p95: Option<PercentileBand>,
    /// Closed-form distribution over `[S0..S4]` at this horizon.
    pub state_distribution: Option<[f64; STATE_COUNT]>,
    /// `|closed_form - empirical|`.
    pub delta: Option<f64>,
}

/// Full analysis output for one company. Computed fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub company: String,
    pub as_of_date: NaiveDate,
    pub state: RiskState,
    pub classified_by: ClassificationBasis,

    pub expected_time_to_default_months: ExpectedTime,

    pub prob_default_6m: f64,
    pub prob_default_12m: f64,
    pub prob_default_24m: f64,
    pub ci_6m: Option<ConfidenceInterval>,
    pub ci_12m: Option<ConfidenceInterval>,
    pub ci_24m: Option<ConfidenceInterval>,

    pub data_source: String,
    pub adjustments: Vec<String>,

    pub monte_carlo_runs: usize,
    /// Master seed actually used (reproduces the simulation when passed back in).
    pub seed: u64,
    pub non_absorbed_runs: usize,
    pub mean_absorption_month: Option<f64>,

    pub validated: bool,
    /// Largest `|closed_form - empirical|` across horizons (0 when no closed form).
    pub discrepancy: f64,
    /// Some part of the result came from an approximation rather than the closed form.
    pub approximate: bool,
    pub warnings: Vec<ValidationWarning>,

    pub horizons: Vec<HorizonForecast>,
}

impl ForecastResult {
    pub fn horizon(&self, months: u32) -> Option<&HorizonForecast> {
        self.horizons.iter().find(|h| h.horizon_months == months)
    }
}

/// Analysis configuration as understood by the orchestrator.
///
/// Derived from CLI flags (plus defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Monte Carlo trajectories per company.
    pub num_runs: usize,
    /// Hard cap on simulated months per trajectory.
    pub step_cap: u32,
    /// Simulation shards (fixed count so results do not depend on the thread pool).
    pub shards: usize,
    /// Master seed; `None` draws one when the orchestrator is built.
    pub seed: Option<u64>,
    /// Closed-form vs. simulation tolerance.
    pub tolerance: f64,
    /// Absolute uplift on each deterioration transition for LBO companies.
    pub lbo_uplift: f64,
    pub fallback_table: FallbackTable,
    pub unknown_sector: UnknownSectorPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            num_runs: DEFAULT_NUM_RUNS,
            step_cap: DEFAULT_STEP_CAP,
            shards: DEFAULT_SHARDS,
            seed: None,
            tolerance: DISCREPANCY_TOLERANCE,
            lbo_uplift: DEFAULT_LBO_UPLIFT,
            fallback_table: FallbackTable::Moodys,
            unknown_sector: UnknownSectorPolicy::Reject,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.num_runs == 0 {
            return Err(InputError::InvalidConfig("num_runs must be > 0".into()));
        }
        if self.shards == 0 {
            return Err(InputError::InvalidConfig("shards must be > 0".into()));
        }
        let max_horizon = FORECAST_HORIZONS.iter().copied().max().unwrap_or(0);
        if self.step_cap < max_horizon {
            return Err(InputError::InvalidConfig(format!(
                "step_cap {} is shorter than the {max_horizon}-month horizon",
                self.step_cap
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(InputError::InvalidConfig("tolerance must be > 0".into()));
        }
        if !(self.lbo_uplift.is_finite() && (0.0..1.0).contains(&self.lbo_uplift)) {
            return Err(InputError::InvalidConfig("lbo_uplift must be in [0, 1)".into()));
        }
        Ok(())
    }
}
