//! Migration-data sources.
//!
//! The builder never decides *where* data comes from. Callers hand it a
//! [`RatingMigrationSource`]; two interchangeable implementations ship here:
//!
//! - [`SnapshotSource`]: a live table fetched ahead of time by the service layer
//! - [`StaticTableSource`]: the documented historical fallback tables
//!
//! [`UnavailableSource`] stands in when no live feed is configured, so the
//! builder's fallback path is taken explicitly rather than by a missing env var.

use chrono::NaiveDate;

use crate::domain::{FallbackTable, RiskState, STATE_COUNT};
use crate::error::DataUnavailable;

/// A raw 5x5 one-period migration table, rows/columns ordered `[S0..S4]`.
pub type BaseMatrix = [[f64; STATE_COUNT]; STATE_COUNT];

/// `data_source` tag for matrices built from a fallback table.
pub const FALLBACK_SOURCE_ID: &str = "fallback";

/// Moody's-derived one-period migration frequencies mapped onto the five states
/// (S0 ~ BBB and better, S1 ~ BB, S2 ~ B, S3 ~ CCC, S4 = default).
pub const MOODYS_TABLE: BaseMatrix = [
    [0.850, 0.120, 0.025, 0.004, 0.001],
    [0.150, 0.700, 0.120, 0.025, 0.005],
    [0.050, 0.200, 0.550, 0.150, 0.050],
    [0.000, 0.000, 0.000, 0.700, 0.300],
    [0.000, 0.000, 0.000, 0.000, 1.000],
];

/// S&P-derived one-period migration frequencies, same state mapping.
pub const SP_TABLE: BaseMatrix = [
    [0.820, 0.140, 0.030, 0.008, 0.002],
    [0.130, 0.680, 0.140, 0.040, 0.010],
    [0.040, 0.180, 0.520, 0.180, 0.080],
    [0.000, 0.000, 0.000, 0.650, 0.350],
    [0.000, 0.000, 0.000, 0.000, 1.000],
];

impl FallbackTable {
    pub fn matrix(self) -> BaseMatrix {
        match self {
            FallbackTable::Moodys => MOODYS_TABLE,
            FallbackTable::Sp => SP_TABLE,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FallbackTable::Moodys => "Moody's historical",
            FallbackTable::Sp => "S&P historical",
        }
    }
}

/// Collaborator contract: supply a base migration matrix for a date.
pub trait RatingMigrationSource: Send + Sync {
    /// Identifier recorded as the matrix's `data_source`.
    fn source_id(&self) -> &str;

    fn get_matrix(&self, as_of_date: NaiveDate) -> Result<BaseMatrix, DataUnavailable>;
}

/// Documented static fallback table. Always available.
#[derive(Debug, Clone, Copy)]
pub struct StaticTableSource {
    table: FallbackTable,
}

impl StaticTableSource {
    pub fn new(table: FallbackTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> FallbackTable {
        self.table
    }
}

impl Default for StaticTableSource {
    fn default() -> Self {
        Self::new(FallbackTable::Moodys)
    }
}

impl RatingMigrationSource for StaticTableSource {
    fn source_id(&self) -> &str {
        FALLBACK_SOURCE_ID
    }

    fn get_matrix(&self, _as_of_date: NaiveDate) -> Result<BaseMatrix, DataUnavailable> {
        Ok(self.table.matrix())
    }
}

/// Live table resolved before analysis (no I/O happens here).
///
/// Serves requests for any as-of date on or after the table's own date; a table
/// published after the requested date is not visible at that date.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    id: String,
    published: NaiveDate,
    matrix: BaseMatrix,
}

impl SnapshotSource {
    pub fn new(id: impl Into<String>, published: NaiveDate, matrix: BaseMatrix) -> Self {
        Self {
            id: id.into(),
            published,
            matrix,
        }
    }

    pub fn published(&self) -> NaiveDate {
        self.published
    }
}

impl RatingMigrationSource for SnapshotSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn get_matrix(&self, as_of_date: NaiveDate) -> Result<BaseMatrix, DataUnavailable> {
        if self.published > as_of_date {
            return Err(DataUnavailable::new(format!(
                "{} table published {} is after as-of {}",
                self.id, self.published, as_of_date
            )));
        }
        Ok(self.matrix)
    }
}

/// No live feed configured.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RatingMigrationSource for UnavailableSource {
    fn source_id(&self) -> &str {
        "unavailable"
    }

    fn get_matrix(&self, _as_of_date: NaiveDate) -> Result<BaseMatrix, DataUnavailable> {
        let reason = if self.reason.is_empty() {
            "no live migration source configured"
        } else {
            &self.reason
        };
        Err(DataUnavailable::new(reason))
    }
}

/// Normalize raw feed rows into a base matrix.
///
/// Each transient row is scaled to sum to 1; the default row is forced absorbing.
/// Rows with no positive mass are reported as unavailable.
pub fn normalize_feed_rows(raw: BaseMatrix) -> Result<BaseMatrix, DataUnavailable> {
    let mut out = raw;
    for state in RiskState::TRANSIENT {
        let row = &mut out[state.index()];
        if row.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(DataUnavailable::new(format!(
                "feed row {} has negative or non-finite entries",
                state.code()
            )));
        }
        let sum: f64 = row.iter().sum();
        if sum <= 0.0 {
            return Err(DataUnavailable::new(format!("feed row {} is empty", state.code())));
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    out[RiskState::Default.index()] = [0.0, 0.0, 0.0, 0.0, 1.0];
    Ok(out)
}
