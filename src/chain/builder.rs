//! Transition-matrix construction.
//!
//! `build` is a pure function of its inputs:
//!
//! 1. resolve a base matrix from the caller's source, or the static fallback table
//!    (tagged `data_source = "fallback"`) when the source reports `DataUnavailable`
//! 2. LBO: add `lbo_uplift` to every deterioration cell (`j > i`, S4 included) of
//!    each transient row
//! 3. sector: add the sector multiplier to the S4 column of each transient row
//!
//! Each adjustment is rebalanced inside its row by shrinking every *other* entry
//! (stay-probability included) proportionally, so the row sums to 1 again. The S4
//! row is never touched. The row-stochastic check runs on the base matrix and again
//! after every adjustment.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::chain::matrix::{TransitionMatrix, validate_rows};
use crate::chain::source::{BaseMatrix, FALLBACK_SOURCE_ID, RatingMigrationSource, StaticTableSource};
use crate::domain::{AnalysisConfig, RiskState, UnknownSectorPolicy};
use crate::error::{DataError, ForecastError, InputError};

/// Absolute uplift on each deterioration cell for LBO companies.
pub const DEFAULT_LBO_UPLIFT: f64 = 0.025;

/// Absolute default-column uplift per sector.
pub const DEFAULT_SECTOR_MULTIPLIERS: &[(&str, f64)] = &[
    ("Retail", 0.03),
    ("Consumer Discretionary", 0.03),
    ("Energy", 0.02),
    ("Healthcare", 0.02),
    ("Technology", 0.00),
    ("Real Estate", 0.025),
    ("Financials", 0.015),
    ("Utilities", 0.01),
    ("Industrials", 0.01),
    ("Materials", 0.02),
    ("Telecommunications", 0.02),
    ("Consumer Staples", 0.005),
];

/// Sector -> default-column multiplier, matched case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorTable {
    entries: BTreeMap<String, f64>,
    policy: UnknownSectorPolicy,
}

impl Default for SectorTable {
    fn default() -> Self {
        let entries = DEFAULT_SECTOR_MULTIPLIERS
            .iter()
            .map(|(name, m)| (sector_key(name), *m))
            .collect();
        Self {
            entries,
            policy: UnknownSectorPolicy::Reject,
        }
    }
}

impl SectorTable {
    /// Build a table from explicit `(sector, multiplier)` pairs.
    pub fn from_entries<I, S>(entries: I, policy: UnknownSectorPolicy) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut table = Self {
            entries: BTreeMap::new(),
            policy,
        };
        for (sector, multiplier) in entries {
            table.insert(sector.as_ref(), multiplier)?;
        }
        Ok(table)
    }

    pub fn with_policy(mut self, policy: UnknownSectorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn insert(&mut self, sector: &str, multiplier: f64) -> Result<(), InputError> {
        if !(multiplier.is_finite() && (0.0..1.0).contains(&multiplier)) {
            return Err(InputError::InvalidConfig(format!(
                "sector multiplier for '{sector}' must be in [0, 1), got {multiplier}"
            )));
        }
        self.entries.insert(sector_key(sector), multiplier);
        Ok(())
    }

    pub fn multiplier(&self, sector: &str) -> Result<f64, InputError> {
        match self.entries.get(&sector_key(sector)) {
            Some(m) => Ok(*m),
            None => match self.policy {
                UnknownSectorPolicy::Reject => Err(InputError::UnmappedSector {
                    sector: sector.to_string(),
                }),
                UnknownSectorPolicy::Neutral => Ok(0.0),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order (lower-cased sector names).
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn sector_key(sector: &str) -> String {
    sector.trim().to_lowercase()
}

/// Stateless matrix builder. Holds configuration only; no cache.
#[derive(Debug, Clone)]
pub struct TransitionMatrixBuilder {
    sectors: SectorTable,
    lbo_uplift: f64,
    fallback: Option<StaticTableSource>,
}

impl Default for TransitionMatrixBuilder {
    fn default() -> Self {
        Self::new(SectorTable::default(), DEFAULT_LBO_UPLIFT)
    }
}

impl TransitionMatrixBuilder {
    pub fn new(sectors: SectorTable, lbo_uplift: f64) -> Self {
        Self {
            sectors,
            lbo_uplift,
            fallback: Some(StaticTableSource::default()),
        }
    }

    /// Builder wired from run configuration (uplift, fallback table, unknown-sector policy).
    pub fn from_config(config: &AnalysisConfig, sectors: SectorTable) -> Self {
        Self {
            sectors: sectors.with_policy(config.unknown_sector),
            lbo_uplift: config.lbo_uplift,
            fallback: Some(StaticTableSource::new(config.fallback_table)),
        }
    }

    /// Replace (or remove) the static fallback table.
    pub fn with_fallback(mut self, fallback: Option<StaticTableSource>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn sectors(&self) -> &SectorTable {
        &self.sectors
    }

    pub fn build(
        &self,
        source: &dyn RatingMigrationSource,
        sector: &str,
        lbo_flag: bool,
        as_of_date: NaiveDate,
    ) -> Result<TransitionMatrix, ForecastError> {
        // Input errors surface before any matrix work.
        let sector_uplift = self.sectors.multiplier(sector)?;

        let (mut values, data_source) = self.resolve_base(source, as_of_date)?;
        validate_rows(&values, "base")?;

        let mut adjustments = Vec::new();

        if lbo_flag && self.lbo_uplift > 0.0 {
            values = apply_deterioration_uplift(&values, self.lbo_uplift)?;
            validate_rows(&values, "lbo adjustment")?;
            adjustments.push(format!("lbo_deterioration+{:.4}", self.lbo_uplift));
            debug!(uplift = self.lbo_uplift, "applied LBO deterioration uplift");
        }

        if sector_uplift > 0.0 {
            values = apply_default_uplift(&values, sector_uplift)?;
            validate_rows(&values, "sector adjustment")?;
            adjustments.push(format!("sector_default[{}]+{:.4}", sector.trim(), sector_uplift));
            debug!(sector, uplift = sector_uplift, "applied sector default uplift");
        }

        info!(
            source = %data_source,
            sector,
            lbo_flag,
            %as_of_date,
            adjustments = adjustments.len(),
            "transition matrix built"
        );
        TransitionMatrix::new(values, data_source, adjustments, as_of_date)
    }

    fn resolve_base(
        &self,
        source: &dyn RatingMigrationSource,
        as_of_date: NaiveDate,
    ) -> Result<(BaseMatrix, String), ForecastError> {
        match source.get_matrix(as_of_date) {
            Ok(values) => Ok((values, source.source_id().to_string())),
            Err(unavailable) => {
                let Some(fallback) = self.fallback else {
                    return Err(DataError::MigrationDataUnavailable {
                        reason: unavailable.reason,
                    }
                    .into());
                };
                warn!(
                    source = source.source_id(),
                    reason = %unavailable.reason,
                    table = fallback.table().display_name(),
                    "migration source unavailable, using fallback table"
                );
                let values = fallback.get_matrix(as_of_date).map_err(|e| {
                    DataError::MigrationDataUnavailable { reason: e.reason }
                })?;
                Ok((values, FALLBACK_SOURCE_ID.to_string()))
            }
        }
    }
}

/// Add `uplift` to every transition into a strictly worse state, per transient row.
pub fn apply_deterioration_uplift(values: &BaseMatrix, uplift: f64) -> Result<BaseMatrix, ForecastError> {
    let mut out = *values;
    for state in RiskState::TRANSIENT {
        let i = state.index();
        let targets: Vec<usize> = (i + 1..RiskState::ALL.len()).collect();
        add_and_rebalance(&mut out[i], &targets, uplift, "lbo adjustment", state)?;
    }
    Ok(out)
}

/// Add `uplift` to the S4 column of every transient row.
pub fn apply_default_uplift(values: &BaseMatrix, uplift: f64) -> Result<BaseMatrix, ForecastError> {
    let mut out = *values;
    let default_col = RiskState::Default.index();
    for state in RiskState::TRANSIENT {
        add_and_rebalance(&mut out[state.index()], &[default_col], uplift, "sector adjustment", state)?;
    }
    Ok(out)
}

/// Add `uplift` to each target cell and shrink the remaining cells proportionally
/// by the total added mass.
fn add_and_rebalance(
    row: &mut [f64],
    targets: &[usize],
    uplift: f64,
    step: &str,
    state: RiskState,
) -> Result<(), ForecastError> {
    let added = uplift * targets.len() as f64;
    if added == 0.0 {
        return Ok(());
    }
    let others_sum: f64 = row
        .iter()
        .enumerate()
        .filter(|(j, _)| !targets.contains(j))
        .map(|(_, v)| *v)
        .sum();
    if others_sum < added {
        return Err(ForecastError::invalid_matrix(
            step,
            format!(
                "row {} has {others_sum:.6} mass left to absorb an uplift of {added:.6}",
                state.code()
            ),
        ));
    }
    let scale = (others_sum - added) / others_sum;
    for (j, v) in row.iter_mut().enumerate() {
        if targets.contains(&j) {
            *v += uplift;
        } else {
            *v *= scale;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::source::{MOODYS_TABLE, SnapshotSource, UnavailableSource};
    use crate::domain::FallbackTable;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn assert_stochastic(m: &TransitionMatrix) {
        for row in m.values() {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "row sums to {sum}");
        }
        assert_eq!(m.row(RiskState::Default), &[0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unavailable_source_falls_back_and_is_tagged() {
        let builder = TransitionMatrixBuilder::default();
        let m = builder
            .build(&UnavailableSource::default(), "Technology", false, as_of())
            .unwrap();
        assert_eq!(m.data_source(), "fallback");
        assert_eq!(m.values(), &MOODYS_TABLE);
        assert!(m.adjustments().is_empty());
    }

    #[test]
    fn live_source_id_is_recorded() {
        let source = SnapshotSource::new("live", as_of(), MOODYS_TABLE);
        let m = TransitionMatrixBuilder::default()
            .build(&source, "Technology", false, as_of())
            .unwrap();
        assert_eq!(m.data_source(), "live");
    }

    #[test]
    fn no_fallback_and_no_source_is_data_error() {
        let builder = TransitionMatrixBuilder::default().with_fallback(None);
        let err = builder
            .build(&UnavailableSource::default(), "Retail", true, as_of())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::MigrationDataUnavailable { .. })));
    }

    #[test]
    fn lbo_uplift_matches_hand_computed_rows() {
        let out = apply_deterioration_uplift(&MOODYS_TABLE, 0.025).unwrap();
        // S0: four deterioration cells get +0.025, stay shrinks 0.85 -> 0.75.
        assert!((out[0][0] - 0.75).abs() < 1e-12);
        assert!((out[0][1] - 0.145).abs() < 1e-12);
        assert!((out[0][4] - 0.026).abs() < 1e-12);
        // S2: 0.05 added across S3/S4, S0..S2 scaled by 0.75 / 0.8.
        assert!((out[2][0] - 0.046875).abs() < 1e-12);
        assert!((out[2][2] - 0.515625).abs() < 1e-12);
        assert!((out[2][3] - 0.175).abs() < 1e-12);
        assert!((out[2][4] - 0.075).abs() < 1e-12);
        // S3: only S4 is worse.
        assert!((out[3][3] - 0.675).abs() < 1e-12);
        assert!((out[3][4] - 0.325).abs() < 1e-12);
        assert_eq!(out[4], MOODYS_TABLE[4]);
    }

    #[test]
    fn lbo_never_lowers_default_column() {
        for table in [FallbackTable::Moodys, FallbackTable::Sp] {
            let base = table.matrix();
            let out = apply_deterioration_uplift(&base, 0.025).unwrap();
            for i in 0..5 {
                assert!(out[i][4] >= base[i][4]);
            }
        }
    }

    #[test]
    fn sector_uplift_only_raises_default_column() {
        let out = apply_default_uplift(&MOODYS_TABLE, 0.03).unwrap();
        assert!((out[2][4] - 0.08).abs() < 1e-12);
        let shrink = (0.95 - 0.03) / 0.95;
        assert!((out[2][2] - 0.55 * shrink).abs() < 1e-12);
        assert!((out[3][3] - 0.67).abs() < 1e-12);
    }

    #[test]
    fn full_build_with_both_adjustments_stays_stochastic() {
        let m = TransitionMatrixBuilder::default()
            .build(&UnavailableSource::default(), "retail", true, as_of())
            .unwrap();
        assert_stochastic(&m);
        assert_eq!(m.adjustments().len(), 2);
        assert!(m.adjustments()[1].starts_with("sector_default[retail]"));
    }

    #[test]
    fn unknown_sector_is_rejected_or_neutral_by_policy() {
        let builder = TransitionMatrixBuilder::default();
        let err = builder
            .build(&UnavailableSource::default(), "Space Mining", false, as_of())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Input(InputError::UnmappedSector { .. })));

        let config = AnalysisConfig {
            unknown_sector: UnknownSectorPolicy::Neutral,
            ..AnalysisConfig::default()
        };
        let builder = TransitionMatrixBuilder::from_config(&config, SectorTable::default());
        let m = builder
            .build(&UnavailableSource::default(), "Space Mining", false, as_of())
            .unwrap();
        assert_eq!(m.values(), &MOODYS_TABLE);
    }

    #[test]
    fn oversized_uplift_is_invalid_matrix() {
        let err = apply_deterioration_uplift(&MOODYS_TABLE, 0.3).unwrap_err();
        assert!(err.to_string().contains("lbo adjustment"));
    }

    #[test]
    fn sector_table_validates_multipliers() {
        assert!(SectorTable::from_entries([("Shipping", 0.04)], UnknownSectorPolicy::Reject).is_ok());
        assert!(SectorTable::from_entries([("Shipping", 1.5)], UnknownSectorPolicy::Reject).is_err());
        assert_eq!(SectorTable::default().multiplier("  REAL ESTATE ").unwrap(), 0.025);
    }
}
