//! Validated one-period transition matrix.
//!
//! A [`TransitionMatrix`] can only be obtained through [`TransitionMatrix::new`],
//! which enforces:
//!
//! - every entry finite and in `[0, 1]`
//! - every row sums to 1 within [`ROW_SUM_TOLERANCE`]
//! - the S4 row is exactly `[0, 0, 0, 0, 1]`
//!
//! Once built it is immutable.

use chrono::NaiveDate;
use nalgebra::Matrix5;
use serde::Serialize;

use crate::chain::source::BaseMatrix;
use crate::domain::{RiskState, STATE_COUNT};
use crate::error::ForecastError;
use crate::math::matrix5_from_rows;

pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

const ABSORBING_ROW: [f64; STATE_COUNT] = [0.0, 0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionMatrix {
    values: BaseMatrix,
    data_source: String,
    adjustments: Vec<String>,
    as_of_date: NaiveDate,
}

impl TransitionMatrix {
    pub fn new(
        values: BaseMatrix,
        data_source: impl Into<String>,
        adjustments: Vec<String>,
        as_of_date: NaiveDate,
    ) -> Result<Self, ForecastError> {
        validate_rows(&values, "construction")?;
        Ok(Self {
            values,
            data_source: data_source.into(),
            adjustments,
            as_of_date,
        })
    }

    pub fn get(&self, from: RiskState, to: RiskState) -> f64 {
        self.values[from.index()][to.index()]
    }

    pub fn row(&self, from: RiskState) -> &[f64; STATE_COUNT] {
        &self.values[from.index()]
    }

    pub fn values(&self) -> &BaseMatrix {
        &self.values
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn adjustments(&self) -> &[String] {
        &self.adjustments
    }

    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn to_matrix5(&self) -> Matrix5<f64> {
        matrix5_from_rows(&self.values)
    }
}

/// Check the row-stochastic invariants. `step` names the stage for error messages.
pub fn validate_rows(values: &BaseMatrix, step: &str) -> Result<(), ForecastError> {
    for (i, row) in values.iter().enumerate() {
        let code = RiskState::ALL[i].code();
        if let Some((j, v)) = row
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && (0.0..=1.0).contains(*v)))
        {
            return Err(ForecastError::invalid_matrix(
                step,
                format!("entry {code}->{} = {v} outside [0, 1]", RiskState::ALL[j].code()),
            ));
        }
        let sum: f64 = row.iter().sum();
        if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(ForecastError::invalid_matrix(
                step,
                format!("row {code} sums to {sum:.12}"),
            ));
        }
    }
    if values[RiskState::Default.index()] != ABSORBING_ROW {
        return Err(ForecastError::invalid_matrix(
            step,
            "S4 row is not [0, 0, 0, 0, 1]",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::source::MOODYS_TABLE;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    #[test]
    fn accepts_fallback_table() {
        let m = TransitionMatrix::new(MOODYS_TABLE, "fallback", vec![], as_of()).unwrap();
        assert_eq!(m.get(RiskState::High, RiskState::Default), 0.05);
        assert_eq!(m.row(RiskState::Default), &ABSORBING_ROW);
        assert_eq!(m.data_source(), "fallback");
    }

    #[test]
    fn rejects_row_that_does_not_sum_to_one() {
        let mut values = MOODYS_TABLE;
        values[1][1] += 1e-6;
        let err = TransitionMatrix::new(values, "x", vec![], as_of()).unwrap_err();
        assert!(err.to_string().contains("row S1"));
    }

    #[test]
    fn rejects_negative_entry() {
        let mut values = MOODYS_TABLE;
        values[0][0] = 0.98;
        values[0][1] = -0.01;
        let err = validate_rows(&values, "test").unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn rejects_leaky_default_row() {
        let mut values = MOODYS_TABLE;
        values[4] = [0.01, 0.0, 0.0, 0.0, 0.99];
        let err = validate_rows(&values, "base").unwrap_err();
        assert!(err.to_string().contains("S4 row"));
    }
}
