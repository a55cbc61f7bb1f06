//! Closed-form absorbing-chain forecasts.
//!
//! For a one-period matrix `P` with transient block `Q` (S0..S3):
//!
//! ```text
//! n-step distribution from i:  e_i · P^n
//! P(default by n):             (e_i · P^n)[S4]
//! fundamental matrix:          N = (I - Q)^-1
//! expected periods to S4:      Σ_j N[i, j]
//! ```
//!
//! When `(I - Q)` is singular or ill-conditioned the expected time is estimated by
//! iterating `e_i · P^t` until at least [`ABSORPTION_MASS_TARGET`] of the mass has
//! been absorbed; that result is marked approximate.

use std::collections::VecDeque;

use nalgebra::{Matrix4, RowVector5};
use tracing::debug;

use crate::chain::matrix::TransitionMatrix;
use crate::domain::{ExpectedTime, RiskState, STATE_COUNT};
use crate::error::{ForecastError, NumericError};
use crate::math::{MAX_CONDITION_NUMBER, invert_guarded, matrix_power};

/// Absorbed probability mass at which the iterative fallback stops.
pub const ABSORPTION_MASS_TARGET: f64 = 0.999;

/// Iteration cap for the fallback.
pub const MAX_FALLBACK_PERIODS: u32 = 100_000;

/// State distribution after `n` periods starting from `initial`.
pub fn n_step_probabilities(
    matrix: &TransitionMatrix,
    initial: RiskState,
    n: u32,
) -> Result<[f64; STATE_COUNT], ForecastError> {
    let powered = matrix_power(&matrix.to_matrix5(), n);
    let mut out = [0.0; STATE_COUNT];
    for (j, v) in out.iter_mut().enumerate() {
        *v = powered[(initial.index(), j)];
    }
    if out.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::invalid_matrix(
            format!("{n}-step power"),
            "non-finite probability",
        ));
    }
    Ok(out)
}

/// Probability of having reached S4 within `horizon_months` periods.
pub fn prob_default(
    matrix: &TransitionMatrix,
    initial: RiskState,
    horizon_months: u32,
) -> Result<f64, ForecastError> {
    let dist = n_step_probabilities(matrix, initial, horizon_months)?;
    Ok(dist[RiskState::Default.index()].clamp(0.0, 1.0))
}

/// `(I - Q)^-1` over the transient block, if well conditioned.
pub fn fundamental_matrix(matrix: &TransitionMatrix) -> Option<Matrix4<f64>> {
    let values = matrix.values();
    let q = Matrix4::from_fn(|r, c| values[r][c]);
    invert_guarded(&(Matrix4::identity() - q), MAX_CONDITION_NUMBER)
}

/// Expected periods until absorption in S4.
///
/// - `Exact(0.0)` when starting in S4
/// - `Undefined` when some state reachable from `initial` can never reach S4
/// - `Exact(..)` from the fundamental matrix when it is well conditioned
/// - `Approximate(..)` from the iterative fallback otherwise
pub fn expected_time_to_absorption(
    matrix: &TransitionMatrix,
    initial: RiskState,
) -> Result<ExpectedTime, ForecastError> {
    if initial.is_absorbing() {
        return Ok(ExpectedTime::Exact(0.0));
    }
    if !absorption_is_certain(matrix, initial) {
        debug!(state = initial.code(), "default unreachable from part of the chain");
        return Ok(ExpectedTime::Undefined);
    }

    match fundamental_matrix(matrix) {
        Some(n) => {
            let months = n.row(initial.index()).sum();
            if months.is_finite() && months >= 0.0 {
                Ok(ExpectedTime::Exact(months))
            } else {
                iterate_absorption(matrix, initial)
            }
        }
        None => {
            debug!(state = initial.code(), "(I - Q) ill-conditioned, iterating powers");
            iterate_absorption(matrix, initial)
        }
    }
}

/// Every state reachable from `initial` has a path into S4.
fn absorption_is_certain(matrix: &TransitionMatrix, initial: RiskState) -> bool {
    reachable_from(matrix, initial)
        .into_iter()
        .all(|s| reachable_from(matrix, s).contains(&RiskState::Default))
}

fn reachable_from(matrix: &TransitionMatrix, start: RiskState) -> Vec<RiskState> {
    let mut seen = [false; STATE_COUNT];
    let mut queue = VecDeque::from([start]);
    seen[start.index()] = true;
    while let Some(state) = queue.pop_front() {
        for next in RiskState::ALL {
            if !seen[next.index()] && matrix.get(state, next) > 0.0 {
                seen[next.index()] = true;
                queue.push_back(next);
            }
        }
    }
    RiskState::ALL
        .into_iter()
        .filter(|s| seen[s.index()])
        .collect()
}

/// `E[T] = Σ_t P(T > t)`, truncated once the absorbed mass reaches the target.
fn iterate_absorption(
    matrix: &TransitionMatrix,
    initial: RiskState,
) -> Result<ExpectedTime, ForecastError> {
    let p = matrix.to_matrix5();
    let mut dist = RowVector5::<f64>::zeros();
    dist[initial.index()] = 1.0;

    let mut expected = 0.0;
    let mut absorbed = 0.0;
    for period in 0..MAX_FALLBACK_PERIODS {
        absorbed = dist[RiskState::Default.index()];
        if absorbed >= ABSORPTION_MASS_TARGET {
            debug!(state = initial.code(), period, expected, "iterative absorption converged");
            return Ok(ExpectedTime::Approximate(expected));
        }
        expected += 1.0 - absorbed;
        dist = dist * p;
    }

    Err(NumericError::UnresolvedAbsorption {
        state: initial.code().to_string(),
        periods: MAX_FALLBACK_PERIODS,
        absorbed,
    }
    .into())
}
