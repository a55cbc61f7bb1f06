//! Small fixed-size linear algebra used by the absorbing-chain forecaster.
//!
//! The chain has five states, so everything here works on nalgebra's static
//! `Matrix5` / `Matrix4` types:
//!
//! - `matrix_power` raises the one-period matrix to `n` periods
//! - `invert_guarded` inverts `(I - Q)` only when it is well conditioned
//!
//! Conditioning is judged from the SVD: the ratio of the largest to the smallest
//! singular value. Callers treat `None` as "use the iterative fallback".

use nalgebra::{Matrix4, Matrix5};

use crate::domain::STATE_COUNT;

/// Condition number above which `(I - Q)` is treated as singular.
pub const MAX_CONDITION_NUMBER: f64 = 1e12;

pub fn matrix5_from_rows(rows: &[[f64; STATE_COUNT]; STATE_COUNT]) -> Matrix5<f64> {
    Matrix5::from_fn(|r, c| rows[r][c])
}

/// `m^n` by repeated squaring. `m^0` is the identity.
pub fn matrix_power(m: &Matrix5<f64>, n: u32) -> Matrix5<f64> {
    let mut result = Matrix5::<f64>::identity();
    let mut base = *m;
    let mut exp = n;
    while exp > 0 {
        if exp & 1 == 1 {
            result *= base;
        }
        exp >>= 1;
        if exp > 0 {
            base = base * base;
        }
    }
    result
}

/// Ratio of largest to smallest singular value (`inf` when singular).
pub fn condition_number(m: &Matrix4<f64>) -> f64 {
    let svd = (*m).svd(false, false);
    let (lo, hi) = svd
        .singular_values
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    if lo <= 0.0 || !lo.is_finite() {
        f64::INFINITY
    } else {
        hi / lo
    }
}

/// Invert `m` if its condition number is at most `max_condition`.
///
/// Returns `None` for singular or ill-conditioned inputs, or if the inverse
/// contains non-finite entries.
pub fn invert_guarded(m: &Matrix4<f64>, max_condition: f64) -> Option<Matrix4<f64>> {
    if condition_number(m) > max_condition {
        return None;
    }
    let inv = (*m).try_inverse()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_power_matches_repeated_multiplication() {
        let rows = [
            [0.9, 0.1, 0.0, 0.0, 0.0],
            [0.1, 0.8, 0.1, 0.0, 0.0],
            [0.0, 0.1, 0.8, 0.1, 0.0],
            [0.0, 0.0, 0.1, 0.8, 0.1],
            [0.0, 0.0, 0.0, 0.0, 1.0],
        ];
        let m = matrix5_from_rows(&rows);
        let mut naive = Matrix5::<f64>::identity();
        for _ in 0..13 {
            naive *= m;
        }
        let fast = matrix_power(&m, 13);
        assert!((naive - fast).abs().max() < 1e-12);
        assert_eq!(matrix_power(&m, 0), Matrix5::identity());
    }

    #[test]
    fn invert_guarded_rejects_singular_matrix() {
        let singular = Matrix4::new(
            1.0, 2.0, 0.0, 0.0, //
            2.0, 4.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        assert!(invert_guarded(&singular, MAX_CONDITION_NUMBER).is_none());

        let diag = Matrix4::from_diagonal_element(0.5);
        let inv = invert_guarded(&diag, MAX_CONDITION_NUMBER).unwrap();
        assert!((inv[(2, 2)] - 2.0).abs() < 1e-12);
    }
}
