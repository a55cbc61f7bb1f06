//! Map risk scores and agency ratings onto chain states.
//!
//! Score bands (lower bound inclusive):
//!
//! ```text
//! [0, 50)   -> S0 Stable
//! [50, 75)  -> S1 Elevated
//! [75, 90)  -> S2 High
//! [90, 100] -> S3 Critical
//! ```
//!
//! S4 is only reachable through an explicit default indicator or a default rating.

use tracing::warn;

use crate::domain::{ClassificationBasis, CompanySnapshot, RiskState};
use crate::error::{DataError, ForecastError, InputError};

const ELEVATED_FLOOR: f64 = 50.0;
const HIGH_FLOOR: f64 = 75.0;
const CRITICAL_FLOOR: f64 = 90.0;

/// Rating base grade (modifiers stripped, uppercased) to state.
///
/// S&P/Fitch letter grades and Moody's grades share one table; the Moody's
/// spellings (`BAA`, `BA`, `CAA`, `CA`) never collide with S&P ones.
const RATING_TABLE: &[(&str, RiskState)] = &[
    ("AAA", RiskState::Stable),
    ("AA", RiskState::Stable),
    ("A", RiskState::Stable),
    ("BBB", RiskState::Stable),
    ("BAA", RiskState::Stable),
    ("BB", RiskState::Elevated),
    ("BA", RiskState::Elevated),
    ("B", RiskState::High),
    ("CCC", RiskState::Critical),
    ("CAA", RiskState::Critical),
    ("CC", RiskState::Critical),
    ("CA", RiskState::Critical),
    ("C", RiskState::Critical),
    ("D", RiskState::Default),
    ("SD", RiskState::Default),
    ("RD", RiskState::Default),
];

/// Classify a composite risk score in `[0, 100]`.
pub fn classify(score: f64) -> Result<RiskState, InputError> {
    if !(score.is_finite() && (0.0..=100.0).contains(&score)) {
        return Err(InputError::ScoreOutOfRange { score });
    }
    let state = if score < ELEVATED_FLOOR {
        RiskState::Stable
    } else if score < HIGH_FLOOR {
        RiskState::Elevated
    } else if score < CRITICAL_FLOOR {
        RiskState::High
    } else {
        RiskState::Critical
    };
    Ok(state)
}

/// Like [`classify`], but an explicit default indicator wins over the score.
pub fn classify_with_default(score: f64, in_default: bool) -> Result<RiskState, InputError> {
    if in_default {
        return Ok(RiskState::Default);
    }
    classify(score)
}

/// Table-driven rating lookup. Accepts `+`/`-` and Moody's `1`/`2`/`3` modifiers.
pub fn classify_from_rating(rating: &str) -> Result<RiskState, InputError> {
    let base = rating_base(rating);
    RATING_TABLE
        .iter()
        .find(|(grade, _)| *grade == base)
        .map(|(_, state)| *state)
        .ok_or_else(|| InputError::UnmappedRating {
            rating: rating.to_string(),
        })
}

fn rating_base(rating: &str) -> String {
    let trimmed = rating.trim();
    let stripped = trimmed
        .strip_suffix(['+', '-', '1', '2', '3'])
        .unwrap_or(trimmed);
    stripped.to_ascii_uppercase()
}

/// Resolve the starting state for a snapshot.
///
/// Order: default indicator, then rating, then score. An unmapped rating falls back
/// to the score. A score outside `[0, 100]` is rejected even when a rating is present.
pub fn classify_snapshot(
    snapshot: &CompanySnapshot,
) -> Result<(RiskState, ClassificationBasis), ForecastError> {
    let score_state = snapshot.risk_score.map(classify).transpose()?;

    if snapshot.in_default {
        return Ok((RiskState::Default, ClassificationBasis::DefaultIndicator));
    }

    if let Some(rating) = snapshot.rating.as_deref() {
        match classify_from_rating(rating) {
            Ok(state) => return Ok((state, ClassificationBasis::Rating)),
            Err(err) => warn!(company = snapshot.display_name(), %err, "falling back to score"),
        }
    }

    match score_state {
        Some(state) => Ok((state, ClassificationBasis::Score)),
        None => Err(DataError::UpstreamData {
            company: snapshot.display_name().to_string(),
            reason: "no default indicator, usable rating, or risk score".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn snapshot(score: Option<f64>, rating: Option<&str>) -> CompanySnapshot {
        CompanySnapshot {
            name: "Acme".into(),
            risk_score: score,
            sector: "Retail".into(),
            lbo_flag: false,
            rating: rating.map(str::to_string),
            in_default: false,
            as_of_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        }
    }

    #[test]
    fn score_bands_are_lower_bound_inclusive() {
        assert_eq!(classify(0.0).unwrap(), RiskState::Stable);
        assert_eq!(classify(49.9).unwrap(), RiskState::Stable);
        assert_eq!(classify(50.0).unwrap(), RiskState::Elevated);
        assert_eq!(classify(74.9).unwrap(), RiskState::Elevated);
        assert_eq!(classify(75.0).unwrap(), RiskState::High);
        assert_eq!(classify(89.9).unwrap(), RiskState::High);
        assert_eq!(classify(90.0).unwrap(), RiskState::Critical);
        assert_eq!(classify(100.0).unwrap(), RiskState::Critical);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        assert!(matches!(classify(-0.1), Err(InputError::ScoreOutOfRange { .. })));
        assert!(classify(100.1).is_err());
        assert!(classify(f64::NAN).is_err());
    }

    #[test]
    fn default_indicator_overrides_score() {
        assert_eq!(classify_with_default(10.0, true).unwrap(), RiskState::Default);
        assert_eq!(classify_with_default(10.0, false).unwrap(), RiskState::Stable);
    }

    #[test]
    fn ratings_map_with_modifiers() {
        assert_eq!(classify_from_rating("AAA").unwrap(), RiskState::Stable);
        assert_eq!(classify_from_rating("BBB-").unwrap(), RiskState::Stable);
        assert_eq!(classify_from_rating("Baa3").unwrap(), RiskState::Stable);
        assert_eq!(classify_from_rating("BB+").unwrap(), RiskState::Elevated);
        assert_eq!(classify_from_rating("B2").unwrap(), RiskState::High);
        assert_eq!(classify_from_rating(" ccc+ ").unwrap(), RiskState::Critical);
        assert_eq!(classify_from_rating("Caa1").unwrap(), RiskState::Critical);
        assert_eq!(classify_from_rating("D").unwrap(), RiskState::Default);
        assert_eq!(classify_from_rating("SD").unwrap(), RiskState::Default);
    }

    #[test]
    fn unmapped_rating_is_an_error_not_a_default() {
        let err = classify_from_rating("NR").unwrap_err();
        assert_eq!(err, InputError::UnmappedRating { rating: "NR".into() });
        assert!(classify_from_rating("").is_err());
    }

    #[test]
    fn snapshot_prefers_rating_then_falls_back_to_score() {
        let (state, basis) = classify_snapshot(&snapshot(Some(20.0), Some("CCC"))).unwrap();
        assert_eq!((state, basis), (RiskState::Critical, ClassificationBasis::Rating));

        let (state, basis) = classify_snapshot(&snapshot(Some(87.0), Some("NR"))).unwrap();
        assert_eq!((state, basis), (RiskState::High, ClassificationBasis::Score));
    }

    #[test]
    fn snapshot_without_any_signal_is_upstream_error() {
        let err = classify_snapshot(&snapshot(None, Some("WR"))).unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::UpstreamData { .. })));
    }

    #[test]
    fn snapshot_default_indicator_wins() {
        let mut snap = snapshot(Some(10.0), Some("AAA"));
        snap.in_default = true;
        let (state, basis) = classify_snapshot(&snap).unwrap();
        assert_eq!(state, RiskState::Default);
        assert_eq!(basis, ClassificationBasis::DefaultIndicator);
    }

    #[test]
    fn snapshot_rejects_bad_score_even_with_rating() {
        let err = classify_snapshot(&snapshot(Some(140.0), Some("B"))).unwrap_err();
        assert!(matches!(err, ForecastError::Input(InputError::ScoreOutOfRange { .. })));
    }
}
