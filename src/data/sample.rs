//! Synthetic portfolio generation for demos and smoke runs.
//!
//! Scores are drawn from a normal distribution and clamped into `[0, 100]`;
//! sectors cycle through the default sector table at random; a fixed share of
//! companies carries an LBO flag. Same seed, same portfolio.

use chrono::NaiveDate;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::chain::DEFAULT_SECTOR_MULTIPLIERS;
use crate::domain::CompanySnapshot;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub count: usize,
    pub seed: u64,
    pub as_of_date: NaiveDate,
    pub score_mean: f64,
    pub score_std: f64,
    /// Probability a company is LBO-backed.
    pub lbo_share: f64,
}

impl PortfolioConfig {
    pub fn new(count: usize, seed: u64, as_of_date: NaiveDate) -> Self {
        Self {
            count,
            seed,
            as_of_date,
            score_mean: 60.0,
            score_std: 18.0,
            lbo_share: 0.3,
        }
    }
}

pub fn generate_portfolio(config: &PortfolioConfig) -> Result<Vec<CompanySnapshot>, AppError> {
    if config.count == 0 {
        return Err(AppError::new(2, "Portfolio size must be > 0."));
    }
    if !(0.0..=1.0).contains(&config.lbo_share) {
        return Err(AppError::new(2, "LBO share must be in [0, 1]."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let scores = Normal::new(config.score_mean, config.score_std)
        .map_err(|e| AppError::new(2, format!("Score distribution error: {e}")))?;

    let companies = (0..config.count)
        .map(|i| {
            let score = round_to(scores.sample(&mut rng).clamp(0.0, 100.0), 1);
            let (sector, _) = DEFAULT_SECTOR_MULTIPLIERS[rng.gen_range(0..DEFAULT_SECTOR_MULTIPLIERS.len())];
            let lbo = rng.r#gen::<f64>() < config.lbo_share;
            CompanySnapshot::new(format!("SYN-{:03}", i + 1), score, sector, lbo, config.as_of_date)
        })
        .collect();

    Ok(companies)
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(count: usize, seed: u64) -> PortfolioConfig {
        PortfolioConfig::new(count, seed, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    #[test]
    fn same_seed_same_portfolio() {
        let a = generate_portfolio(&config(25, 9)).unwrap();
        let b = generate_portfolio(&config(25, 9)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 25);
        assert_eq!(a[0].name, "SYN-001");
    }

    #[test]
    fn scores_stay_in_range_and_sectors_are_known() {
        let known: Vec<&str> = DEFAULT_SECTOR_MULTIPLIERS.iter().map(|(s, _)| *s).collect();
        for company in generate_portfolio(&config(500, 1)).unwrap() {
            let score = company.risk_score.unwrap();
            assert!((0.0..=100.0).contains(&score));
            assert!(known.contains(&company.sector.as_str()));
        }
    }

    #[test]
    fn empty_portfolio_is_rejected() {
        let err = generate_portfolio(&config(0, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
