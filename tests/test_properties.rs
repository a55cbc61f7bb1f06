//! Property-based tests for classification, matrix construction, and forecasts.

use chrono::NaiveDate;
use proptest::prelude::*;

use credit_migration::chain::{
    DEFAULT_SECTOR_MULTIPLIERS, SectorTable, SimulationConfig, StaticTableSource, TransitionMatrix,
    TransitionMatrixBuilder, apply_default_uplift, apply_deterioration_uplift, classify, prob_default, simulate,
};
use credit_migration::domain::{FallbackTable, RiskState};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
}

fn sector_strategy() -> impl Strategy<Value = &'static str> {
    (0..DEFAULT_SECTOR_MULTIPLIERS.len()).prop_map(|i| DEFAULT_SECTOR_MULTIPLIERS[i].0)
}

fn table_strategy() -> impl Strategy<Value = FallbackTable> {
    prop_oneof![Just(FallbackTable::Moodys), Just(FallbackTable::Sp)]
}

fn state_strategy() -> impl Strategy<Value = RiskState> {
    (0..RiskState::ALL.len()).prop_map(|i| RiskState::ALL[i])
}

fn build(table: FallbackTable, sector: &str, lbo: bool, uplift: f64) -> TransitionMatrix {
    TransitionMatrixBuilder::new(SectorTable::default(), uplift)
        .build(&StaticTableSource::new(table), sector, lbo, as_of())
        .unwrap()
}

proptest! {
    // 1. A higher score never maps to a healthier state
    #[test]
    fn classification_is_monotone(a in 0.0..=100.0f64, b in 0.0..=100.0f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let s_lo = classify(lo).unwrap();
        let s_hi = classify(hi).unwrap();
        prop_assert!(s_lo.index() <= s_hi.index(), "{lo} -> {s_lo}, {hi} -> {s_hi}");
        prop_assert!(!s_hi.is_absorbing());
    }

    // 2. Scores outside [0, 100] are rejected
    #[test]
    fn out_of_range_scores_rejected(excess in 1e-6..1e6f64, negative in proptest::bool::ANY) {
        let score = if negative { -excess } else { 100.0 + excess };
        prop_assert!(classify(score).is_err());
    }

    // 3. Every built matrix is row-stochastic with an absorbing S4 row
    #[test]
    fn built_matrices_are_row_stochastic(
        table in table_strategy(),
        sector in sector_strategy(),
        lbo in proptest::bool::ANY,
        uplift in 0.0..0.05f64,
    ) {
        let m = build(table, sector, lbo, uplift);
        for state in RiskState::ALL {
            let row = m.row(state);
            let sum: f64 = row.iter().sum();
            prop_assert!((sum - 1.0).abs() <= 1e-9, "{state} sums to {sum}");
            prop_assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
        prop_assert_eq!(m.row(RiskState::Default), &[0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    // 4. Default probability never decreases with the horizon
    #[test]
    fn default_probability_monotone_in_horizon(
        table in table_strategy(),
        sector in sector_strategy(),
        lbo in proptest::bool::ANY,
        state in state_strategy(),
        h in 0u32..60,
    ) {
        let m = build(table, sector, lbo, 0.025);
        let p0 = prob_default(&m, state, h).unwrap();
        let p1 = prob_default(&m, state, h + 1).unwrap();
        prop_assert!(p1 + 1e-12 >= p0, "h={h}: {p0} -> {p1}");
        prop_assert!((0.0..=1.0).contains(&p1));
    }

    // 5. A sector uplift never lowers the one-step default probability
    #[test]
    fn default_uplift_raises_default_column(
        table in table_strategy(),
        uplift in 0.0..0.1f64,
    ) {
        let base = table.matrix();
        let adjusted = apply_default_uplift(&base, uplift).unwrap();
        for state in RiskState::TRANSIENT {
            let i = state.index();
            prop_assert!(adjusted[i][4] + 1e-15 >= base[i][4]);
        }
    }

    // 6. Seeded simulations are reproducible
    #[test]
    fn seeded_simulation_is_reproducible(seed in any::<u64>(), state in state_strategy()) {
        let m = build(FallbackTable::Moodys, "Retail", true, 0.025);
        let config = SimulationConfig { num_runs: 200, seed, ..SimulationConfig::default() };
        let a = simulate(&m, state, 24, &config).unwrap();
        let b = simulate(&m, state, 24, &config).unwrap();
        prop_assert_eq!(a.absorption_months(), b.absorption_months());
        prop_assert_eq!(a.num_runs(), 200);
    }

    // 7. The LBO uplift never lowers any row's default-column probability
    #[test]
    fn lbo_uplift_raises_default_column(table in table_strategy(), uplift in 0.0..0.05f64) {
        let base = table.matrix();
        let adjusted = apply_deterioration_uplift(&base, uplift).unwrap();
        for state in RiskState::ALL {
            let i = state.index();
            prop_assert!(adjusted[i][4] + 1e-15 >= base[i][4], "{state}");
        }
    }

    // 8. Worse starting states default at least as often
    #[test]
    fn default_probability_monotone_in_state(
        table in table_strategy(),
        sector in sector_strategy(),
        lbo in proptest::bool::ANY,
        h in 1u32..48,
    ) {
        let m = build(table, sector, lbo, 0.025);
        let probs: Vec<f64> = RiskState::TRANSIENT
            .iter()
            .map(|s| prob_default(&m, *s, h).unwrap())
            .collect();
        prop_assert!(probs.windows(2).all(|w| w[0] <= w[1] + 1e-12), "h={h}: {probs:?}");
    }
}
