//! End-to-end analysis through the public library API.

use chrono::NaiveDate;

use credit_migration::chain::{
    AnalysisOrchestrator, CancellationToken, MOODYS_TABLE, SectorTable, SnapshotSource, StaticTableSource,
    UnavailableSource,
};
use credit_migration::data::{PortfolioConfig, generate_portfolio};
use credit_migration::domain::{AnalysisConfig, CompanySnapshot, ExpectedTime, FallbackTable, RiskState};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn orchestrator(runs: usize, seed: u64) -> AnalysisOrchestrator {
    let config = AnalysisConfig {
        num_runs: runs,
        seed: Some(seed),
        ..AnalysisConfig::default()
    };
    AnalysisOrchestrator::from_config(config, SectorTable::default()).unwrap()
}

#[test]
fn lbo_technology_company_without_live_feed() {
    let snapshot = CompanySnapshot::new("Acme", 87.0, "Technology", true, date(2025, 6, 30));
    let result = orchestrator(10_000, 42)
        .analyze(&snapshot, &UnavailableSource::default())
        .unwrap();

    assert_eq!(result.state, RiskState::High);
    assert_eq!(result.data_source, "fallback");
    assert!((result.prob_default_6m - 0.522).abs() < 0.01);
    assert!((result.prob_default_12m - 0.773).abs() < 0.01);
    assert!((result.prob_default_24m - 0.940).abs() < 0.01);
    let etd = result.expected_time_to_default_months.months().unwrap();
    assert!((etd - 8.93).abs() < 0.05, "etd={etd}");
    assert!(result.validated);
    assert!(result.warnings.is_empty());
    for ci in [result.ci_6m, result.ci_12m, result.ci_24m] {
        let ci = ci.unwrap();
        assert!(ci.earliest_month <= ci.latest_month);
    }
}

#[test]
fn live_table_is_used_when_visible() {
    let snapshot = CompanySnapshot::new("Acme", 40.0, "Energy", false, date(2025, 6, 30));
    let live = SnapshotSource::new("live", date(2025, 6, 1), MOODYS_TABLE);
    let result = orchestrator(1_000, 1).analyze(&snapshot, &live).unwrap();
    assert_eq!(result.data_source, "live");

    // Published after the as-of date: not visible, so the fallback table is used.
    let late = SnapshotSource::new("live", date(2025, 7, 1), MOODYS_TABLE);
    let result = orchestrator(1_000, 1).analyze(&snapshot, &late).unwrap();
    assert_eq!(result.data_source, "fallback");
}

#[test]
fn sp_fallback_table_is_selectable() {
    let config = AnalysisConfig {
        num_runs: 1_000,
        seed: Some(3),
        fallback_table: FallbackTable::Sp,
        ..AnalysisConfig::default()
    };
    let orchestrator = AnalysisOrchestrator::from_config(config, SectorTable::default()).unwrap();
    let snapshot = CompanySnapshot::new("Acme", 87.0, "Technology", true, date(2025, 6, 30));
    let result = orchestrator.analyze(&snapshot, &UnavailableSource::default()).unwrap();
    assert!((result.prob_default_6m - 0.633).abs() < 0.01);
    assert!(matches!(
        result.expected_time_to_default_months,
        ExpectedTime::Exact(v) if (v - 6.80).abs() < 0.05
    ));
}

#[test]
fn rating_overrides_score() {
    let snapshot = CompanySnapshot::new("Acme", 10.0, "Technology", false, date(2025, 6, 30)).with_rating("Caa2");
    let result = orchestrator(500, 5)
        .analyze(&snapshot, &StaticTableSource::default())
        .unwrap();
    assert_eq!(result.state, RiskState::Critical);
}

#[test]
fn synthetic_batch_is_reproducible() {
    let portfolio = generate_portfolio(&PortfolioConfig::new(12, 7, date(2025, 6, 30))).unwrap();
    let run = || {
        orchestrator(500, 11).analyze_batch(
            &portfolio,
            &StaticTableSource::default(),
            &CancellationToken::new(),
            false,
        )
    };
    let a = run();
    let b = run();
    assert_eq!(a.completed.len(), 12);
    assert!(a.failed.is_empty());
    assert_eq!(a.completed, b.completed);
}

#[test]
fn result_serializes_with_tagged_expected_time() {
    let snapshot = CompanySnapshot::new("Acme", 95.0, "Retail", false, date(2025, 6, 30));
    let result = orchestrator(500, 2)
        .analyze(&snapshot, &StaticTableSource::default())
        .unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["state"], "S3");
    assert_eq!(value["expected_time_to_default_months"]["kind"], "exact");
    assert!(value["prob_default_24m"].as_f64().unwrap() > 0.9);
    assert_eq!(value["horizons"].as_array().unwrap().len(), 3);
}
