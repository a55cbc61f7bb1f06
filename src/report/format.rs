//! Terminal formatting for forecasts, matrices, and batch summaries.
//!
//! Formatting lives here so the numeric core never builds strings for humans.

use std::cmp::Ordering;

use crate::chain::{BatchOutcome, TransitionMatrix};
use crate::domain::{ConfidenceInterval, ExpectedTime, ForecastResult, RiskState};

/// Full single-company report.
pub fn format_forecast(result: &ForecastResult) -> String {
    let mut out = String::new();

    out.push_str("=== cmig - Credit Migration Forecast ===\n");
    out.push_str(&format!("Company: {}\n", result.company));
    out.push_str(&format!("As-of: {}\n", result.as_of_date));
    out.push_str(&format!(
        "State: {} (from {:?})\n",
        result.state, result.classified_by
    ));
    out.push_str(&format!("Data source: {}\n", result.data_source));
    if result.adjustments.is_empty() {
        out.push_str("Adjustments: none\n");
    } else {
        out.push_str(&format!("Adjustments: {}\n", result.adjustments.join(", ")));
    }
    out.push_str(&format!(
        "Expected time to default: {}\n",
        fmt_expected_time(result.expected_time_to_default_months)
    ));

    out.push_str("\nDefault probability:\n");
    out.push_str(
        format!(
            "{:<8} {:>10} {:>10} {:>10} {:>12} {:>14}\n",
            "horizon", "reported", "closed", "simulated", "min-max", "p05-p95"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<8} {:-<10} {:-<10} {:-<10} {:-<12} {:-<14}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    for h in &result.horizons {
        let band = h
            .absorption_p05_p95
            .map(|b| format!("{:.1}-{:.1}", b.p05_month, b.p95_month))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<8} {:>10} {:>10} {:>10} {:>12} {:>14}\n",
                format!("{}m", h.horizon_months),
                fmt_pct(h.prob_default),
                h.closed_form.map(fmt_pct).unwrap_or_else(|| "-".to_string()),
                fmt_pct(h.empirical),
                fmt_ci(h.confidence_interval),
                band,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str(&format!(
        "\nSimulation: runs={} seed={} non-absorbed={} mean absorption={}\n",
        result.monte_carlo_runs,
        result.seed,
        result.non_absorbed_runs,
        result
            .mean_absorption_month
            .map(|m| format!("{m:.2}m"))
            .unwrap_or_else(|| "-".to_string()),
    ));
    out.push_str(&format!(
        "Validation: {} (max delta {:.4}){}\n",
        if result.validated { "ok" } else { "FAILED" },
        result.discrepancy,
        if result.approximate { " [approximate]" } else { "" },
    ));
    for w in &result.warnings {
        out.push_str(&format!(
            "  warning: {}m closed={:.4} simulated={:.4} delta={:.4}\n",
            w.horizon_months, w.closed_form, w.empirical, w.delta
        ));
    }

    out
}

/// One-period matrix with provenance.
pub fn format_matrix(matrix: &TransitionMatrix) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Transition matrix (source={}, as-of={})\n",
        matrix.data_source(),
        matrix.as_of_date()
    ));
    if !matrix.adjustments().is_empty() {
        out.push_str(&format!("Adjustments: {}\n", matrix.adjustments().join(", ")));
    }

    out.push_str(&format!("{:<6}", "from"));
    for to in RiskState::ALL {
        out.push_str(&format!(" {:>8}", to.code()));
    }
    out.push('\n');
    for from in RiskState::ALL {
        out.push_str(&format!("{:<6}", from.code()));
        for p in matrix.row(from) {
            out.push_str(&format!(" {p:>8.4}"));
        }
        out.push('\n');
    }
    out
}

/// Batch summary, riskiest (by 12m probability) first.
pub fn format_batch(outcome: &BatchOutcome) -> String {
    let mut out = String::new();

    let mut rows: Vec<&ForecastResult> = outcome.completed.iter().collect();
    rows.sort_by(|a, b| {
        b.prob_default_12m
            .partial_cmp(&a.prob_default_12m)
            .unwrap_or(Ordering::Equal)
    });

    out.push_str(
        format!(
            "{:<24} {:<6} {:>8} {:>8} {:>8} {:>12} {:<4}\n",
            "company", "state", "p6", "p12", "p24", "etd", "ok"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<24} {:-<6} {:-<8} {:-<8} {:-<8} {:-<12} {:-<4}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    for r in rows {
        out.push_str(
            format!(
                "{:<24} {:<6} {:>8} {:>8} {:>8} {:>12} {:<4}\n",
                truncate(&r.company, 24),
                r.state.code(),
                fmt_pct(r.prob_default_6m),
                fmt_pct(r.prob_default_12m),
                fmt_pct(r.prob_default_24m),
                fmt_expected_time(r.expected_time_to_default_months),
                if r.validated { "yes" } else { "no" },
            )
            .trim_end(),
        );
        out.push('\n');
    }

    if !outcome.failed.is_empty() {
        out.push_str("\nFailed:\n");
        for f in &outcome.failed {
            out.push_str(&format!("  #{} {}: {}\n", f.index, f.company, f.error));
        }
    }
    out.push_str(&format!(
        "\n{} analysed, {} failed, {} skipped{}\n",
        outcome.completed.len(),
        outcome.failed.len(),
        outcome.skipped,
        if outcome.cancelled { " (cancelled)" } else { "" },
    ));
    out
}

fn fmt_expected_time(t: ExpectedTime) -> String {
    match t {
        ExpectedTime::Exact(m) => format!("{m:.2}m"),
        ExpectedTime::Approximate(m) => format!("~{m:.2}m"),
        ExpectedTime::Undefined => "never".to_string(),
    }
}

fn fmt_pct(p: f64) -> String {
    format!("{:.2}%", p * 100.0)
}

fn fmt_ci(ci: Option<ConfidenceInterval>) -> String {
    match ci {
        Some(ci) => format!("{}-{}", ci.earliest_month, ci.latest_month),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
