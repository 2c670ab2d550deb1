//! A walk-forward run produces both train and test reports, with the test
//! leg starting from a fresh portfolio at the split date.

use std::collections::BTreeMap;

use btx_portfolio::PortfolioConfig;
use btx_testkit::flat_series;
use chrono::NaiveDate;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Same split-date formula the orchestrator uses internally: floor of
/// `train_pct` of the calendar span, in days, added to `start`.
fn expected_split(start: NaiveDate, end: NaiveDate, train_pct: f64) -> NaiveDate {
    let span_days = (end - start).num_days();
    start + chrono::Duration::days((span_days as f64 * train_pct) as i64)
}

#[test]
fn walk_forward_run_produces_train_and_test_reports() {
    let start = d(2023, 1, 1);
    let end = d(2023, 12, 31);
    let split = expected_split(start, end, 0.5);
    assert!(split > start && split < end);

    let mut series_by_symbol = BTreeMap::new();
    series_by_symbol.insert("X".to_string(), flat_series("X", start, end, 10.0));

    let code = "fn update(bar) {}";
    let result = btx_backtest::run_strategy(
        code,
        &series_by_symbol,
        1000.0,
        PortfolioConfig::default(),
        start,
        end,
        Some(0.5),
        true,
    );

    assert!(result.train_report.is_some(), "a walk-forward run must produce a train report");
    assert!(result.test_report.is_some(), "a walk-forward run must produce a test report");
    assert!(result.per_symbol[0].error.is_none());
}

#[test]
fn no_train_pct_skips_the_split_entirely() {
    let start = d(2023, 1, 1);
    let end = d(2023, 6, 30);
    let mut series_by_symbol = BTreeMap::new();
    series_by_symbol.insert("X".to_string(), flat_series("X", start, end, 10.0));

    let code = "fn update(bar) {}";
    let result = btx_backtest::run_strategy(
        code,
        &series_by_symbol,
        1000.0,
        PortfolioConfig::default(),
        start,
        end,
        None,
        true,
    );

    assert!(result.train_report.is_none());
    assert!(result.test_report.is_none());
}
