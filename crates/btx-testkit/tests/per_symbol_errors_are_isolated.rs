//! One symbol's rejected order must not abort the others in the same run.

use std::collections::BTreeMap;

use btx_portfolio::PortfolioConfig;
use btx_testkit::flat_series;
use chrono::NaiveDate;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Buys a fixed 100 shares once, on the first bar it sees.
const BUY_ONCE: &str = r#"
    let bought = false;
    fn update(bar) {
        if !this.bought {
            buy(100.0);
            this.bought = true;
        }
    }
"#;

#[test]
fn one_symbols_rejected_order_does_not_abort_the_others() {
    let start = d(2024, 1, 1);
    let end = d(2024, 1, 3);

    // 1000 initial cash split evenly across two symbols: 500 each.
    // "CHEAP" at $1/share: 100 shares costs $100, well within $500.
    // "DEAR" at $10/share: 100 shares costs $1000, over its $500 allocation.
    let mut series_by_symbol = BTreeMap::new();
    series_by_symbol.insert("CHEAP".to_string(), flat_series("CHEAP", start, end, 1.0));
    series_by_symbol.insert("DEAR".to_string(), flat_series("DEAR", start, end, 10.0));

    let result = btx_backtest::run_strategy(
        BUY_ONCE,
        &series_by_symbol,
        1000.0,
        PortfolioConfig::default(),
        start,
        end,
        None,
        true,
    );

    assert_eq!(result.per_symbol.len(), 2);

    let cheap = result.per_symbol.iter().find(|r| r.symbol == "CHEAP").unwrap();
    assert!(cheap.error.is_none(), "CHEAP should have run cleanly, got {:?}", cheap.error);
    assert_eq!(cheap.start_value, 500.0);

    let dear = result.per_symbol.iter().find(|r| r.symbol == "DEAR").unwrap();
    assert!(dear.error.is_some(), "DEAR should have been rejected for insufficient cash");
    let message = dear.error.as_ref().unwrap();
    assert!(message.contains("cash") || message.contains("rejected"), "unexpected error text: {message}");
}
