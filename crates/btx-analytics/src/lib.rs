//! btx-analytics
//!
//! Turns a portfolio's trade log and equity curve into the performance
//! report surfaced through the run endpoints: drawdown and risk-adjusted
//! return on the equity side, win rate and profit factor on the trade side,
//! plus a per-symbol breakdown. Pure: no IO, no database.

mod daily;
mod equity;
mod trades;

use btx_portfolio::{EquityPoint, TradeEvent};
use serde::Serialize;

pub use daily::expand_equity_to_daily;
pub use equity::{compute_equity_metrics, EquityMetrics};
pub use trades::{compute_symbol_breakdown, compute_trade_metrics, SymbolBreakdown, TradeMetrics};

/// Trading days used to annualize daily-return statistics.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// Fixed at zero: this rewrite treats the risk-free rate as a constant
/// rather than a per-run Setting, matching the upstream default.
pub const RISK_FREE_RATE_ANNUAL: f64 = 0.0;

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub equity: EquityMetrics,
    pub trades: TradeMetrics,
    pub symbols: Vec<SymbolBreakdown>,
}

/// The full performance report for one backtest run.
pub fn compute_report(trade_log: &[TradeEvent], equity_curve: &[EquityPoint], initial_cash: f64) -> Report {
    Report {
        equity: compute_equity_metrics(equity_curve, initial_cash),
        trades: compute_trade_metrics(trade_log),
        symbols: compute_symbol_breakdown(trade_log),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btx_portfolio::TradeKind;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn report_combines_all_three_sections() {
        let curve = vec![
            EquityPoint { i: 0, v: 1000.0, time: Some(d(2024, 1, 1)) },
            EquityPoint { i: 1, v: 1100.0, time: Some(d(2024, 1, 2)) },
        ];
        let trades = vec![TradeEvent {
            kind: TradeKind::Exit,
            symbol: "X".to_string(),
            quantity: 1.0,
            raw_price: 10.0,
            fill_price: 10.0,
            cash_delta: 10.0,
            commission: 0.0,
            realized_pnl: 100.0,
            bar_index: 1,
            date: d(2024, 1, 2),
        }];
        let report = compute_report(&trades, &curve, 1000.0);
        assert_eq!(report.equity.start_value, 1000.0);
        assert_eq!(report.trades.exits, 1);
        assert_eq!(report.symbols.len(), 1);
    }
}
