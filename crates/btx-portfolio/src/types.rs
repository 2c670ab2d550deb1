use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Commission policy: either percent-of-notional, or a flat per-order charge
/// plus a per-share charge. The per-order/per-share pair wins whenever either
/// of its two fields is non-zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CommissionPolicy {
    pub percent_of_notional: f64,
    pub per_order: f64,
    pub per_share: f64,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            percent_of_notional: 0.0,
            per_order: 0.0,
            per_share: 0.0,
        }
    }
}

/// Per-order and per-position constraints. `0` means "unlimited" throughout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constraints {
    pub max_positions: u32,
    pub max_position_pct: f64,
    pub min_cash_reserve_pct: f64,
    pub min_trade_value: f64,
    pub max_trade_value: f64,
    pub max_order_qty: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_positions: 0,
            max_position_pct: 0.0,
            min_cash_reserve_pct: 0.0,
            min_trade_value: 0.0,
            max_trade_value: 0.0,
            max_order_qty: 0.0,
        }
    }
}

/// Portfolio-wide trading configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortfolioConfig {
    pub slippage: f64,
    pub commission: CommissionPolicy,
    pub allow_short: bool,
    /// >= 1.0, typically 1.5.
    pub short_margin_requirement: f64,
    /// Minimum share increment as a percentage of one share: 100 = whole
    /// shares, 10 = tenths, 1 = hundredths.
    pub share_min_pct: f64,
    pub constraints: Constraints,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            slippage: 0.0,
            commission: CommissionPolicy::default(),
            allow_short: true,
            short_margin_requirement: 1.5,
            share_min_pct: 100.0,
            constraints: Constraints::default(),
        }
    }
}

/// Tolerances absorbing float imprecision in admission checks.
pub const MARGIN_TOLERANCE: f64 = 1e-6;
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// Per-symbol position: signed quantity (positive = long, negative = short),
/// weighted-average cost basis of the currently open side, and accumulated
/// realized P&L. A position with `quantity == 0` does not exist as a record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub avg_price: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }
}

/// What kind of fill a [`TradeEvent`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Long,
    Short,
    Exit,
}

/// One executed fill. `cash_delta` is the signed change to portfolio cash
/// (this collapses the upstream notion of "cost" for a buy, "proceeds" for a
/// short open, and "amount" for an exit into a single signed quantity: all
/// three are just the cash impact of the fill).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeKind,
    pub symbol: String,
    pub quantity: f64,
    pub raw_price: f64,
    pub fill_price: f64,
    pub cash_delta: f64,
    pub commission: f64,
    pub realized_pnl: f64,
    pub bar_index: usize,
    pub date: NaiveDate,
}

/// `(trade_count_after, portfolio_value_at_that_bar)`, appended after every fill.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub i: usize,
    pub v: f64,
    pub time: Option<NaiveDate>,
}

/// Current close price per symbol, used to mark open positions to market.
pub type MarkMap = BTreeMap<String, f64>;

pub(crate) fn mark_of(marks: &MarkMap, symbol: &str) -> f64 {
    *marks.get(symbol).unwrap_or(&0.0)
}
