use std::fmt;

use crate::types::{Constraints, FLOAT_TOLERANCE, MARGIN_TOLERANCE};

/// Why an order was refused. Each variant carries the values that drove the
/// decision so callers can build a precise message without re-deriving them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdmissionError {
    NonPositiveQuantity { qty: f64 },
    MaxOrderQtyExceeded { qty: f64, max_order_qty: f64 },
    TradeValueBelowMinimum { trade_value: f64, min_trade_value: f64 },
    TradeValueAboveMaximum { trade_value: f64, max_trade_value: f64 },
    MaxPositionsReached { current: u32, max_positions: u32 },
    MaxPositionPctExceeded { trade_value: f64, limit: f64 },
    MinCashReserveBreached { cash_after: f64, required: f64 },
    InsufficientCash { shortfall: f64, cash: f64 },
    MarginProjectionBreached { cash_after: f64, reserved_after: f64 },
    ShortingDisabled,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::NonPositiveQuantity { qty } => {
                write!(f, "order quantity {qty} is not positive after rounding")
            }
            AdmissionError::MaxOrderQtyExceeded { qty, max_order_qty } => {
                write!(f, "order quantity {qty} exceeds max_order_qty {max_order_qty}")
            }
            AdmissionError::TradeValueBelowMinimum { trade_value, min_trade_value } => write!(
                f,
                "trade value {trade_value} is below min_trade_value {min_trade_value}"
            ),
            AdmissionError::TradeValueAboveMaximum { trade_value, max_trade_value } => write!(
                f,
                "trade value {trade_value} exceeds max_trade_value {max_trade_value}"
            ),
            AdmissionError::MaxPositionsReached { current, max_positions } => write!(
                f,
                "opening a new position would exceed max_positions ({current} >= {max_positions})"
            ),
            AdmissionError::MaxPositionPctExceeded { trade_value, limit } => write!(
                f,
                "trade value {trade_value} exceeds max_position_pct limit {limit}"
            ),
            AdmissionError::MinCashReserveBreached { cash_after, required } => write!(
                f,
                "cash after trade {cash_after} would be below min_cash_reserve_pct requirement {required}"
            ),
            AdmissionError::InsufficientCash { shortfall, cash } => write!(
                f,
                "order requires {shortfall} but only {cash} cash is available"
            ),
            AdmissionError::MarginProjectionBreached { cash_after, reserved_after } => write!(
                f,
                "projected cash {cash_after} would be below reserved cash {reserved_after}"
            ),
            AdmissionError::ShortingDisabled => write!(f, "short selling is disabled"),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Step 1-2: quantity must be positive and within the per-order cap.
pub fn check_quantity(qty: f64, max_order_qty: f64) -> Result<(), AdmissionError> {
    if qty <= 0.0 {
        return Err(AdmissionError::NonPositiveQuantity { qty });
    }
    if max_order_qty > 0.0 && qty > max_order_qty {
        return Err(AdmissionError::MaxOrderQtyExceeded { qty, max_order_qty });
    }
    Ok(())
}

/// Step 3: trade value must sit within `[min_trade_value, max_trade_value]`
/// when either bound is set (0 means unbounded on that side).
pub fn check_trade_value(trade_value: f64, constraints: &Constraints) -> Result<(), AdmissionError> {
    if constraints.min_trade_value > 0.0 && trade_value < constraints.min_trade_value {
        return Err(AdmissionError::TradeValueBelowMinimum {
            trade_value,
            min_trade_value: constraints.min_trade_value,
        });
    }
    if constraints.max_trade_value > 0.0 && trade_value > constraints.max_trade_value {
        return Err(AdmissionError::TradeValueAboveMaximum {
            trade_value,
            max_trade_value: constraints.max_trade_value,
        });
    }
    Ok(())
}

/// Step 4: opening a brand-new symbol must not exceed `max_positions`.
pub fn check_max_positions(
    opens_new_symbol: bool,
    current_distinct_positions: u32,
    max_positions: u32,
) -> Result<(), AdmissionError> {
    if opens_new_symbol && max_positions > 0 && current_distinct_positions >= max_positions {
        return Err(AdmissionError::MaxPositionsReached {
            current: current_distinct_positions,
            max_positions,
        });
    }
    Ok(())
}

/// Step 5: a single order's notional cannot dwarf the book.
pub fn check_max_position_pct(
    trade_value: f64,
    equity_pre: f64,
    max_position_pct: f64,
) -> Result<(), AdmissionError> {
    if max_position_pct > 0.0 {
        let limit = equity_pre * max_position_pct;
        if trade_value > limit + FLOAT_TOLERANCE {
            return Err(AdmissionError::MaxPositionPctExceeded { trade_value, limit });
        }
    }
    Ok(())
}

/// Step 6: a buy must leave at least `min_cash_reserve_pct * equity_pre` in cash.
pub fn check_min_cash_reserve(
    is_buy: bool,
    cash_after: f64,
    equity_pre: f64,
    min_cash_reserve_pct: f64,
) -> Result<(), AdmissionError> {
    if is_buy && min_cash_reserve_pct > 0.0 {
        let required = equity_pre * min_cash_reserve_pct;
        if cash_after < required - MARGIN_TOLERANCE {
            return Err(AdmissionError::MinCashReserveBreached { cash_after, required });
        }
    }
    Ok(())
}

/// Step 7: a negative cash change cannot exceed cash on hand.
pub fn check_sufficient_cash(cash_change: f64, cash: f64) -> Result<(), AdmissionError> {
    if cash_change < 0.0 && -cash_change > cash + FLOAT_TOLERANCE {
        return Err(AdmissionError::InsufficientCash { shortfall: -cash_change - cash, cash });
    }
    Ok(())
}

/// Step 8: projected post-trade margin must stay non-negative (within tolerance).
pub fn check_margin_projection(cash_after: f64, reserved_after: f64) -> Result<(), AdmissionError> {
    if cash_after - reserved_after < -MARGIN_TOLERANCE {
        return Err(AdmissionError::MarginProjectionBreached { cash_after, reserved_after });
    }
    Ok(())
}
