use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

use crate::admission::{
    check_margin_projection, check_max_position_pct, check_max_positions, check_min_cash_reserve,
    check_quantity, check_sufficient_cash, check_trade_value, AdmissionError,
};
use crate::metrics;
use crate::pricing::{commission, fill_price, round_qty};
use crate::types::{EquityPoint, MarkMap, PortfolioConfig, Position, TradeEvent, TradeKind};

/// Everything that can go wrong entering a new long or short.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EnterError {
    Admission(AdmissionError),
    ShortingDisabled,
}

impl fmt::Display for EnterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnterError::Admission(e) => write!(f, "{e}"),
            EnterError::ShortingDisabled => write!(f, "short selling is disabled"),
        }
    }
}

impl std::error::Error for EnterError {}

impl From<AdmissionError> for EnterError {
    fn from(e: AdmissionError) -> Self {
        EnterError::Admission(e)
    }
}

/// Why a close/reduce failed. Unlike [`EnterError`], these never route
/// through the admission sequence: an exit on a position that already exists
/// is always allowed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExitError {
    NoPosition,
    QuantityExceedsPosition { qty: f64, available: f64 },
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitError::NoPosition => write!(f, "no open position to exit"),
            ExitError::QuantityExceedsPosition { qty, available } => {
                write!(f, "exit quantity {qty} exceeds open quantity {available}")
            }
        }
    }
}

impl std::error::Error for ExitError {}

/// Cash, positions, trade log and equity curve for one user (or one
/// backtest leg). Pure and deterministic: every method takes the current
/// mark-to-market prices it needs as an argument rather than reaching out
/// for them itself.
#[derive(Clone, Debug)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_cash: f64,
    pub positions: BTreeMap<String, Position>,
    /// Cumulative realized P&L per symbol, surviving a position's destruction
    /// when it fully closes (§3: the Position record is removed at
    /// `quantity == 0`, but its realized history is not).
    pub realized: BTreeMap<String, f64>,
    pub trade_log: Vec<TradeEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub config: PortfolioConfig,
}

impl Portfolio {
    pub fn new(initial_cash: f64, config: PortfolioConfig) -> Self {
        Self {
            cash: initial_cash,
            initial_cash,
            positions: BTreeMap::new(),
            realized: BTreeMap::new(),
            trade_log: Vec::new(),
            equity_curve: Vec::new(),
            config,
        }
    }

    /// Cumulative realized P&L for `symbol`, including P&L realized before
    /// its last position was fully closed.
    fn accumulate_realized(&mut self, symbol: &str, fill_realized: f64) -> f64 {
        let entry = self.realized.entry(symbol.to_string()).or_insert(0.0);
        *entry += fill_realized;
        *entry
    }

    pub fn get_value(&self, marks: &MarkMap) -> f64 {
        metrics::equity(self.cash, &self.positions, marks)
    }

    pub fn short_market_value(&self, marks: &MarkMap) -> f64 {
        metrics::short_market_value(&self.positions, marks)
    }

    pub fn reserved_cash(&self, marks: &MarkMap) -> f64 {
        metrics::reserved_cash(
            &self.positions,
            marks,
            self.cash,
            self.config.short_margin_requirement,
            self.config.constraints.min_cash_reserve_pct,
        )
    }

    pub fn buying_power(&self, marks: &MarkMap) -> f64 {
        metrics::buying_power(
            &self.positions,
            marks,
            self.cash,
            self.config.short_margin_requirement,
            self.config.constraints.min_cash_reserve_pct,
        )
    }

    /// Wipes positions, logs and realized history and resets cash.
    pub fn clear_history(&mut self, initial_cash: f64) {
        self.cash = initial_cash;
        self.initial_cash = initial_cash;
        self.positions.clear();
        self.realized.clear();
        self.trade_log.clear();
        self.equity_curve.clear();
    }

    fn push_fill(&mut self, event: TradeEvent, bar_index: usize, marks: &MarkMap) {
        self.trade_log.push(event);
        let v = self.get_value(marks);
        self.equity_curve.push(EquityPoint {
            i: self.trade_log.len(),
            v,
            time: Some(self.trade_log[self.trade_log.len() - 1].date),
        });
        let _ = bar_index;
    }

    /// Projects cash/equity/short-market-value after hypothetically applying
    /// `cash_change` and replacing `symbol`'s position with `new_position`
    /// (or removing it, if `new_position` is `None`).
    fn project_margin(
        &self,
        marks: &MarkMap,
        symbol: &str,
        new_position: Option<Position>,
        cash_change: f64,
    ) -> (f64, f64) {
        let mut projected = self.positions.clone();
        match new_position {
            Some(p) => {
                projected.insert(symbol.to_string(), p);
            }
            None => {
                projected.remove(symbol);
            }
        }
        let cash_after = self.cash + cash_change;
        let equity_after = metrics::equity(cash_after, &projected, marks);
        let short_mv_after = metrics::short_market_value(&projected, marks);
        let reserved_after = self.config.short_margin_requirement * short_mv_after
            + self.config.constraints.min_cash_reserve_pct * equity_after.max(0.0);
        (cash_after, reserved_after)
    }

    /// Buy `qty` shares of `symbol` at `raw_price`, opening or extending a
    /// long (or covering/flipping an existing short). Runs the full
    /// admission sequence (§4.2 steps 1-8).
    pub fn enter_long(
        &mut self,
        symbol: &str,
        qty: f64,
        raw_price: f64,
        bar_index: usize,
        date: NaiveDate,
        marks: &mut MarkMap,
    ) -> Result<&TradeEvent, EnterError> {
        marks.insert(symbol.to_string(), raw_price);

        let qty = round_qty(qty, self.config.share_min_pct);
        check_quantity(qty, self.config.constraints.max_order_qty)?;

        let fill = fill_price(raw_price, self.config.slippage, true);
        let notional = fill * qty;
        let comm = commission(qty, notional, &self.config.commission);
        let trade_value = notional + comm;
        check_trade_value(trade_value, &self.config.constraints)?;

        let existing = self.positions.get(symbol).copied();
        let opens_new_symbol = existing.is_none();
        check_max_positions(
            opens_new_symbol,
            self.positions.len() as u32,
            self.config.constraints.max_positions,
        )?;

        let equity_pre = self.get_value(marks);
        check_max_position_pct(trade_value, equity_pre, self.config.constraints.max_position_pct)?;

        let cash_change = -trade_value;
        check_min_cash_reserve(
            true,
            self.cash + cash_change,
            equity_pre,
            self.config.constraints.min_cash_reserve_pct,
        )?;
        check_sufficient_cash(cash_change, self.cash)?;

        let (q0, a0) = existing.map(|p| (p.quantity, p.avg_price)).unwrap_or((0.0, 0.0));
        let (new_qty, new_avg, realized) = if q0 >= 0.0 {
            (q0 + qty, (a0 * q0 + fill * qty) / (q0 + qty), 0.0)
        } else {
            let covered = qty.min(-q0);
            let realized = (a0 - fill) * covered;
            let residual = qty - covered;
            if residual > 0.0 {
                (residual, fill, realized)
            } else {
                (q0 + covered, a0, realized)
            }
        };

        let new_position = if new_qty.abs() > f64::EPSILON {
            Some(Position { quantity: new_qty, avg_price: new_avg, realized_pnl: realized })
        } else {
            None
        };
        let (cash_after, reserved_after) =
            self.project_margin(marks, symbol, new_position, cash_change);
        check_margin_projection(cash_after, reserved_after)?;

        self.cash = cash_after;
        let cumulative_realized = self.accumulate_realized(symbol, realized);
        match new_position {
            Some(mut p) => {
                p.realized_pnl = cumulative_realized;
                self.positions.insert(symbol.to_string(), p);
            }
            None => {
                self.positions.remove(symbol);
            }
        }

        let event = TradeEvent {
            kind: TradeKind::Long,
            symbol: symbol.to_string(),
            quantity: qty,
            raw_price,
            fill_price: fill,
            cash_delta: cash_change,
            commission: comm,
            realized_pnl: realized,
            bar_index,
            date,
        };
        self.push_fill(event, bar_index, marks);
        Ok(self.trade_log.last().unwrap())
    }

    /// Sell `qty` shares of `symbol` at `raw_price`, opening or extending a
    /// short (or reducing/flipping an existing long). Runs the full
    /// admission sequence, plus an `allow_short` gate when the order would
    /// leave a net negative position.
    pub fn enter_short(
        &mut self,
        symbol: &str,
        qty: f64,
        raw_price: f64,
        bar_index: usize,
        date: NaiveDate,
        marks: &mut MarkMap,
    ) -> Result<&TradeEvent, EnterError> {
        marks.insert(symbol.to_string(), raw_price);

        let qty = round_qty(qty, self.config.share_min_pct);
        check_quantity(qty, self.config.constraints.max_order_qty)?;

        let existing = self.positions.get(symbol).copied();
        let (q0, a0) = existing.map(|p| (p.quantity, p.avg_price)).unwrap_or((0.0, 0.0));

        if q0 - qty < 0.0 && !self.config.allow_short {
            return Err(EnterError::ShortingDisabled);
        }

        let fill = fill_price(raw_price, self.config.slippage, false);
        let notional = fill * qty;
        let comm = commission(qty, notional, &self.config.commission);
        let trade_value = notional;
        check_trade_value(trade_value, &self.config.constraints)?;

        let opens_new_symbol = existing.is_none();
        check_max_positions(
            opens_new_symbol,
            self.positions.len() as u32,
            self.config.constraints.max_positions,
        )?;

        let equity_pre = self.get_value(marks);
        check_max_position_pct(trade_value, equity_pre, self.config.constraints.max_position_pct)?;

        let cash_change = notional - comm;
        check_sufficient_cash(cash_change, self.cash)?;

        let (new_qty, new_avg, realized) = if q0 <= 0.0 {
            (q0 - qty, (a0 * (-q0) + fill * qty) / (-q0 + qty), 0.0)
        } else {
            let sold = qty.min(q0);
            let realized = (fill - a0) * sold;
            let residual = qty - sold;
            if residual > 0.0 {
                (-residual, fill, realized)
            } else {
                (q0 - sold, a0, realized)
            }
        };

        let new_position = if new_qty.abs() > f64::EPSILON {
            Some(Position { quantity: new_qty, avg_price: new_avg, realized_pnl: realized })
        } else {
            None
        };
        let (cash_after, reserved_after) =
            self.project_margin(marks, symbol, new_position, cash_change);
        check_margin_projection(cash_after, reserved_after)?;

        self.cash = cash_after;
        let cumulative_realized = self.accumulate_realized(symbol, realized);
        match new_position {
            Some(mut p) => {
                p.realized_pnl = cumulative_realized;
                self.positions.insert(symbol.to_string(), p);
            }
            None => {
                self.positions.remove(symbol);
            }
        }

        let event = TradeEvent {
            kind: TradeKind::Short,
            symbol: symbol.to_string(),
            quantity: qty,
            raw_price,
            fill_price: fill,
            cash_delta: cash_change,
            commission: comm,
            realized_pnl: realized,
            bar_index,
            date,
        };
        self.push_fill(event, bar_index, marks);
        Ok(self.trade_log.last().unwrap())
    }

    /// Reduce (or fully close) an existing position by `qty`. Never runs
    /// the admission sequence: the position already exists, so the order is
    /// always allowed up to its size.
    pub fn exit(
        &mut self,
        symbol: &str,
        qty: f64,
        raw_price: f64,
        bar_index: usize,
        date: NaiveDate,
        marks: &mut MarkMap,
    ) -> Result<&TradeEvent, ExitError> {
        marks.insert(symbol.to_string(), raw_price);

        let position = self.positions.get(symbol).copied().ok_or(ExitError::NoPosition)?;
        let qty = round_qty(qty, self.config.share_min_pct).min(position.quantity.abs());
        if qty <= 0.0 {
            return Err(ExitError::QuantityExceedsPosition { qty: 0.0, available: position.quantity.abs() });
        }

        let (kind, fill, cash_change, comm, realized, new_qty) = if position.is_long() {
            let fill = fill_price(raw_price, self.config.slippage, false);
            let notional = fill * qty;
            let comm = commission(qty, notional, &self.config.commission);
            let realized = (fill - position.avg_price) * qty - comm;
            (TradeKind::Exit, fill, notional - comm, comm, realized, position.quantity - qty)
        } else {
            let fill = fill_price(raw_price, self.config.slippage, true);
            let notional = fill * qty;
            let comm = commission(qty, notional, &self.config.commission);
            let realized = (position.avg_price - fill) * qty - comm;
            (TradeKind::Exit, fill, -(notional + comm), comm, realized, position.quantity + qty)
        };

        self.cash += cash_change;
        let cumulative_realized = self.accumulate_realized(symbol, realized);
        if new_qty.abs() > f64::EPSILON {
            self.positions.insert(
                symbol.to_string(),
                Position { quantity: new_qty, avg_price: position.avg_price, realized_pnl: cumulative_realized },
            );
        } else {
            self.positions.remove(symbol);
        }

        let event = TradeEvent {
            kind,
            symbol: symbol.to_string(),
            quantity: qty,
            raw_price,
            fill_price: fill,
            cash_delta: cash_change,
            commission: comm,
            realized_pnl: realized,
            bar_index,
            date,
        };
        self.push_fill(event, bar_index, marks);
        Ok(self.trade_log.last().unwrap())
    }

    /// Reattaches positions from a persisted snapshot. Positions whose
    /// symbol cannot be resolved by `symbol_exists` are silently dropped, as
    /// they reference data the caller no longer has.
    pub fn restore_from_state(
        initial_cash: f64,
        config: PortfolioConfig,
        cash: f64,
        positions: BTreeMap<String, Position>,
        trade_log: Vec<TradeEvent>,
        equity_curve: Vec<EquityPoint>,
        realized: BTreeMap<String, f64>,
        symbol_exists: impl Fn(&str) -> bool,
    ) -> Self {
        let positions = positions.into_iter().filter(|(sym, _)| symbol_exists(sym)).collect();
        Self { cash, initial_cash, positions, trade_log, equity_curve, config, realized }
    }

    /// Estimated cash cost of buying `qty` shares at `raw_price`, including
    /// slippage and commission, without mutating any state.
    pub fn estimate_buy_cost(&self, qty: f64, raw_price: f64) -> f64 {
        let qty = round_qty(qty, self.config.share_min_pct);
        let fill = fill_price(raw_price, self.config.slippage, true);
        let notional = fill * qty;
        notional + commission(qty, notional, &self.config.commission)
    }

    /// Estimated cash proceeds of selling `qty` shares at `raw_price`.
    pub fn estimate_sell_proceeds(&self, qty: f64, raw_price: f64) -> f64 {
        let qty = round_qty(qty, self.config.share_min_pct);
        let fill = fill_price(raw_price, self.config.slippage, false);
        let notional = fill * qty;
        notional - commission(qty, notional, &self.config.commission)
    }

    /// Largest quantity of `symbol` buyable at `raw_price` while keeping
    /// the projected cost within `(1 - reserve_fraction) * cash`, searched
    /// downward from `qty_upper_bound` by the share increment.
    pub fn max_affordable_buy(&self, raw_price: f64, qty_upper_bound: f64, reserve_fraction: f64) -> f64 {
        let increment = (self.config.share_min_pct / 100.0).max(f64::EPSILON);
        let budget = (1.0 - reserve_fraction) * self.cash;
        let mut qty = round_qty(qty_upper_bound, self.config.share_min_pct);
        while qty > 0.0 {
            if self.estimate_buy_cost(qty, raw_price) <= budget + crate::types::FLOAT_TOLERANCE {
                return qty;
            }
            qty -= increment;
        }
        0.0
    }
}
