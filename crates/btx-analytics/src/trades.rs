use btx_portfolio::{TradeEvent, TradeKind};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct TradeMetrics {
    pub trades: usize,
    pub exits: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub win_rate_pct: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_realized_exits: f64,
    pub net_realized_all: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_win: f64,
    pub max_loss: f64,
    pub profit_factor: Option<f64>,
    pub turnover: f64,
}

/// Win rate, profit factor, and turnover derived from a trade log.
pub fn compute_trade_metrics(trade_log: &[TradeEvent]) -> TradeMetrics {
    let exits: Vec<&TradeEvent> = trade_log.iter().filter(|t| t.kind == TradeKind::Exit).collect();
    let realized_exits: Vec<f64> = exits.iter().map(|t| t.realized_pnl).collect();

    let wins: Vec<f64> = realized_exits.iter().copied().filter(|&x| x > 0.0).collect();
    let losses: Vec<f64> = realized_exits.iter().copied().filter(|&x| x < 0.0).collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum();
    let net_realized: f64 = realized_exits.iter().sum();
    let win_rate = if realized_exits.is_empty() { 0.0 } else { wins.len() as f64 / realized_exits.len() as f64 };

    let profit_factor = if !losses.is_empty() {
        let denom = losses.iter().sum::<f64>().abs();
        if denom != 0.0 { Some(gross_profit / denom) } else { None }
    } else {
        None
    };

    let avg_win = if wins.is_empty() { 0.0 } else { wins.iter().sum::<f64>() / wins.len() as f64 };
    let avg_loss = if losses.is_empty() { 0.0 } else { losses.iter().sum::<f64>() / losses.len() as f64 };

    let realized_all: f64 = trade_log.iter().map(|t| t.realized_pnl).sum();

    let turnover: f64 = trade_log.iter().map(|t| t.cash_delta.abs()).sum();

    TradeMetrics {
        trades: trade_log.len(),
        exits: exits.len(),
        wins: wins.len(),
        losses: losses.len(),
        win_rate,
        win_rate_pct: win_rate * 100.0,
        gross_profit,
        gross_loss,
        net_realized_exits: net_realized,
        net_realized_all: realized_all,
        avg_win,
        avg_loss,
        max_win: wins.iter().cloned().fold(0.0, f64::max),
        max_loss: losses.iter().cloned().fold(0.0, f64::min),
        profit_factor,
        turnover,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SymbolBreakdown {
    pub symbol: String,
    pub trades: usize,
    pub exits: usize,
    pub net_realized: f64,
}

/// Per-symbol trade counts and realized P&L, sorted best-to-worst.
pub fn compute_symbol_breakdown(trade_log: &[TradeEvent]) -> Vec<SymbolBreakdown> {
    use std::collections::BTreeMap;
    let mut by: BTreeMap<String, SymbolBreakdown> = BTreeMap::new();
    for t in trade_log {
        let rec = by.entry(t.symbol.clone()).or_insert_with(|| SymbolBreakdown {
            symbol: t.symbol.clone(),
            trades: 0,
            exits: 0,
            net_realized: 0.0,
        });
        rec.trades += 1;
        if t.kind == TradeKind::Exit {
            rec.exits += 1;
            rec.net_realized += t.realized_pnl;
        }
    }
    let mut out: Vec<SymbolBreakdown> = by.into_values().collect();
    out.sort_by(|a, b| {
        b.net_realized
            .partial_cmp(&a.net_realized)
            .unwrap()
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn exit_event(symbol: &str, realized_pnl: f64) -> TradeEvent {
        TradeEvent {
            kind: TradeKind::Exit,
            symbol: symbol.to_string(),
            quantity: 1.0,
            raw_price: 10.0,
            fill_price: 10.0,
            cash_delta: 10.0,
            commission: 0.0,
            realized_pnl,
            bar_index: 0,
            date: d(2024, 1, 1),
        }
    }

    #[test]
    fn win_rate_counts_only_exits() {
        let log = vec![exit_event("X", 5.0), exit_event("X", -2.0)];
        let m = compute_trade_metrics(&log);
        assert_eq!(m.exits, 2);
        assert_eq!(m.wins, 1);
        assert_eq!(m.losses, 1);
        assert!((m.win_rate - 0.5).abs() < 1e-9);
        assert!((m.profit_factor.unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn symbol_breakdown_sorts_best_realized_first() {
        let log = vec![exit_event("A", -3.0), exit_event("B", 7.0)];
        let out = compute_symbol_breakdown(&log);
        assert_eq!(out[0].symbol, "B");
        assert_eq!(out[1].symbol, "A");
    }
}
