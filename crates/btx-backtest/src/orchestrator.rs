use std::collections::BTreeMap;

use btx_analytics::{compute_report, Report};
use btx_portfolio::{EquityPoint, MarkMap, Portfolio, PortfolioConfig, TradeEvent};
use btx_priceseries::PriceSeries;
use btx_sandbox::CompiledStrategy;
use chrono::NaiveDate;

use crate::driver;

/// Result of running one symbol, success or failure, mirroring the
/// per-symbol try/except in the upstream run endpoint: one symbol failing
/// does not abort the others.
pub struct SymbolRun {
    pub symbol: String,
    pub start_value: f64,
    pub end_value: f64,
    pub pnl: f64,
    pub error: Option<String>,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<TradeEvent>,
}

pub struct OrchestratorResult {
    pub per_symbol: Vec<SymbolRun>,
    pub combined_trade_log: Vec<TradeEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub train_report: Option<Report>,
    pub test_report: Option<Report>,
    pub report: Report,
}

/// One factory call per (fresh) portfolio a symbol needs: the strategy code
/// is re-evaluated from scratch for a walk-forward split's train/test legs
/// exactly as the upstream per-symbol loop constructs a new `Strategy`
/// object for each leg.
fn fresh_strategy(code: &str) -> Result<CompiledStrategy, String> {
    CompiledStrategy::compile(code).map_err(|e| e.to_string())
}

/// Splits `[start, end]` into a train leg and a test (out-of-sample) leg at
/// `train_pct` of the way through, by calendar days. `train_pct` must be in
/// `(0, 1)`; the caller is expected to have validated that already.
fn walk_forward_split(start: NaiveDate, end: NaiveDate, train_pct: f64) -> NaiveDate {
    let span_days = (end - start).num_days();
    let offset_days = (span_days as f64 * train_pct) as i64;
    start + chrono::Duration::days(offset_days)
}

/// Runs one strategy against one symbol's series, cash-allocated out of the
/// total initial cash, optionally split into a walk-forward train/test pair.
/// Auto-liquidates any open position at `end` when `auto_liquidate_end` is
/// set, mirroring the upstream default.
#[allow(clippy::too_many_arguments)]
fn run_symbol(
    code: &str,
    series: &PriceSeries,
    cash_per_symbol: f64,
    config: PortfolioConfig,
    start: NaiveDate,
    end: NaiveDate,
    train_pct: Option<f64>,
    auto_liquidate_end: bool,
) -> Result<(SymbolRun, Option<(Vec<EquityPoint>, Vec<TradeEvent>)>), String> {
    let symbol = series.symbol().to_string();

    let split = train_pct.map(|pct| walk_forward_split(start, end, pct));

    let train_leg = if let Some(split_date) = split {
        let mut strategy = fresh_strategy(code)?;
        let mut portfolio = Portfolio::new(cash_per_symbol, config.clone());
        let mut marks = MarkMap::new();
        driver::run(&mut strategy, &mut portfolio, series, &symbol, &mut marks, start, split_date)
            .map_err(|e| e.to_string())?;
        Some((portfolio.equity_curve.clone(), portfolio.trade_log.clone()))
    } else {
        None
    };

    let run_start = split.unwrap_or(start);
    let mut strategy = fresh_strategy(code)?;
    let mut portfolio = Portfolio::new(cash_per_symbol, config);
    let mut marks = MarkMap::new();
    driver::run(&mut strategy, &mut portfolio, series, &symbol, &mut marks, run_start, end)
        .map_err(|e| e.to_string())?;

    if auto_liquidate_end {
        if let Some(pos) = portfolio.positions.get(&symbol).cloned() {
            if pos.quantity != 0.0 {
                let end_iloc = series.to_iloc_date(end);
                let raw_price = series.price(end_iloc);
                let qty = pos.quantity.abs();
                driver_exit(&mut portfolio, &symbol, qty, raw_price, end_iloc, end, &mut marks)
                    .map_err(|e| e.to_string())?;
            }
        }
    }

    let end_iloc = series.to_iloc_date(end);
    let end_val = portfolio.get_value(&marks_at(series, end_iloc, &symbol, &marks));

    let run = SymbolRun {
        symbol: symbol.clone(),
        start_value: cash_per_symbol,
        end_value: end_val,
        pnl: end_val - cash_per_symbol,
        error: None,
        equity_curve: portfolio.equity_curve.clone(),
        trade_log: portfolio.trade_log.clone(),
    };
    Ok((run, train_leg))
}

fn driver_exit(
    portfolio: &mut Portfolio,
    symbol: &str,
    qty: f64,
    raw_price: f64,
    bar_index: usize,
    date: NaiveDate,
    marks: &mut MarkMap,
) -> Result<(), btx_portfolio::ExitError> {
    portfolio.exit(symbol, qty, raw_price, bar_index, date, marks).map(|_| ())
}

fn marks_at(series: &PriceSeries, iloc: usize, symbol: &str, existing: &MarkMap) -> MarkMap {
    let mut marks = existing.clone();
    marks.insert(symbol.to_string(), series.price(iloc));
    marks
}

/// An equity point enriched with the wall-clock time it occurred at, built
/// by pairing each equity-curve entry with the trade that produced it.
fn enrich_equity(equity_curve: &[EquityPoint], trade_log: &[TradeEvent], start: NaiveDate) -> Vec<EquityPoint> {
    let mut out = Vec::with_capacity(equity_curve.len());
    for (j, pt) in equity_curve.iter().enumerate() {
        let time = if j > 0 && j - 1 < trade_log.len() { Some(trade_log[j - 1].date) } else if j == 0 { Some(start) } else { None };
        out.push(EquityPoint { i: pt.i, v: pt.v, time });
    }
    out
}

/// Runs a strategy across every symbol with equal capital allocation,
/// merges the resulting per-symbol equity curves into one combined curve,
/// and computes the overall performance report plus (when walk-forward
/// split) separate train/test reports.
#[allow(clippy::too_many_arguments)]
pub fn run_strategy(
    code: &str,
    series_by_symbol: &BTreeMap<String, PriceSeries>,
    initial_cash: f64,
    config: PortfolioConfig,
    start: NaiveDate,
    end: NaiveDate,
    train_pct: Option<f64>,
    auto_liquidate_end: bool,
) -> OrchestratorResult {
    let symbols: Vec<&String> = series_by_symbol.keys().collect();
    let cash_per_symbol = if symbols.is_empty() { 0.0 } else { initial_cash / symbols.len() as f64 };

    let mut per_symbol = Vec::new();
    let mut combined_trade_log = Vec::new();
    let mut portfolio_curves: Vec<(Vec<EquityPoint>, Vec<TradeEvent>)> = Vec::new();
    let mut train_legs: Vec<(Vec<EquityPoint>, Vec<TradeEvent>)> = Vec::new();

    for symbol in &symbols {
        let series = &series_by_symbol[*symbol];
        match run_symbol(code, series, cash_per_symbol, config.clone(), start, end, train_pct, auto_liquidate_end) {
            Ok((run, train_leg)) => {
                combined_trade_log.extend(run.trade_log.clone());
                portfolio_curves.push((run.equity_curve.clone(), run.trade_log.clone()));
                if let Some(leg) = train_leg {
                    train_legs.push(leg);
                }
                per_symbol.push(run);
            }
            Err(e) => {
                per_symbol.push(SymbolRun {
                    symbol: (*symbol).clone(),
                    start_value: cash_per_symbol,
                    end_value: cash_per_symbol,
                    pnl: 0.0,
                    error: Some(e),
                    equity_curve: Vec::new(),
                    trade_log: Vec::new(),
                });
            }
        }
    }

    let total_end_value: f64 = per_symbol.iter().map(|r| r.end_value).sum();

    let equity_curve = merge_equity_curves(&portfolio_curves, initial_cash, start, end, total_end_value);

    // Train/test metrics are reported from the first symbol only, matching
    // the upstream run endpoint (which keeps whichever leg it computed
    // first rather than aggregating legs across symbols).
    let train_report = train_legs.first().map(|(ec, tl)| {
        let mut curve = vec![EquityPoint { i: 0, v: cash_per_symbol, time: Some(start) }];
        curve.extend(enrich_equity(ec, tl, start));
        compute_report(tl, &curve, cash_per_symbol)
    });
    let test_report = train_pct.and(portfolio_curves.first()).map(|(ec, tl)| {
        let split = train_pct.map(|pct| walk_forward_split(start, end, pct)).unwrap_or(start);
        let mut curve = vec![EquityPoint { i: 0, v: cash_per_symbol, time: Some(split) }];
        curve.extend(enrich_equity(ec, tl, split));
        compute_report(tl, &curve, cash_per_symbol)
    });

    let report = compute_report(&combined_trade_log, &equity_curve, initial_cash);

    OrchestratorResult { per_symbol, combined_trade_log, equity_curve, train_report, test_report, report }
}

/// Merges per-symbol equity curves into one combined curve.
///
/// - No symbols ran: a flat two-point curve from `initial` to the total end
///   value.
/// - Exactly one symbol: its own curve, enriched with trade timestamps and
///   anchored with an initial point at `start`.
/// - Multiple symbols: a time-ordered merge where, at each distinct
///   timestamp any symbol produced an equity point, the combined value is
///   the sum of every symbol's most recently known value.
fn merge_equity_curves(
    portfolio_curves: &[(Vec<EquityPoint>, Vec<TradeEvent>)],
    initial: f64,
    start: NaiveDate,
    end: NaiveDate,
    total_end_value: f64,
) -> Vec<EquityPoint> {
    if portfolio_curves.is_empty() {
        return vec![
            EquityPoint { i: 0, v: initial, time: Some(start) },
            EquityPoint { i: 1, v: total_end_value, time: Some(end) },
        ];
    }

    if portfolio_curves.len() == 1 {
        let (ec, tl) = &portfolio_curves[0];
        let mut enriched = enrich_equity(ec, tl, start);
        if enriched.first().map(|p| p.i != 0).unwrap_or(true) {
            enriched.insert(0, EquityPoint { i: 0, v: initial, time: Some(start) });
        }
        if let Some(last) = enriched.last_mut() {
            if last.time.is_none() {
                last.time = Some(end);
            }
        }
        return enriched;
    }

    // Each curve's own i=0 point only seeds `current`'s initial per-symbol
    // value; it is not itself a dated event, so it must not stream into the
    // merge (otherwise every symbol's opening value would re-emit a
    // duplicate point at `start` before any real fill has happened).
    let mut events: Vec<(NaiveDate, usize, f64)> = Vec::new();
    for (pidx, (ec, tl)) in portfolio_curves.iter().enumerate() {
        for (j, pt) in ec.iter().enumerate().skip(1) {
            if let Some(t) = tl.get(j - 1).map(|t| t.date) {
                events.push((t, pidx, pt.v));
            }
        }
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut current: Vec<f64> = portfolio_curves
        .iter()
        .map(|(ec, _)| ec.first().map(|p| p.v).unwrap_or(0.0))
        .collect();

    let mut out = vec![EquityPoint { i: 0, v: initial, time: None }];
    let mut idx = 0;
    while idx < events.len() {
        let date = events[idx].0;
        let mut j = idx;
        while j < events.len() && events[j].0 == date {
            current[events[j].1] = events[j].2;
            j += 1;
        }
        let combined: f64 = current.iter().sum();
        out.push(EquityPoint { i: out.len(), v: combined, time: Some(date) });
        idx = j;
    }
    out
}

/// Reconstructs a trade-to-trade equity curve from a trade log alone, for
/// runs persisted before the equity curve itself was stored (the stored
/// curve has only its initial/final points but the trade log is intact).
pub fn reconstruct_equity_curve_from_trades(
    trade_log: &[TradeEvent],
    initial_cash: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<EquityPoint> {
    if trade_log.is_empty() {
        return vec![
            EquityPoint { i: 0, v: initial_cash, time: Some(start) },
            EquityPoint { i: 1, v: initial_cash, time: Some(end) },
        ];
    }

    // Mirrors the upstream reconstruction exactly, including its asymmetry:
    // it only tracks position for "long"/"exit" trades, the two kinds that
    // existed when this fallback was written. A "short" trade still moves
    // cash but is not folded into the tracked position here.
    let mut curve = vec![EquityPoint { i: 0, v: initial_cash, time: Some(start) }];
    let mut cash = initial_cash;
    let mut position = 0.0_f64;
    for (i, t) in trade_log.iter().enumerate() {
        use btx_portfolio::TradeKind;
        cash += t.cash_delta;
        match t.kind {
            TradeKind::Long => position += t.quantity,
            TradeKind::Exit => position -= t.quantity,
            TradeKind::Short => {}
        }
        let value = if position != 0.0 { cash + position * t.fill_price } else { cash };
        curve.push(EquityPoint { i: i + 1, v: value, time: Some(t.date) });
    }
    curve
}

/// Whether a stored run's equity curve is a legacy stub (only its
/// start/end points persisted) that should be rebuilt from the trade log.
pub fn needs_legacy_reconstruction(equity_curve: &[EquityPoint], trade_log: &[TradeEvent]) -> bool {
    equity_curve.len() <= 2 && trade_log.len() > 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use btx_priceseries::Bar;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(symbol: &str) -> PriceSeries {
        PriceSeries::from_bars(
            symbol,
            vec![
                Bar { date: d(2024, 1, 1), open: 10.0, high: 10.0, low: 10.0, close: 10.0 },
                Bar { date: d(2024, 1, 2), open: 11.0, high: 11.0, low: 11.0, close: 11.0 },
                Bar { date: d(2024, 1, 3), open: 12.0, high: 12.0, low: 12.0, close: 12.0 },
                Bar { date: d(2024, 1, 4), open: 13.0, high: 13.0, low: 13.0, close: 13.0 },
            ],
        )
    }

    #[test]
    fn single_symbol_run_allocates_full_cash() {
        let mut map = BTreeMap::new();
        map.insert("X".to_string(), series("X"));
        let code = "fn update(bar) {}";
        let result = run_strategy(code, &map, 1000.0, PortfolioConfig::default(), d(2024, 1, 1), d(2024, 1, 4), None, true);
        assert_eq!(result.per_symbol.len(), 1);
        assert_eq!(result.per_symbol[0].start_value, 1000.0);
        assert!(result.per_symbol[0].error.is_none());
    }

    #[test]
    fn two_symbols_split_cash_equally() {
        let mut map = BTreeMap::new();
        map.insert("X".to_string(), series("X"));
        map.insert("Y".to_string(), series("Y"));
        let code = "fn update(bar) {}";
        let result = run_strategy(code, &map, 1000.0, PortfolioConfig::default(), d(2024, 1, 1), d(2024, 1, 4), None, true);
        assert_eq!(result.per_symbol.len(), 2);
        assert_eq!(result.per_symbol[0].start_value, 500.0);
        assert_eq!(result.per_symbol[1].start_value, 500.0);
    }

    #[test]
    fn invalid_strategy_code_is_reported_as_a_per_symbol_error() {
        let mut map = BTreeMap::new();
        map.insert("X".to_string(), series("X"));
        let code = "fn start(bar) {}"; // missing required update hook
        let result = run_strategy(code, &map, 1000.0, PortfolioConfig::default(), d(2024, 1, 1), d(2024, 1, 4), None, true);
        assert!(result.per_symbol[0].error.is_some());
    }

    #[test]
    fn legacy_reconstruction_trigger_matches_stub_curve_shape() {
        assert!(needs_legacy_reconstruction(
            &[EquityPoint { i: 0, v: 1.0, time: None }, EquityPoint { i: 1, v: 2.0, time: None }],
            &[
                TradeEvent {
                    kind: btx_portfolio::TradeKind::Exit,
                    symbol: "X".into(),
                    quantity: 1.0,
                    raw_price: 1.0,
                    fill_price: 1.0,
                    cash_delta: 1.0,
                    commission: 0.0,
                    realized_pnl: 0.0,
                    bar_index: 0,
                    date: d(2024, 1, 1),
                };
                3
            ],
        ));
        assert!(!needs_legacy_reconstruction(
            &[EquityPoint { i: 0, v: 1.0, time: None }; 5],
            &[],
        ));
    }

    fn trade_on(date: NaiveDate) -> TradeEvent {
        TradeEvent {
            kind: btx_portfolio::TradeKind::Long,
            symbol: "X".into(),
            quantity: 1.0,
            raw_price: 1.0,
            fill_price: 1.0,
            cash_delta: 0.0,
            commission: 0.0,
            realized_pnl: 0.0,
            bar_index: 0,
            date,
        }
    }

    #[test]
    fn equity_merge_combines_two_symbols_by_timestamp() {
        let start = d(2024, 1, 1);
        let a_curve = vec![
            EquityPoint { i: 0, v: 500.0, time: None },
            EquityPoint { i: 1, v: 520.0, time: None },
            EquityPoint { i: 2, v: 515.0, time: None },
        ];
        let a_trades = vec![trade_on(d(2024, 1, 5)), trade_on(d(2024, 1, 10))];
        let b_curve = vec![
            EquityPoint { i: 0, v: 500.0, time: None },
            EquityPoint { i: 1, v: 490.0, time: None },
        ];
        let b_trades = vec![trade_on(d(2024, 1, 7))];

        let merged = merge_equity_curves(
            &[(a_curve, a_trades), (b_curve, b_trades)],
            1000.0,
            start,
            d(2024, 1, 10),
            1005.0,
        );

        // Matches §8 scenario 6 exactly: (0,1000,null), (Jan5,1020),
        // (Jan7,1010), (Jan10,1005).
        let values: Vec<f64> = merged.iter().map(|p| p.v).collect();
        assert_eq!(values, vec![1000.0, 1020.0, 1010.0, 1005.0]);
        assert_eq!(merged[0].time, None);
        assert_eq!(merged[1].time, Some(d(2024, 1, 5)));
        assert_eq!(merged[2].time, Some(d(2024, 1, 7)));
        assert_eq!(merged[3].time, Some(d(2024, 1, 10)));
    }

    #[test]
    fn walk_forward_split_lands_at_half_the_calendar_span() {
        // 2023 has 364 days between Jan 1 and Dec 31; floor(364*0.5) = 182
        // calendar days past the start date is Jul 2, not Jul 1.
        let split = walk_forward_split(d(2023, 1, 1), d(2023, 12, 31), 0.5);
        assert_eq!(split, d(2023, 7, 2));
    }
}
