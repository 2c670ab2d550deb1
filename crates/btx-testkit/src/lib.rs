//! Fixture helpers shared by the scenario tests under `tests/`, centralizing
//! CSV/JSON fixture loading so it isn't duplicated per test file.

use anyhow::{Context, Result};
use btx_priceseries::{Bar, PriceSeries};
use chrono::NaiveDate;

/// Reads a `date,open,high,low,close` CSV fixture into a [`PriceSeries`].
pub fn load_bars_csv(symbol: &str, path: &str) -> Result<PriceSeries> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open bars csv: {path}"))?;
    let mut bars = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let date: NaiveDate = rec[0].parse().context("parse date")?;
        let open: f64 = rec[1].parse().context("parse open")?;
        let high: f64 = rec[2].parse().context("parse high")?;
        let low: f64 = rec[3].parse().context("parse low")?;
        let close: f64 = rec[4].parse().context("parse close")?;
        bars.push(Bar { date, open, high, low, close });
    }
    Ok(PriceSeries::from_bars(symbol, bars))
}

/// Builds a flat-price daily series for `symbol` over `[start, end]`
/// inclusive, every bar open=high=low=close=`price` — useful for scenarios
/// where only the date axis matters, not price movement.
pub fn flat_series(symbol: &str, start: NaiveDate, end: NaiveDate, price: f64) -> PriceSeries {
    let mut bars = Vec::new();
    let mut d = start;
    while d <= end {
        bars.push(Bar { date: d, open: price, high: price, low: price, close: price });
        d += chrono::Duration::days(1);
    }
    PriceSeries::from_bars(symbol, bars)
}

/// Builds a series from explicit `(date, close)` pairs, with open/high/low
/// all pinned to the same close — useful when a scenario cares only about
/// the closing price path on specific dates.
pub fn series_from_closes(symbol: &str, points: &[(NaiveDate, f64)]) -> PriceSeries {
    let bars = points
        .iter()
        .map(|&(date, close)| Bar { date, open: close, high: close, low: close, close })
        .collect();
    PriceSeries::from_bars(symbol, bars)
}
