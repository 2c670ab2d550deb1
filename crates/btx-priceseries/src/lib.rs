//! btx-priceseries
//!
//! Immutable, indexed daily OHLC series for one symbol, plus the indicator
//! functions served off of it. Pure data + pure math: no I/O, no network.

pub mod indicators;

use chrono::NaiveDate;

/// One day of OHLC for one symbol.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// `low <= open,close <= high` and all four strictly positive.
    fn is_sane(&self) -> bool {
        self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

/// Immutable daily OHLC series for one symbol, indexed 0..N-1 by position.
#[derive(Clone, Debug)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Builds a series from unsorted, possibly-dirty bars: sorts by date,
    /// drops duplicate dates (keeping the first occurrence) and any bar that
    /// violates the OHLC sanity invariant, then freezes.
    pub fn from_bars<S: Into<String>>(symbol: S, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.retain(|b| b.is_sane());
        bars.dedup_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Position whose date is <= `date` (forward-fill). A date before the
    /// first bar clamps to 0; a date after the last bar clamps to N-1.
    pub fn to_iloc_date(&self, date: NaiveDate) -> usize {
        if self.bars.is_empty() {
            return 0;
        }
        match self.bars.partition_point(|b| b.date <= date) {
            0 => 0,
            n => n - 1,
        }
    }

    /// Clamps a raw integer index into `[0, len-1]`.
    pub fn to_iloc_index(&self, i: i64) -> usize {
        if self.bars.is_empty() {
            return 0;
        }
        i.clamp(0, self.bars.len() as i64 - 1) as usize
    }

    pub fn last_index(&self) -> usize {
        self.bars.len().saturating_sub(1)
    }

    pub fn candle(&self, i: usize) -> Bar {
        self.bars[i]
    }

    pub fn price(&self, i: usize) -> f64 {
        self.bars[i].close
    }

    pub fn date(&self, i: usize) -> NaiveDate {
        self.bars[i].date
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
        }
    }

    #[test]
    fn drops_rows_violating_ohlc_invariants() {
        let bars = vec![
            bar(2024, 1, 1, 10.0, 11.0, 9.0, 10.5),
            bar(2024, 1, 2, 10.0, 9.0, 11.0, 10.0), // high < low, dropped
            bar(2024, 1, 3, -1.0, 1.0, -2.0, 0.5),  // negative, dropped
        ];
        let series = PriceSeries::from_bars("TEST", bars);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn dedups_duplicate_dates_keeping_first() {
        let bars = vec![
            bar(2024, 1, 1, 10.0, 11.0, 9.0, 10.0),
            bar(2024, 1, 1, 20.0, 21.0, 19.0, 20.0),
        ];
        let series = PriceSeries::from_bars("TEST", bars);
        assert_eq!(series.len(), 1);
        assert_eq!(series.price(0), 10.0);
    }

    #[test]
    fn to_iloc_date_forward_fills_and_clamps() {
        let bars = vec![
            bar(2024, 1, 1, 10.0, 11.0, 9.0, 10.0),
            bar(2024, 1, 5, 11.0, 12.0, 10.0, 11.0),
            bar(2024, 1, 10, 12.0, 13.0, 11.0, 12.0),
        ];
        let series = PriceSeries::from_bars("TEST", bars);

        assert_eq!(series.to_iloc_date(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()), 0);
        assert_eq!(series.to_iloc_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()), 0);
        assert_eq!(series.to_iloc_date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()), 1);
        assert_eq!(series.to_iloc_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()), 2);
    }

    #[test]
    fn to_iloc_index_is_idempotent() {
        let bars = vec![
            bar(2024, 1, 1, 10.0, 11.0, 9.0, 10.0),
            bar(2024, 1, 2, 11.0, 12.0, 10.0, 11.0),
        ];
        let series = PriceSeries::from_bars("TEST", bars);
        for i in [-5_i64, 0, 1, 9] {
            let once = series.to_iloc_index(i);
            let twice = series.to_iloc_index(once as i64);
            assert_eq!(once, twice);
        }
    }
}
