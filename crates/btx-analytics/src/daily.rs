use std::collections::BTreeMap;

use btx_portfolio::EquityPoint;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Expands a trade-to-trade equity curve into a business-day series via
/// forward fill, for Sharpe/Sortino/Calmar computation on daily returns.
///
/// Points without a `time` are dropped from the date-indexed expansion (they
/// carry no daily-resampling information); if none of the points carry a
/// time at all, the original trade-to-trade values are returned unexpanded.
pub fn expand_equity_to_daily(points: &[EquityPoint], initial_cash: f64) -> Vec<f64> {
    if points.is_empty() {
        return vec![initial_cash];
    }

    let mut sorted: Vec<&EquityPoint> = points.iter().collect();
    sorted.sort_by_key(|p| (p.time, p.i));

    let dated: Vec<&EquityPoint> = sorted.iter().copied().filter(|p| p.time.is_some()).collect();
    if dated.is_empty() {
        return sorted.iter().map(|p| p.v).collect();
    }

    let start = dated.iter().map(|p| p.time.unwrap()).min().unwrap();
    let end = dated.iter().map(|p| p.time.unwrap()).max().unwrap();

    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for p in &dated {
        by_date.insert(p.time.unwrap(), p.v);
    }

    let business_days = business_day_range(start, end);
    if business_days.is_empty() {
        return sorted.iter().map(|p| p.v).collect();
    }

    let mut out = Vec::with_capacity(business_days.len());
    let mut last: Option<f64> = None;
    for day in &business_days {
        if let Some(v) = by_date.get(day) {
            last = Some(*v);
        }
        out.push(last);
    }

    // Backward fill any leading gap, then fall back to initial_cash.
    let mut next: Option<f64> = None;
    for slot in out.iter_mut().rev() {
        if slot.is_none() {
            *slot = next;
        } else {
            next = *slot;
        }
    }

    out.into_iter().map(|v| v.unwrap_or(initial_cash)).collect()
}

fn business_day_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cur = start;
    while cur <= end {
        if !matches!(cur.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(cur);
        }
        cur += Duration::days(1);
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn forward_fills_gaps_between_dated_points() {
        let points = vec![
            EquityPoint { i: 0, v: 1000.0, time: Some(d(2024, 1, 1)) },
            EquityPoint { i: 1, v: 1100.0, time: Some(d(2024, 1, 5)) },
        ];
        let daily = expand_equity_to_daily(&points, 1000.0);
        assert_eq!(*daily.first().unwrap(), 1000.0);
        assert_eq!(*daily.last().unwrap(), 1100.0);
        assert!(daily.len() >= 2);
    }

    #[test]
    fn falls_back_to_trade_to_trade_values_when_untimed() {
        let points = vec![
            EquityPoint { i: 0, v: 1000.0, time: None },
            EquityPoint { i: 1, v: 1200.0, time: None },
        ];
        let daily = expand_equity_to_daily(&points, 1000.0);
        assert_eq!(daily, vec![1000.0, 1200.0]);
    }
}
