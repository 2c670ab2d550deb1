use btx_portfolio::EquityPoint;
use serde::Serialize;

use crate::daily::expand_equity_to_daily;
use crate::{RISK_FREE_RATE_ANNUAL, TRADING_DAYS_PER_YEAR};

#[derive(Clone, Debug, Serialize)]
pub struct EquityMetrics {
    pub start_value: f64,
    pub end_value: f64,
    pub pnl: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration: i64,
    pub peak_value: f64,
    pub low_value: f64,
    pub points: usize,
    pub sharpe_annual: f64,
    pub sortino_annual: f64,
    pub calmar_annual: f64,
    pub cagr: f64,
    pub trade_to_trade_avg_return: f64,
    pub trade_to_trade_avg_return_pct: f64,
    pub trade_to_trade_stdev_return: f64,
    pub trade_to_trade_sharpe_like: f64,
    pub drawdown_series: Vec<f64>,
}

fn pct(x: f64) -> f64 {
    x * 100.0
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() { 0.0 } else { xs.iter().sum::<f64>() / xs.len() as f64 }
}

fn sample_stdev(xs: &[f64], mean_x: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs.iter().map(|r| (r - mean_x).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0);
    var.sqrt()
}

/// Equity summary: cumulative return, drawdown series, and annualized
/// Sharpe/Sortino/Calmar computed from a business-day-resampled curve.
pub fn compute_equity_metrics(equity_curve: &[EquityPoint], initial_cash: f64) -> EquityMetrics {
    let mut values: Vec<f64> = equity_curve.iter().map(|p| p.v).collect();
    let mut points: Vec<EquityPoint> = equity_curve.to_vec();
    if values.is_empty() {
        values = vec![initial_cash];
        points = vec![EquityPoint { i: 0, v: initial_cash, time: None }];
    }

    let start_value = values[0];
    let end_value = *values.last().unwrap();
    let pnl = end_value - start_value;
    let total_return = if start_value != 0.0 { pnl / start_value } else { 0.0 };

    let mut peak = start_value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration: i64 = 0;
    let mut dd_start: i64 = 0;
    let mut dd_series = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        if v > peak {
            peak = v;
            dd_start = i as i64;
        }
        let dd = if peak != 0.0 { (v - peak) / peak } else { 0.0 };
        dd_series.push(dd);
        if dd < max_dd {
            max_dd = dd;
            max_dd_duration = i as i64 - dd_start;
        }
    }

    let daily_values = expand_equity_to_daily(&points, initial_cash);
    let daily_returns: Vec<f64> = daily_values
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] / w[0]) - 1.0 } else { 0.0 })
        .collect();

    let avg_daily = mean(&daily_returns);
    let stdev_daily = sample_stdev(&daily_returns, avg_daily);

    let rf_daily = RISK_FREE_RATE_ANNUAL / TRADING_DAYS_PER_YEAR as f64;
    let excess_daily = avg_daily - rf_daily;
    let sharpe_annual = if stdev_daily != 0.0 {
        (excess_daily / stdev_daily) * (TRADING_DAYS_PER_YEAR as f64).sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = daily_returns.iter().copied().filter(|&r| r < 0.0).collect();
    let downside_var = if downside.len() > 1 {
        downside.iter().map(|r| r.powi(2)).sum::<f64>() / (downside.len() as f64 - 1.0)
    } else {
        0.0
    };
    let downside_stdev = downside_var.sqrt();
    let sortino_annual = if downside_stdev != 0.0 {
        (excess_daily / downside_stdev) * (TRADING_DAYS_PER_YEAR as f64).sqrt()
    } else if excess_daily >= 0.0 {
        sharpe_annual
    } else {
        0.0
    };

    let n_daily = daily_returns.len();
    let years = n_daily as f64 / TRADING_DAYS_PER_YEAR as f64;
    let cagr = if years > 0.0 && start_value != 0.0 {
        (end_value / start_value).powf(1.0 / years) - 1.0
    } else {
        0.0
    };
    let calmar_annual = if max_dd != 0.0 { cagr / max_dd.abs() } else { cagr };

    let trade_returns: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] / w[0]) - 1.0)
        .collect();
    let avg_trade_r = mean(&trade_returns);
    let stdev_trade_r = sample_stdev(&trade_returns, avg_trade_r);
    let sharpe_like_trade = if stdev_trade_r != 0.0 { avg_trade_r / stdev_trade_r } else { 0.0 };

    EquityMetrics {
        start_value,
        end_value,
        pnl,
        total_return,
        total_return_pct: pct(total_return),
        max_drawdown: max_dd,
        max_drawdown_pct: pct(max_dd),
        max_drawdown_duration,
        peak_value: values.iter().cloned().fold(f64::MIN, f64::max),
        low_value: values.iter().cloned().fold(f64::MAX, f64::min),
        points: values.len(),
        sharpe_annual,
        sortino_annual,
        calmar_annual,
        cagr,
        trade_to_trade_avg_return: avg_trade_r,
        trade_to_trade_avg_return_pct: pct(avg_trade_r),
        trade_to_trade_stdev_return: stdev_trade_r,
        trade_to_trade_sharpe_like: sharpe_like_trade,
        drawdown_series: dd_series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn flat_curve_has_zero_drawdown_and_return() {
        let curve = vec![
            EquityPoint { i: 0, v: 1000.0, time: Some(d(2024, 1, 1)) },
            EquityPoint { i: 1, v: 1000.0, time: Some(d(2024, 1, 2)) },
        ];
        let m = compute_equity_metrics(&curve, 1000.0);
        assert_eq!(m.pnl, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn drawdown_is_measured_from_the_running_peak() {
        let curve = vec![
            EquityPoint { i: 0, v: 1000.0, time: Some(d(2024, 1, 1)) },
            EquityPoint { i: 1, v: 1200.0, time: Some(d(2024, 1, 2)) },
            EquityPoint { i: 2, v: 900.0, time: Some(d(2024, 1, 3)) },
        ];
        let m = compute_equity_metrics(&curve, 1000.0);
        assert!((m.max_drawdown - (-0.25)).abs() < 1e-9);
    }

    #[test]
    fn empty_curve_falls_back_to_initial_cash() {
        let m = compute_equity_metrics(&[], 500.0);
        assert_eq!(m.start_value, 500.0);
        assert_eq!(m.end_value, 500.0);
    }
}
