//! Technical indicators over raw OHLC slices.
//!
//! These are free functions, not methods on [`crate::PriceSeries`]: they take
//! plain `&[f64]` so they can be tested and reused independently of any one
//! series, and so the simulation core (which only ever needs close/candle)
//! never has to pull this module in.

/// Exponential moving average with `adjust=False` semantics: the first
/// output equals the first input, then `y_t = alpha*x_t + (1-alpha)*y_{t-1}`.
fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = 0.0;
    for (i, &x) in values.iter().enumerate() {
        let y = if i == 0 { x } else { alpha * x + (1.0 - alpha) * prev };
        out.push(y);
        prev = y;
    }
    out
}

fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

fn rolling_stdev_sample(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let means = rolling_mean(values, period);
    let mut out = vec![None; values.len()];
    if period < 2 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let mean = match means[i] {
            Some(m) => m,
            None => continue,
        };
        let window = &values[i + 1 - period..=i];
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        out[i] = Some(var.sqrt());
    }
    out
}

/// Simple moving average. `None` until the window is full.
pub fn sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_mean(closes, period)
}

/// Exponential moving average, seeded at the series' first value.
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (period as f64 + 1.0);
    ewm(closes, alpha).into_iter().map(Some).collect()
}

/// Wilder's relative strength index. `None` for the first `period` bars.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }
    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&gains, alpha);
    let avg_loss = ewm(&losses, alpha);

    let mut out = vec![None; n];
    for i in period..n {
        out[i] = Some(if avg_loss[i] > 0.0 {
            100.0 - 100.0 / (1.0 + avg_gain[i] / avg_loss[i])
        } else {
            100.0
        });
    }
    out
}

/// MACD line (short EMA minus long EMA). `None` for the first `long_period` bars.
pub fn macd(closes: &[f64], short_period: usize, long_period: usize) -> Vec<Option<f64>> {
    let short = ema(closes, short_period);
    let long = ema(closes, long_period);
    (0..closes.len())
        .map(|i| {
            if i < long_period {
                None
            } else {
                Some(short[i].unwrap() - long[i].unwrap())
            }
        })
        .collect()
}

/// `(upper, middle, lower)` Bollinger bands: middle = SMA, bands = middle +/- dev*stdev.
pub fn bollinger_bands(
    closes: &[f64],
    period: usize,
    dev: f64,
) -> Vec<(Option<f64>, Option<f64>, Option<f64>)> {
    let middle = rolling_mean(closes, period);
    let stdev = rolling_stdev_sample(closes, period);
    (0..closes.len())
        .map(|i| match (middle[i], stdev[i]) {
            (Some(m), Some(s)) => (Some(m + dev * s), Some(m), Some(m - dev * s)),
            _ => (None, None, None),
        })
        .collect()
}

/// True range series: `max(high-low, |high-prev_close|, |low-prev_close|)`.
/// The first bar has no previous close, so it is simply `high - low`.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = highs.len();
    let mut out = vec![0.0; n];
    for i in 0..n {
        if i == 0 {
            out[i] = highs[i] - lows[i];
            continue;
        }
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        out[i] = hl.max(hc).max(lc);
    }
    out
}

/// Wilder-smoothed average true range. `None` for the first `period` bars.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(highs, lows, closes);
    let alpha = 1.0 / period as f64;
    let smoothed = ewm(&tr, alpha);
    (0..tr.len()).map(|i| if i < period { None } else { Some(smoothed[i]) }).collect()
}

/// `(+DM, -DM)` directional movement series.
pub fn directional_movement(highs: &[f64], lows: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = highs.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }
    (plus_dm, minus_dm)
}

/// Wilder's average directional index. `None` for the first `2*period` bars.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = highs.len();
    let tr = true_range(highs, lows, closes);
    let (plus_dm, minus_dm) = directional_movement(highs, lows);
    let alpha = 1.0 / period as f64;
    let atr_s = ewm(&tr, alpha);
    let smooth_plus = ewm(&plus_dm, alpha);
    let smooth_minus = ewm(&minus_dm, alpha);

    let mut dx = vec![0.0; n];
    for i in 0..n {
        if atr_s[i] <= 0.0 {
            continue;
        }
        let pdi = 100.0 * smooth_plus[i] / atr_s[i];
        let mdi = 100.0 * smooth_minus[i] / atr_s[i];
        let sum = pdi + mdi;
        if sum > 0.0 {
            dx[i] = 100.0 * (pdi - mdi).abs() / sum;
        }
    }

    let adx_s = ewm(&dx, alpha);
    (0..n).map(|i| if i < 2 * period { None } else { Some(adx_s[i]) }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_is_none_until_window_full() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&closes, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn ema_seeds_at_first_value() {
        let closes = [10.0, 20.0, 30.0];
        let out = ema(&closes, 2);
        assert_eq!(out[0], Some(10.0));
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let out = rsi(&closes, 14);
        assert_eq!(out[14], Some(100.0));
    }

    #[test]
    fn true_range_first_bar_is_high_minus_low() {
        let highs = [10.0, 12.0];
        let lows = [8.0, 9.0];
        let closes = [9.0, 11.0];
        let tr = true_range(&highs, &lows, &closes);
        assert_eq!(tr[0], 2.0);
    }
}
