use crate::types::CommissionPolicy;

/// Buy fills are always marked up, sell/short fills always marked down:
/// slippage is adverse to the trader by construction.
pub fn fill_price(raw_price: f64, slippage: f64, is_buy: bool) -> f64 {
    if is_buy {
        raw_price * (1.0 + slippage)
    } else {
        raw_price * (1.0 - slippage)
    }
}

/// Commission on a fill. The per-order/per-share policy wins whenever either
/// of its fields is set; otherwise commission is a flat percent of notional.
pub fn commission(qty: f64, notional: f64, policy: &CommissionPolicy) -> f64 {
    if policy.per_order > 0.0 || policy.per_share > 0.0 {
        policy.per_order + policy.per_share * qty.abs()
    } else {
        policy.percent_of_notional * notional
    }
}

/// Rounds `qty` to the nearest multiple of `share_min_pct / 100`, using
/// half-away-from-zero rounding. `share_min_pct = 100` rounds to whole
/// shares, `10` to tenths, `1` to hundredths.
pub fn round_qty(qty: f64, share_min_pct: f64) -> f64 {
    let increment = share_min_pct / 100.0;
    if increment <= 0.0 {
        return qty;
    }
    (qty / increment).round() * increment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_marks_buys_up_and_sells_down() {
        assert_eq!(fill_price(100.0, 0.01, true), 101.0);
        assert_eq!(fill_price(100.0, 0.01, false), 99.0);
    }

    #[test]
    fn commission_prefers_per_share_policy_when_set() {
        let policy = CommissionPolicy {
            percent_of_notional: 0.0,
            per_order: 0.0,
            per_share: 0.01,
        };
        assert!((commission(10.0, 1010.0, &policy) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn commission_falls_back_to_percent_of_notional() {
        let policy = CommissionPolicy {
            percent_of_notional: 0.001,
            per_order: 0.0,
            per_share: 0.0,
        };
        assert!((commission(10.0, 1000.0, &policy) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn round_qty_half_away_from_zero_at_tenths() {
        assert!((round_qty(0.14, 10.0) - 0.1).abs() < 1e-9);
        assert!((round_qty(0.16, 10.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn round_qty_whole_shares() {
        assert_eq!(round_qty(3.4, 100.0), 3.0);
        assert_eq!(round_qty(3.5, 100.0), 4.0);
    }
}
