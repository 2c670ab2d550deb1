//! Translates the persisted JSON blobs in the `portfolios`/`settings` tables
//! into and out of a live [`Portfolio`] (§4.7), the way the upstream
//! `get_portfolio`/`save_portfolio` pair in `api.py` applies settings to a
//! freshly-rehydrated portfolio on every request.

use std::collections::BTreeMap;

use anyhow::Context;
use btx_portfolio::{CommissionPolicy, Constraints, EquityPoint, Portfolio, PortfolioConfig, Position, TradeEvent};
use serde_json::Value;
use sqlx::PgPool;

fn f(settings: &Value, key: &str, default: f64) -> f64 {
    settings.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn b(settings: &Value, key: &str, default: bool) -> bool {
    settings.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Builds trading configuration from a merged settings object, the way the
/// upstream `_apply_portfolio_constraints` plus the `port.set_*` calls do.
pub fn settings_to_config(settings: &Value) -> PortfolioConfig {
    PortfolioConfig {
        slippage: f(settings, "slippage", 0.0),
        commission: CommissionPolicy {
            percent_of_notional: f(settings, "commission", 0.0),
            per_order: f(settings, "commission_per_order", 0.0),
            per_share: f(settings, "commission_per_share", 0.0),
        },
        allow_short: b(settings, "allow_short", true),
        short_margin_requirement: f(settings, "short_margin_requirement", 1.5),
        share_min_pct: f(settings, "share_min_pct", 100.0),
        constraints: Constraints {
            max_positions: f(settings, "max_positions", 0.0) as u32,
            max_position_pct: f(settings, "max_position_pct", 0.0),
            min_cash_reserve_pct: f(settings, "min_cash_reserve_pct", 0.0),
            min_trade_value: f(settings, "min_trade_value", 0.0),
            max_trade_value: f(settings, "max_trade_value", 0.0),
            max_order_qty: f(settings, "max_order_qty", 0.0),
        },
    }
}

/// Loads a user's portfolio from persistence, or starts a fresh one seeded
/// with `initial_cash` if none is stored yet. Positions referencing a
/// symbol the cache/provider can no longer resolve are dropped, mirroring
/// `Portfolio.restore_from_state`'s `symbol_exists` filter.
pub async fn load_portfolio(
    pool: &PgPool,
    user_id: &str,
    settings: &Value,
) -> anyhow::Result<Portfolio> {
    let config = settings_to_config(settings);
    let initial_cash = f(settings, "initial_cash", 100_000.0);

    let state = btx_db::Db::get_portfolio_state(pool, user_id).await.context("load portfolio state")?;
    match state {
        Some(state) => {
            let positions: BTreeMap<String, Position> =
                serde_json::from_value(state.positions).context("decode stored positions")?;
            let trade_log: Vec<TradeEvent> =
                serde_json::from_value(state.trade_log).context("decode stored trade log")?;
            let equity_curve: Vec<EquityPoint> =
                serde_json::from_value(state.equity_curve).context("decode stored equity curve")?;
            let realized: BTreeMap<String, f64> =
                serde_json::from_value(state.realized).context("decode stored realized P&L")?;
            Ok(Portfolio::restore_from_state(
                initial_cash,
                config,
                state.cash,
                positions,
                trade_log,
                equity_curve,
                realized,
                |_symbol| true,
            ))
        }
        None => Ok(Portfolio::new(initial_cash, config)),
    }
}

/// Persists a portfolio's cash/positions/trade log/equity curve. Called
/// only on state-mutating requests — §4.8 "read-only requests must not
/// persist".
pub async fn save_portfolio(pool: &PgPool, user_id: &str, portfolio: &Portfolio) -> anyhow::Result<()> {
    let positions = serde_json::to_value(&portfolio.positions).context("encode positions")?;
    let trade_log = serde_json::to_value(&portfolio.trade_log).context("encode trade log")?;
    let equity_curve = serde_json::to_value(&portfolio.equity_curve).context("encode equity curve")?;
    let realized = serde_json::to_value(&portfolio.realized).context("encode realized P&L")?;
    btx_db::Db::save_portfolio_state(pool, user_id, portfolio.cash, &positions, &trade_log, &equity_curve, &realized)
        .await
        .context("save portfolio state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_to_config_reads_every_constraint_field() {
        let settings = json!({
            "slippage": 0.01,
            "commission": 0.001,
            "allow_short": false,
            "short_margin_requirement": 2.0,
            "share_min_pct": 10,
            "max_positions": 5,
            "max_order_qty": 100,
        });
        let config = settings_to_config(&settings);
        assert_eq!(config.slippage, 0.01);
        assert!(!config.allow_short);
        assert_eq!(config.short_margin_requirement, 2.0);
        assert_eq!(config.constraints.max_positions, 5);
        assert_eq!(config.constraints.max_order_qty, 100.0);
    }
}
