use serde_json::{json, Value};
use sqlx::PgPool;

use crate::Db;

#[derive(Debug, Clone)]
pub struct PortfolioState {
    pub cash: f64,
    pub positions: Value,
    pub trade_log: Value,
    pub equity_curve: Value,
    pub realized: Value,
}

impl Db {
    pub async fn get_portfolio_state(pool: &PgPool, user_id: &str) -> anyhow::Result<Option<PortfolioState>> {
        let row: Option<(f64, Value, Value, Value, Value)> = sqlx::query_as(
            "select cash, positions_json, trade_log_json, equity_curve_json, realized_json
             from portfolios where user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(cash, positions, trade_log, equity_curve, realized)| PortfolioState {
            cash,
            positions,
            trade_log,
            equity_curve,
            realized,
        }))
    }

    pub async fn save_portfolio_state(
        pool: &PgPool,
        user_id: &str,
        cash: f64,
        positions: &Value,
        trade_log: &Value,
        equity_curve: &Value,
        realized: &Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "insert into portfolios (user_id, cash, positions_json, trade_log_json, equity_curve_json, realized_json, updated_at)
             values ($1, $2, $3, $4, $5, $6, now())
             on conflict (user_id) do update set
               cash = excluded.cash,
               positions_json = excluded.positions_json,
               trade_log_json = excluded.trade_log_json,
               equity_curve_json = excluded.equity_curve_json,
               realized_json = excluded.realized_json,
               updated_at = now()",
        )
        .bind(user_id)
        .bind(cash)
        .bind(positions)
        .bind(trade_log)
        .bind(equity_curve)
        .bind(realized)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn clear_portfolio_state(pool: &PgPool, user_id: &str, initial_cash: f64) -> anyhow::Result<()> {
        Self::save_portfolio_state(pool, user_id, initial_cash, &json!([]), &json!([]), &json!([]), &json!({})).await
    }
}
