use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::Db;

/// Everything the run orchestrator produced for one completed run, ready to
/// persist.
pub struct NewRun<'a> {
    pub strategy_id: i64,
    pub strategy_name: &'a str,
    pub symbols: &'a Value,
    pub start_date: &'a str,
    pub end_date: &'a str,
    pub results: &'a Value,
    pub portfolio: &'a Value,
    pub metrics: &'a Value,
}

/// A lightweight projection of a run, used for the run list endpoint — full
/// trade logs and equity curves are only fetched for a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub strategy: String,
    pub strategy_id: i64,
    pub symbols: Value,
    pub start_date: String,
    pub end_date: String,
    pub start_value: Option<f64>,
    pub end_value: Option<f64>,
    pub pnl: Option<f64>,
    pub total_return_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub trades: Option<i64>,
    pub exits: Option<i64>,
    pub win_rate_pct: Option<f64>,
}

/// The full persisted record for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub strategy_id: i64,
    pub strategy_name: String,
    pub symbols: Value,
    pub start_date: String,
    pub end_date: String,
    pub results: Value,
    pub portfolio: Value,
    pub metrics: Value,
}

fn value_f64(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(|x| x.as_f64())
}

fn value_i64(v: &Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|x| x.as_i64())
}

impl Db {
    pub async fn save_run(pool: &PgPool, user_id: &str, run: &NewRun<'_>) -> anyhow::Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "insert into runs
               (user_id, strategy_id, strategy_name, symbols_json, start_date, end_date,
                results_json, portfolio_json, metrics_json)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             returning id",
        )
        .bind(user_id)
        .bind(run.strategy_id)
        .bind(run.strategy_name)
        .bind(run.symbols)
        .bind(run.start_date)
        .bind(run.end_date)
        .bind(run.results)
        .bind(run.portfolio)
        .bind(run.metrics)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    /// Lists the most recent runs, newest first, capped at `limit` (the
    /// upstream default and hard cap is 25 — see `Config::max_runs_per_user`).
    pub async fn get_runs(pool: &PgPool, user_id: &str, limit: i64) -> anyhow::Result<Vec<RunSummary>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: i64,
            created_at: Option<DateTime<Utc>>,
            strategy_name: String,
            strategy_id: i64,
            symbols_json: Value,
            start_date: String,
            end_date: String,
            metrics_json: Value,
        }

        let rows = sqlx::query_as::<_, Row>(
            "select id, created_at, strategy_name, strategy_id, symbols_json, start_date, end_date, metrics_json
             from runs where user_id = $1 order by id desc limit $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let equity = r.metrics_json.get("equity").cloned().unwrap_or(Value::Null);
                let trades = r.metrics_json.get("trades").cloned().unwrap_or(Value::Null);
                RunSummary {
                    id: r.id,
                    created_at: r.created_at,
                    strategy: r.strategy_name,
                    strategy_id: r.strategy_id,
                    symbols: r.symbols_json,
                    start_date: r.start_date,
                    end_date: r.end_date,
                    start_value: value_f64(&equity, "start_value"),
                    end_value: value_f64(&equity, "end_value"),
                    pnl: value_f64(&equity, "pnl"),
                    total_return_pct: value_f64(&equity, "total_return_pct"),
                    max_drawdown_pct: value_f64(&equity, "max_drawdown_pct"),
                    trades: value_i64(&trades, "trades"),
                    exits: value_i64(&trades, "exits"),
                    win_rate_pct: value_f64(&trades, "win_rate_pct"),
                }
            })
            .collect())
    }

    pub async fn get_run(pool: &PgPool, user_id: &str, run_id: i64) -> anyhow::Result<Option<RunRecord>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: i64,
            created_at: Option<DateTime<Utc>>,
            strategy_id: i64,
            strategy_name: String,
            symbols_json: Value,
            start_date: String,
            end_date: String,
            results_json: Value,
            portfolio_json: Value,
            metrics_json: Value,
        }

        let row = sqlx::query_as::<_, Row>(
            "select id, created_at, strategy_id, strategy_name, symbols_json, start_date, end_date,
                    results_json, portfolio_json, metrics_json
             from runs where id = $1 and user_id = $2",
        )
        .bind(run_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| RunRecord {
            id: r.id,
            created_at: r.created_at,
            strategy_id: r.strategy_id,
            strategy_name: r.strategy_name,
            symbols: r.symbols_json,
            start_date: r.start_date,
            end_date: r.end_date,
            results: r.results_json,
            portfolio: r.portfolio_json,
            metrics: r.metrics_json,
        }))
    }

    pub async fn clear_runs(pool: &PgPool, user_id: &str) -> anyhow::Result<()> {
        sqlx::query("delete from runs where user_id = $1").bind(user_id).execute(pool).await?;
        Ok(())
    }
}
