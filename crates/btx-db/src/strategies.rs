use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::Db;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Db {
    pub async fn get_strategies(pool: &PgPool, user_id: &str) -> anyhow::Result<Vec<Strategy>> {
        let rows = sqlx::query_as::<_, Strategy>(
            "select id, name, code, created_at from strategies where user_id = $1 order by id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_strategy(pool: &PgPool, user_id: &str, strategy_id: i64) -> anyhow::Result<Option<Strategy>> {
        let row = sqlx::query_as::<_, Strategy>(
            "select id, name, code, created_at from strategies where id = $1 and user_id = $2",
        )
        .bind(strategy_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn create_strategy(pool: &PgPool, user_id: &str, name: &str, code: &str) -> anyhow::Result<Strategy> {
        let (id,): (i64,) = sqlx::query_as(
            "insert into strategies (user_id, name, code) values ($1, $2, $3) returning id",
        )
        .bind(user_id)
        .bind(name)
        .bind(code)
        .fetch_one(pool)
        .await?;
        Ok(Strategy { id, name: name.to_string(), code: code.to_string(), created_at: None })
    }

    pub async fn update_strategy(
        pool: &PgPool,
        user_id: &str,
        strategy_id: i64,
        name: Option<&str>,
        code: Option<&str>,
    ) -> anyhow::Result<Option<Strategy>> {
        let Some(existing) = Self::get_strategy(pool, user_id, strategy_id).await? else {
            return Ok(None);
        };
        let new_name = name.unwrap_or(&existing.name).to_string();
        let new_code = code.unwrap_or(&existing.code).to_string();
        sqlx::query("update strategies set name = $1, code = $2 where id = $3 and user_id = $4")
            .bind(&new_name)
            .bind(&new_code)
            .bind(strategy_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(Some(Strategy { id: strategy_id, name: new_name, code: new_code, created_at: existing.created_at }))
    }

    pub async fn delete_strategy(pool: &PgPool, user_id: &str, strategy_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("delete from strategies where id = $1 and user_id = $2")
            .bind(strategy_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
