use serde_json::{json, Value};
use sqlx::PgPool;

use crate::Db;

/// Settings are stored as a JSON blob, merged with these defaults on read so
/// an older row missing a newly-added key (e.g. `share_min_pct`) still
/// yields a complete settings object instead of a partial one.
fn default_settings() -> Value {
    json!({
        "initial_cash": 100000,
        "slippage": 0.0,
        "commission": 0.0,
        "share_min_pct": 10,
        "allow_short": true,
        "max_positions": 0,
        "max_position_pct": 0.0,
        "min_cash_reserve_pct": 0.0,
        "min_trade_value": 0.0,
        "max_trade_value": 0.0,
        "max_order_qty": 0,
        "short_margin_requirement": 1.5,
        "auto_liquidate_end": true,
        "block_lookahead": true,
    })
}

fn default_watchlist() -> Value {
    json!(["AAPL", "MSFT", "GOOGL", "TSLA"])
}

fn merge_with_defaults(stored: &Value) -> Value {
    let mut merged = default_settings();
    if let (Some(merged_obj), Some(stored_obj)) = (merged.as_object_mut(), stored.as_object()) {
        for (k, v) in stored_obj {
            merged_obj.insert(k.clone(), v.clone());
        }
    }
    let has_watchlist = merged.get("watchlist").map(|w| w.is_array()).unwrap_or(false);
    if !has_watchlist {
        merged["watchlist"] = default_watchlist();
    }
    // Legacy migration: only takes effect if the caller never set share_min_pct directly.
    if stored.get("share_min_pct").is_none() {
        if let Some(precision) = stored.get("share_precision").and_then(|v| v.as_i64()) {
            let table = [100, 10, 1];
            let idx = precision.clamp(0, 2) as usize;
            merged["share_min_pct"] = json!(table[idx]);
        }
    }
    merged
}

impl Db {
    pub async fn get_settings(pool: &PgPool, user_id: &str) -> anyhow::Result<Value> {
        let row: Option<(Value,)> =
            sqlx::query_as("select settings_json from settings where user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        match row {
            Some((stored,)) => Ok(merge_with_defaults(&stored)),
            None => {
                let mut out = default_settings();
                out["watchlist"] = default_watchlist();
                Ok(out)
            }
        }
    }

    pub async fn save_settings(pool: &PgPool, user_id: &str, settings: &Value) -> anyhow::Result<()> {
        let merged = merge_with_defaults(settings);
        sqlx::query(
            "insert into settings (user_id, settings_json, updated_at) values ($1, $2, now())
             on conflict (user_id) do update set settings_json = excluded.settings_json, updated_at = now()",
        )
        .bind(user_id)
        .bind(&merged)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_fills_in_missing_keys_from_defaults() {
        let stored = json!({"initial_cash": 5000});
        let merged = merge_with_defaults(&stored);
        assert_eq!(merged["initial_cash"], 5000);
        assert_eq!(merged["share_min_pct"], 10);
        assert!(merged["watchlist"].is_array());
    }

    #[test]
    fn legacy_share_precision_migrates_when_share_min_pct_absent() {
        let stored = json!({"share_precision": 1});
        let merged = merge_with_defaults(&stored);
        assert_eq!(merged["share_min_pct"], 10);
    }

    #[test]
    fn explicit_share_min_pct_overrides_legacy_precision() {
        let stored = json!({"share_precision": 2, "share_min_pct": 100});
        let merged = merge_with_defaults(&stored);
        assert_eq!(merged["share_min_pct"], 100);
    }
}
