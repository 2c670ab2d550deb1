//! btx-db
//!
//! Postgres persistence for settings, portfolio snapshots, strategies, and
//! run history. The logical schema (four tables: settings/portfolios/
//! strategies/runs) is carried over unchanged from the upstream SQLite
//! store; the connection model is not — a pooled async `PgPool` replaces a
//! thread-local `sqlite3.connect` handle, since this crate backs a
//! multi-worker async daemon rather than a single-threaded WSGI-style app.

mod portfolios;
mod runs;
mod settings;
mod strategies;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use portfolios::PortfolioState;
pub use runs::{NewRun, RunRecord, RunSummary};
pub use strategies::Strategy;

pub const ENV_DB_URL: &str = "ACEMARKET_DB";

/// Namespace for the persistence functions (all `impl Db` blocks across this
/// crate's modules); carries no state itself — callers hold their own
/// `PgPool`.
pub struct Db;

/// Connects to Postgres using the `ACEMARKET_DB` env var (or an explicit
/// URL).
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn connect_from_env() -> anyhow::Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Runs the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.context("db migrate failed")
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_runs_table: bool,
}

/// Connectivity + schema-presence check, used by `btx-cli db status` and the
/// daemon's health endpoint.
pub async fn status(pool: &PgPool) -> anyhow::Result<DbStatus> {
    let (one,): (i32,) =
        sqlx::query_as("select 1").fetch_one(pool).await.context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = 'runs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok: one == 1, has_runs_table: exists })
}
