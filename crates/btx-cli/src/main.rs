//! btx-cli entry point.
//!
//! Mirrors the existing CLI's flat `Db`/`Run`-style subcommand layout: one
//! `Cli`/`Commands` enum, handlers inlined in `main`, errors reported via
//! `anyhow::Context` rather than a custom error type.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use btx_priceseries::{Bar, PriceSeries};

#[derive(Parser)]
#[command(name = "btx")]
#[command(about = "Paper-trading backtest engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Run a single backtest from local OHLC CSV files
    Run {
        /// Path to a Rhai strategy source file
        #[arg(long)]
        strategy: PathBuf,

        /// Directory containing one `<SYMBOL>.csv` file per symbol
        #[arg(long)]
        data_dir: PathBuf,

        /// Symbols to load from `data_dir` (comma-separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Backtest start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Backtest end date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Total starting cash, split evenly across symbols
        #[arg(long, default_value_t = 100_000.0)]
        initial_cash: f64,

        /// Fraction of the date range used for the train leg (0,1 exclusive)
        #[arg(long)]
        train_pct: Option<f64>,

        /// Persist the resulting run to the database
        #[arg(long)]
        save: bool,

        /// User id to persist the run under
        #[arg(long, default_value = "cli-user")]
        user: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = btx_db::connect_from_env().await.context("connecting to database")?;
            match cmd {
                DbCmd::Status => {
                    let status = btx_db::status(&pool).await.context("querying db status")?;
                    println!("db_ok={} has_runs_table={}", status.ok, status.has_runs_table);
                }
                DbCmd::Migrate => {
                    btx_db::migrate(&pool).await.context("running migrations")?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Run { strategy, data_dir, symbols, start, end, initial_cash, train_pct, save, user } => {
            if symbols.is_empty() {
                anyhow::bail!("at least one symbol is required (--symbols)");
            }
            if let Some(pct) = train_pct {
                if pct <= 0.0 || pct >= 1.0 {
                    anyhow::bail!("--train-pct must be between 0 and 1 (exclusive)");
                }
            }

            let code = std::fs::read_to_string(&strategy)
                .with_context(|| format!("reading strategy source from {}", strategy.display()))?;

            let mut series_by_symbol = BTreeMap::new();
            for symbol in &symbols {
                let symbol = symbol.trim().to_uppercase();
                let csv_path = data_dir.join(format!("{symbol}.csv"));
                let series = load_price_series(&symbol, &csv_path)
                    .with_context(|| format!("loading price data for {symbol} from {}", csv_path.display()))?;
                series_by_symbol.insert(symbol, series);
            }

            let config = btx_portfolio::PortfolioConfig::default();
            let outcome = btx_backtest::run_strategy(
                &code,
                &series_by_symbol,
                initial_cash,
                config,
                start,
                end,
                train_pct,
                true,
            );

            println!("=== per-symbol results ===");
            for r in &outcome.per_symbol {
                match &r.error {
                    Some(err) => println!("{}: error: {err}", r.symbol),
                    None => println!(
                        "{}: start={:.2} end={:.2} pnl={:.2}",
                        r.symbol, r.start_value, r.end_value, r.pnl
                    ),
                }
            }

            println!("=== combined ===");
            println!(
                "total_return_pct={:.2} max_drawdown_pct={:.2} trades={} win_rate_pct={:.1}",
                outcome.report.equity.total_return_pct,
                outcome.report.equity.max_drawdown_pct,
                outcome.report.trades.exits,
                outcome.report.trades.win_rate_pct,
            );

            if save {
                let pool = btx_db::connect_from_env().await.context("connecting to database")?;
                let strategy_name =
                    strategy.file_stem().and_then(|s| s.to_str()).unwrap_or("cli-strategy").to_string();

                let existing = btx_db::Db::get_strategies(&pool, &user).await.context("listing strategies")?;
                let strategy_row = match existing.into_iter().find(|s| s.name == strategy_name) {
                    Some(s) => s,
                    None => btx_db::Db::create_strategy(&pool, &user, &strategy_name, &code)
                        .await
                        .context("saving strategy")?,
                };

                let symbols_json = serde_json::to_value(&symbols)?;
                let results_json = serde_json::to_value(
                    outcome
                        .per_symbol
                        .iter()
                        .map(|r| {
                            serde_json::json!({
                                "symbol": r.symbol,
                                "start_value": r.start_value,
                                "end_value": r.end_value,
                                "pnl": r.pnl,
                                "error": r.error,
                            })
                        })
                        .collect::<Vec<_>>(),
                )?;
                let portfolio_json = serde_json::json!({
                    "initial_cash": initial_cash,
                    "trade_log": outcome.combined_trade_log,
                    "equity_curve": outcome.equity_curve,
                });
                let metrics_json = serde_json::json!({
                    "equity": outcome.report.equity,
                    "trades": outcome.report.trades,
                    "symbols": outcome.report.symbols,
                });

                let new_run = btx_db::NewRun {
                    strategy_id: strategy_row.id,
                    strategy_name: &strategy_row.name,
                    symbols: &symbols_json,
                    start_date: &start.to_string(),
                    end_date: &end.to_string(),
                    results: &results_json,
                    portfolio: &portfolio_json,
                    metrics: &metrics_json,
                };
                let run_id = btx_db::Db::save_run(&pool, &user, &new_run).await.context("saving run")?;
                println!("run_id={run_id}");
            }
        }
    }

    Ok(())
}

/// Reads a `date,open,high,low,close` CSV (no other columns required) into a
/// [`PriceSeries`], mirroring the OHLC shape `stock.py` fetches over the wire.
fn load_price_series(symbol: &str, path: &Path) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date: NaiveDate = record.get(0).context("missing date column")?.parse().context("invalid date")?;
        let open: f64 = record.get(1).context("missing open column")?.parse().context("invalid open")?;
        let high: f64 = record.get(2).context("missing high column")?.parse().context("invalid high")?;
        let low: f64 = record.get(3).context("missing low column")?.parse().context("invalid low")?;
        let close: f64 = record.get(4).context("missing close column")?.parse().context("invalid close")?;
        bars.push(Bar { date, open, high, low, close });
    }
    let series = PriceSeries::from_bars(symbol, bars);
    if series.is_empty() {
        anyhow::bail!("no usable OHLC rows in {}", path.display());
    }
    Ok(series)
}
