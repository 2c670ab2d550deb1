//! Axum router and all HTTP handlers for btx-daemon. `build_router` is
//! the single entry point; `main.rs` attaches CORS/trace/security-header
//! layers after this call so scenario tests can exercise the bare router.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::Value;

use crate::api_types::*;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::portfolio_bridge;
use crate::state::AppState;

/// Paths exempt from the general rate limiter, matching the upstream
/// middleware's skip-list.
const RATE_LIMIT_SKIP_PATHS: &[&str] = &["/health", "/docs", "/redoc", "/openapi.json"];

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/search", get(search))
        .route("/api/v1/stock/:symbol", get(get_stock_data))
        .route("/api/v1/stock/:symbol/price", get(get_stock_price))
        .route("/api/v1/watchlist/quotes", get(get_watchlist_quotes))
        .route("/api/v1/portfolio", get(get_portfolio))
        .route("/api/v1/portfolio/position", post(open_position))
        .route("/api/v1/portfolio/position", delete(close_position))
        .route("/api/v1/portfolio/position/close", post(close_position))
        .route("/api/v1/portfolio/clear", post(clear_portfolio))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/settings", put(update_settings))
        .route("/api/v1/strategies", get(list_strategies))
        .route("/api/v1/strategies", post(create_strategy))
        .route("/api/v1/strategies/run", post(run_strategy))
        .route("/api/v1/strategies/:id", get(get_strategy))
        .route("/api/v1/strategies/:id", put(update_strategy))
        .route("/api/v1/strategies/:id", delete(delete_strategy))
        .route("/api/v1/runs", get(list_runs))
        .route("/api/v1/runs", delete(clear_runs))
        .route("/api/v1/runs/:id", get(get_run))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

/// Applies the general per-caller rate limit ahead of every handler (§4.8),
/// keyed by a prefix of the bearer token when present, else by client IP —
/// mirroring the upstream `rate_limit_middleware`'s `general:{key}` scheme.
async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if RATE_LIMIT_SKIP_PATHS.contains(&path) {
        return Ok(next.run(req).await);
    }

    let key = match req.headers().get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(h) if !h.is_empty() => format!("general:{}", &h[..h.len().min(32)]),
        _ => format!("general:ip:{}", addr.ip()),
    };

    if state.general_rate_limiter.check(&key) {
        Ok(next.run(req).await)
    } else {
        Err(ApiError::RateLimited)
    }
}

fn validate_symbol(config: &btx_config::Config, raw: &str) -> Result<String, ApiError> {
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return Err(ApiError::validation("symbol cannot be empty"));
    }
    if s.len() > config.symbol_max_len {
        return Err(ApiError::validation(format!("symbol too long (max {})", config.symbol_max_len)));
    }
    if !s.chars().all(btx_config::is_valid_symbol_char) {
        return Err(ApiError::validation("symbol contains invalid characters"));
    }
    Ok(s)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(serde::Deserialize)]
pub struct SearchQuery {
    q: String,
}

async fn search(
    State(state): State<Arc<AppState>>,
    AuthUser(_user_id): AuthUser,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let hits = state
        .data_provider
        .search(&q.q, 10)
        .await
        .map_err(|e| ApiError::from(anyhow::anyhow!(e)))?;
    Ok(Json(
        hits.into_iter().map(|h| SearchResult { symbol: h.symbol, name: h.name, kind: h.kind }).collect(),
    ))
}

#[derive(serde::Deserialize, Default)]
pub struct StockQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    750
}

async fn get_stock_data(
    State(state): State<Arc<AppState>>,
    AuthUser(_user_id): AuthUser,
    Path(symbol): Path<String>,
    Query(q): Query<StockQuery>,
) -> Result<Json<StockResponse>, ApiError> {
    let symbol = validate_symbol(&state.config, &symbol)?;
    let limit = q.limit.clamp(1, 5000);
    let start = q.start_date.unwrap_or(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    let end = q.end_date.unwrap_or_else(|| chrono::Utc::now().date_naive());

    let series = state
        .stock_cache
        .get_or_fetch(state.data_provider.as_ref(), &symbol, start, end)
        .await
        .map_err(|e| match e {
            crate::data_provider::DataProviderError::Empty => ApiError::not_found(format!("no data for {symbol}")),
            other => ApiError::from(anyhow::anyhow!(other)),
        })?;

    let bars = series.bars();
    let windowed: Vec<_> = bars
        .iter()
        .filter(|b| b.date >= start && b.date <= end)
        .collect();
    let tail: Vec<_> = windowed.iter().rev().take(limit).rev().copied().collect();

    let closes: Vec<f64> = tail.iter().map(|b| b.close).collect();
    let candles: Vec<Candle> = tail
        .iter()
        .map(|b| Candle { time: b.date.to_string(), open: b.open, high: b.high, low: b.low, close: b.close })
        .collect();

    let sma = btx_priceseries::indicators::sma(&closes, 14);
    let ema = btx_priceseries::indicators::ema(&closes, 14);
    let rsi = btx_priceseries::indicators::rsi(&closes, 14);

    Ok(Json(StockResponse { symbol, candles, sma, ema, rsi }))
}

async fn get_stock_price(
    State(state): State<Arc<AppState>>,
    AuthUser(_user_id): AuthUser,
    Path(symbol): Path<String>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = validate_symbol(&state.config, &symbol)?;
    let end = chrono::Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * 2);
    let series = state
        .stock_cache
        .get_or_fetch(state.data_provider.as_ref(), &symbol, start, end)
        .await
        .map_err(|_| ApiError::not_found(format!("no data for {symbol}")))?;
    let price = series.price(series.last_index());
    Ok(Json(PriceResponse { symbol, price }))
}

async fn get_watchlist_quotes(
    State(state): State<Arc<AppState>>,
    AuthUser(_user_id): AuthUser,
    Query(q): Query<WatchlistQuery>,
) -> Json<Vec<QuoteResponse>> {
    let end = chrono::Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * 2);
    let mut out = Vec::new();
    for raw in q.symbols.split(',') {
        let sym = raw.trim().to_uppercase();
        if sym.is_empty() {
            continue;
        }
        match state.stock_cache.get_or_fetch(state.data_provider.as_ref(), &sym, start, end).await {
            Ok(series) if series.len() >= 1 => {
                let price = series.price(series.last_index());
                let prev_close = if series.len() >= 2 { series.price(series.last_index() - 1) } else { price };
                let change = price - prev_close;
                let change_pct = if prev_close != 0.0 { change / prev_close * 100.0 } else { 0.0 };
                out.push(QuoteResponse {
                    symbol: sym,
                    price: Some(price),
                    prev_close: Some(prev_close),
                    change: Some(change),
                    change_pct: Some(change_pct),
                });
            }
            _ => out.push(QuoteResponse { symbol: sym, price: None, prev_close: None, change: None, change_pct: None }),
        }
    }
    Json(out)
}

/// Marks every open position to its latest cached/fetched price, falling
/// back to the stored average cost when the symbol can't be resolved (e.g.
/// the provider has gone away since the position was opened).
async fn marks_for(state: &AppState, portfolio: &btx_portfolio::Portfolio) -> btx_portfolio::MarkMap {
    let mut marks = BTreeMap::new();
    let end = chrono::Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * 2);
    for (symbol, pos) in &portfolio.positions {
        let price = match state.stock_cache.get_or_fetch(state.data_provider.as_ref(), symbol, start, end).await {
            Ok(series) if !series.is_empty() => series.price(series.last_index()),
            _ => pos.avg_price,
        };
        marks.insert(symbol.clone(), price);
    }
    marks
}

async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let settings = btx_db::Db::get_settings(&state.db, &user_id).await?;
    let portfolio = portfolio_bridge::load_portfolio(&state.db, &user_id, &settings).await?;
    let marks = marks_for(&state, &portfolio).await;

    let initial_cash = settings.get("initial_cash").and_then(|v| v.as_f64()).unwrap_or(100_000.0);
    let value = portfolio.get_value(&marks);

    let positions = portfolio
        .positions
        .iter()
        .map(|(symbol, p)| {
            let price = *marks.get(symbol).unwrap_or(&p.avg_price);
            let qty_abs = p.quantity.abs();
            let pnl = if p.is_long() { (price - p.avg_price) * p.quantity } else { (p.avg_price - price) * qty_abs };
            let pnl_pct = if p.avg_price != 0.0 && qty_abs != 0.0 { pnl / (p.avg_price * qty_abs) * 100.0 } else { 0.0 };
            PositionView {
                symbol: symbol.clone(),
                quantity: qty_abs,
                side: if p.is_long() { "long" } else { "short" },
                avg_price: p.avg_price,
                current_price: price,
                pnl,
                pnl_pct,
                realized_pnl: p.realized_pnl,
            }
        })
        .collect();

    let mut equity_curve = vec![btx_portfolio::EquityPoint { i: 0, v: initial_cash, time: None }];
    equity_curve.extend(portfolio.equity_curve.iter().copied());
    if equity_curve.last().map(|p| (p.v - value).abs() > 0.01).unwrap_or(true) {
        let next_i = equity_curve.len().max(1);
        equity_curve.push(btx_portfolio::EquityPoint { i: next_i, v: value, time: None });
    }

    let report = btx_analytics::compute_report(&portfolio.trade_log, &equity_curve, initial_cash);

    Ok(Json(PortfolioResponse {
        cash: portfolio.cash,
        reserved_cash: portfolio.reserved_cash(&marks),
        buying_power: portfolio.buying_power(&marks),
        short_exposure: portfolio.short_market_value(&marks),
        value,
        positions,
        trade_log: portfolio.trade_log.clone(),
        equity_curve,
        initial_cash,
        metrics: report,
    }))
}

async fn open_position(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<OpenPositionRequest>,
) -> Result<Json<OkMessage>, ApiError> {
    if req.quantity <= 0.0 {
        return Err(ApiError::validation("quantity must be positive"));
    }
    if req.side != "long" && req.side != "short" {
        return Err(ApiError::validation("side must be 'long' or 'short'"));
    }
    let symbol = validate_symbol(&state.config, &req.symbol)?;

    let settings = btx_db::Db::get_settings(&state.db, &user_id).await?;
    let mut portfolio = portfolio_bridge::load_portfolio(&state.db, &user_id, &settings).await?;
    let end = chrono::Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * 2);
    let series = state
        .stock_cache
        .get_or_fetch(state.data_provider.as_ref(), &symbol, start, end)
        .await
        .map_err(|_| ApiError::not_found(format!("no data for {symbol}")))?;
    let mut marks = marks_for(&state, &portfolio).await;
    let price = series.price(series.last_index());
    let bar_index = portfolio.trade_log.len();

    let result = if req.side == "long" {
        portfolio.enter_long(&symbol, req.quantity, price, bar_index, end, &mut marks)
    } else {
        portfolio.enter_short(&symbol, req.quantity, price, bar_index, end, &mut marks)
    };
    result.map_err(|e| ApiError::validation(e.to_string()))?;

    portfolio_bridge::save_portfolio(&state.db, &user_id, &portfolio).await?;
    Ok(Json(OkMessage { ok: true, message: format!("Opened {} {} {}", req.side, req.quantity, symbol) }))
}

async fn close_position(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<ClosePositionRequest>,
) -> Result<Json<OkMessage>, ApiError> {
    if req.quantity <= 0.0 {
        return Err(ApiError::validation("quantity must be positive"));
    }
    let symbol = validate_symbol(&state.config, &req.symbol)?;

    let settings = btx_db::Db::get_settings(&state.db, &user_id).await?;
    let mut portfolio = portfolio_bridge::load_portfolio(&state.db, &user_id, &settings).await?;
    let end = chrono::Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * 2);
    let series = state
        .stock_cache
        .get_or_fetch(state.data_provider.as_ref(), &symbol, start, end)
        .await
        .map_err(|_| ApiError::not_found(format!("no data for {symbol}")))?;
    let mut marks = marks_for(&state, &portfolio).await;
    let price = series.price(series.last_index());
    let bar_index = portfolio.trade_log.len();

    portfolio
        .exit(&symbol, req.quantity, price, bar_index, end, &mut marks)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    portfolio_bridge::save_portfolio(&state.db, &user_id, &portfolio).await?;
    Ok(Json(OkMessage { ok: true, message: format!("Closed {} {}", req.quantity, symbol) }))
}

async fn clear_portfolio(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<OkMessage>, ApiError> {
    let settings = btx_db::Db::get_settings(&state.db, &user_id).await?;
    let initial_cash = settings.get("initial_cash").and_then(|v| v.as_f64()).unwrap_or(100_000.0);
    let mut portfolio = portfolio_bridge::load_portfolio(&state.db, &user_id, &settings).await?;
    portfolio.clear_history(initial_cash);
    portfolio_bridge::save_portfolio(&state.db, &user_id, &portfolio).await?;
    Ok(Json(OkMessage { ok: true, message: "History cleared".to_string() }))
}

async fn get_settings(State(state): State<Arc<AppState>>, AuthUser(user_id): AuthUser) -> Result<Json<Value>, ApiError> {
    Ok(Json(btx_db::Db::get_settings(&state.db, &user_id).await?))
}

fn validate_range(value: Option<f64>, name: &str, min: f64, max: f64, max_inclusive: bool) -> Result<(), ApiError> {
    if let Some(v) = value {
        let ok = if max_inclusive { v >= min && v <= max } else { v >= min && v < max };
        if !ok {
            return Err(ApiError::validation(format!("{name} out of range")));
        }
    }
    Ok(())
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(upd): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut settings = btx_db::Db::get_settings(&state.db, &user_id).await?;

    validate_range(upd.get("slippage").and_then(|v| v.as_f64()), "slippage", 0.0, 1.0, false)?;
    validate_range(upd.get("commission").and_then(|v| v.as_f64()), "commission", 0.0, 1.0, false)?;
    validate_range(upd.get("max_position_pct").and_then(|v| v.as_f64()), "max_position_pct", 0.0, 1.0, true)?;
    validate_range(upd.get("min_cash_reserve_pct").and_then(|v| v.as_f64()), "min_cash_reserve_pct", 0.0, 1.0, true)?;
    validate_range(
        upd.get("short_margin_requirement").and_then(|v| v.as_f64()),
        "short_margin_requirement",
        1.0,
        3.0,
        true,
    )?;
    if let Some(cash) = upd.get("initial_cash").and_then(|v| v.as_f64()) {
        if cash < 0.0 {
            return Err(ApiError::validation("initial_cash must be >= 0"));
        }
    }

    if let (Some(obj), Some(upd_obj)) = (settings.as_object_mut(), upd.as_object()) {
        for (k, v) in upd_obj {
            if !v.is_null() {
                obj.insert(k.clone(), v.clone());
            }
        }
    }

    let max_tv = settings.get("max_trade_value").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let min_tv = settings.get("min_trade_value").and_then(|v| v.as_f64()).unwrap_or(0.0);
    if max_tv > 0.0 && min_tv > 0.0 && max_tv < min_tv {
        return Err(ApiError::validation("max_trade_value must be >= min_trade_value"));
    }

    btx_db::Db::save_settings(&state.db, &user_id, &settings).await?;
    Ok(Json(serde_json::json!({ "ok": true, "settings": settings })))
}

async fn list_strategies(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StrategiesResponse>, ApiError> {
    let strategies = btx_db::Db::get_strategies(&state.db, &user_id).await?;
    Ok(Json(StrategiesResponse { strategies }))
}

/// A strategy must compile and instantiate cleanly before it is stored —
/// the upstream runs a one-bar sanity backtest; this rewrite just proves
/// the sandbox accepts the source (§4.3).
fn validate_strategy_source(code: &str) -> Result<(), ApiError> {
    btx_sandbox::CompiledStrategy::compile(code).map_err(|e| ApiError::validation(e.to_string()))?;
    Ok(())
}

async fn create_strategy(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<StrategyCreate>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("strategy name cannot be empty"));
    }
    if req.code.trim().is_empty() {
        return Err(ApiError::validation("strategy code cannot be empty"));
    }
    if req.code.len() > state.config.strategy_code_max_len {
        return Err(ApiError::validation(format!(
            "strategy code exceeds maximum length ({})",
            state.config.strategy_code_max_len
        )));
    }

    let existing = btx_db::Db::get_strategies(&state.db, &user_id).await?;
    if existing.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
        return Err(ApiError::validation(format!("strategy '{name}' already exists")));
    }

    validate_strategy_source(&req.code)?;

    let strategy = btx_db::Db::create_strategy(&state.db, &user_id, name, &req.code).await?;
    Ok(Json(StrategyResponse { ok: true, strategy }))
}

async fn get_strategy(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let strategy = btx_db::Db::get_strategy(&state.db, &user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("strategy not found"))?;
    Ok(Json(StrategyResponse { ok: true, strategy }))
}

async fn update_strategy(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(upd): Json<StrategyUpdate>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let existing = btx_db::Db::get_strategy(&state.db, &user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("strategy not found"))?;

    if let Some(name) = &upd.name {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ApiError::validation("strategy name cannot be empty"));
        }
        let others = btx_db::Db::get_strategies(&state.db, &user_id).await?;
        if others.iter().any(|s| s.id != id && s.name.eq_ignore_ascii_case(trimmed)) {
            return Err(ApiError::validation(format!("strategy '{trimmed}' already exists")));
        }
    }
    if let Some(code) = &upd.code {
        if code.trim().is_empty() {
            return Err(ApiError::validation("strategy code cannot be empty"));
        }
        if code.len() > state.config.strategy_code_max_len {
            return Err(ApiError::validation(format!(
                "strategy code exceeds maximum length ({})",
                state.config.strategy_code_max_len
            )));
        }
        validate_strategy_source(code)?;
    }

    let updated = btx_db::Db::update_strategy(
        &state.db,
        &user_id,
        id,
        upd.name.as_deref().map(str::trim),
        upd.code.as_deref(),
    )
    .await?
    .unwrap_or(existing);

    Ok(Json(StrategyResponse { ok: true, strategy: updated }))
}

async fn delete_strategy(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = btx_db::Db::delete_strategy(&state.db, &user_id, id).await?;
    if !deleted {
        return Err(ApiError::not_found("strategy not found"));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn run_strategy(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<RunStrategyRequest>,
) -> Result<Json<RunStrategyResponse>, ApiError> {
    if !state.strategy_rate_limiter.check(&format!("strategy:{user_id}")) {
        return Err(ApiError::RateLimited);
    }

    let strategy = btx_db::Db::get_strategy(&state.db, &user_id, req.strategy_id)
        .await?
        .ok_or_else(|| ApiError::not_found("strategy not found"))?;

    let symbols: Vec<String> = req.symbols.iter().map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect();
    if symbols.is_empty() {
        return Err(ApiError::validation("select at least one stock"));
    }
    if let Some(pct) = req.train_pct {
        if pct <= 0.0 || pct >= 1.0 {
            return Err(ApiError::validation("train_pct must be between 0 and 1 (exclusive)"));
        }
    }

    let start = req
        .start_date
        .parse::<NaiveDate>()
        .map_err(|_| ApiError::validation("invalid start_date"))?;
    let end = req.end_date.parse::<NaiveDate>().map_err(|_| ApiError::validation("invalid end_date"))?;

    let settings = btx_db::Db::get_settings(&state.db, &user_id).await?;
    let config = portfolio_bridge::settings_to_config(&settings);
    let initial_cash = settings.get("initial_cash").and_then(|v| v.as_f64()).unwrap_or(100_000.0);
    let auto_liquidate_end = settings.get("auto_liquidate_end").and_then(|v| v.as_bool()).unwrap_or(true);

    let mut series_by_symbol = BTreeMap::new();
    let mut results = Vec::new();
    for symbol in &symbols {
        match state.stock_cache.get_or_fetch(state.data_provider.as_ref(), symbol, start, end).await {
            Ok(series) => {
                series_by_symbol.insert(symbol.clone(), (*series).clone());
            }
            Err(e) => {
                results.push(SymbolResult {
                    strategy: strategy.name.clone(),
                    symbol: symbol.clone(),
                    start_value: None,
                    end_value: None,
                    pnl: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let outcome = btx_backtest::run_strategy(
        &strategy.code,
        &series_by_symbol,
        initial_cash,
        config,
        start,
        end,
        req.train_pct,
        auto_liquidate_end,
    );

    for r in &outcome.per_symbol {
        results.push(SymbolResult {
            strategy: strategy.name.clone(),
            symbol: r.symbol.clone(),
            start_value: r.error.is_none().then_some(r.start_value),
            end_value: r.error.is_none().then_some(r.end_value),
            pnl: r.error.is_none().then_some(r.pnl),
            error: r.error.clone(),
        });
    }

    let symbols_json = serde_json::to_value(&symbols).context_json()?;
    let results_json = serde_json::to_value(&results).context_json()?;
    let portfolio_json = serde_json::json!({
        "initial_cash": initial_cash,
        "value": outcome.per_symbol.iter().map(|r| r.end_value).sum::<f64>(),
        "trade_log": outcome.combined_trade_log,
        "equity_curve": outcome.equity_curve,
    });
    let metrics_json = serde_json::json!({
        "equity": outcome.report.equity,
        "trades": outcome.report.trades,
        "symbols": outcome.report.symbols,
        "train_metrics": outcome.train_report,
        "test_metrics": outcome.test_report,
    });

    let new_run = btx_db::NewRun {
        strategy_id: strategy.id,
        strategy_name: &strategy.name,
        symbols: &symbols_json,
        start_date: &req.start_date,
        end_date: &req.end_date,
        results: &results_json,
        portfolio: &portfolio_json,
        metrics: &metrics_json,
    };
    let run_id = btx_db::Db::save_run(&state.db, &user_id, &new_run).await?;

    Ok(Json(RunStrategyResponse { ok: true, results, run_id }))
}

trait ResultJsonExt<T> {
    fn context_json(self) -> Result<T, ApiError>;
}

impl<T> ResultJsonExt<T> for Result<T, serde_json::Error> {
    fn context_json(self) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from(anyhow::anyhow!(e)))
    }
}

async fn list_runs(State(state): State<Arc<AppState>>, AuthUser(user_id): AuthUser) -> Result<Json<RunsResponse>, ApiError> {
    let runs = btx_db::Db::get_runs(&state.db, &user_id, state.config.max_runs_per_user).await?;
    Ok(Json(RunsResponse { runs }))
}

async fn clear_runs(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    btx_db::Db::clear_runs(&state.db, &user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RunResponse>, ApiError> {
    let mut record = btx_db::Db::get_run(&state.db, &user_id, id).await?.ok_or_else(|| ApiError::not_found("run not found"))?;

    let equity_curve: Vec<btx_portfolio::EquityPoint> = record
        .portfolio
        .get("equity_curve")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ApiError::from(anyhow::anyhow!(e)))?
        .unwrap_or_default();
    let trade_log: Vec<btx_portfolio::TradeEvent> = record
        .portfolio
        .get("trade_log")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ApiError::from(anyhow::anyhow!(e)))?
        .unwrap_or_default();

    if btx_backtest::needs_legacy_reconstruction(&equity_curve, &trade_log) {
        let initial = record.portfolio.get("initial_cash").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let start = record.start_date.parse::<NaiveDate>().unwrap_or_else(|_| chrono::Utc::now().date_naive());
        let end = record.end_date.parse::<NaiveDate>().unwrap_or(start);
        let reconstructed = btx_backtest::reconstruct_equity_curve_from_trades(&trade_log, initial, start, end);
        let report = btx_analytics::compute_report(&trade_log, &reconstructed, initial);

        if let Some(obj) = record.portfolio.as_object_mut() {
            obj.insert("equity_curve".to_string(), serde_json::to_value(&reconstructed).unwrap());
        }
        record.metrics = serde_json::json!({
            "equity": report.equity,
            "trades": report.trades,
            "symbols": report.symbols,
        });
    }

    Ok(Json(RunResponse { run: record }))
}
