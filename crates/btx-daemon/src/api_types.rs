//! Request/response DTOs for the HTTP surface (§6), mirroring the upstream
//! pydantic models field-for-field.

use btx_analytics::Report;
use btx_portfolio::{EquityPoint, TradeEvent};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
pub struct Candle {
    pub time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub sma: Vec<Option<f64>>,
    pub ema: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
}

#[derive(Serialize)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: f64,
}

#[derive(Deserialize)]
pub struct WatchlistQuery {
    pub symbols: String,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub symbol: String,
    pub price: Option<f64>,
    pub prev_close: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
}

#[derive(Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: f64,
    pub side: &'static str,
    pub avg_price: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub realized_pnl: f64,
}

#[derive(Serialize)]
pub struct PortfolioResponse {
    pub cash: f64,
    pub reserved_cash: f64,
    pub buying_power: f64,
    pub short_exposure: f64,
    pub value: f64,
    pub positions: Vec<PositionView>,
    pub trade_log: Vec<TradeEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_cash: f64,
    pub metrics: Report,
}

#[derive(Deserialize)]
pub struct OpenPositionRequest {
    pub symbol: String,
    pub quantity: f64,
    pub side: String,
}

#[derive(Deserialize)]
pub struct ClosePositionRequest {
    pub symbol: String,
    pub quantity: f64,
}

#[derive(Serialize)]
pub struct OkMessage {
    pub ok: bool,
    pub message: String,
}

#[derive(Deserialize)]
pub struct StrategyCreate {
    pub name: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct StrategyUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
pub struct StrategyResponse {
    pub ok: bool,
    pub strategy: btx_db::Strategy,
}

#[derive(Serialize)]
pub struct StrategiesResponse {
    pub strategies: Vec<btx_db::Strategy>,
}

#[derive(Deserialize)]
pub struct RunStrategyRequest {
    pub strategy_id: i64,
    pub symbols: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub train_pct: Option<f64>,
}

#[derive(Serialize)]
pub struct SymbolResult {
    pub strategy: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct RunStrategyResponse {
    pub ok: bool,
    pub results: Vec<SymbolResult>,
    pub run_id: i64,
}

#[derive(Serialize)]
pub struct RunsResponse {
    pub runs: Vec<btx_db::RunSummary>,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub run: btx_db::RunRecord,
}
