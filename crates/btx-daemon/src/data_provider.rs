//! Market-data fetching: an external collaborator per §1 ("not the subject
//! of deep design work... but a complete repository still implements a
//! working version"). The core never depends on this trait directly — only
//! [`crate::stock_cache::StockCache`] and the `/search` handler do.

use std::fmt;

use async_trait::async_trait;
use btx_priceseries::Bar;
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct TickerHit {
    pub symbol: String,
    pub name: String,
    pub kind: String,
}

#[derive(Debug)]
pub enum DataProviderError {
    Upstream(String),
    Empty,
}

impl fmt::Display for DataProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataProviderError::Upstream(msg) => write!(f, "upstream data provider error: {msg}"),
            DataProviderError::Empty => write!(f, "no data returned"),
        }
    }
}

impl std::error::Error for DataProviderError {}

/// A source of OHLC history and ticker search results. Implementations are
/// never trusted with anything beyond read-only market data: the daemon
/// treats this as a pure data fetch, same as the sandbox treats strategy
/// code as data rather than a host capability.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch_ohlc(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataProviderError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TickerHit>, DataProviderError>;
}

/// Real implementation: fetches from a configurable HTTP JSON endpoint via
/// `reqwest`, rather than hardcoding one upstream vendor's API shape.
pub struct HttpDataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Deserialize)]
struct OhlcRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Deserialize)]
struct SearchRow {
    symbol: String,
    name: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
}

fn default_kind() -> String {
    "EQUITY".to_string()
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    async fn fetch_ohlc(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataProviderError> {
        let url = format!("{}/ohlc/{}?start={}&end={}", self.base_url, symbol, start, end);
        let rows: Vec<OhlcRow> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?;

        if rows.is_empty() {
            return Err(DataProviderError::Empty);
        }

        Ok(rows
            .into_iter()
            .map(|r| Bar { date: r.date, open: r.open, high: r.high, low: r.low, close: r.close })
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TickerHit>, DataProviderError> {
        let url = format!("{}/search?q={}&limit={}", self.base_url, query, limit);
        let rows: Vec<SearchRow> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| DataProviderError::Upstream(e.to_string()))?;

        Ok(rows.into_iter().map(|r| TickerHit { symbol: r.symbol, name: r.name, kind: r.kind }).collect())
    }
}
