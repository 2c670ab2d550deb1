//! A TTL + LRU cache of [`PriceSeries`] fronting [`crate::data_provider::DataProvider`]
//! (§4.8, §5 "shared resources"). Hand-rolled rather than pulling in an LRU
//! crate: the eviction policy is a three-line min-by-timestamp scan, the
//! same shape as the upstream `_stock_cache` dict-of-dicts it replaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use btx_priceseries::PriceSeries;
use chrono::NaiveDate;

use crate::data_provider::{DataProvider, DataProviderError};

struct Entry {
    inserted_at: Instant,
    series: Arc<PriceSeries>,
}

/// Process-wide cache, shared across users (market data has no per-user
/// view). Guarded by a single lock: lookups are cheap enough that striping
/// by symbol would add complexity without a measured need.
pub struct StockCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl StockCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached series for `symbol`, fetching and inserting it on
    /// a miss or after expiry. Expired entries are pruned first; insertion
    /// beyond `max_entries` evicts the least-recently-refreshed entry.
    pub async fn get_or_fetch(
        &self,
        provider: &dyn DataProvider,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Arc<PriceSeries>, DataProviderError> {
        {
            let mut entries = self.entries.lock().unwrap();
            let now = Instant::now();
            entries.retain(|_, e| now.duration_since(e.inserted_at) <= self.ttl);
            if let Some(entry) = entries.get_mut(symbol) {
                entry.inserted_at = now;
                return Ok(entry.series.clone());
            }
        }

        let bars = provider.fetch_ohlc(symbol, start, end).await?;
        let series = Arc::new(PriceSeries::from_bars(symbol, bars));
        if series.is_empty() {
            return Err(DataProviderError::Empty);
        }

        let mut entries = self.entries.lock().unwrap();
        entries.insert(symbol.to_string(), Entry { inserted_at: Instant::now(), series: series.clone() });
        if entries.len() > self.max_entries {
            if let Some(lru_key) = entries
                .iter()
                .filter(|(k, _)| k.as_str() != symbol)
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&lru_key);
            }
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use btx_priceseries::Bar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProvider for CountingProvider {
        async fn fetch_ohlc(&self, symbol: &str, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<Bar>, DataProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0 + symbol.len() as f64,
            }])
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<crate::data_provider::TickerHit>, DataProviderError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache_instead_of_the_provider() {
        let cache = StockCache::new(Duration::from_secs(3600), 64);
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        cache.get_or_fetch(&provider, "X", start, end).await.unwrap();
        cache.get_or_fetch(&provider, "X", start, end).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_caps_entry_count_at_max() {
        let cache = StockCache::new(Duration::from_secs(3600), 2);
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        cache.get_or_fetch(&provider, "A", start, end).await.unwrap();
        cache.get_or_fetch(&provider, "B", start, end).await.unwrap();
        cache.get_or_fetch(&provider, "C", start, end).await.unwrap();
        assert_eq!(cache.entries.lock().unwrap().len(), 2);
    }
}
