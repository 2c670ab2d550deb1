//! Shared runtime state for btx-daemon: one `Arc<AppState>` cloned into every
//! handler via `State<Arc<AppState>>`.

use std::sync::Arc;

use btx_config::Config;
use sqlx::PgPool;

use crate::auth::{OpaqueTokenVerifier, TokenVerifier};
use crate::data_provider::DataProvider;
use crate::rate_limit::RateLimiter;
use crate::stock_cache::StockCache;

pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub stock_cache: StockCache,
    pub general_rate_limiter: RateLimiter,
    pub strategy_rate_limiter: RateLimiter,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub data_provider: Arc<dyn DataProvider>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, data_provider: Arc<dyn DataProvider>) -> Arc<Self> {
        let stock_cache = StockCache::new(config.stock_cache_ttl, config.stock_cache_max);
        let general_rate_limiter = RateLimiter::new(config.rate_limit_general_window, config.rate_limit_general_max);
        let strategy_rate_limiter =
            RateLimiter::new(config.rate_limit_strategy_window, config.rate_limit_strategy_max);

        Arc::new(Self {
            config,
            db,
            stock_cache,
            general_rate_limiter,
            strategy_rate_limiter,
            token_verifier: Arc::new(OpaqueTokenVerifier),
            data_provider,
        })
    }
}
