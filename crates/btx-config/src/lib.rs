//! btx-config
//!
//! Env-driven application configuration, loaded once at daemon/CLI startup,
//! built straight from `std::env` rather than a YAML/file-based config layer.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub cors_origins: Vec<String>,
    pub stock_cache_max: usize,
    pub stock_cache_ttl: Duration,
    pub rate_limit_strategy_window: Duration,
    pub rate_limit_strategy_max: u32,
    pub rate_limit_general_window: Duration,
    pub rate_limit_general_max: u32,
    pub environment: Environment,
    /// Whether bearer-token verification is bypassed. Forced `false` in
    /// production regardless of what the environment asked for: see
    /// [`Config::from_env`].
    pub disable_auth: bool,
    pub database_url: String,
    pub symbol_max_len: usize,
    pub max_runs_per_user: i64,
    pub strategy_code_max_len: usize,
    pub log_level: String,
    /// Base URL of the external market-data provider behind the stock
    /// cache (§1: market-data fetching is an external collaborator).
    pub data_provider_url: String,
}

impl Config {
    /// Builds configuration from the process environment, loading a local
    /// `.env` file first if present (dev convenience; silently absent in
    /// production, which injects env vars directly).
    ///
    /// Fails fast if a numeric env var is set but cannot be parsed — a
    /// malformed value should stop startup, not silently fall back to a
    /// default.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let environment = Environment::parse(&env_or("ENVIRONMENT", "development"));

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173,http://127.0.0.1:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        validate_cors_origins(&cors_origins)?;

        let has_firebase_creds = std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .map(|p| !p.is_empty() && std::path::Path::new(&p).is_file())
            .unwrap_or(false);
        let explicit = std::env::var("DISABLE_AUTH").ok().map(|v| v.to_lowercase());
        let disable_auth = if environment.is_production() {
            false
        } else {
            match explicit.as_deref() {
                Some("0") | Some("false") | Some("no") => false,
                Some("1") | Some("true") | Some("yes") => true,
                _ => !has_firebase_creds,
            }
        };

        Ok(Self {
            cors_origins,
            stock_cache_max: 64,
            stock_cache_ttl: Duration::from_secs(60 * 60),
            rate_limit_strategy_window: Duration::from_secs(parse_env("RATE_LIMIT_STRATEGY_WINDOW_SEC", 60)?),
            rate_limit_strategy_max: parse_env("RATE_LIMIT_STRATEGY_MAX", 5)?,
            rate_limit_general_window: Duration::from_secs(parse_env("RATE_LIMIT_GENERAL_WINDOW_SEC", 60)?),
            rate_limit_general_max: parse_env("RATE_LIMIT_GENERAL_MAX", 100)?,
            environment,
            disable_auth,
            database_url: env_or("ACEMARKET_DB", "postgres://localhost/btx"),
            symbol_max_len: 12,
            max_runs_per_user: 25,
            strategy_code_max_len: 50_000,
            log_level: env_or("LOG_LEVEL", "info"),
            data_provider_url: env_or("DATA_PROVIDER_URL", "http://localhost:9000/api"),
        })
    }
}

/// Wildcard-with-credentials is always rejected at config load: CORS
/// requests carry a bearer token, so a `*` origin would let any site read
/// an authenticated response.
fn validate_cors_origins(origins: &[String]) -> anyhow::Result<()> {
    anyhow::ensure!(
        !origins.iter().any(|o| o == "*"),
        "CORS_ORIGINS may not contain '*': wildcard origins cannot be combined with credentialed requests"
    );
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

/// Characters permitted in a stock symbol (uppercase letters, digits, `.`,
/// `-`), e.g. `BRK.B`, `BHF-A`.
pub fn is_valid_symbol_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_defaults_to_development() {
        assert_eq!(Environment::parse("nonsense"), Environment::Development);
        assert_eq!(Environment::parse("PRODUCTION"), Environment::Production);
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        assert!(validate_cors_origins(&["*".to_string()]).is_err());
    }

    #[test]
    fn explicit_origin_list_is_accepted() {
        assert!(validate_cors_origins(&["https://example.com".to_string()]).is_ok());
    }

    #[test]
    fn symbol_char_validation_matches_allowed_set() {
        assert!(is_valid_symbol_char('B'));
        assert!(is_valid_symbol_char('.'));
        assert!(is_valid_symbol_char('-'));
        assert!(!is_valid_symbol_char('b'));
        assert!(!is_valid_symbol_char('_'));
    }
}
