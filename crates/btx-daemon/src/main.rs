//! btx-daemon entry point.
//!
//! Intentionally thin: load config, set up tracing, connect to Postgres,
//! build shared state, wire middleware, serve. All route handlers live in
//! `routes.rs`; shared state lives in `state.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::Response;
use btx_config::Config;
use btx_daemon::{data_provider::HttpDataProvider, routes, state::AppState};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.log_level);

    info!(environment = ?config.environment, "starting btx-daemon");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    btx_db::migrate(&pool).await.context("running database migrations")?;

    let data_provider = Arc::new(HttpDataProvider::new(config.data_provider_url.clone()));
    let cors = cors_layer(&config.cors_origins);
    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));

    let shared = AppState::new(config, pool, data_provider);

    let app = routes::build_router(shared)
        .layer(axum::middleware::from_fn(security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    info!("btx-daemon listening on http://{}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server crashed")?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("BTX_DAEMON_ADDR").ok()?.parse().ok()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
}

/// Adds the handful of defensive headers the upstream `add_security_headers`
/// middleware sets on every response (§4.8).
async fn security_headers(req: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static("x-content-type-options"), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY"));
    headers.insert(HeaderName::from_static("referrer-policy"), HeaderValue::from_static("strict-origin-when-cross-origin"));
    response
}
