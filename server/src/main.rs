//! Market data aggregator service binary.
//!
//! Composition root plus the HTTP read API. Every endpoint serves from the
//! cache the background loops maintain; a request never reaches upstream.

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use market_aggregator::{
    Aggregator, AssetType, CacheStore, DataProvider, LogFormat, NewsArticle, ProviderRegistry,
    Quote, Settings, symbols,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Server-specific default values
mod defaults {
    /// Default server port
    pub const SERVER_PORT: u16 = 8000;
    /// Maximum symbols per /v1/quotes request
    pub const MAX_SYMBOLS_PER_REQUEST: usize = 100;
    /// Readiness requires a loop stamp within this window (seconds)
    pub const READINESS_WINDOW_SECS: i64 = 3600;
}

#[derive(Clone)]
struct AppState {
    aggregator: Aggregator,
    started_at: DateTime<Utc>,
}

// ---- Error envelope ----

/// Structured API error: `{error, error_code, timestamp, details?}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: String,
    error_code: &'static str,
    details: Option<Value>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            error_code: "BAD_REQUEST",
            details: None,
        }
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: error.into(),
            error_code: "NOT_FOUND",
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.error,
            "error_code": self.error_code,
            "timestamp": Utc::now(),
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

// ---- Response shapes ----

#[derive(Serialize)]
struct QuotesResponse {
    quotes: Vec<Quote>,
    total: usize,
    cache_hit: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct AssetsResponse {
    assets: Vec<market_aggregator::Asset>,
    asset_type: AssetType,
    total: usize,
    cache_hit: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct NewsResponse {
    news: Vec<NewsArticle>,
    total: usize,
    cache_hit: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ActiveSymbolsResponse {
    symbols: Vec<String>,
    total: usize,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ProviderStatus {
    healthy: bool,
    circuit_open: bool,
    available: bool,
}

#[derive(Serialize)]
struct ProviderStatusResponse {
    providers: HashMap<String, ProviderStatus>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    uptime_seconds: f64,
    redis_connected: bool,
    active_circuits: HashMap<String, bool>,
    background_tasks_running: bool,
    last_data_update: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct QuotesQuery {
    /// Comma-separated symbols
    symbols: Option<String>,
}

// ---- Validation ----

/// Parse and validate the `symbols` query parameter: trimmed, uppercased,
/// deduplicated preserving input order; blank input and oversized batches
/// are rejected.
fn validate_symbols_param(raw: Option<&str>) -> Result<Vec<String>, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Symbols parameter is required"))?;

    let parsed = symbols::parse_symbol_list(raw);
    if parsed.is_empty() {
        return Err(ApiError::bad_request("At least one valid symbol is required"));
    }
    if parsed.len() > defaults::MAX_SYMBOLS_PER_REQUEST {
        return Err(ApiError::bad_request(format!(
            "Maximum {} symbols allowed per request",
            defaults::MAX_SYMBOLS_PER_REQUEST
        ))
        .with_details(json!({ "requested": parsed.len() })));
    }
    Ok(parsed)
}

// ---- Handlers ----

/// GET /v1/quotes?symbols=A,B,C
async fn get_quotes(
    Extension(state): Extension<AppState>,
    Query(params): Query<QuotesQuery>,
) -> Result<Json<QuotesResponse>, ApiError> {
    let requested = validate_symbols_param(params.symbols.as_deref())?;

    info!(count = requested.len(), "Quotes request received");
    let found = state.aggregator.cache().get_quotes(&requested).await;

    // Preserve request order in the response
    let quotes: Vec<Quote> = requested
        .iter()
        .filter_map(|symbol| found.get(symbol).cloned())
        .collect();
    let cache_hit = !quotes.is_empty();

    Ok(Json(QuotesResponse {
        total: quotes.len(),
        quotes,
        cache_hit,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/quote/{symbol}
async fn get_quote(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    let symbol = symbols::normalize(&symbol);
    if symbol.is_empty() {
        return Err(ApiError::bad_request("Symbol is required"));
    }

    let found = state
        .aggregator
        .cache()
        .get_quotes(std::slice::from_ref(&symbol))
        .await;
    match found.into_values().next() {
        Some(quote) => Ok(Json(quote)),
        None => Err(ApiError::not_found(format!(
            "Quote not found for symbol: {symbol}"
        ))),
    }
}

/// GET /v1/assets/{type}
async fn get_assets(
    Extension(state): Extension<AppState>,
    Path(asset_type): Path<String>,
) -> Result<Json<AssetsResponse>, ApiError> {
    let asset_type: AssetType = asset_type.parse().map_err(|_| {
        ApiError::bad_request("Unknown asset type")
            .with_details(json!({ "valid_types": ["stocks", "crypto", "forex"] }))
    })?;

    let assets = state.aggregator.cache().get_assets(asset_type).await;
    let cache_hit = !assets.is_empty();

    Ok(Json(AssetsResponse {
        total: assets.len(),
        assets,
        asset_type,
        cache_hit,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/news/general
async fn get_general_news(
    Extension(state): Extension<AppState>,
) -> Result<Json<NewsResponse>, ApiError> {
    let news = state.aggregator.cache().get_news("general").await;
    let cache_hit = !news.is_empty();

    Ok(Json(NewsResponse {
        total: news.len(),
        news,
        cache_hit,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/news/{symbol}
async fn get_symbol_news(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<NewsResponse>, ApiError> {
    let symbol = symbols::normalize(&symbol);
    if symbol.is_empty() {
        return Err(ApiError::bad_request("Symbol is required"));
    }

    let news = state.aggregator.cache().get_news(&symbol).await;
    let cache_hit = !news.is_empty();

    Ok(Json(NewsResponse {
        total: news.len(),
        news,
        cache_hit,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/symbols/active
async fn get_active_symbols(
    Extension(state): Extension<AppState>,
) -> Result<Json<ActiveSymbolsResponse>, ApiError> {
    let seed = state.aggregator.settings().active_symbols.clone();
    let symbols = state.aggregator.cache().get_active_symbols(&seed).await;

    Ok(Json(ActiveSymbolsResponse {
        total: symbols.len(),
        symbols,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/providers/status
///
/// Health values come from the startup probe sweep; this handler never
/// reaches upstream.
async fn get_provider_status(
    Extension(state): Extension<AppState>,
) -> Result<Json<ProviderStatusResponse>, ApiError> {
    let health = state.aggregator.known_provider_health().await;
    let circuits = state.aggregator.circuit_status().await;

    let mut providers = HashMap::new();
    for provider in DataProvider::ALL {
        let healthy = health.get(&provider).copied().unwrap_or(false);
        let circuit_open = circuits.get(provider.as_str()).copied().unwrap_or(false);
        providers.insert(
            provider.as_str().to_string(),
            ProviderStatus {
                healthy,
                circuit_open,
                available: healthy && !circuit_open,
            },
        );
    }

    Ok(Json(ProviderStatusResponse {
        providers,
        timestamp: Utc::now(),
    }))
}

/// GET /v1/cache/stats
async fn get_cache_stats(Extension(state): Extension<AppState>) -> Json<Value> {
    let settings = state.aggregator.settings();
    let last_updates = state.aggregator.last_update_times().await;
    let redis_connected = state.aggregator.cache().health_check().await;

    Json(json!({
        "redis_connected": redis_connected,
        "last_asset_update": last_updates.asset_list_update,
        "last_price_update": last_updates.price_fetch,
        "last_news_update": last_updates.news_fetch,
        "cache_ttl_settings": {
            "quotes": settings.quotes_cache_ttl,
            "assets": settings.assets_cache_ttl,
            "news": settings.news_cache_ttl,
        },
        "timestamp": Utc::now(),
    }))
}

/// GET /health
async fn health_check(Extension(state): Extension<AppState>) -> Response {
    let redis_connected = state.aggregator.cache().health_check().await;
    let tasks_running = state.aggregator.background_tasks_running().await;
    let active_circuits = state.aggregator.circuit_status().await;
    let last_updates = state.aggregator.last_update_times().await;

    let healthy = redis_connected && tasks_running;
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: state.aggregator.settings().app_version.clone(),
        uptime_seconds: (Utc::now() - state.started_at).num_milliseconds() as f64 / 1000.0,
        redis_connected,
        active_circuits,
        background_tasks_running: tasks_running,
        last_data_update: last_updates.most_recent(),
        timestamp: Utc::now(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response)).into_response()
}

/// GET /healthz, the terse probe for load balancers
async fn healthz(Extension(state): Extension<AppState>) -> Response {
    let redis_connected = state.aggregator.cache().health_check().await;
    let tasks_running = state.aggregator.background_tasks_running().await;

    if redis_connected && tasks_running {
        Json(json!({ "status": "healthy" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "redis": redis_connected,
                "tasks": tasks_running,
            })),
        )
            .into_response()
    }
}

/// GET /ready: requires the cache, the loops, and a fresh loop stamp
async fn ready(Extension(state): Extension<AppState>) -> Response {
    let redis_connected = state.aggregator.cache().health_check().await;
    let tasks_running = state.aggregator.background_tasks_running().await;
    let last_updates = state.aggregator.last_update_times().await;

    let recent_updates = last_updates
        .most_recent()
        .map(|stamp| (Utc::now() - stamp).num_seconds() < defaults::READINESS_WINDOW_SECS)
        .unwrap_or(false);

    if redis_connected && tasks_running && recent_updates {
        Json(json!({ "status": "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "redis": redis_connected,
                "tasks": tasks_running,
                "recent_updates": recent_updates,
            })),
        )
            .into_response()
    }
}

// ---- Wiring ----

/// API routes nested under /v1
fn api_routes() -> Router {
    Router::new()
        // Routes are sorted alphabetically by path.
        // GET /v1/assets/{type}
        .route("/assets/{asset_type}", get(get_assets))
        // GET /v1/cache/stats
        .route("/cache/stats", get(get_cache_stats))
        // GET /v1/news/general
        .route("/news/general", get(get_general_news))
        // GET /v1/news/{symbol}
        .route("/news/{symbol}", get(get_symbol_news))
        // GET /v1/providers/status
        .route("/providers/status", get(get_provider_status))
        // GET /v1/quote/{symbol}
        .route("/quote/{symbol}", get(get_quote))
        // GET /v1/quotes?symbols=<csv>
        .route("/quotes", get(get_quotes))
        // GET /v1/symbols/active
        .route("/symbols/active", get(get_active_symbols))
}

fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .nest("/v1", api_routes())
        .route("/health", get(health_check))
        .route("/healthz", get(healthz))
        .route("/ready", get(ready))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.clone()));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C signal");
        },
        _ = terminate => {
            warn!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    init_tracing(&settings);

    info!(
        version = %settings.app_version,
        "Starting Market Data Aggregator service"
    );

    // Composition root: cache, adapters, orchestrator
    let cache = CacheStore::connect(&settings).await;
    let providers = ProviderRegistry::from_settings(&settings);
    let aggregator = Aggregator::new(providers, cache, settings);

    // Startup probe sweep; authentication failures surface here
    let health = aggregator.provider_health().await;
    for (provider, healthy) in &health {
        if !healthy {
            warn!(provider = %provider, "Provider failed its startup probe");
        }
    }

    aggregator.start_background_tasks().await;

    let state = AppState {
        aggregator: aggregator.clone(),
        started_at: Utc::now(),
    };
    let app = create_app(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain loops, cancel what remains, disconnect adapters and cache
    aggregator.shutdown().await;
    info!("Service shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_symbols_rejects_missing_param() {
        assert!(validate_symbols_param(None).is_err());
        assert!(validate_symbols_param(Some("   ")).is_err());
        assert!(validate_symbols_param(Some(", ,")).is_err());
    }

    #[test]
    fn test_validate_symbols_uppercases_and_dedupes_in_order() {
        let parsed = validate_symbols_param(Some("aapl, msft ,AAPL,btc-usd")).unwrap();
        assert_eq!(parsed, vec!["AAPL", "MSFT", "BTC-USD"]);
    }

    #[test]
    fn test_validate_symbols_caps_batch_size() {
        let raw: Vec<String> = (0..101).map(|i| format!("SYM{i}")).collect();
        let err = validate_symbols_param(Some(&raw.join(","))).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let raw: Vec<String> = (0..100).map(|i| format!("SYM{i}")).collect();
        assert_eq!(
            validate_symbols_param(Some(&raw.join(","))).unwrap().len(),
            100
        );
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let error = ApiError::bad_request("Symbols parameter is required");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Symbols parameter is required");
        assert_eq!(body["error_code"], "BAD_REQUEST");
        assert!(body.get("timestamp").is_some());
        assert!(body.get("details").is_none());
    }
}
