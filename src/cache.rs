//! Redis-backed cache and circuit-breaker store.
//!
//! The cache is the single source of truth for the read API; the
//! orchestrator is its only writer. Entries are self-describing JSON
//! documents with per-key TTLs; multi-key reads and writes are pipelined so
//! readers never observe a partially-written batch. A missing or unreachable
//! Redis degrades gracefully: reads come back empty, writes are dropped, and
//! the health surface reports the outage.

use crate::config::Settings;
use crate::models::{Asset, AssetType, CircuitBreakerState, DataProvider, NewsArticle, Quote};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Failure counters reset an hour after the last increment
const FAILURE_COUNT_TTL: u64 = 3600;
/// Active-symbol list entry TTL
const ACTIVE_SYMBOLS_TTL: u64 = 3600;
/// Last-update stamps outlive every loop period
const LAST_UPDATE_TTL: u64 = 86_400;
/// Grace added to circuit entries so expiry cleanup always runs first
const CIRCUIT_TTL_GRACE: u64 = 60;

/// Cache key builders; one function per logical key family.
pub mod keys {
    use crate::models::{AssetType, DataProvider};

    /// `quotes:{SYMBOL}`
    pub fn quote(symbol: &str) -> String {
        format!("quotes:{symbol}")
    }

    /// `assets:{stocks|crypto|forex}`
    pub fn assets(asset_type: AssetType) -> String {
        format!("assets:{asset_type}")
    }

    /// `news:general` or `news:{SYMBOL}`
    pub fn news(key: &str) -> String {
        format!("news:{key}")
    }

    /// `circuit_breaker:{provider}`
    pub fn circuit(provider: DataProvider) -> String {
        format!("circuit_breaker:{provider}")
    }

    /// `failures:{provider}`
    pub fn failures(provider: DataProvider) -> String {
        format!("failures:{provider}")
    }

    /// `config:active_symbols`
    pub fn active_symbols() -> String {
        "config:active_symbols".to_string()
    }

    /// `last_update:{task}`
    pub fn last_update(task: &str) -> String {
        format!("last_update:{task}")
    }
}

/// Cache façade over Redis.
#[derive(Clone)]
pub struct CacheStore {
    conn: Option<ConnectionManager>,
    circuit_timeout: u64,
    quotes_ttl: u64,
    assets_ttl: u64,
    news_ttl: u64,
}

impl CacheStore {
    /// Connect to Redis using the configured URL.
    ///
    /// Connection failure is logged and leaves the store in degraded mode
    /// rather than failing startup; the health endpoints surface the outage.
    pub async fn connect(settings: &Settings) -> Self {
        let url = settings.redis_url();
        let conn = match redis::Client::open(url.as_str()) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(manager) => {
                    info!(
                        redis_host = %settings.redis_host,
                        redis_port = settings.redis_port,
                        redis_db = settings.redis_db,
                        "Connected to Redis"
                    );
                    Some(manager)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis, cache disabled");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Invalid Redis URL, cache disabled");
                None
            }
        };

        Self {
            conn,
            circuit_timeout: settings.circuit_breaker_timeout,
            quotes_ttl: settings.quotes_cache_ttl,
            assets_ttl: settings.assets_cache_ttl,
            news_ttl: settings.news_cache_ttl,
        }
    }

    /// Whether a Redis connection was established
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// PING the backend
    pub async fn health_check(&self) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        let mut conn = conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                false
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        match redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    // Decode failures are cache misses
                    warn!(key = %key, error = %e, "Cache deserialize error, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache GET error");
                None
            }
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: u64) {
        let Some(conn) = &self.conn else {
            return;
        };
        let mut conn = conn.clone();

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialize error, dropping write");
                return;
            }
        };

        if let Err(e) = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl)
            .arg(&raw)
            .query_async::<()>(&mut conn)
            .await
        {
            warn!(key = %key, error = %e, "Cache SET error, write dropped");
        } else {
            debug!(key = %key, ttl = ttl, "Cache SET");
        }
    }

    async fn delete(&self, key: &str) {
        let Some(conn) = &self.conn else {
            return;
        };
        let mut conn = conn.clone();
        if let Err(e) = redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await {
            warn!(key = %key, error = %e, "Cache DEL error");
        }
    }

    // ---- Quotes ----

    /// Pipelined multi-get of quotes. Missing keys are simply absent from
    /// the result; corrupted entries are logged and skipped.
    pub async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        if symbols.is_empty() {
            return HashMap::new();
        }
        let Some(conn) = &self.conn else {
            return HashMap::new();
        };
        let mut conn = conn.clone();

        let mut pipe = redis::pipe();
        for symbol in symbols {
            pipe.cmd("GET").arg(keys::quote(symbol));
        }

        let rows: Vec<Option<String>> = match pipe.query_async(&mut conn).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Pipelined quote read failed");
                return HashMap::new();
            }
        };

        let mut quotes = HashMap::new();
        for (symbol, raw) in symbols.iter().zip(rows) {
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<Quote>(&raw) {
                Ok(quote) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Corrupted quote entry, skipping");
                }
            }
        }

        debug!(
            requested = symbols.len(),
            found = quotes.len(),
            "Retrieved quotes from cache"
        );
        quotes
    }

    /// Pipelined multi-set of quotes with the quote TTL.
    pub async fn set_quotes(&self, quotes: &HashMap<String, Quote>) {
        if quotes.is_empty() {
            return;
        }
        let Some(conn) = &self.conn else {
            return;
        };
        let mut conn = conn.clone();

        let mut pipe = redis::pipe();
        for (symbol, quote) in quotes {
            match serde_json::to_string(quote) {
                Ok(raw) => {
                    pipe.cmd("SETEX")
                        .arg(keys::quote(symbol))
                        .arg(self.quotes_ttl)
                        .arg(raw)
                        .ignore();
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Quote serialize error, dropping entry");
                }
            }
        }

        if let Err(e) = pipe.query_async::<()>(&mut conn).await {
            warn!(error = %e, "Pipelined quote write failed");
        } else {
            debug!(count = quotes.len(), ttl = self.quotes_ttl, "Stored quotes in cache");
        }
    }

    // ---- Asset lists ----

    /// Read the cached asset list for a class; empty when absent.
    pub async fn get_assets(&self, asset_type: AssetType) -> Vec<Asset> {
        self.get_json(&keys::assets(asset_type)).await.unwrap_or_default()
    }

    /// Replace the cached asset list for a class.
    pub async fn set_assets(&self, asset_type: AssetType, assets: &[Asset]) {
        self.set_json(&keys::assets(asset_type), &assets, self.assets_ttl)
            .await;
        info!(
            asset_type = %asset_type,
            count = assets.len(),
            "Stored asset list in cache"
        );
    }

    // ---- Active symbols ----

    /// Read the active-symbol list, falling back to the configured seed.
    ///
    /// On a miss the seed list is written back so later readers converge on
    /// the same working set.
    pub async fn get_active_symbols(&self, fallback: &[String]) -> Vec<String> {
        if let Some(symbols) = self.get_json::<Vec<String>>(&keys::active_symbols()).await {
            return symbols;
        }
        self.set_active_symbols(fallback).await;
        fallback.to_vec()
    }

    /// Replace the active-symbol list.
    pub async fn set_active_symbols(&self, symbols: &[String]) {
        self.set_json(&keys::active_symbols(), &symbols, ACTIVE_SYMBOLS_TTL)
            .await;
    }

    // ---- News ----

    /// Read a news bundle (`general` or a symbol); empty when absent.
    pub async fn get_news(&self, key: &str) -> Vec<NewsArticle> {
        self.get_json(&keys::news(key)).await.unwrap_or_default()
    }

    /// Replace a news bundle.
    pub async fn set_news(&self, key: &str, articles: &[NewsArticle]) {
        self.set_json(&keys::news(key), &articles, self.news_ttl).await;
    }

    // ---- Circuit breaker ----

    /// Whether the provider's circuit is currently open.
    ///
    /// Absent entries are closed. A stored entry past its timeout counts as
    /// closed and is removed as a side effect of the observation.
    pub async fn is_circuit_open(&self, provider: DataProvider) -> bool {
        let Some(state) = self
            .get_json::<CircuitBreakerState>(&keys::circuit(provider))
            .await
        else {
            return false;
        };

        let now = Utc::now();
        if state.is_open && state.is_expired(now, self.circuit_timeout) {
            info!(provider = %provider, "Circuit timeout expired, closing");
            self.close_circuit(provider).await;
            return false;
        }
        state.holds_open(now, self.circuit_timeout)
    }

    /// Trip (open) the circuit for a provider.
    pub async fn trip_circuit(&self, provider: DataProvider, error_message: &str) {
        let failure_count = self.increment_failure_count(provider).await;
        let state = CircuitBreakerState::tripped(Utc::now(), failure_count, error_message.to_string());

        self.set_json(
            &keys::circuit(provider),
            &state,
            self.circuit_timeout + CIRCUIT_TTL_GRACE,
        )
        .await;

        warn!(
            provider = %provider,
            failure_count = failure_count,
            error = %error_message,
            "Circuit breaker tripped"
        );
    }

    /// Close (reset) the circuit for a provider and clear its failure count.
    pub async fn close_circuit(&self, provider: DataProvider) {
        self.delete(&keys::circuit(provider)).await;
        self.delete(&keys::failures(provider)).await;
        info!(provider = %provider, "Circuit breaker closed");
    }

    /// Detailed circuit state for the status endpoints.
    pub async fn circuit_status(&self, provider: DataProvider) -> CircuitBreakerState {
        self.get_json(&keys::circuit(provider))
            .await
            .unwrap_or_else(CircuitBreakerState::closed)
    }

    async fn increment_failure_count(&self, provider: DataProvider) -> u64 {
        let Some(conn) = &self.conn else {
            return 1;
        };
        let mut conn = conn.clone();
        let key = keys::failures(provider);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(FAILURE_COUNT_TTL)
            .ignore();

        match pipe.query_async::<(u64,)>(&mut conn).await {
            Ok((count,)) => count,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Failure count increment failed");
                1
            }
        }
    }

    // ---- Freshness stamps ----

    /// Read the last-update stamp for a task.
    pub async fn get_last_update(&self, task: &str) -> Option<DateTime<Utc>> {
        let raw: String = self.get_json(&keys::last_update(task)).await?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Stamp a task's last successful completion.
    pub async fn set_last_update(&self, task: &str, timestamp: DateTime<Utc>) {
        self.set_json(
            &keys::last_update(task),
            &timestamp.to_rfc3339(),
            LAST_UPDATE_TTL,
        )
        .await;
    }
}

#[cfg(test)]
impl CacheStore {
    /// A store with no backend, for exercising degraded-mode paths in tests.
    pub(crate) fn disconnected(circuit_timeout: u64) -> Self {
        Self {
            conn: None,
            circuit_timeout,
            quotes_ttl: 300,
            assets_ttl: 86_400,
            news_ttl: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::quote("AAPL"), "quotes:AAPL");
        assert_eq!(keys::assets(AssetType::Stocks), "assets:stocks");
        assert_eq!(keys::assets(AssetType::Forex), "assets:forex");
        assert_eq!(keys::news("general"), "news:general");
        assert_eq!(keys::news("MSFT"), "news:MSFT");
        assert_eq!(
            keys::circuit(DataProvider::AlphaVantage),
            "circuit_breaker:alpha_vantage"
        );
        assert_eq!(keys::failures(DataProvider::Finnhub), "failures:finnhub");
        assert_eq!(keys::active_symbols(), "config:active_symbols");
        assert_eq!(keys::last_update("price_fetch"), "last_update:price_fetch");
    }

    fn degraded_store() -> CacheStore {
        CacheStore::disconnected(300)
    }

    #[tokio::test]
    async fn test_degraded_reads_are_empty() {
        let store = degraded_store();
        assert!(!store.is_connected());
        assert!(!store.health_check().await);
        assert!(store.get_quotes(&["AAPL".to_string()]).await.is_empty());
        assert!(store.get_assets(AssetType::Crypto).await.is_empty());
        assert!(store.get_news("general").await.is_empty());
        assert!(!store.is_circuit_open(DataProvider::Yfinance).await);
        assert!(store.get_last_update("price_fetch").await.is_none());
    }

    #[tokio::test]
    async fn test_degraded_active_symbols_fall_back_to_config() {
        let store = degraded_store();
        let seed = vec!["AAPL".to_string(), "BTC-USD".to_string()];
        assert_eq!(store.get_active_symbols(&seed).await, seed);
    }

    #[tokio::test]
    async fn test_degraded_circuit_status_is_closed() {
        let store = degraded_store();
        let status = store.circuit_status(DataProvider::Coingecko).await;
        assert_eq!(status, CircuitBreakerState::closed());
    }

    #[tokio::test]
    async fn test_degraded_writes_do_not_panic() {
        let store = degraded_store();
        store.set_quotes(&HashMap::new()).await;
        store.set_assets(AssetType::Stocks, &[]).await;
        store.set_news("general", &[]).await;
        store.trip_circuit(DataProvider::Finnhub, "boom").await;
        store.set_last_update("price_fetch", Utc::now()).await;
    }
}
