//! Aggregation orchestrator.
//!
//! Owns the three background loops (asset-list refresh, quote fetch, news
//! fetch) and the provider-selection policy they
//! share. Each call site picks the primary for the asset class, diverts to
//! the fallback when the primary's circuit is open, and skips the class for
//! the cycle when both are unavailable. Only provider-level failures trip
//! circuits, and only time expiry closes them.

use crate::cache::CacheStore;
use crate::config::{routing, Settings};
use crate::error::AggregatorError;
use crate::models::{AssetType, DataProvider, NewsArticle, Quote};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use crate::symbols;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Cache key for the general news bundle
const GENERAL_NEWS_KEY: &str = "general";

/// Loop names used for `last_update:{task}` stamps
mod tasks {
    pub const ASSET_LIST_UPDATE: &str = "asset_list_update";
    pub const PRICE_FETCH: &str = "price_fetch";
    pub const NEWS_FETCH: &str = "news_fetch";
}

/// How long shutdown waits for loops to drain before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Last successful completion times of the background loops.
#[derive(Debug, Clone, Default)]
pub struct LastUpdateTimes {
    /// Asset-list loop
    pub asset_list_update: Option<DateTime<Utc>>,
    /// Quote loop
    pub price_fetch: Option<DateTime<Utc>>,
    /// News loop
    pub news_fetch: Option<DateTime<Utc>>,
}

impl LastUpdateTimes {
    /// The most recent stamp across all loops
    pub fn most_recent(&self) -> Option<DateTime<Utc>> {
        [self.asset_list_update, self.price_fetch, self.news_fetch]
            .into_iter()
            .flatten()
            .max()
    }
}

struct Inner {
    providers: ProviderRegistry,
    cache: CacheStore,
    settings: Settings,
    shutdown: watch::Sender<bool>,
    running: Mutex<Vec<JoinHandle<()>>>,
    probe_results: Mutex<HashMap<DataProvider, bool>>,
}

/// The aggregation service: provider registry + cache + background loops.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    /// Assemble the orchestrator from its collaborators.
    pub fn new(providers: ProviderRegistry, cache: CacheStore, settings: Settings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                providers,
                cache,
                settings,
                shutdown,
                running: Mutex::new(Vec::new()),
                probe_results: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The cache this orchestrator writes to
    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// The settings this orchestrator runs with
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Spawn the three background loops.
    pub async fn start_background_tasks(&self) {
        let mut running = self.inner.running.lock().await;

        let this = self.clone();
        running.push(tokio::spawn(async move { this.asset_list_loop().await }));
        let this = self.clone();
        running.push(tokio::spawn(async move { this.quote_fetch_loop().await }));
        let this = self.clone();
        running.push(tokio::spawn(async move { this.news_fetch_loop().await }));

        info!(tasks = running.len(), "Background tasks started");
    }

    /// Whether any background loop is still running.
    pub async fn background_tasks_running(&self) -> bool {
        let running = self.inner.running.lock().await;
        !running.is_empty() && running.iter().any(|task| !task.is_finished())
    }

    /// Signal shutdown, wait up to the grace period for loops to finish
    /// their current iteration, then abort whatever is left.
    pub async fn shutdown(&self) {
        info!("Shutting down aggregator");
        let _ = self.inner.shutdown.send(true);

        let mut running = self.inner.running.lock().await;
        let drain = futures::future::join_all(running.iter_mut());
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Grace period elapsed, aborting outstanding tasks"
            );
            for task in running.iter() {
                task.abort();
            }
        }
        running.clear();
        info!("Aggregator shutdown complete");
    }

    // ---- Provider selection ----

    /// Pick the provider for an asset class: primary if it supports the
    /// class and its circuit is closed, else the fallback under the same
    /// conditions, else none.
    async fn select_provider(&self, asset_type: AssetType) -> Option<Arc<dyn ProviderAdapter>> {
        let (primary, fallback) = routing(asset_type);

        for candidate in [primary, fallback] {
            let Some(adapter) = self.inner.providers.get(candidate) else {
                continue;
            };
            if !adapter.supports(asset_type) {
                continue;
            }
            if self.inner.cache.is_circuit_open(candidate).await {
                info!(
                    provider = %candidate,
                    asset_type = %asset_type,
                    "Circuit breaker is open, trying next provider"
                );
                continue;
            }
            return Some(adapter);
        }

        warn!(asset_type = %asset_type, "No available provider for asset class this cycle");
        None
    }

    /// Record a provider failure, tripping the circuit of the provider that
    /// was actually used when the error calls for it.
    async fn record_failure(&self, provider: DataProvider, error: &AggregatorError) {
        if error.trips_circuit() {
            self.inner
                .cache
                .trip_circuit(provider, &error.to_string())
                .await;
        }
    }

    // ---- Loop 1: asset lists ----

    async fn asset_list_loop(self) {
        let period = Duration::from_secs(self.inner.settings.asset_list_update_interval);
        let mut shutdown = self.inner.shutdown.subscribe();
        info!(interval_secs = period.as_secs(), "Starting asset list update loop");

        while !*shutdown.borrow() {
            self.asset_list_iteration().await;

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("Asset list update loop stopped");
    }

    async fn asset_list_iteration(&self) {
        let started = Utc::now();

        for asset_type in AssetType::ALL {
            self.update_asset_list_for(asset_type).await;
        }

        let finished = Utc::now();
        self.inner
            .cache
            .set_last_update(tasks::ASSET_LIST_UPDATE, finished)
            .await;
        info!(
            duration_ms = (finished - started).num_milliseconds(),
            "Asset list update completed"
        );
    }

    async fn update_asset_list_for(&self, asset_type: AssetType) {
        let Some(adapter) = self.select_provider(asset_type).await else {
            return;
        };
        let provider = adapter.identity();

        match adapter.assets(asset_type).await {
            Ok(assets) if !assets.is_empty() => {
                self.inner.cache.set_assets(asset_type, &assets).await;
                info!(
                    asset_type = %asset_type,
                    provider = %provider,
                    count = assets.len(),
                    "Updated asset list"
                );
            }
            Ok(_) => {
                warn!(
                    asset_type = %asset_type,
                    provider = %provider,
                    "No assets received from provider, keeping previous list"
                );
            }
            Err(e) => {
                error!(
                    asset_type = %asset_type,
                    provider = %provider,
                    error = %e,
                    "Provider error while fetching asset list"
                );
                self.record_failure(provider, &e).await;
            }
        }
    }

    // ---- Loop 2: quotes ----

    async fn quote_fetch_loop(self) {
        let period = Duration::from_secs(self.inner.settings.price_fetch_interval);
        let mut shutdown = self.inner.shutdown.subscribe();
        info!(interval_secs = period.as_secs(), "Starting price fetch loop");

        while !*shutdown.borrow() {
            self.quote_fetch_iteration().await;

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("Price fetch loop stopped");
    }

    async fn quote_fetch_iteration(&self) {
        let started = Utc::now();
        let active = self
            .inner
            .cache
            .get_active_symbols(&self.inner.settings.active_symbols)
            .await;

        if active.is_empty() {
            warn!("No active symbols to track");
            return;
        }

        let mut merged: HashMap<String, Quote> = HashMap::new();
        for (asset_type, bucket) in symbols::bucket_by_asset_type(&active) {
            let quotes = self.fetch_quotes_for(asset_type, &bucket).await;
            merged.extend(quotes);
        }

        if !merged.is_empty() {
            self.inner.cache.set_quotes(&merged).await;
        }

        let finished = Utc::now();
        self.inner
            .cache
            .set_last_update(tasks::PRICE_FETCH, finished)
            .await;
        info!(
            symbols_requested = active.len(),
            quotes_received = merged.len(),
            duration_ms = (finished - started).num_milliseconds(),
            "Price fetch completed"
        );
    }

    /// Fetch one bucket through the selected provider. Failures trip the
    /// circuit of the provider actually used and yield an empty map; no
    /// stale data is written for the bucket.
    async fn fetch_quotes_for(
        &self,
        asset_type: AssetType,
        bucket: &[String],
    ) -> HashMap<String, Quote> {
        if bucket.is_empty() {
            return HashMap::new();
        }
        let Some(adapter) = self.select_provider(asset_type).await else {
            return HashMap::new();
        };
        let provider = adapter.identity();

        match adapter.quotes(bucket).await {
            Ok(quotes) => quotes,
            Err(e) => {
                error!(
                    asset_type = %asset_type,
                    provider = %provider,
                    error = %e,
                    "Provider error while fetching quotes"
                );
                self.record_failure(provider, &e).await;
                HashMap::new()
            }
        }
    }

    // ---- Loop 3: news ----

    async fn news_fetch_loop(self) {
        let period = Duration::from_secs(self.inner.settings.news_fetch_interval);
        let mut shutdown = self.inner.shutdown.subscribe();
        info!(interval_secs = period.as_secs(), "Starting news fetch loop");

        while !*shutdown.borrow() {
            self.news_fetch_iteration().await;

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("News fetch loop stopped");
    }

    async fn news_fetch_iteration(&self) {
        self.fetch_general_news().await;

        let active = self
            .inner
            .cache
            .get_active_symbols(&self.inner.settings.active_symbols)
            .await;
        for symbol in company_news_symbols(&active) {
            let articles = self.fetch_company_news(&symbol).await;
            self.inner.cache.set_news(&symbol, &articles).await;
        }

        self.inner
            .cache
            .set_last_update(tasks::NEWS_FETCH, Utc::now())
            .await;
    }

    /// General market news comes from Finnhub alone; an open circuit skips
    /// the feed for the cycle.
    async fn fetch_general_news(&self) {
        let Some(adapter) = self.inner.providers.get(DataProvider::Finnhub) else {
            return;
        };
        if self.inner.cache.is_circuit_open(DataProvider::Finnhub).await {
            info!("Finnhub circuit open, skipping general news this cycle");
            return;
        }

        match adapter.general_news().await {
            Ok(articles) => {
                self.inner.cache.set_news(GENERAL_NEWS_KEY, &articles).await;
                info!(count = articles.len(), "Updated general news");
            }
            Err(e) => {
                error!(error = %e, "Provider error while fetching general news");
                self.record_failure(DataProvider::Finnhub, &e).await;
            }
        }
    }

    /// Company news tries Finnhub first; an error trips its circuit, and an
    /// empty or failed result falls through to Yahoo Finance.
    async fn fetch_company_news(&self, symbol: &str) -> Vec<NewsArticle> {
        let finnhub_articles = match self.inner.providers.get(DataProvider::Finnhub) {
            Some(adapter) if !self.inner.cache.is_circuit_open(DataProvider::Finnhub).await => {
                match adapter.company_news(symbol).await {
                    Ok(articles) => articles,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Finnhub company news failed");
                        self.record_failure(DataProvider::Finnhub, &e).await;
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        if !finnhub_articles.is_empty() {
            return finnhub_articles;
        }

        match self.inner.providers.get(DataProvider::Yfinance) {
            Some(adapter) => match adapter.company_news(symbol).await {
                Ok(articles) => articles,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Yahoo company news failed");
                    self.record_failure(DataProvider::Yfinance, &e).await;
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    // ---- Status surfaces ----

    /// Probe every registered adapter concurrently and remember the results.
    ///
    /// Run at startup (where authentication failures surface) and from
    /// diagnostics, never from the request path: the read API reports the
    /// remembered results via [`known_provider_health`](Self::known_provider_health).
    pub async fn provider_health(&self) -> HashMap<DataProvider, bool> {
        let probes = self.inner.providers.all().map(|adapter| {
            let adapter = adapter.clone();
            async move { (adapter.identity(), adapter.health_probe().await) }
        });
        let results: HashMap<DataProvider, bool> =
            futures::future::join_all(probes).await.into_iter().collect();

        *self.inner.probe_results.lock().await = results.clone();
        results
    }

    /// Most recent probe results; providers never probed report unhealthy.
    pub async fn known_provider_health(&self) -> HashMap<DataProvider, bool> {
        self.inner.probe_results.lock().await.clone()
    }

    /// Whether a provider has a registered adapter
    pub fn is_registered(&self, provider: DataProvider) -> bool {
        self.inner.providers.get(provider).is_some()
    }

    /// Circuit state for every known provider, expired entries observed
    /// closed.
    pub async fn circuit_status(&self) -> HashMap<String, bool> {
        let mut status = HashMap::new();
        for provider in DataProvider::ALL {
            status.insert(
                provider.as_str().to_string(),
                self.inner.cache.is_circuit_open(provider).await,
            );
        }
        status
    }

    /// Last-update stamps for all three loops.
    pub async fn last_update_times(&self) -> LastUpdateTimes {
        LastUpdateTimes {
            asset_list_update: self.inner.cache.get_last_update(tasks::ASSET_LIST_UPDATE).await,
            price_fetch: self.inner.cache.get_last_update(tasks::PRICE_FETCH).await,
            news_fetch: self.inner.cache.get_last_update(tasks::NEWS_FETCH).await,
        }
    }
}

/// Stock-bucket symbols from the active list; the company-news chain only
/// covers these.
fn company_news_symbols(active: &[String]) -> Vec<String> {
    active
        .iter()
        .filter(|symbol| symbols::classify(symbol) == AssetType::Stocks)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::Asset;
    use async_trait::async_trait;

    struct StubProvider {
        identity: DataProvider,
        supports: Vec<AssetType>,
        quotes: HashMap<String, Quote>,
        fail: bool,
    }

    impl StubProvider {
        fn healthy(identity: DataProvider, supports: Vec<AssetType>, symbols: &[&str]) -> Self {
            let quotes = symbols
                .iter()
                .map(|s| {
                    (
                        s.to_string(),
                        Quote::new(*s, 100.0, identity, Utc::now()),
                    )
                })
                .collect();
            Self {
                identity,
                supports,
                quotes,
                fail: false,
            }
        }

        fn failing(identity: DataProvider, supports: Vec<AssetType>) -> Self {
            Self {
                identity,
                supports,
                quotes: HashMap::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn identity(&self) -> DataProvider {
            self.identity
        }

        fn rate_limit_per_minute(&self) -> u32 {
            60
        }

        fn supports(&self, asset_type: AssetType) -> bool {
            self.supports.contains(&asset_type)
        }

        async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
            if self.fail {
                return Err(AggregatorError::Provider {
                    provider: self.identity,
                    context: "stub failure".to_string(),
                });
            }
            Ok(requested
                .iter()
                .filter_map(|s| self.quotes.get(s).map(|q| (s.clone(), q.clone())))
                .collect())
        }

        async fn assets(&self, _asset_type: AssetType) -> Result<Vec<Asset>> {
            Ok(Vec::new())
        }
    }

    fn aggregator_with(providers: Vec<Arc<dyn ProviderAdapter>>) -> Aggregator {
        let mut registry = ProviderRegistry::default();
        for provider in providers {
            registry.register(provider);
        }
        // Disconnected cache: every circuit observes closed, writes drop.
        let cache = CacheStore::disconnected(300);
        let settings = test_settings();
        Aggregator::new(registry, cache, settings)
    }

    fn test_settings() -> Settings {
        Settings::for_tests()
    }

    #[test]
    fn test_company_news_symbols_filters_stock_bucket() {
        let active = vec![
            "AAPL".to_string(),
            "BTC-USD".to_string(),
            "EUR/USD".to_string(),
            "MSFT".to_string(),
        ];
        assert_eq!(company_news_symbols(&active), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_last_update_most_recent() {
        let older = Utc::now() - chrono::Duration::seconds(60);
        let newer = Utc::now();
        let times = LastUpdateTimes {
            asset_list_update: Some(older),
            price_fetch: Some(newer),
            news_fetch: None,
        };
        assert_eq!(times.most_recent(), Some(newer));
        assert_eq!(LastUpdateTimes::default().most_recent(), None);
    }

    #[tokio::test]
    async fn test_selection_prefers_primary() {
        let aggregator = aggregator_with(vec![
            Arc::new(StubProvider::healthy(
                DataProvider::Yfinance,
                vec![AssetType::Stocks, AssetType::Forex],
                &["AAPL"],
            )),
            Arc::new(StubProvider::healthy(
                DataProvider::Finnhub,
                vec![AssetType::Stocks],
                &["AAPL"],
            )),
        ]);

        let selected = aggregator.select_provider(AssetType::Stocks).await.unwrap();
        assert_eq!(selected.identity(), DataProvider::Yfinance);
    }

    #[tokio::test]
    async fn test_selection_falls_back_when_primary_missing() {
        let aggregator = aggregator_with(vec![Arc::new(StubProvider::healthy(
            DataProvider::Finnhub,
            vec![AssetType::Stocks],
            &["AAPL"],
        ))]);

        let selected = aggregator.select_provider(AssetType::Stocks).await.unwrap();
        assert_eq!(selected.identity(), DataProvider::Finnhub);
    }

    #[tokio::test]
    async fn test_selection_none_when_no_provider_covers_class() {
        let aggregator = aggregator_with(vec![Arc::new(StubProvider::healthy(
            DataProvider::Finnhub,
            vec![AssetType::Stocks],
            &["AAPL"],
        ))]);

        assert!(aggregator.select_provider(AssetType::Crypto).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_bucket_yields_no_quotes() {
        let aggregator = aggregator_with(vec![Arc::new(StubProvider::failing(
            DataProvider::Yfinance,
            vec![AssetType::Stocks, AssetType::Forex],
        ))]);

        let quotes = aggregator
            .fetch_quotes_for(AssetType::Stocks, &["AAPL".to_string()])
            .await;
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_bucket_fetch_returns_partial_batch() {
        let aggregator = aggregator_with(vec![Arc::new(StubProvider::healthy(
            DataProvider::Yfinance,
            vec![AssetType::Stocks, AssetType::Forex],
            &["AAPL"],
        ))]);

        let quotes = aggregator
            .fetch_quotes_for(
                AssetType::Stocks,
                &["AAPL".to_string(), "UNKNOWN".to_string()],
            )
            .await;
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn test_provider_health_remembered() {
        let aggregator = aggregator_with(vec![
            Arc::new(StubProvider::healthy(
                DataProvider::Yfinance,
                vec![AssetType::Stocks],
                &["AAPL"],
            )),
            Arc::new(StubProvider::failing(
                DataProvider::Finnhub,
                vec![AssetType::Stocks],
            )),
        ]);

        assert!(aggregator.known_provider_health().await.is_empty());

        let probed = aggregator.provider_health().await;
        assert_eq!(probed.get(&DataProvider::Yfinance), Some(&true));
        assert_eq!(probed.get(&DataProvider::Finnhub), Some(&false));

        let remembered = aggregator.known_provider_health().await;
        assert_eq!(remembered, probed);
        assert!(aggregator.is_registered(DataProvider::Yfinance));
        assert!(!aggregator.is_registered(DataProvider::Coingecko));
    }

    #[tokio::test]
    async fn test_background_tasks_lifecycle() {
        let aggregator = aggregator_with(vec![]);
        assert!(!aggregator.background_tasks_running().await);

        aggregator.start_background_tasks().await;
        assert!(aggregator.background_tasks_running().await);

        aggregator.shutdown().await;
        assert!(!aggregator.background_tasks_running().await);
    }
}
