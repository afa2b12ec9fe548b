//! Provider adapters.
//!
//! One adapter per upstream, each implementing the uniform capability set:
//! batch quotes, asset listings, optional news feeds and a cheap health
//! probe. Adapters own symbol translation to and from their upstream's
//! format and are stateless apart from their minute-budget counter.

mod alphavantage;
mod coingecko;
mod coinmarketcap;
mod finnhub;
mod transport;
mod yahoo;

pub use alphavantage::AlphaVantageProvider;
pub use coingecko::CoinGeckoProvider;
pub use coinmarketcap::CoinMarketCapProvider;
pub use finnhub::FinnhubProvider;
pub use transport::ProviderHttp;
pub use yahoo::YahooFinanceProvider;

use crate::config::Settings;
use crate::error::Result;
use crate::models::{Asset, AssetType, DataProvider, NewsArticle, Quote};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Uniform capability contract implemented by every upstream adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// This adapter's provider identity
    fn identity(&self) -> DataProvider;

    /// Conservative per-minute request budget
    fn rate_limit_per_minute(&self) -> u32;

    /// Whether this adapter covers the given asset class
    fn supports(&self, asset_type: AssetType) -> bool;

    /// Fetch quotes for canonical symbols.
    ///
    /// Missing symbols are omitted from the result, never fabricated; a
    /// partial batch is normal. Every returned quote names this adapter as
    /// its source and carries the observation time.
    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;

    /// Fetch the instrument listing for an asset class.
    ///
    /// Returns an empty list for classes this adapter does not cover.
    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>>;

    /// Fetch general market news. Optional capability; the default is empty.
    async fn general_news(&self) -> Result<Vec<NewsArticle>> {
        Ok(Vec::new())
    }

    /// Fetch company news for one symbol. Optional capability; the default
    /// is empty.
    async fn company_news(&self, _symbol: &str) -> Result<Vec<NewsArticle>> {
        Ok(Vec::new())
    }

    /// Cheap upstream liveness probe: a quote pull for a well-known symbol
    /// of a supported class. Never surfaces the failure.
    async fn health_probe(&self) -> bool {
        let probe = if self.supports(AssetType::Stocks) {
            "AAPL"
        } else if self.supports(AssetType::Crypto) {
            "BTC-USD"
        } else if self.supports(AssetType::Forex) {
            "EUR/USD"
        } else {
            return true;
        };

        match self.quotes(&[probe.to_string()]).await {
            Ok(quotes) => !quotes.is_empty(),
            Err(e) => {
                warn!(provider = %self.identity(), error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// The set of constructed adapters, keyed by provider identity.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<DataProvider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Construct every adapter the settings allow.
    ///
    /// Adapters that fail to build (missing API key, client construction
    /// error) are skipped with an error log so one bad provider never blocks
    /// the rest.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::default();

        registry.insert_built("yfinance", YahooFinanceProvider::new(settings).map(Arc::new));
        registry.insert_built("finnhub", FinnhubProvider::new(settings).map(Arc::new));
        registry.insert_built("coingecko", CoinGeckoProvider::new(settings).map(Arc::new));
        registry.insert_built(
            "coinmarketcap",
            CoinMarketCapProvider::new(settings).map(Arc::new),
        );
        registry.insert_built(
            "alpha_vantage",
            AlphaVantageProvider::new(settings).map(Arc::new),
        );

        info!(
            active_providers = ?registry.adapters.keys().map(|p| p.as_str()).collect::<Vec<_>>(),
            "Provider registry initialized"
        );
        registry
    }

    fn insert_built<A: ProviderAdapter + 'static>(&mut self, name: &str, built: Result<Arc<A>>) {
        match built {
            Ok(adapter) => {
                self.adapters.insert(adapter.identity(), adapter);
            }
            Err(e) => {
                error!(provider = %name, error = %e, "Failed to initialize provider");
            }
        }
    }

    /// Register an adapter, replacing any previous one with the same identity.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.identity(), adapter);
    }

    /// Look up an adapter by identity
    pub fn get(&self, provider: DataProvider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// All registered adapters
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn ProviderAdapter>> {
        self.adapters.values()
    }

    /// Number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
