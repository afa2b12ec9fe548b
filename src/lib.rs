//! # market-aggregator
//!
//! Multi-provider market data aggregation with circuit-breaker fallback.
//!
//! The library fans out to five upstream providers (Yahoo Finance, Finnhub,
//! CoinGecko, CoinMarketCap, Alpha Vantage), routes each asset class to a
//! primary provider with an automatic fallback, and materialises quotes,
//! asset lists and news into a Redis-backed cache. Readers (the HTTP server
//! in this workspace's `server` member) serve exclusively from that cache,
//! so request latency is decoupled from upstream latency.
//!
//! ## Quick Start
//!
//! ```no_run
//! use market_aggregator::{Aggregator, CacheStore, ProviderRegistry, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let cache = CacheStore::connect(&settings).await;
//!     let providers = ProviderRegistry::from_settings(&settings);
//!
//!     let aggregator = Aggregator::new(providers, cache, settings);
//!     aggregator.start_background_tasks().await;
//!
//!     // ... serve reads from aggregator.cache() ...
//!
//!     aggregator.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Aggregation orchestrator and its background loops
pub mod aggregator;
/// Redis-backed cache and circuit-breaker store
pub mod cache;
/// Environment-driven configuration
pub mod config;
/// Error types and result definitions
pub mod error;
/// Shared data models
pub mod models;
/// Provider adapters
pub mod providers;
/// Per-minute request budgets
pub mod rate_limit;
/// Canonical symbol handling
pub mod symbols;

// Re-export main types
pub use aggregator::{Aggregator, LastUpdateTimes};
pub use cache::CacheStore;
pub use config::{routing, LogFormat, Settings};
pub use error::{AggregatorError, Result};
pub use models::{Asset, AssetType, CircuitBreakerState, DataProvider, NewsArticle, Quote};
pub use providers::{ProviderAdapter, ProviderRegistry};
