//! Environment-driven configuration.
//!
//! Every knob has a default so the service starts in a development
//! environment with nothing but provider API keys set. Values are read once
//! at startup into [`Settings`]; the binary loads `.env` before calling
//! [`Settings::from_env`].

use crate::error::{AggregatorError, Result};
use crate::models::{AssetType, DataProvider};
use crate::symbols;
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Default active symbols when `ACTIVE_SYMBOLS` is unset
pub const DEFAULT_ACTIVE_SYMBOLS: &str = "AAPL,GOOGL,MSFT,TSLA,BTC-USD,ETH-USD,EUR/USD,GBP/USD";

/// Conservative per-minute request budgets, below published upstream limits.
///
/// Preserved verbatim from production tuning; override per provider with
/// `RATE_LIMIT_<PROVIDER>_PER_MINUTE`.
pub mod rate_limits {
    /// Yahoo Finance
    pub const YFINANCE: u32 = 30;
    /// Finnhub (free tier allows 60/min)
    pub const FINNHUB: u32 = 50;
    /// CoinGecko (free tier allows 50/min)
    pub const COINGECKO: u32 = 40;
    /// CoinMarketCap (basic plan is budgeted per day)
    pub const COINMARKETCAP: u32 = 15;
    /// Alpha Vantage (free tier allows 5/min)
    pub const ALPHA_VANTAGE: u32 = 4;
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON lines
    Json,
    /// Human-readable text
    Text,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            _ => Err(()),
        }
    }
}

/// Application settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Service name used in log output
    pub app_name: String,
    /// Service version reported by `/health`
    pub app_version: String,

    /// Redis host
    pub redis_host: String,
    /// Redis port
    pub redis_port: u16,
    /// Redis logical database
    pub redis_db: u32,
    /// Redis password, when authentication is enabled
    pub redis_password: Option<String>,

    /// Seconds an open circuit diverts traffic before closing by expiry
    pub circuit_breaker_timeout: u64,

    /// Asset-list loop period in seconds
    pub asset_list_update_interval: u64,
    /// Quote loop period in seconds
    pub price_fetch_interval: u64,
    /// News loop period in seconds
    pub news_fetch_interval: u64,

    /// Finnhub API key
    pub finnhub_api_key: Option<String>,
    /// CoinMarketCap API key
    pub coinmarketcap_api_key: Option<String>,
    /// Alpha Vantage API key
    pub alpha_vantage_api_key: Option<String>,
    /// CoinGecko base URL (free tier, no key)
    pub coingecko_api_url: String,

    /// Quote entry TTL in seconds
    pub quotes_cache_ttl: u64,
    /// Asset-list entry TTL in seconds
    pub assets_cache_ttl: u64,
    /// News bundle TTL in seconds
    pub news_cache_ttl: u64,

    /// Seed working set for the quote loop, canonical form
    pub active_symbols: Vec<String>,

    /// Log level name for the default env filter
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    rate_limit_yfinance: u32,
    rate_limit_finnhub: u32,
    rate_limit_coingecko: u32,
    rate_limit_coinmarketcap: u32,
    rate_limit_alpha_vantage: u32,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Fails only on values that cannot be defaulted away: an unknown
    /// `LOG_FORMAT` or an `ACTIVE_SYMBOLS` list that parses to nothing.
    pub fn from_env() -> Result<Self> {
        let log_format_raw = env_string("LOG_FORMAT", "json");
        let log_format =
            log_format_raw
                .parse()
                .map_err(|_| AggregatorError::InvalidParameter {
                    param: "LOG_FORMAT".to_string(),
                    reason: format!("'{log_format_raw}' is not one of: json, text"),
                })?;

        let active_raw = env_string("ACTIVE_SYMBOLS", DEFAULT_ACTIVE_SYMBOLS);
        let active_symbols = symbols::parse_symbol_list(&active_raw);
        if active_symbols.is_empty() {
            return Err(AggregatorError::InvalidParameter {
                param: "ACTIVE_SYMBOLS".to_string(),
                reason: "must contain at least one symbol".to_string(),
            });
        }

        Ok(Self {
            app_name: env_string("APP_NAME", "Market Data Aggregator"),
            app_version: env_string("APP_VERSION", env!("CARGO_PKG_VERSION")),

            redis_host: env_string("REDIS_HOST", "localhost"),
            redis_port: env_parse("REDIS_PORT", 6379),
            redis_db: env_parse("REDIS_DB", 0),
            redis_password: env_opt("REDIS_PASSWORD"),

            circuit_breaker_timeout: env_parse("CIRCUIT_BREAKER_TIMEOUT", 300),

            asset_list_update_interval: env_parse("ASSET_LIST_UPDATE_INTERVAL", 86_400),
            price_fetch_interval: env_parse("PRICE_FETCH_INTERVAL", 5),
            news_fetch_interval: env_parse("NEWS_FETCH_INTERVAL", 600),

            finnhub_api_key: env_opt("FINNHUB_API_KEY"),
            coinmarketcap_api_key: env_opt("COINMARKETCAP_API_KEY"),
            alpha_vantage_api_key: env_opt("ALPHA_VANTAGE_API_KEY"),
            coingecko_api_url: env_string("COINGECKO_API_URL", "https://api.coingecko.com/api/v3"),

            quotes_cache_ttl: env_parse("QUOTES_CACHE_TTL", 300),
            assets_cache_ttl: env_parse("ASSETS_CACHE_TTL", 86_400),
            news_cache_ttl: env_parse("NEWS_CACHE_TTL", 900),

            active_symbols,

            log_level: env_string("LOG_LEVEL", "info"),
            log_format,

            rate_limit_yfinance: env_parse("RATE_LIMIT_YFINANCE_PER_MINUTE", rate_limits::YFINANCE),
            rate_limit_finnhub: env_parse("RATE_LIMIT_FINNHUB_PER_MINUTE", rate_limits::FINNHUB),
            rate_limit_coingecko: env_parse(
                "RATE_LIMIT_COINGECKO_PER_MINUTE",
                rate_limits::COINGECKO,
            ),
            rate_limit_coinmarketcap: env_parse(
                "RATE_LIMIT_COINMARKETCAP_PER_MINUTE",
                rate_limits::COINMARKETCAP,
            ),
            rate_limit_alpha_vantage: env_parse(
                "RATE_LIMIT_ALPHA_VANTAGE_PER_MINUTE",
                rate_limits::ALPHA_VANTAGE,
            ),
        })
    }

    /// Redis connection URL assembled from host/port/db/password
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }

    /// Per-minute request budget for a provider
    pub fn rate_limit_for(&self, provider: DataProvider) -> u32 {
        match provider {
            DataProvider::Yfinance => self.rate_limit_yfinance,
            DataProvider::Finnhub => self.rate_limit_finnhub,
            DataProvider::Coingecko => self.rate_limit_coingecko,
            DataProvider::Coinmarketcap => self.rate_limit_coinmarketcap,
            DataProvider::AlphaVantage => self.rate_limit_alpha_vantage,
        }
    }
}

#[cfg(test)]
impl Settings {
    /// Default settings without touching the process environment.
    pub(crate) fn for_tests() -> Self {
        Self {
            app_name: "Market Data Aggregator".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            circuit_breaker_timeout: 300,
            asset_list_update_interval: 86_400,
            price_fetch_interval: 5,
            news_fetch_interval: 600,
            finnhub_api_key: Some("test-key".to_string()),
            coinmarketcap_api_key: Some("test-key".to_string()),
            alpha_vantage_api_key: Some("test-key".to_string()),
            coingecko_api_url: "https://api.coingecko.com/api/v3".to_string(),
            quotes_cache_ttl: 300,
            assets_cache_ttl: 86_400,
            news_cache_ttl: 900,
            active_symbols: symbols::parse_symbol_list(DEFAULT_ACTIVE_SYMBOLS),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            rate_limit_yfinance: rate_limits::YFINANCE,
            rate_limit_finnhub: rate_limits::FINNHUB,
            rate_limit_coingecko: rate_limits::COINGECKO,
            rate_limit_coinmarketcap: rate_limits::COINMARKETCAP,
            rate_limit_alpha_vantage: rate_limits::ALPHA_VANTAGE,
        }
    }
}

/// Static primary/fallback routing per asset class.
///
/// Circuits divert traffic from primary to fallback; when both are open the
/// class is skipped for the cycle and its cache simply ages.
pub fn routing(asset_type: AssetType) -> (DataProvider, DataProvider) {
    match asset_type {
        AssetType::Stocks => (DataProvider::Yfinance, DataProvider::Finnhub),
        AssetType::Crypto => (DataProvider::Coingecko, DataProvider::Coinmarketcap),
        AssetType::Forex => (DataProvider::AlphaVantage, DataProvider::Yfinance),
    }
}
