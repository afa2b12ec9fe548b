use super::{AssetType, DataProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time price observation for one symbol.
///
/// A quote always names the provider that produced it and the instant it was
/// observed. Prices are rounded to 8 decimal places and percent changes to 4,
/// matching the precision the cache serves downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Canonical symbol (uppercase)
    pub symbol: String,
    /// Last traded price, strictly positive
    pub price: f64,
    /// Absolute change against the previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    /// Percent change against the previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    /// Traded volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    /// Market capitalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    /// 24-hour (or session) high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_24h: Option<f64>,
    /// 24-hour (or session) low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_24h: Option<f64>,
    /// Session open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    /// Previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    /// Best bid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    /// Best ask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    /// Provider that produced this observation
    pub source: DataProvider,
    /// Observation time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Quote currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Asset class, when the provider knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
}

/// Round to 8 decimal places (price precision)
fn round_price(v: f64) -> f64 {
    (v * 1e8).round() / 1e8
}

/// Round to 4 decimal places (percent precision)
fn round_percent(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

impl Quote {
    /// Create a quote with only the required fields set.
    ///
    /// The price is rounded to 8 decimal places; optional fields start empty
    /// and are filled through the builder-style setters below.
    pub fn new(
        symbol: impl Into<String>,
        price: f64,
        source: DataProvider,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price: round_price(price),
            change: None,
            percent_change: None,
            volume: None,
            market_cap: None,
            high_24h: None,
            low_24h: None,
            open: None,
            close: None,
            bid: None,
            ask: None,
            source,
            timestamp,
            currency: None,
            asset_type: None,
        }
    }

    /// Set absolute and percent change (percent rounded to 4 dp)
    pub fn with_change(mut self, change: Option<f64>, percent_change: Option<f64>) -> Self {
        self.change = change.map(round_price);
        self.percent_change = percent_change.map(round_percent);
        self
    }

    /// Set volume
    pub fn with_volume(mut self, volume: Option<u64>) -> Self {
        self.volume = volume;
        self
    }

    /// Set market capitalization
    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap;
        self
    }

    /// Set the session range (high/low/open/previous close)
    pub fn with_session(
        mut self,
        high: Option<f64>,
        low: Option<f64>,
        open: Option<f64>,
        close: Option<f64>,
    ) -> Self {
        self.high_24h = high;
        self.low_24h = low;
        self.open = open;
        self.close = close;
        self
    }

    /// Set bid/ask
    pub fn with_book(mut self, bid: Option<f64>, ask: Option<f64>) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    /// Set the quote currency
    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    /// Set the asset class
    pub fn with_asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }
}
