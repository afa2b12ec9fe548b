//! Alpha Vantage adapter.
//!
//! Primary for forex, with a stock path for completeness. Every quote is one
//! upstream call (`CURRENCY_EXCHANGE_RATE` or `GLOBAL_QUOTE`); the response
//! fields carry numbered names like `"5. Exchange Rate"` which are extracted
//! positionally. Authentication is the `apikey` query parameter. The free
//! tier budget is tiny, so this adapter leans hardest on the minute gate.

use super::transport::ProviderHttp;
use super::ProviderAdapter;
use crate::config::Settings;
use crate::error::{AggregatorError, Result};
use crate::models::{Asset, AssetType, DataProvider, Quote};
use crate::symbols;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

const FOREX_LIST: &[(&str, &str)] = &[
    ("EUR/USD", "Euro / US Dollar"),
    ("GBP/USD", "British Pound / US Dollar"),
    ("USD/JPY", "US Dollar / Japanese Yen"),
    ("USD/CHF", "US Dollar / Swiss Franc"),
    ("AUD/USD", "Australian Dollar / US Dollar"),
    ("USD/CAD", "US Dollar / Canadian Dollar"),
    ("NZD/USD", "New Zealand Dollar / US Dollar"),
    ("EUR/GBP", "Euro / British Pound"),
    ("EUR/JPY", "Euro / Japanese Yen"),
    ("GBP/JPY", "British Pound / Japanese Yen"),
    ("EUR/CHF", "Euro / Swiss Franc"),
    ("GBP/CHF", "British Pound / Swiss Franc"),
    ("AUD/JPY", "Australian Dollar / Japanese Yen"),
    ("CAD/JPY", "Canadian Dollar / Japanese Yen"),
    ("CHF/JPY", "Swiss Franc / Japanese Yen"),
    ("EUR/AUD", "Euro / Australian Dollar"),
    ("EUR/CAD", "Euro / Canadian Dollar"),
    ("GBP/AUD", "British Pound / Australian Dollar"),
    ("AUD/CAD", "Australian Dollar / Canadian Dollar"),
    ("NZD/JPY", "New Zealand Dollar / Japanese Yen"),
];

const STOCK_LIST: &[(&str, &str)] = &[
    ("AAPL", "Apple Inc."),
    ("MSFT", "Microsoft Corporation"),
    ("GOOGL", "Alphabet Inc."),
    ("AMZN", "Amazon.com Inc."),
    ("TSLA", "Tesla Inc."),
    ("META", "Meta Platforms Inc."),
    ("NVDA", "NVIDIA Corporation"),
    ("BRK.B", "Berkshire Hathaway Inc."),
    ("JNJ", "Johnson & Johnson"),
    ("V", "Visa Inc."),
    ("WMT", "Walmart Inc."),
    ("JPM", "JPMorgan Chase & Co."),
    ("MA", "Mastercard Incorporated"),
    ("PG", "The Procter & Gamble Company"),
    ("UNH", "UnitedHealth Group Incorporated"),
    ("DIS", "The Walt Disney Company"),
    ("HD", "The Home Depot Inc."),
    ("BAC", "Bank of America Corporation"),
    ("ADBE", "Adobe Inc."),
    ("CRM", "Salesforce Inc."),
];

/// Split a canonical forex symbol into base and quote currencies.
///
/// Accepts `EUR/USD` and compact `EURUSD`; returns `None` for anything that
/// does not look like a currency pair.
fn split_pair(symbol: &str) -> Option<(String, String)> {
    if let Some((base, quote)) = symbol.split_once('/') {
        if base.len() == 3 && quote.len() == 3 {
            return Some((base.to_string(), quote.to_string()));
        }
        return None;
    }
    if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some((symbol[..3].to_string(), symbol[3..].to_string()));
    }
    None
}

fn field_f64(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key)?.as_str()?.trim().parse().ok()
}

/// Parse a `"1.2345%"`-shaped percent field
fn field_percent(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key)?
        .as_str()?
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .ok()
}

/// Alpha Vantage provider adapter
pub struct AlphaVantageProvider {
    http: ProviderHttp,
    base_url: String,
    api_key: String,
}

impl AlphaVantageProvider {
    /// Build the adapter from settings; fails without an API key.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.alpha_vantage_api_key.clone().ok_or_else(|| {
            AggregatorError::AuthenticationFailed {
                provider: DataProvider::AlphaVantage,
                context: "ALPHA_VANTAGE_API_KEY is required".to_string(),
            }
        })?;
        Self::build(
            DEFAULT_BASE_URL.to_string(),
            api_key,
            settings.rate_limit_for(DataProvider::AlphaVantage),
        )
    }

    fn build(base_url: String, api_key: String, per_minute: u32) -> Result<Self> {
        Ok(Self {
            http: ProviderHttp::new(DataProvider::AlphaVantage, per_minute)?,
            base_url,
            api_key,
        })
    }

    async fn forex_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let Some((base, quote_ccy)) = split_pair(symbol) else {
            warn!(symbol = %symbol, "Invalid forex symbol format");
            return Ok(None);
        };

        let params = [
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", base.as_str()),
            ("to_currency", quote_ccy.as_str()),
            ("apikey", self.api_key.as_str()),
        ];
        let value = self.http.get_json(&self.base_url, &params).await?;

        let Some(rate) = value.get("Realtime Currency Exchange Rate") else {
            return Ok(None);
        };
        let Some(price) = field_f64(rate, "5. Exchange Rate").filter(|p| *p > 0.0) else {
            return Ok(None);
        };

        Ok(Some(
            Quote::new(symbol, price, DataProvider::AlphaVantage, Utc::now())
                .with_book(
                    field_f64(rate, "8. Bid Price"),
                    field_f64(rate, "9. Ask Price"),
                )
                .with_currency(Some(quote_ccy))
                .with_asset_type(AssetType::Forex),
        ))
    }

    async fn stock_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let params = [
            ("function", "GLOBAL_QUOTE"),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ];
        let value = self.http.get_json(&self.base_url, &params).await?;

        let Some(global) = value.get("Global Quote") else {
            return Ok(None);
        };
        let Some(price) = field_f64(global, "05. price").filter(|p| *p > 0.0) else {
            return Ok(None);
        };

        // Zero-valued OHLC fields mean "not reported"
        let nonzero = |v: Option<f64>| v.filter(|x| *x != 0.0);

        Ok(Some(
            Quote::new(symbol, price, DataProvider::AlphaVantage, Utc::now())
                .with_change(
                    field_f64(global, "09. change"),
                    field_percent(global, "10. change percent"),
                )
                .with_volume(field_f64(global, "06. volume").map(|v| v as u64))
                .with_session(
                    nonzero(field_f64(global, "03. high")),
                    nonzero(field_f64(global, "04. low")),
                    nonzero(field_f64(global, "02. open")),
                    nonzero(field_f64(global, "08. previous close")),
                )
                .with_currency(Some("USD".to_string()))
                .with_asset_type(AssetType::Stocks),
        ))
    }
}

#[async_trait]
impl ProviderAdapter for AlphaVantageProvider {
    fn identity(&self) -> DataProvider {
        DataProvider::AlphaVantage
    }

    fn rate_limit_per_minute(&self) -> u32 {
        self.http.rate_limit_per_minute()
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        matches!(asset_type, AssetType::Forex | AssetType::Stocks)
    }

    async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
        let mut quotes = HashMap::new();

        for symbol in requested {
            let fetched = if symbols::is_forex(symbol) || split_pair(symbol).is_some() {
                self.forex_quote(symbol).await
            } else {
                self.stock_quote(symbol).await
            };

            match fetched {
                Ok(Some(quote)) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Ok(None) => {
                    warn!(symbol = %symbol, "No quote data from Alpha Vantage, skipping");
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        info!(
            requested = requested.len(),
            received = quotes.len(),
            "Retrieved quotes from Alpha Vantage"
        );
        Ok(quotes)
    }

    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>> {
        // Alpha Vantage has no listing API; both classes are curated majors.
        let list: Vec<Asset> = match asset_type {
            AssetType::Forex => FOREX_LIST
                .iter()
                .map(|(symbol, name)| {
                    Asset::new(symbol, *name, AssetType::Forex).with_exchange("Forex")
                })
                .collect(),
            AssetType::Stocks => STOCK_LIST
                .iter()
                .map(|(symbol, name)| {
                    Asset::new(symbol, *name, AssetType::Stocks)
                        .with_exchange("NASDAQ/NYSE")
                        .with_currency("USD")
                })
                .collect(),
            AssetType::Crypto => Vec::new(),
        };
        Ok(list)
    }
}
