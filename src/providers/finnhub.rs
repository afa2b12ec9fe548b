//! Finnhub adapter.
//!
//! Fallback for stocks and the primary news source. Quotes are one upstream
//! call per symbol (`/quote` has no batch form); change and percent change
//! are derived from the current price and previous close. Authentication is
//! the `token` query parameter.

use super::transport::ProviderHttp;
use super::ProviderAdapter;
use crate::config::Settings;
use crate::error::{AggregatorError, Result};
use crate::models::{Asset, AssetType, DataProvider, NewsArticle, Quote};
use crate::symbols;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Listing cap; the US exchange dump is tens of thousands of lines
const ASSET_LIST_LIMIT: usize = 1000;
/// Article caps per feed
const GENERAL_NEWS_LIMIT: usize = 50;
const COMPANY_NEWS_LIMIT: usize = 30;
/// Company-news lookback window
const COMPANY_NEWS_DAYS: i64 = 30;

#[derive(Deserialize)]
struct FinnhubQuote {
    /// Current price
    c: Option<f64>,
    /// High of the day
    h: Option<f64>,
    /// Low of the day
    l: Option<f64>,
    /// Open of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
}

#[derive(Deserialize)]
struct FinnhubSymbol {
    symbol: Option<String>,
    description: Option<String>,
    currency: Option<String>,
    figi: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct FinnhubNewsItem {
    headline: Option<String>,
    url: Option<String>,
    datetime: Option<i64>,
    summary: Option<String>,
    source: Option<String>,
    category: Option<String>,
    related: Option<String>,
}

/// Finnhub provider adapter
pub struct FinnhubProvider {
    http: ProviderHttp,
    base_url: String,
    api_key: String,
}

impl FinnhubProvider {
    /// Build the adapter from settings; fails without an API key.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key =
            settings
                .finnhub_api_key
                .clone()
                .ok_or_else(|| AggregatorError::AuthenticationFailed {
                    provider: DataProvider::Finnhub,
                    context: "FINNHUB_API_KEY is required".to_string(),
                })?;
        Self::build(
            DEFAULT_BASE_URL.to_string(),
            api_key,
            settings.rate_limit_for(DataProvider::Finnhub),
        )
    }

    fn build(base_url: String, api_key: String, per_minute: u32) -> Result<Self> {
        Ok(Self {
            http: ProviderHttp::new(DataProvider::Finnhub, per_minute)?,
            base_url,
            api_key,
        })
    }

    fn article_from(&self, item: &FinnhubNewsItem, symbol: Option<&str>) -> Option<NewsArticle> {
        let published = DateTime::<Utc>::from_timestamp(item.datetime?, 0)?;
        let article = NewsArticle::build(
            item.headline.as_deref()?,
            item.url.as_deref()?,
            item.source.as_deref().unwrap_or("Finnhub"),
            published,
        )?
        .with_summary(item.summary.as_deref())
        .with_category(item.category.as_deref().or(Some("general")));

        let related: Vec<String> = match symbol {
            Some(s) => vec![s.to_string()],
            None => item
                .related
                .as_deref()
                .map(|r| r.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        };
        Some(article.with_symbols(related))
    }

    fn news_from(&self, payload: Value, symbol: Option<&str>, limit: usize) -> Vec<NewsArticle> {
        let items: Vec<FinnhubNewsItem> = match serde_json::from_value(payload) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Unexpected Finnhub news payload");
                return Vec::new();
            }
        };

        items
            .iter()
            .take(limit)
            .filter_map(|item| {
                let article = self.article_from(item, symbol);
                if article.is_none() {
                    warn!("Dropping Finnhub news item with missing required fields");
                }
                article
            })
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for FinnhubProvider {
    fn identity(&self) -> DataProvider {
        DataProvider::Finnhub
    }

    fn rate_limit_per_minute(&self) -> u32 {
        self.http.rate_limit_per_minute()
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        asset_type == AssetType::Stocks
    }

    async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
        let url = format!("{}/quote", self.base_url);
        let mut quotes = HashMap::new();

        for symbol in requested {
            let params = [("symbol", symbol.as_str()), ("token", self.api_key.as_str())];
            let value = match self.http.get_json(&url, &params).await {
                Ok(value) => value,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };

            let raw: FinnhubQuote = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Unexpected Finnhub quote payload");
                    continue;
                }
            };

            // Finnhub reports c = 0 for unknown symbols rather than a 404.
            let Some(price) = raw.c.filter(|c| *c > 0.0) else {
                warn!(symbol = %symbol, "No quote data from Finnhub, skipping");
                continue;
            };

            let previous_close = raw.pc.filter(|pc| *pc > 0.0);
            let change = previous_close.map(|pc| price - pc);
            let percent_change = match (change, previous_close) {
                (Some(change), Some(pc)) => Some(change / pc * 100.0),
                _ => None,
            };

            let quote = Quote::new(symbol, price, DataProvider::Finnhub, Utc::now())
                .with_change(change, percent_change)
                .with_session(raw.h, raw.l, raw.o, previous_close)
                .with_currency(Some("USD".to_string()))
                .with_asset_type(AssetType::Stocks);
            quotes.insert(symbol.clone(), quote);
        }

        info!(
            requested = requested.len(),
            received = quotes.len(),
            "Retrieved quotes from Finnhub"
        );
        Ok(quotes)
    }

    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>> {
        if !self.supports(asset_type) {
            return Ok(Vec::new());
        }

        let url = format!("{}/stock/symbol", self.base_url);
        let params = [("exchange", "US"), ("token", self.api_key.as_str())];
        let value = self.http.get_json(&url, &params).await?;
        let listing: Vec<FinnhubSymbol> = serde_json::from_value(value)?;

        let assets: Vec<Asset> = listing
            .iter()
            .take(ASSET_LIST_LIMIT)
            .filter_map(|entry| {
                let symbol = entry.symbol.as_deref()?.trim();
                let description = entry.description.as_deref()?.trim();
                if symbol.is_empty() || description.is_empty() {
                    return None;
                }
                // Skip warrants, units and other dotted/dashed listings
                if symbol.contains(['.', '-', '/', '^']) {
                    return None;
                }

                let mut asset = Asset::new(symbol, description, AssetType::Stocks)
                    .with_exchange("US")
                    .with_currency(entry.currency.as_deref().unwrap_or("USD"));
                if let Some(figi) = &entry.figi {
                    asset = asset.with_metadata("figi", Value::String(figi.clone()));
                }
                if let Some(kind) = &entry.kind {
                    asset = asset.with_metadata("type", Value::String(kind.clone()));
                }
                Some(asset)
            })
            .collect();

        info!(count = assets.len(), "Retrieved asset list from Finnhub");
        Ok(assets)
    }

    async fn general_news(&self) -> Result<Vec<NewsArticle>> {
        let url = format!("{}/news", self.base_url);
        let params = [("category", "general"), ("token", self.api_key.as_str())];
        let payload = self.http.get_json(&url, &params).await?;

        let articles = self.news_from(payload, None, GENERAL_NEWS_LIMIT);
        info!(count = articles.len(), "Retrieved general news from Finnhub");
        Ok(articles)
    }

    async fn company_news(&self, symbol: &str) -> Result<Vec<NewsArticle>> {
        let symbol = symbols::normalize(symbol);
        if symbol.is_empty() {
            return Ok(Vec::new());
        }

        let to = Utc::now();
        let from = to - Duration::days(COMPANY_NEWS_DAYS);
        let from_str = from.format("%Y-%m-%d").to_string();
        let to_str = to.format("%Y-%m-%d").to_string();

        let url = format!("{}/company-news", self.base_url);
        let params = [
            ("symbol", symbol.as_str()),
            ("from", from_str.as_str()),
            ("to", to_str.as_str()),
            ("token", self.api_key.as_str()),
        ];
        let payload = self.http.get_json(&url, &params).await?;

        let articles = self.news_from(payload, Some(&symbol), COMPANY_NEWS_LIMIT);
        info!(symbol = %symbol, count = articles.len(), "Retrieved company news from Finnhub");
        Ok(articles)
    }
}
