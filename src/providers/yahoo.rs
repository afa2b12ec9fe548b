//! Yahoo Finance adapter.
//!
//! Primary for stocks and the fallback for forex. Quotes come from the v7
//! batch endpoint, so one upstream call covers the whole bucket. Yahoo has no
//! listing API on this surface; asset lists are the curated majors. Company
//! news rides the search endpoint and degrades to an empty list so the news
//! fallback chain never stalls on it.

use super::transport::ProviderHttp;
use super::ProviderAdapter;
use crate::config::Settings;
use crate::error::Result;
use crate::models::{Asset, AssetType, DataProvider, NewsArticle, Quote};
use crate::symbols;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Number of news articles requested per symbol
const NEWS_COUNT: u32 = 10;

/// Curated large-cap listing; Yahoo exposes no bulk symbol directory on the
/// free quote surface.
const STOCK_LIST: &[(&str, &str)] = &[
    ("AAPL", "Apple Inc."),
    ("MSFT", "Microsoft Corporation"),
    ("GOOGL", "Alphabet Inc."),
    ("AMZN", "Amazon.com Inc."),
    ("TSLA", "Tesla Inc."),
    ("META", "Meta Platforms Inc."),
    ("NVDA", "NVIDIA Corporation"),
    ("BRK-B", "Berkshire Hathaway Inc."),
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
];

#[derive(Deserialize)]
struct BatchQuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: BatchQuoteBody,
}

#[derive(Deserialize)]
struct BatchQuoteBody {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_volume: Option<u64>,
    market_cap: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_previous_close: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooNewsItem {
    title: Option<String>,
    link: Option<String>,
    publisher: Option<String>,
    provider_publish_time: Option<i64>,
    #[serde(default)]
    related_tickers: Vec<String>,
}

/// Yahoo Finance provider adapter
pub struct YahooFinanceProvider {
    http: ProviderHttp,
    base_url: String,
}

impl YahooFinanceProvider {
    /// Build the adapter from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::build(
            DEFAULT_BASE_URL.to_string(),
            settings.rate_limit_for(DataProvider::Yfinance),
        )
    }

    fn build(base_url: String, per_minute: u32) -> Result<Self> {
        Ok(Self {
            http: ProviderHttp::new(DataProvider::Yfinance, per_minute)?,
            base_url,
        })
    }

    /// Canonical symbol to Yahoo's upstream form: `BASE/QUOTE` forex pairs
    /// become `BASEQUOTE=X`, everything else passes through.
    fn to_upstream(symbol: &str) -> String {
        if symbol.contains('/') {
            let compact: String = symbol.split('/').collect();
            format!("{compact}=X")
        } else {
            symbol.to_string()
        }
    }

    fn quote_from(&self, canonical: &str, raw: &YahooQuote, now: DateTime<Utc>) -> Option<Quote> {
        let price = raw
            .regular_market_price
            .or(raw.bid)
            .filter(|p| *p > 0.0)?;

        let asset_type = if raw.symbol.ends_with("=X") {
            AssetType::Forex
        } else {
            AssetType::Stocks
        };

        Some(
            Quote::new(canonical, price, DataProvider::Yfinance, now)
                .with_change(raw.regular_market_change, raw.regular_market_change_percent)
                .with_volume(raw.regular_market_volume)
                .with_market_cap(raw.market_cap)
                .with_session(
                    raw.regular_market_day_high,
                    raw.regular_market_day_low,
                    raw.regular_market_open,
                    raw.regular_market_previous_close,
                )
                .with_book(raw.bid, raw.ask)
                .with_currency(raw.currency.clone())
                .with_asset_type(asset_type),
        )
    }
}

#[async_trait]
impl ProviderAdapter for YahooFinanceProvider {
    fn identity(&self) -> DataProvider {
        DataProvider::Yfinance
    }

    fn rate_limit_per_minute(&self) -> u32 {
        self.http.rate_limit_per_minute()
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        matches!(asset_type, AssetType::Stocks | AssetType::Forex)
    }

    async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
        if requested.is_empty() {
            return Ok(HashMap::new());
        }

        // upstream symbol -> canonical, so responses map back to what the
        // caller asked for
        let mut reverse: HashMap<String, String> = HashMap::new();
        let mut upstream: Vec<String> = Vec::with_capacity(requested.len());
        for symbol in requested {
            let mapped = Self::to_upstream(symbol);
            reverse.insert(mapped.clone(), symbol.clone());
            upstream.push(mapped);
        }

        let url = format!("{}/v7/finance/quote", self.base_url);
        let joined = upstream.join(",");
        let value = self.http.get_json(&url, &[("symbols", &joined)]).await?;
        let envelope: BatchQuoteEnvelope = serde_json::from_value(value)?;

        let now = Utc::now();
        let mut quotes = HashMap::new();
        for raw in &envelope.quote_response.result {
            let Some(canonical) = reverse.get(&raw.symbol) else {
                continue;
            };
            match self.quote_from(canonical, raw, now) {
                Some(quote) => {
                    quotes.insert(canonical.clone(), quote);
                }
                None => {
                    warn!(symbol = %canonical, "No usable price in Yahoo quote, skipping");
                }
            }
        }

        info!(
            requested = requested.len(),
            received = quotes.len(),
            "Retrieved quotes from Yahoo Finance"
        );
        Ok(quotes)
    }

    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>> {
        let list: Vec<Asset> = match asset_type {
            AssetType::Stocks => STOCK_LIST
                .iter()
                .map(|(symbol, name)| {
                    Asset::new(symbol, *name, AssetType::Stocks)
                        .with_exchange("NASDAQ/NYSE")
                        .with_currency("USD")
                })
                .collect(),
            AssetType::Forex => FOREX_LIST
                .iter()
                .map(|(symbol, name)| {
                    Asset::new(symbol, *name, AssetType::Forex).with_exchange("Forex")
                })
                .collect(),
            AssetType::Crypto => Vec::new(),
        };
        Ok(list)
    }

    async fn company_news(&self, symbol: &str) -> Result<Vec<NewsArticle>> {
        let symbol = symbols::normalize(symbol);
        if symbol.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/finance/search", self.base_url);
        let count = NEWS_COUNT.to_string();
        let params = [
            ("q", symbol.as_str()),
            ("newsCount", count.as_str()),
            ("quotesCount", "0"),
        ];

        // The news chain treats Yahoo as best-effort: any failure here is an
        // empty list, not an error.
        let value = match self.http.get_json(&url, &params).await {
            Ok(value) => value,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Yahoo news fetch failed");
                return Ok(Vec::new());
            }
        };

        let envelope: SearchEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Unexpected Yahoo news payload");
                return Ok(Vec::new());
            }
        };

        let articles: Vec<NewsArticle> = envelope
            .news
            .iter()
            .filter_map(|item| {
                let published = item
                    .provider_publish_time
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                    .unwrap_or_else(Utc::now);
                let article = NewsArticle::build(
                    item.title.as_deref()?,
                    item.link.as_deref()?,
                    item.publisher.as_deref().unwrap_or("Yahoo Finance"),
                    published,
                )?;
                let mut related = vec![symbol.clone()];
                related.extend(item.related_tickers.iter().cloned());
                Some(article.with_symbols(related))
            })
            .collect();

        info!(symbol = %symbol, count = articles.len(), "Retrieved company news from Yahoo Finance");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(base_url: String) -> YahooFinanceProvider {
        YahooFinanceProvider::build(base_url, 1000).unwrap()
    }

    #[test]
    fn test_to_upstream_forex_mapping() {
        assert_eq!(YahooFinanceProvider::to_upstream("EUR/USD"), "EURUSD=X");
        assert_eq!(YahooFinanceProvider::to_upstream("EURUSD=X"), "EURUSD=X");
        assert_eq!(YahooFinanceProvider::to_upstream("AAPL"), "AAPL");
    }

    #[test]
    fn test_to_upstream_idempotent() {
        let once = YahooFinanceProvider::to_upstream("EUR/USD");
        assert_eq!(YahooFinanceProvider::to_upstream(&once), once);
    }

    #[tokio::test]
    async fn test_quotes_batch_maps_back_to_canonical() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v7/finance/quote")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbols".into(),
                "AAPL,EURUSD=X".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"quoteResponse":{"result":[
                    {"symbol":"AAPL","regularMarketPrice":190.5,"regularMarketChange":1.5,
                     "regularMarketChangePercent":0.7937,"regularMarketVolume":52000000,
                     "regularMarketPreviousClose":189.0,"currency":"USD"},
                    {"symbol":"EURUSD=X","regularMarketPrice":1.0876,"bid":1.0875,"ask":1.0877,
                     "currency":"USD"}
                ],"error":null}}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let quotes = adapter
            .quotes(&["AAPL".to_string(), "EUR/USD".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        let aapl = &quotes["AAPL"];
        assert_eq!(aapl.price, 190.5);
        assert_eq!(aapl.source, DataProvider::Yfinance);
        assert_eq!(aapl.asset_type, Some(AssetType::Stocks));

        let eur = &quotes["EUR/USD"];
        assert_eq!(eur.symbol, "EUR/USD");
        assert_eq!(eur.asset_type, Some(AssetType::Forex));
        assert_eq!(eur.bid, Some(1.0875));
    }

    #[tokio::test]
    async fn test_quotes_skip_unpriced_symbols() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v7/finance/quote")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"quoteResponse":{"result":[
                    {"symbol":"ZZZZ","currency":"USD"}
                ],"error":null}}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let quotes = adapter.quotes(&["ZZZZ".to_string()]).await.unwrap();
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_company_news_failure_is_empty_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/finance/search")
            .with_status(403)
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let news = adapter.company_news("MSFT").await.unwrap();
        assert!(news.is_empty());
    }

    #[tokio::test]
    async fn test_company_news_maps_articles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/finance/search")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"news":[
                    {"title":"Microsoft ships something","link":"https://news.test/msft",
                     "publisher":"TestWire","providerPublishTime":1700000000,
                     "relatedTickers":["MSFT","AAPL"]},
                    {"link":"https://news.test/no-title"}
                ]}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let news = adapter.company_news("msft").await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Microsoft ships something");
        assert_eq!(news[0].symbols, vec!["MSFT", "AAPL"]);
    }

    #[tokio::test]
    async fn test_assets_curated_lists() {
        let settingsless = adapter("http://unused.test".to_string());
        let stocks = settingsless.assets(AssetType::Stocks).await.unwrap();
        assert_eq!(stocks.len(), STOCK_LIST.len());
        assert!(stocks.iter().all(|a| a.asset_type == AssetType::Stocks));

        let crypto = settingsless.assets(AssetType::Crypto).await.unwrap();
        assert!(crypto.is_empty());
    }
}
