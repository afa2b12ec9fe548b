//! CoinMarketCap adapter.
//!
//! Crypto fallback. Authentication is the `X-CMC_PRO_API_KEY` header, set as
//! a default header on the adapter's client. Quote batches go through
//! `/cryptocurrency/quotes/latest` keyed by bare tickers.

use super::coingecko::strip_quote_suffix;
use super::transport::ProviderHttp;
use super::ProviderAdapter;
use crate::config::Settings;
use crate::error::{AggregatorError, Result};
use crate::models::{Asset, AssetType, DataProvider, Quote};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1";

const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Listing cap for `/cryptocurrency/listings/latest`
const ASSET_LIST_LIMIT: u32 = 500;

#[derive(Deserialize)]
struct UsdQuote {
    price: Option<f64>,
    volume_24h: Option<f64>,
    percent_change_24h: Option<f64>,
    market_cap: Option<f64>,
}

#[derive(Deserialize)]
struct CmcCoin {
    quote: HashMap<String, UsdQuote>,
}

#[derive(Deserialize)]
struct CmcListingEntry {
    id: Option<i64>,
    name: Option<String>,
    symbol: Option<String>,
    slug: Option<String>,
    cmc_rank: Option<i64>,
    /// Parent chain for tokens, null for native coins
    platform: Option<Value>,
}

/// CoinMarketCap provider adapter
pub struct CoinMarketCapProvider {
    http: ProviderHttp,
    base_url: String,
}

impl CoinMarketCapProvider {
    /// Build the adapter from settings; fails without an API key.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.coinmarketcap_api_key.clone().ok_or_else(|| {
            AggregatorError::AuthenticationFailed {
                provider: DataProvider::Coinmarketcap,
                context: "COINMARKETCAP_API_KEY is required".to_string(),
            }
        })?;
        Self::build(
            DEFAULT_BASE_URL.to_string(),
            api_key,
            settings.rate_limit_for(DataProvider::Coinmarketcap),
        )
    }

    fn build(base_url: String, api_key: String, per_minute: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key_value =
            HeaderValue::from_str(&api_key).map_err(|_| AggregatorError::AuthenticationFailed {
                provider: DataProvider::Coinmarketcap,
                context: "API key contains invalid header characters".to_string(),
            })?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            http: ProviderHttp::with_headers(DataProvider::Coinmarketcap, per_minute, headers)?,
            base_url,
        })
    }
}

#[async_trait]
impl ProviderAdapter for CoinMarketCapProvider {
    fn identity(&self) -> DataProvider {
        DataProvider::Coinmarketcap
    }

    fn rate_limit_per_minute(&self) -> u32 {
        self.http.rate_limit_per_minute()
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        asset_type == AssetType::Crypto
    }

    async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
        // bare ticker -> canonical symbol
        let mut reverse: HashMap<String, String> = HashMap::new();
        let mut tickers: Vec<String> = Vec::new();
        for symbol in requested {
            let ticker = strip_quote_suffix(symbol).to_string();
            if reverse.insert(ticker.clone(), symbol.clone()).is_none() {
                tickers.push(ticker);
            }
        }
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/cryptocurrency/quotes/latest", self.base_url);
        let joined = tickers.join(",");
        let params = [("symbol", joined.as_str()), ("convert", "USD")];
        let value = self.http.get_json(&url, &params).await?;

        let data: HashMap<String, CmcCoin> = match value.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => {
                warn!("CoinMarketCap response carried no data section");
                return Ok(HashMap::new());
            }
        };

        let now = Utc::now();
        let mut quotes = HashMap::new();
        for (ticker, coin) in &data {
            let Some(canonical) = reverse.get(ticker) else {
                continue;
            };
            let Some(usd) = coin.quote.get("USD") else {
                continue;
            };
            let Some(price) = usd.price.filter(|p| *p > 0.0) else {
                continue;
            };

            let quote = Quote::new(canonical, price, DataProvider::Coinmarketcap, now)
                .with_change(None, usd.percent_change_24h)
                .with_volume(usd.volume_24h.map(|v| v as u64))
                .with_market_cap(usd.market_cap)
                .with_currency(Some("USD".to_string()))
                .with_asset_type(AssetType::Crypto);
            quotes.insert(canonical.clone(), quote);
        }

        info!(
            requested = requested.len(),
            received = quotes.len(),
            "Retrieved quotes from CoinMarketCap"
        );
        Ok(quotes)
    }

    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>> {
        if !self.supports(asset_type) {
            return Ok(Vec::new());
        }

        let url = format!("{}/cryptocurrency/listings/latest", self.base_url);
        let limit = ASSET_LIST_LIMIT.to_string();
        let params = [
            ("start", "1"),
            ("limit", limit.as_str()),
            ("convert", "USD"),
        ];
        let value = self.http.get_json(&url, &params).await?;

        let listing: Vec<CmcListingEntry> = match value.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => return Ok(Vec::new()),
        };

        let assets: Vec<Asset> = listing
            .iter()
            .filter_map(|entry| {
                let symbol = entry.symbol.as_deref()?.trim();
                let name = entry.name.as_deref()?.trim();
                if symbol.is_empty() || name.is_empty() {
                    return None;
                }

                let mut asset = Asset::new(symbol, name, AssetType::Crypto)
                    .with_exchange("Crypto")
                    .with_currency("USD");
                if let Some(id) = entry.id {
                    asset = asset.with_metadata("cmc_id", json!(id));
                }
                if let Some(slug) = &entry.slug {
                    asset = asset.with_metadata("slug", Value::String(slug.clone()));
                }
                if let Some(rank) = entry.cmc_rank {
                    asset = asset.with_metadata("cmc_rank", json!(rank));
                }
                if let Some(platform) = &entry.platform {
                    if !platform.is_null() {
                        asset = asset.with_metadata("platform", platform.clone());
                    }
                }
                Some(asset)
            })
            .collect();

        info!(count = assets.len(), "Retrieved asset list from CoinMarketCap");
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(base_url: String) -> CoinMarketCapProvider {
        CoinMarketCapProvider::build(base_url, "test-key".to_string(), 1000).unwrap()
    }

    #[tokio::test]
    async fn test_quotes_sends_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cryptocurrency/quotes/latest")
            .match_header(API_KEY_HEADER, "test-key")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("symbol".into(), "BTC".into()),
                mockito::Matcher::UrlEncoded("convert".into(), "USD".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"data":{"BTC":{"quote":{"USD":{
                    "price":64250.12,"volume_24h":3.1e10,
                    "percent_change_24h":2.5,"market_cap":1.2e12}}}}}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let quotes = adapter.quotes(&["BTC-USD".to_string()]).await.unwrap();

        assert_eq!(quotes.len(), 1);
        let btc = &quotes["BTC-USD"];
        assert_eq!(btc.price, 64250.12);
        assert_eq!(btc.source, DataProvider::Coinmarketcap);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_data_section_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/cryptocurrency/quotes/latest")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":{"error_code":0}}"#)
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let quotes = adapter.quotes(&["BTC".to_string()]).await.unwrap();
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_listings_map_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/cryptocurrency/listings/latest")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("start".into(), "1".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "500".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"data":[
                    {"id":1,"name":"Bitcoin","symbol":"BTC","slug":"bitcoin","cmc_rank":1,
                     "platform":null},
                    {"id":825,"name":"Tether","symbol":"USDT","slug":"tether","cmc_rank":3,
                     "platform":{"id":1027,"name":"Ethereum","symbol":"ETH",
                                 "token_address":"0xdac17f958d2ee523a2206206994597c13d831ec7"}}
                ]}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let assets = adapter.assets(AssetType::Crypto).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol, "BTC");
        assert_eq!(assets[0].metadata["cmc_rank"], 1);
        // Native coins carry no platform entry
        assert!(!assets[0].metadata.contains_key("platform"));
        assert_eq!(assets[1].metadata["slug"], "tether");
        assert_eq!(assets[1].metadata["platform"]["name"], "Ethereum");
    }
}
