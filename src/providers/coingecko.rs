//! CoinGecko adapter.
//!
//! Primary for crypto. The free tier needs no key; symbols are translated to
//! CoinGecko coin ids through a fixed lookup table before hitting
//! `/simple/price`, and the response maps back to the caller's canonical
//! symbols.

use super::transport::ProviderHttp;
use super::ProviderAdapter;
use crate::config::Settings;
use crate::error::Result;
use crate::models::{Asset, AssetType, DataProvider, Quote};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

/// Listing cap; `/coins/list` returns every coin CoinGecko tracks
const ASSET_LIST_LIMIT: usize = 500;

/// Ticker to CoinGecko coin id.
static COINGECKO_IDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("ADA", "cardano"),
        ("DOT", "polkadot"),
        ("XRP", "ripple"),
        ("LTC", "litecoin"),
        ("BCH", "bitcoin-cash"),
        ("LINK", "chainlink"),
        ("XLM", "stellar"),
        ("DOGE", "dogecoin"),
        ("UNI", "uniswap"),
        ("AAVE", "aave"),
        ("SUSHI", "sushi"),
        ("COMP", "compound-governance-token"),
        ("MKR", "maker"),
        ("SNX", "havven"),
        ("CRV", "curve-dao-token"),
        ("YFI", "yearn-finance"),
        ("1INCH", "1inch"),
        ("MATIC", "matic-network"),
        ("AVAX", "avalanche-2"),
        ("SOL", "solana"),
        ("LUNA", "terra-luna"),
        ("ALGO", "algorand"),
        ("VET", "vechain"),
        ("ICP", "internet-computer"),
        ("FIL", "filecoin"),
        ("TRX", "tron"),
        ("XTZ", "tezos"),
        ("EOS", "eos"),
        ("ATOM", "cosmos"),
        ("XMR", "monero"),
        ("NEO", "neo"),
        ("IOTA", "iota"),
        ("ZEC", "zcash"),
        ("DASH", "dash"),
    ])
});

/// Strip the quote-currency suffix from a canonical crypto symbol.
///
/// `BTC-USD`, `BTCUSD` and `BTC-USDT` all reduce to `BTC`. Idempotent.
pub(crate) fn strip_quote_suffix(symbol: &str) -> &str {
    symbol
        .strip_suffix("-USDT")
        .or_else(|| symbol.strip_suffix("-USD"))
        .or_else(|| symbol.strip_suffix("USD").filter(|s| !s.is_empty()))
        .unwrap_or(symbol)
}

#[derive(Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[derive(Deserialize)]
struct CoinListEntry {
    id: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
}

/// CoinGecko provider adapter
pub struct CoinGeckoProvider {
    http: ProviderHttp,
    base_url: String,
}

impl CoinGeckoProvider {
    /// Build the adapter from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::build(
            settings.coingecko_api_url.clone(),
            settings.rate_limit_for(DataProvider::Coingecko),
        )
    }

    fn build(base_url: String, per_minute: u32) -> Result<Self> {
        Ok(Self {
            http: ProviderHttp::new(DataProvider::Coingecko, per_minute)?,
            base_url,
        })
    }

    fn coin_id(symbol: &str) -> Option<&'static str> {
        COINGECKO_IDS.get(strip_quote_suffix(symbol)).copied()
    }
}

#[async_trait]
impl ProviderAdapter for CoinGeckoProvider {
    fn identity(&self) -> DataProvider {
        DataProvider::Coingecko
    }

    fn rate_limit_per_minute(&self) -> u32 {
        self.http.rate_limit_per_minute()
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        asset_type == AssetType::Crypto
    }

    async fn quotes(&self, requested: &[String]) -> Result<HashMap<String, Quote>> {
        // coin id -> canonical symbol, so the response maps back
        let mut reverse: HashMap<&'static str, String> = HashMap::new();
        let mut ids: Vec<&'static str> = Vec::new();
        for symbol in requested {
            match Self::coin_id(symbol) {
                Some(id) => {
                    if reverse.insert(id, symbol.clone()).is_none() {
                        ids.push(id);
                    }
                }
                None => {
                    warn!(symbol = %symbol, "No CoinGecko id for symbol, skipping");
                }
            }
        }
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/simple/price", self.base_url);
        let joined = ids.join(",");
        let params = [
            ("ids", joined.as_str()),
            ("vs_currencies", "usd"),
            ("include_24hr_change", "true"),
            ("include_24hr_vol", "true"),
            ("include_market_cap", "true"),
        ];
        let value = self.http.get_json(&url, &params).await?;
        let prices: HashMap<String, SimplePrice> = serde_json::from_value(value)?;

        let now = Utc::now();
        let mut quotes = HashMap::new();
        for (id, data) in &prices {
            let Some(canonical) = reverse.get(id.as_str()) else {
                continue;
            };
            let Some(price) = data.usd.filter(|p| *p > 0.0) else {
                continue;
            };

            let quote = Quote::new(canonical, price, DataProvider::Coingecko, now)
                .with_change(None, data.usd_24h_change)
                .with_volume(data.usd_24h_vol.map(|v| v as u64))
                .with_market_cap(data.usd_market_cap)
                .with_currency(Some("USD".to_string()))
                .with_asset_type(AssetType::Crypto);
            quotes.insert(canonical.clone(), quote);
        }

        info!(
            requested = requested.len(),
            received = quotes.len(),
            "Retrieved quotes from CoinGecko"
        );
        Ok(quotes)
    }

    async fn assets(&self, asset_type: AssetType) -> Result<Vec<Asset>> {
        if !self.supports(asset_type) {
            return Ok(Vec::new());
        }

        let url = format!("{}/coins/list", self.base_url);
        let value = self.http.get_json(&url, &[]).await?;
        let listing: Vec<CoinListEntry> = serde_json::from_value(value)?;

        let assets: Vec<Asset> = listing
            .iter()
            .take(ASSET_LIST_LIMIT)
            .filter_map(|entry| {
                let id = entry.id.as_deref()?.trim();
                let symbol = entry.symbol.as_deref()?.trim();
                let name = entry.name.as_deref()?.trim();
                if id.is_empty() || symbol.is_empty() || name.is_empty() {
                    return None;
                }
                Some(
                    Asset::new(symbol, name, AssetType::Crypto)
                        .with_exchange("Crypto")
                        .with_currency("USD")
                        .with_metadata("coingecko_id", Value::String(id.to_string())),
                )
            })
            .collect();

        info!(count = assets.len(), "Retrieved asset list from CoinGecko");
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(base_url: String) -> CoinGeckoProvider {
        CoinGeckoProvider::build(base_url, 1000).unwrap()
    }

    #[test]
    fn test_strip_quote_suffix_idempotent() {
        assert_eq!(strip_quote_suffix("BTC-USD"), "BTC");
        assert_eq!(strip_quote_suffix("BTCUSD"), "BTC");
        assert_eq!(strip_quote_suffix("BTC-USDT"), "BTC");
        assert_eq!(strip_quote_suffix("BTC"), "BTC");
        assert_eq!(strip_quote_suffix(strip_quote_suffix("ETH-USD")), "ETH");
    }

    #[test]
    fn test_coin_id_lookup() {
        assert_eq!(CoinGeckoProvider::coin_id("BTC-USD"), Some("bitcoin"));
        assert_eq!(CoinGeckoProvider::coin_id("ETH"), Some("ethereum"));
        assert_eq!(CoinGeckoProvider::coin_id("NOTACOIN"), None);
    }

    #[tokio::test]
    async fn test_quotes_map_back_to_canonical() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("ids".into(), "bitcoin,ethereum".into()),
                mockito::Matcher::UrlEncoded("vs_currencies".into(), "usd".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{
                    "bitcoin":{"usd":64250.12,"usd_market_cap":1.2e12,
                               "usd_24h_vol":3.1e10,"usd_24h_change":2.5113},
                    "ethereum":{"usd":3050.5,"usd_24h_change":-1.2}
                }"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let quotes = adapter
            .quotes(&["BTC-USD".to_string(), "ETH-USD".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        let btc = &quotes["BTC-USD"];
        assert_eq!(btc.price, 64250.12);
        assert_eq!(btc.percent_change, Some(2.5113));
        assert_eq!(btc.volume, Some(31_000_000_000));
        assert_eq!(btc.source, DataProvider::Coingecko);
        assert_eq!(btc.asset_type, Some(AssetType::Crypto));
    }

    #[tokio::test]
    async fn test_unknown_symbols_skip_upstream_call() {
        // No mock server interaction expected: nothing resolvable to an id.
        let adapter = adapter("http://unused.test".to_string());
        let quotes = adapter.quotes(&["NOTACOIN-USD".to_string()]).await.unwrap();
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_asset_list_capped_and_tagged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/list")
            .with_status(200)
            .with_body(
                r#"[
                    {"id":"bitcoin","symbol":"btc","name":"Bitcoin"},
                    {"id":"ethereum","symbol":"eth","name":"Ethereum"},
                    {"id":"","symbol":"bad","name":"Broken"}
                ]"#,
            )
            .create_async()
            .await;

        let adapter = adapter(server.url());
        let assets = adapter.assets(AssetType::Crypto).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol, "BTC");
        assert_eq!(assets[0].metadata["coingecko_id"], "bitcoin");
    }

    #[tokio::test]
    async fn test_assets_unsupported_type_empty() {
        let adapter = adapter("http://unused.test".to_string());
        assert!(adapter.assets(AssetType::Stocks).await.unwrap().is_empty());
    }
}
