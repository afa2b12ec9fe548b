use super::AssetType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A listed instrument known to one of the providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Canonical symbol (uppercase, non-empty)
    pub symbol: String,
    /// Human-readable instrument name
    pub name: String,
    /// Asset class
    pub asset_type: AssetType,
    /// Listing exchange, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Trading currency, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Whether the instrument is currently tradable
    pub is_active: bool,
    /// Provider-specific extras (FIGI, CoinGecko id, CMC rank, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Asset {
    /// Create an active asset, uppercasing the symbol.
    pub fn new(symbol: impl AsRef<str>, name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            symbol: symbol.as_ref().trim().to_uppercase(),
            name: name.into(),
            asset_type,
            exchange: None,
            currency: None,
            is_active: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the listing exchange
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Set the trading currency
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercased() {
        let asset = Asset::new(" aapl ", "Apple Inc.", AssetType::Stocks);
        assert_eq!(asset.symbol, "AAPL");
        assert!(asset.is_active);
    }

    #[test]
    fn test_metadata_round_trip() {
        let asset = Asset::new("BTC", "Bitcoin", AssetType::Crypto)
            .with_exchange("Crypto")
            .with_currency("USD")
            .with_metadata("coingecko_id", Value::String("bitcoin".into()));
        let json = serde_json::to_string(&asset).unwrap();
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
        assert_eq!(back.metadata["coingecko_id"], "bitcoin");
    }

    #[test]
    fn test_empty_metadata_omitted() {
        let asset = Asset::new("MSFT", "Microsoft Corporation", AssetType::Stocks);
        let json = serde_json::to_value(&asset).unwrap();
        assert!(json.get("metadata").is_none());
    }
}
