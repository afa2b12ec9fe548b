use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Asset class of a tracked symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Equities
    Stocks,
    /// Cryptocurrencies
    Crypto,
    /// Currency pairs
    Forex,
}

impl AssetType {
    /// All asset classes, in the fixed iteration order used by the loops
    pub const ALL: [AssetType; 3] = [AssetType::Stocks, AssetType::Crypto, AssetType::Forex];

    /// Lowercase tag used in cache keys and URL paths
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stocks => "stocks",
            AssetType::Crypto => "crypto",
            AssetType::Forex => "forex",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stocks" => Ok(AssetType::Stocks),
            "crypto" => Ok(AssetType::Crypto),
            "forex" => Ok(AssetType::Forex),
            _ => Err(()),
        }
    }
}

/// Upstream data provider identity.
///
/// The serialized tag is the provider name as it appears in cache keys,
/// quote `source` fields and the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataProvider {
    /// Yahoo Finance
    Yfinance,
    /// Finnhub
    Finnhub,
    /// CoinGecko
    Coingecko,
    /// CoinMarketCap
    Coinmarketcap,
    /// Alpha Vantage
    AlphaVantage,
}

impl DataProvider {
    /// All known providers
    pub const ALL: [DataProvider; 5] = [
        DataProvider::Yfinance,
        DataProvider::Finnhub,
        DataProvider::Coingecko,
        DataProvider::Coinmarketcap,
        DataProvider::AlphaVantage,
    ];

    /// The snake_case tag used in cache keys and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            DataProvider::Yfinance => "yfinance",
            DataProvider::Finnhub => "finnhub",
            DataProvider::Coingecko => "coingecko",
            DataProvider::Coinmarketcap => "coinmarketcap",
            DataProvider::AlphaVantage => "alpha_vantage",
        }
    }
}

impl fmt::Display for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yfinance" => Ok(DataProvider::Yfinance),
            "finnhub" => Ok(DataProvider::Finnhub),
            "coingecko" => Ok(DataProvider::Coingecko),
            "coinmarketcap" => Ok(DataProvider::Coinmarketcap),
            "alpha_vantage" => Ok(DataProvider::AlphaVantage),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_round_trip() {
        for asset_type in AssetType::ALL {
            assert_eq!(asset_type.as_str().parse::<AssetType>(), Ok(asset_type));
        }
        assert!("bonds".parse::<AssetType>().is_err());
    }

    #[test]
    fn test_provider_serde_tags() {
        let json = serde_json::to_string(&DataProvider::AlphaVantage).unwrap();
        assert_eq!(json, "\"alpha_vantage\"");
        let parsed: DataProvider = serde_json::from_str("\"yfinance\"").unwrap();
        assert_eq!(parsed, DataProvider::Yfinance);
    }

    #[test]
    fn test_provider_from_str_matches_as_str() {
        for provider in DataProvider::ALL {
            assert_eq!(provider.as_str().parse::<DataProvider>(), Ok(provider));
        }
    }
}
