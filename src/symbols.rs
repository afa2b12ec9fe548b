//! Canonical symbol handling.
//!
//! Canonical form: trimmed, uppercase, forex as `BASE/QUOTE` (Yahoo-style
//! `EURUSD=X` is accepted on input), crypto as `XXX` or `XXX-USD`. Bucketing
//! applies a deterministic rule to the canonical form so that every loop
//! iteration routes a symbol to exactly one asset-class pipeline.

use crate::models::AssetType;

/// Crypto tickers recognised by the bucketing rule.
///
/// Matches the set of coins the crypto adapters can resolve; a symbol whose
/// leading ticker (the part before a `-` suffix) is in this list is routed to
/// the crypto pipeline.
pub const CRYPTO_TICKERS: &[&str] = &[
    "1INCH", "AAVE", "ADA", "ALGO", "ATOM", "AVAX", "BCH", "BTC", "COMP", "CRV", "DASH", "DOGE",
    "DOT", "EOS", "ETH", "FIL", "ICP", "IOTA", "LINK", "LTC", "LUNA", "MATIC", "MKR", "NEO", "SNX",
    "SOL", "SUSHI", "TRX", "UNI", "VET", "XLM", "XMR", "XRP", "XTZ", "YFI", "ZEC",
];

/// Normalize a raw symbol into canonical form: trimmed and uppercased.
///
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Whether a canonical symbol is forex-shaped: contains `/` or ends in `=X`.
pub fn is_forex(symbol: &str) -> bool {
    symbol.contains('/') || symbol.ends_with("=X")
}

/// Whether a canonical symbol is crypto-shaped: its leading ticker is known.
pub fn is_crypto(symbol: &str) -> bool {
    let ticker = symbol.split('-').next().unwrap_or(symbol);
    CRYPTO_TICKERS.contains(&ticker)
}

/// Classify a canonical symbol into its asset class.
///
/// Forex shapes win over everything, then known crypto tickers; anything
/// else is a stock.
pub fn classify(symbol: &str) -> AssetType {
    if is_forex(symbol) {
        AssetType::Forex
    } else if is_crypto(symbol) {
        AssetType::Crypto
    } else {
        AssetType::Stocks
    }
}

/// Group canonical symbols into per-asset-class buckets, preserving order.
///
/// The buckets are returned in the fixed [`AssetType::ALL`] iteration order
/// with empty buckets omitted; bucket key sets are disjoint, so a later merge
/// of per-bucket results is commutative.
pub fn bucket_by_asset_type(symbols: &[String]) -> Vec<(AssetType, Vec<String>)> {
    let mut stocks = Vec::new();
    let mut crypto = Vec::new();
    let mut forex = Vec::new();

    for symbol in symbols {
        match classify(symbol) {
            AssetType::Stocks => stocks.push(symbol.clone()),
            AssetType::Crypto => crypto.push(symbol.clone()),
            AssetType::Forex => forex.push(symbol.clone()),
        }
    }

    [
        (AssetType::Stocks, stocks),
        (AssetType::Crypto, crypto),
        (AssetType::Forex, forex),
    ]
    .into_iter()
    .filter(|(_, bucket)| !bucket.is_empty())
    .collect()
}

/// Trim, uppercase and deduplicate a comma-separated symbol list,
/// preserving first-seen order.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(normalize)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_idempotent() {
        for raw in [" aapl ", "btc-usd", "eur/usd", "EURUSD=X", "  Doge "] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
        assert_eq!(normalize(" aapl "), "AAPL");
    }

    #[test]
    fn test_classify_forex_shapes() {
        assert_eq!(classify("EUR/USD"), AssetType::Forex);
        assert_eq!(classify("EURUSD=X"), AssetType::Forex);
    }

    #[test]
    fn test_classify_crypto_prefixes() {
        assert_eq!(classify("BTC-USD"), AssetType::Crypto);
        assert_eq!(classify("ETH"), AssetType::Crypto);
        assert_eq!(classify("DOGE-USD"), AssetType::Crypto);
    }

    #[test]
    fn test_classify_defaults_to_stocks() {
        assert_eq!(classify("AAPL"), AssetType::Stocks);
        // Not a known crypto ticker, even though it looks coin-ish
        assert_eq!(classify("DOTM"), AssetType::Stocks);
    }

    #[test]
    fn test_bucketing_disjoint() {
        let symbols = vec![
            "AAPL".to_string(),
            "BTC-USD".to_string(),
            "EUR/USD".to_string(),
        ];
        let buckets = bucket_by_asset_type(&symbols);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], (AssetType::Stocks, vec!["AAPL".to_string()]));
        assert_eq!(buckets[1], (AssetType::Crypto, vec!["BTC-USD".to_string()]));
        assert_eq!(buckets[2], (AssetType::Forex, vec!["EUR/USD".to_string()]));
    }

    #[test]
    fn test_bucketing_omits_empty_buckets() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let buckets = bucket_by_asset_type(&symbols);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].0, AssetType::Stocks);
        assert_eq!(buckets[0].1.len(), 2);
    }

    #[test]
    fn test_parse_symbol_list_dedupes_preserving_order() {
        let parsed = parse_symbol_list(" aapl, MSFT ,aapl,, btc-usd ");
        assert_eq!(parsed, vec!["AAPL", "MSFT", "BTC-USD"]);
    }

    #[test]
    fn test_parse_symbol_list_blank_input() {
        assert!(parse_symbol_list("  , ,").is_empty());
        assert!(parse_symbol_list("").is_empty());
    }
}
