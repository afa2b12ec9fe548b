use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A news article attached to the general feed or to specific symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Headline (non-empty)
    pub title: String,
    /// Short summary, when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Canonical article URL (non-empty)
    pub url: String,
    /// Publisher name
    pub source: String,
    /// Publication time (UTC)
    pub published_at: DateTime<Utc>,
    /// Related symbols, uppercase
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Provider category tag (e.g. "general")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Sentiment score, when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
}

impl NewsArticle {
    /// Build an article, dropping it when the headline or URL is blank.
    ///
    /// Partial upstream records never propagate past the adapter; callers log
    /// a warning and skip `None`.
    pub fn build(
        title: &str,
        url: &str,
        source: &str,
        published_at: DateTime<Utc>,
    ) -> Option<Self> {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            summary: None,
            url: url.to_string(),
            source: source.trim().to_string(),
            published_at,
            symbols: Vec::new(),
            category: None,
            sentiment: None,
        })
    }

    /// Set the summary, treating a blank string as absent
    pub fn with_summary(mut self, summary: Option<&str>) -> Self {
        self.summary = summary
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    /// Attach related symbols, uppercased
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.symbols = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    /// Set the category tag
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_or_url_rejected() {
        assert!(NewsArticle::build("", "https://x.test/a", "Finnhub", Utc::now()).is_none());
        assert!(NewsArticle::build("Headline", "  ", "Finnhub", Utc::now()).is_none());
    }

    #[test]
    fn test_symbols_uppercased() {
        let article = NewsArticle::build("Apple ships", "https://x.test/a", "Finnhub", Utc::now())
            .unwrap()
            .with_symbols(["aapl", " msft "]);
        assert_eq!(article.symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_blank_summary_dropped() {
        let article = NewsArticle::build("Headline", "https://x.test/a", "Finnhub", Utc::now())
            .unwrap()
            .with_summary(Some("   "));
        assert!(article.summary.is_none());
    }
}
