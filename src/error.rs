use crate::models::DataProvider;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Authentication failed against an upstream provider (401)
    #[error("Authentication failed for '{provider}': {context}")]
    AuthenticationFailed {
        /// Provider that rejected the credentials
        provider: DataProvider,
        /// Error context
        context: String,
    },

    /// Requested data does not exist upstream (404 or empty payload)
    #[error("Data not found for '{}'", symbol.as_deref().unwrap_or("unknown"))]
    DataNotFound {
        /// The symbol that was not found, when known
        symbol: Option<String>,
        /// Additional context
        context: String,
    },

    /// Upstream rate limit exceeded (429)
    #[error("Rate limited by '{provider}' (retry after {retry_after:?}s)")]
    RateLimited {
        /// Provider that throttled us
        provider: DataProvider,
        /// Seconds until retry is allowed, from Retry-After when present
        retry_after: Option<u64>,
    },

    /// Provider failure after retries were exhausted; trips the circuit breaker
    #[error("Provider error from '{provider}': {context}")]
    Provider {
        /// Provider that failed
        provider: DataProvider,
        /// Error context
        context: String,
    },

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse a JSON response
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Upstream server error (5xx status codes)
    #[error("Server error {status} from '{provider}'")]
    ServerError {
        /// Provider that returned the status
        provider: DataProvider,
        /// HTTP status code
        status: u16,
    },

    /// Invalid parameter provided by a caller
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Cache backend is unreachable
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),
}

/// Error category for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Authentication errors
    Auth,
    /// Rate limiting errors
    RateLimit,
    /// Timeout errors
    Timeout,
    /// Server errors (5xx)
    Server,
    /// Not found errors
    NotFound,
    /// Validation errors
    Validation,
    /// Parsing errors
    Parsing,
    /// Cache errors
    Cache,
    /// Other errors
    Other,
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, AggregatorError>;

impl AggregatorError {
    /// Check if this error is retriable at the transport layer
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AggregatorError::Timeout { .. }
                | AggregatorError::RateLimited { .. }
                | AggregatorError::Http(_)
                | AggregatorError::ServerError { .. }
        )
    }

    /// Check whether this error should trip the provider's circuit breaker.
    ///
    /// Only provider-level failures do. Validation and not-found errors never
    /// trip anything; authentication errors trip at runtime because the
    /// provider is unusable until credentials are fixed.
    pub fn trips_circuit(&self) -> bool {
        matches!(
            self,
            AggregatorError::Provider { .. } | AggregatorError::AuthenticationFailed { .. }
        )
    }

    /// Check if this error indicates an authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AggregatorError::AuthenticationFailed { .. })
    }

    /// Check if this error indicates missing data
    pub fn is_not_found(&self) -> bool {
        matches!(self, AggregatorError::DataNotFound { .. })
    }

    /// Get retry delay in seconds (for backoff between attempts)
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(retry_after.unwrap_or(60).min(60)),
            Self::Timeout { .. } => Some(2),
            Self::ServerError { status, .. } if *status >= 500 => Some(5),
            _ => None,
        }
    }

    /// Categorize errors for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed { .. } => ErrorCategory::Auth,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::ServerError { .. } => ErrorCategory::Server,
            Self::DataNotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidParameter { .. } => ErrorCategory::Validation,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::CacheUnavailable(_) => ErrorCategory::Cache,
            _ => ErrorCategory::Other,
        }
    }

    /// Escalate a transport-level failure into a circuit-tripping provider error.
    ///
    /// Used once an adapter has exhausted its retry budget: whatever the last
    /// attempt produced becomes the provider failure recorded on the circuit.
    pub fn escalate(self, provider: DataProvider) -> Self {
        match self {
            e @ (Self::Provider { .. }
            | Self::AuthenticationFailed { .. }
            | Self::DataNotFound { .. }
            | Self::InvalidParameter { .. }) => e,
            other => Self::Provider {
                provider,
                context: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retriable() {
        assert!(AggregatorError::Timeout { timeout_ms: 5000 }.is_retriable());
        assert!(
            AggregatorError::RateLimited {
                provider: DataProvider::Finnhub,
                retry_after: None
            }
            .is_retriable()
        );
        assert!(
            AggregatorError::ServerError {
                provider: DataProvider::Yfinance,
                status: 500
            }
            .is_retriable()
        );
        assert!(
            !AggregatorError::DataNotFound {
                symbol: Some("AAPL".to_string()),
                context: "test".to_string()
            }
            .is_retriable()
        );
        assert!(
            !AggregatorError::InvalidParameter {
                param: "symbols".to_string(),
                reason: "empty".to_string()
            }
            .is_retriable()
        );
    }

    #[test]
    fn test_trips_circuit() {
        assert!(
            AggregatorError::Provider {
                provider: DataProvider::Coingecko,
                context: "boom".to_string()
            }
            .trips_circuit()
        );
        assert!(
            AggregatorError::AuthenticationFailed {
                provider: DataProvider::Coinmarketcap,
                context: "bad key".to_string()
            }
            .trips_circuit()
        );
        assert!(!AggregatorError::Timeout { timeout_ms: 1000 }.trips_circuit());
        assert!(
            !AggregatorError::DataNotFound {
                symbol: None,
                context: "empty payload".to_string()
            }
            .trips_circuit()
        );
    }

    #[test]
    fn test_retry_after_secs() {
        assert_eq!(
            AggregatorError::RateLimited {
                provider: DataProvider::Finnhub,
                retry_after: Some(10)
            }
            .retry_after_secs(),
            Some(10)
        );
        // Retry-After is capped at 60 seconds
        assert_eq!(
            AggregatorError::RateLimited {
                provider: DataProvider::Finnhub,
                retry_after: Some(600)
            }
            .retry_after_secs(),
            Some(60)
        );
        assert_eq!(
            AggregatorError::Timeout { timeout_ms: 5000 }.retry_after_secs(),
            Some(2)
        );
        assert_eq!(
            AggregatorError::ServerError {
                provider: DataProvider::AlphaVantage,
                status: 503
            }
            .retry_after_secs(),
            Some(5)
        );
        assert_eq!(
            AggregatorError::DataNotFound {
                symbol: None,
                context: "test".to_string()
            }
            .retry_after_secs(),
            None
        );
    }

    #[test]
    fn test_escalate_wraps_transport_errors() {
        let escalated =
            AggregatorError::Timeout { timeout_ms: 30000 }.escalate(DataProvider::Yfinance);
        match escalated {
            AggregatorError::Provider { provider, .. } => {
                assert_eq!(provider, DataProvider::Yfinance);
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_escalate_preserves_terminal_errors() {
        let not_found = AggregatorError::DataNotFound {
            symbol: Some("ZZZZ".to_string()),
            context: "test".to_string(),
        }
        .escalate(DataProvider::Finnhub);
        assert!(not_found.is_not_found());

        let auth = AggregatorError::AuthenticationFailed {
            provider: DataProvider::Coinmarketcap,
            context: "bad key".to_string(),
        }
        .escalate(DataProvider::Coinmarketcap);
        assert!(auth.is_auth_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AggregatorError::AuthenticationFailed {
                provider: DataProvider::Finnhub,
                context: "test".to_string()
            }
            .category(),
            ErrorCategory::Auth
        );
        assert_eq!(
            AggregatorError::CacheUnavailable("down".to_string()).category(),
            ErrorCategory::Cache
        );
        assert_eq!(
            AggregatorError::InvalidParameter {
                param: "type".to_string(),
                reason: "unknown".to_string()
            }
            .category(),
            ErrorCategory::Validation
        );
    }
}
