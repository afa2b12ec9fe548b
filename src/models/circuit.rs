use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored circuit-breaker state for one provider.
///
/// An open entry always carries its trip time. An entry whose trip time is
/// older than the configured timeout counts as closed regardless of the
/// stored flag; the cache façade deletes such stale entries on first
/// observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Whether the circuit is open (traffic diverted to the fallback)
    pub is_open: bool,
    /// When the circuit was tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_time: Option<DateTime<Utc>>,
    /// Consecutive failures recorded against this provider
    #[serde(default)]
    pub failure_count: u64,
    /// Message from the failure that tripped the circuit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CircuitBreakerState {
    /// A closed circuit with no recorded failures
    pub fn closed() -> Self {
        Self {
            is_open: false,
            trip_time: None,
            failure_count: 0,
            last_error: None,
        }
    }

    /// An open circuit tripped at `trip_time`
    pub fn tripped(trip_time: DateTime<Utc>, failure_count: u64, last_error: String) -> Self {
        Self {
            is_open: true,
            trip_time: Some(trip_time),
            failure_count,
            last_error: Some(last_error),
        }
    }

    /// Whether the open period has elapsed as of `now`.
    ///
    /// Entries without a trip time are treated as expired: `is_open` without
    /// `trip_time` violates the invariant and must not keep a circuit open.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        match self.trip_time {
            Some(tripped) => now - tripped > Duration::seconds(timeout_secs as i64),
            None => true,
        }
    }

    /// Whether this entry currently holds the circuit open
    pub fn holds_open(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        self.is_open && !self.is_expired(now, timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_within_timeout() {
        let now = Utc::now();
        let state = CircuitBreakerState::tripped(now - Duration::seconds(100), 1, "boom".into());
        assert!(state.holds_open(now, 300));
        assert!(!state.is_expired(now, 300));
    }

    #[test]
    fn test_expired_after_timeout() {
        let now = Utc::now();
        let state = CircuitBreakerState::tripped(now - Duration::seconds(301), 2, "boom".into());
        assert!(state.is_expired(now, 300));
        assert!(!state.holds_open(now, 300));
    }

    #[test]
    fn test_boundary_is_not_expired() {
        // Exactly at the timeout the circuit is still open; expiry is strict.
        let now = Utc::now();
        let state = CircuitBreakerState::tripped(now - Duration::seconds(300), 1, "boom".into());
        assert!(!state.is_expired(now, 300));
    }

    #[test]
    fn test_open_without_trip_time_counts_closed() {
        let state = CircuitBreakerState {
            is_open: true,
            trip_time: None,
            failure_count: 0,
            last_error: None,
        };
        assert!(state.is_expired(Utc::now(), 300));
        assert!(!state.holds_open(Utc::now(), 300));
    }

    #[test]
    fn test_round_trip() {
        let state = CircuitBreakerState::tripped(Utc::now(), 3, "timeout".into());
        let json = serde_json::to_string(&state).unwrap();
        let back: CircuitBreakerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
