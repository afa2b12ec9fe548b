//! Sliding-minute request gate for provider adapters.
//!
//! Each adapter tracks how many requests it has issued in the current
//! one-minute window. Once the budget is spent, [`MinuteBudget::acquire`]
//! sleeps until the window rolls over, then starts a fresh count. The gate is
//! shared across concurrent calls within one adapter, so the counter sits
//! behind a tokio mutex.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

struct WindowState {
    window_start: Instant,
    used: u32,
}

/// A per-minute request budget.
///
/// One token is consumed per request; when the budget is exhausted,
/// [`acquire`](Self::acquire) sleeps until the minute window rolls.
pub struct MinuteBudget {
    per_minute: u32,
    state: Mutex<WindowState>,
}

impl MinuteBudget {
    /// Create a budget allowing `per_minute` requests per rolling minute.
    ///
    /// A budget of 0 is clamped to 1 so `acquire` always makes progress.
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute: per_minute.max(1),
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                used: 0,
            }),
        }
    }

    /// The configured budget
    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    /// Consume one request slot, sleeping until the window rolls if the
    /// budget is spent.
    pub async fn acquire(&self) {
        loop {
            let sleep_until = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if now.duration_since(state.window_start) >= WINDOW {
                    state.window_start = now;
                    state.used = 0;
                }

                if state.used < self.per_minute {
                    state.used += 1;
                    return;
                }

                state.window_start + WINDOW
            };
            tokio::time::sleep_until(sleep_until).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_allows_burst() {
        let budget = MinuteBudget::new(10);
        for _ in 0..10 {
            budget.acquire().await;
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_waits_for_window_roll() {
        tokio::time::pause();

        let budget = MinuteBudget::new(2);
        budget.acquire().await;
        budget.acquire().await;

        let start = Instant::now();
        budget.acquire().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(59));
        assert!(elapsed <= Duration::from_secs(61));
    }

    #[tokio::test]
    async fn test_window_roll_resets_count() {
        tokio::time::pause();

        let budget = MinuteBudget::new(1);
        budget.acquire().await;

        tokio::time::advance(Duration::from_secs(61)).await;

        // A fresh window: this must not sleep another full minute.
        let start = Instant::now();
        budget.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_budget_clamped() {
        let budget = MinuteBudget::new(0);
        assert_eq!(budget.per_minute(), 1);
        budget.acquire().await;
    }
}
