//! Sliding-window request budget.
//!
//! The budget is advisory: the upstream enforces its own limit, so crossing
//! the soft limit only produces a signal for the caller to log. Nothing here
//! ever delays or rejects a request.

use std::time::Duration;
use tokio::time::Instant;

/// Requests allowed per window before the soft limit signal fires.
pub const DEFAULT_RATE_LIMIT: u32 = 1000;

/// Length of one accounting window (15 minutes).
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Outcome of recording one request against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// The request fits within the soft limit.
    Within,
    /// The request pushed the window count past the soft limit.
    OverLimit,
}

/// Request counter for one accounting window.
#[derive(Debug, Clone)]
pub struct RateBudget {
    window_start: Instant,
    count: u32,
    limit: u32,
    window: Duration,
}

impl RateBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::starting_at(limit, window, Instant::now())
    }

    pub fn starting_at(limit: u32, window: Duration, now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
            window,
        }
    }

    /// Account for one request issued at `now`.
    ///
    /// The count resets to zero exactly when the window has fully elapsed;
    /// it is never decremented otherwise.
    pub fn record(&mut self, now: Instant) -> BudgetStatus {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);

        if self.count > self.limit {
            BudgetStatus::OverLimit
        } else {
            BudgetStatus::Within
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}
