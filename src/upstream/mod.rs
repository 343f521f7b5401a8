//! Access to the upstream task service.
//!
//! [`UpstreamClient`] owns the credential, the HTTP connection pool and the
//! per-panel [`RateBudget`]. It never retries; retry policy belongs to the
//! caller.

mod client;
mod rate;

pub use client::{ClientOptions, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, UpstreamClient};
pub use rate::{BudgetStatus, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW, RateBudget};
