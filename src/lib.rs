//! Panelkeeper - cache and refresh engine for independently refreshed
//! dashboard panels.
//!
//! Each panel sources its data from a remote task service. This library
//! provides the pieces that keep that data fresh:
//! - `upstream` - authenticated, rate-budgeted HTTP access to the task service
//! - `pipeline` - filter, sort, limit and hierarchy construction over task records
//! - `cache` - the per-panel snapshot store, refresh coordination and worker pool
//! - `panel` - the public controller surface (`render` / `mutate`)

pub mod cache;
pub mod config;
pub mod logging;
pub mod models;
pub mod panel;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod upstream;

use serde::Serialize;

/// Discriminant of [`Error`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Permission,
    NotFound,
    RateLimited,
    UpstreamUnavailable,
    MalformedResponse,
    Validation,
    Config,
}

/// Library-level error type for panel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unauthorized: invalid API token")]
    Auth,

    #[error("forbidden: insufficient permissions")]
    Permission,

    #[error("not found: resource does not exist")]
    NotFound,

    /// The upstream rejected the call for exceeding its rate limit. The retry
    /// hint is passed through verbatim; nothing here retries automatically.
    #[error("rate limit exceeded: {body}")]
    RateLimited {
        retry_after: Option<String>,
        body: String,
    },

    #[error("upstream unavailable: {reason}")]
    UpstreamUnavailable {
        reason: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Transport-level unavailability with no HTTP status attached.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::UpstreamUnavailable {
            reason: reason.into(),
            status: None,
            body: None,
        }
    }

    /// The caller's request context was cancelled before the call finished.
    pub fn cancelled() -> Self {
        Error::unavailable("request cancelled")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth => ErrorKind::Auth,
            Error::Permission => ErrorKind::Permission,
            Error::NotFound => ErrorKind::NotFound,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Error::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP-equivalent status for the panel-facing surface.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::Permission => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamUnavailable | ErrorKind::MalformedResponse | ErrorKind::Config => {
                500
            }
        }
    }

    /// Upstream retry hint, only present on [`Error::RateLimited`].
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Error::RateLimited { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for panel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::validation("empty").http_status(), 400);
        assert_eq!(Error::Auth.http_status(), 401);
        assert_eq!(Error::Permission.http_status(), 403);
        assert_eq!(Error::NotFound.http_status(), 404);
        let limited = Error::RateLimited {
            retry_after: Some("30".to_string()),
            body: "slow down".to_string(),
        };
        assert_eq!(limited.http_status(), 429);
        assert_eq!(Error::unavailable("boom").http_status(), 500);
        assert_eq!(Error::MalformedResponse("x".into()).http_status(), 500);
    }

    #[test]
    fn test_retry_after_only_on_rate_limited() {
        let limited = Error::RateLimited {
            retry_after: Some("12".to_string()),
            body: String::new(),
        };
        assert_eq!(limited.retry_after(), Some("12"));
        assert_eq!(Error::Auth.retry_after(), None);
    }

    #[test]
    fn test_cancelled_is_upstream_unavailable() {
        let err = Error::cancelled();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(err.to_string().contains("cancelled"));
    }
}
