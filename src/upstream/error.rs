//! Error types for the upstream API clients.
//!
//! [`UpstreamError`] covers the five failure classes the protected-call path
//! distinguishes: auth, rate-limited, server, network, timeout. Parse errors
//! are carried separately; like auth they are never retried.

use thiserror::Error;

/// Errors that can occur when talking to the generative or embedding endpoint.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The API rejected the credentials (HTTP 401/403).
    #[error("authentication rejected (status {status})")]
    Auth { status: u16 },

    /// The server returned HTTP 429. `retry_after_ms` is how long the
    /// server asked us to wait before trying again.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// A server-side error (5xx) with the body's error message.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success HTTP status (4xx we don't special-case).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Underlying network failure (DNS, refused connection).
    #[error("network error: {0}")]
    Network(reqwest::Error),

    /// The bounded per-call wait elapsed.
    #[error("request timed out")]
    Timeout,

    /// The response body did not match the expected shape.
    #[error("failed to parse API response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::Parse(e.to_string())
        } else {
            UpstreamError::Network(e)
        }
    }
}

impl UpstreamError {
    /// Whether this failure is worth retrying: rate limits, 5xx, network
    /// faults and timeouts are transient; auth, 4xx and parse errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited { .. }
                | UpstreamError::Server { .. }
                | UpstreamError::Network(_)
                | UpstreamError::Timeout
        )
    }
}
