//! Error taxonomy for the data access core.
//!
//! Every failure that crosses the `Repository` boundary is one of these
//! variants. `RemoteSource` implementations classify transport and HTTP
//! failures here; the rate limiter consults `is_retryable` to decide
//! retry-or-surface.

use thiserror::Error;

/// Classified failure for all core operations.
///
/// `Clone` so that deduplicated callers awaiting the same in-flight
/// request can each receive the shared outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("No network connection - cached data will be used where available")]
    Connectivity,

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited - retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request rejected: {0}")]
    Client(String),

    #[error("Server returned an empty response")]
    EmptyResponse,

    #[error("Not enough historical data ({got} of {want} games)")]
    InsufficientData { got: usize, want: usize },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fallback Retry-After hint when the server does not send one.
/// 60 seconds matches the upstream's rate window.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

impl DataError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Classify an HTTP status into the taxonomy.
    pub fn from_status(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            429 => DataError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            500..=599 => DataError::Server(format!("Status {}: {}", status, truncated)),
            _ => DataError::Client(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Classify a transport-level failure (DNS, TLS, timeout, generic I/O).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::Timeout
        } else {
            DataError::Connectivity
        }
    }

    /// Whether the rate limiter should retry this failure.
    ///
    /// Transport and server-side failures are transient; client errors,
    /// empty payloads and semantic conditions are terminal for the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::Connectivity
                | DataError::Timeout
                | DataError::RateLimited { .. }
                | DataError::Server(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            DataError::from_status(StatusCode::TOO_MANY_REQUESTS, "", Some(30)),
            DataError::RateLimited {
                retry_after_secs: 30
            }
        ));
        assert!(matches!(
            DataError::from_status(StatusCode::TOO_MANY_REQUESTS, "", None),
            DataError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        ));
        assert!(matches!(
            DataError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom", None),
            DataError::Server(_)
        ));
        assert!(matches!(
            DataError::from_status(StatusCode::BAD_GATEWAY, "", None),
            DataError::Server(_)
        ));
        assert!(matches!(
            DataError::from_status(StatusCode::NOT_FOUND, "no such player", None),
            DataError::Client(_)
        ));
        assert!(matches!(
            DataError::from_status(StatusCode::UNAUTHORIZED, "", None),
            DataError::Client(_)
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DataError::Connectivity.is_retryable());
        assert!(DataError::Timeout.is_retryable());
        assert!(DataError::RateLimited {
            retry_after_secs: 1
        }
        .is_retryable());
        assert!(DataError::Server("oops".into()).is_retryable());

        assert!(!DataError::Client("bad id".into()).is_retryable());
        assert!(!DataError::EmptyResponse.is_retryable());
        assert!(!DataError::InsufficientData { got: 1, want: 3 }.is_retryable());
    }

    #[test]
    fn test_body_truncation() {
        let long_body = "x".repeat(600);
        let err = DataError::from_status(reqwest::StatusCode::NOT_FOUND, &long_body, None);
        let msg = err.to_string();
        assert!(msg.contains("truncated, 600 total bytes"));
        assert!(msg.len() < 600);
    }
}
