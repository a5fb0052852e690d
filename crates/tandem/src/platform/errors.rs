use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a Source or Target platform.
///
/// Variants follow the retry taxonomy: rate limits, transient server errors,
/// timeouts and network failures are retryable; authentication failures get
/// one credential refresh; everything else is permanent for that operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Credentials were rejected (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Server-side failure that may succeed on retry (HTTP 5xx).
    #[error("Transient platform error ({status}): {message}")]
    Transient { status: u16, message: String },

    /// A single outbound call exceeded its timeout.
    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Request rejected for good (other HTTP 4xx).
    #[error("Platform rejected request ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// A record could not be decoded or translated.
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    /// Create an authentication error.
    #[inline]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a transient error.
    #[inline]
    pub fn transient(status: u16, message: impl Into<String>) -> Self {
        Self::Transient {
            status,
            message: message.into(),
        }
    }

    /// Create a permanent error.
    #[inline]
    pub fn permanent(status: u16, message: impl Into<String>) -> Self {
        Self::Permanent {
            status,
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[inline]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an invalid payload error.
    #[inline]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify an unsuccessful HTTP status.
    pub fn from_status(
        status: u16,
        retry_after: Option<Duration>,
        message: impl Into<String>,
    ) -> Self {
        match status {
            401 => Self::authentication(message),
            408 => Self::transient(status, message),
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::transient(status, message),
            _ => Self::permanent(status, message),
        }
    }

    /// Whether the retry policy may try this operation again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Transient { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[inline]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}ms", d.as_millis()))
        .unwrap_or_default()
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps multi-line server
/// bodies out of progress output and log lines.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_taxonomy() {
        assert!(PlatformError::from_status(401, None, "bad token").is_authentication());
        assert!(PlatformError::from_status(429, None, "slow down").is_rate_limited());
        assert!(matches!(
            PlatformError::from_status(503, None, "unavailable"),
            PlatformError::Transient { status: 503, .. }
        ));
        assert!(matches!(
            PlatformError::from_status(422, None, "invalid"),
            PlatformError::Permanent { status: 422, .. }
        ));
        assert!(matches!(
            PlatformError::from_status(404, None, "gone"),
            PlatformError::Permanent { status: 404, .. }
        ));
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(PlatformError::RateLimited { retry_after: None }.is_retryable());
        assert!(PlatformError::transient(502, "bad gateway").is_retryable());
        assert!(PlatformError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(PlatformError::network("reset").is_retryable());

        assert!(!PlatformError::authentication("expired").is_retryable());
        assert!(!PlatformError::permanent(400, "bad").is_retryable());
        assert!(!PlatformError::invalid_payload("price").is_retryable());
        assert!(!PlatformError::internal("bug").is_retryable());
    }

    #[test]
    fn rate_limited_display_includes_retry_after() {
        let err = PlatformError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 2000ms");

        let err = PlatformError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn timeout_reports_milliseconds() {
        let err = PlatformError::timeout(Duration::from_millis(1500));
        assert_eq!(err, PlatformError::Timeout { after_ms: 1500 });
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn short_error_message_takes_first_line() {
        let err = PlatformError::permanent(400, "first line\nsecond line");
        assert_eq!(
            short_error_message(&err),
            "Platform rejected request (400): first line"
        );
    }
}
