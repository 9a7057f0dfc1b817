//! Error types for the fetch module.
//!
//! [`AttemptError`] describes why a single HTTP attempt failed and feeds the
//! retry classification. [`FetchError`] is the terminal error returned to
//! callers once the retry loop has given up.

use std::fmt;

use thiserror::Error;

/// Failure of one HTTP attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP response that is not an absence signal.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        url: String,
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// Response headers arrived but the body could not be read.
    #[error("failed reading response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl AttemptError {
    /// Creates a network or timeout error from a reqwest send error.
    pub fn from_send(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error carrying a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// HTTP status of the failed attempt, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw Retry-After header of a rate-limited response.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// Why a fetch gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Every allowed attempt failed with a retryable error.
    Exhausted,
    /// The server answered with a status that retrying cannot fix.
    Rejected,
    /// The caller's deadline passed before a result was obtained.
    Cancelled,
    /// The request could not be built (bad URL or query).
    InvalidRequest,
}

impl FetchErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exhausted => "retries exhausted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest => "invalid request",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of [`FetchClient::fetch`](super::FetchClient::fetch).
#[derive(Debug, Clone, Error)]
#[error("{kind} fetching {url} after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub url: String,
    /// Attempts actually made, including the first one.
    pub attempts: u32,
    pub kind: FetchErrorKind,
    /// Status of the last response, when the server answered.
    pub status: Option<u16>,
    /// Description of the last cause.
    pub message: String,
}

impl FetchError {
    /// Retryable failures continued until the attempt budget ran out.
    pub fn exhausted(url: impl Into<String>, attempts: u32, last: &AttemptError) -> Self {
        Self {
            url: url.into(),
            attempts,
            kind: FetchErrorKind::Exhausted,
            status: last.status(),
            message: last.to_string(),
        }
    }

    /// A permanent failure stopped the loop.
    pub fn rejected(url: impl Into<String>, attempts: u32, last: &AttemptError) -> Self {
        Self {
            url: url.into(),
            attempts,
            kind: FetchErrorKind::Rejected,
            status: last.status(),
            message: last.to_string(),
        }
    }

    /// The deadline ended the loop. `last` is the failure that preceded the
    /// abandoned backoff, if any.
    pub fn cancelled(url: impl Into<String>, attempts: u32, last: Option<&AttemptError>) -> Self {
        Self {
            url: url.into(),
            attempts,
            kind: FetchErrorKind::Cancelled,
            status: last.and_then(AttemptError::status),
            message: last.map_or_else(
                || "deadline passed before the first attempt".to_string(),
                |err| format!("deadline passed during backoff after: {err}"),
            ),
        }
    }

    pub fn invalid_request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempts: 0,
            kind: FetchErrorKind::InvalidRequest,
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == FetchErrorKind::Cancelled
    }
}
