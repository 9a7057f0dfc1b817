//! Retry logic with exponential backoff for transient fetch failures.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::RateLimited`] - Server rate limiting (retries with backoff)
//!
//! Statuses that mean "this resource does not exist" are not failures at all;
//! [`is_absent_status`] identifies them so the client can report absence.
//!
//! # Example
//!
//! ```
//! use tennis_ingest::fetch::{AttemptError, RetryPolicy, RetryDecision, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = AttemptError::http_status("https://example.com/en/rankings/singles", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::AttemptError;

/// Default maximum attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 400 Bad Request, 403 Forbidden.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Stop retrying.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500 milliseconds
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately: 1s, 2s (before hitting max attempts).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    /// Upper bound of the uniform random jitter. Zero disables jitter.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings and the default jitter.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (must be >= 1)
    /// * `base_delay` - Base delay for first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the jitter bound.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay after a failed attempt with exponential backoff and jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = 2^0 = 1x base
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and `max_jitter`.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies an attempt error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Network | Transient |
/// | Body read | Transient |
/// | HTTP status | see [`classify_http_status`] |
#[instrument]
pub fn classify_error(error: &AttemptError) -> FailureType {
    match error {
        AttemptError::HttpStatus { status, .. } => classify_http_status(*status),
        AttemptError::Timeout { .. }
        | AttemptError::Network { .. }
        | AttemptError::Body { .. } => FailureType::Transient,
    }
}

/// Classifies a non-success, non-absent HTTP status code.
///
/// | Status | Type |
/// |--------|------|
/// | 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | Transient |
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests

        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,

        // Anything else is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}

/// Statuses that mean the requested unit has no data at the source.
///
/// 204 is absent regardless of body; empty 200 bodies are detected by the client.
#[must_use]
pub fn is_absent_status(status: u16) -> bool {
    matches!(status, 204 | 404 | 410)
}
