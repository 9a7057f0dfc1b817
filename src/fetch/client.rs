//! Retrying HTTP client for scrape requests.
//!
//! [`FetchClient`] turns a [`FetchRequest`] into either a payload, an explicit
//! absence signal, or a [`FetchError`] once retries are exhausted. The retry
//! loop is an explicit state machine:
//!
//! ```text
//! Attempting(n) --ok--------------------------> Done(Payload | Absent)
//! Attempting(n) --permanent-------------------> Done(Rejected)
//! Attempting(n) --retryable, budget left------> Backoff { delay, next: n+1 }
//! Attempting(n) --retryable, budget spent-----> Done(Exhausted)
//! Backoff       --ends before deadline--------> Attempting(n+1)
//! Backoff       --would end past deadline-----> Done(Cancelled)
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::{AttemptError, FetchError};
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, is_absent_status};
use crate::user_agent;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable settings for a [`FetchClient`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: user_agent::default_user_agent(),
        }
    }
}

/// A GET request for one scrape page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Overrides the client's default timeout when set.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the absolute URL including the query string.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] with kind `InvalidRequest` when the base URL does
    /// not parse.
    pub fn full_url(&self) -> Result<Url, FetchError> {
        let parsed = if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.query)
        };
        parsed.map_err(|e| FetchError::invalid_request(&self.url, e.to_string()))
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    /// Final URL, including the query string.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Payload(RawPayload),
    /// The source has no data for this request (404, 410, 204 or empty body).
    Absent { status: u16 },
}

/// Retry loop states.
enum FetchState {
    Attempting(u32),
    Backoff {
        delay: Duration,
        next: u32,
        last: AttemptError,
    },
    Done(Result<FetchOutcome, FetchError>),
}

/// HTTP client with retry, backoff and absence detection.
///
/// Cheap to clone; clones share the connection pool and the optional pacer.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
    default_timeout: Duration,
    pacer: Option<Arc<RateLimiter>>,
}

impl FetchClient {
    /// Creates a client from immutable settings.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend or proxy configuration
    /// cannot be initialised.
    pub fn new(settings: &FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .gzip(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            policy: settings.retry.clone(),
            default_timeout: settings.request_timeout,
            pacer: None,
        })
    }

    /// Shares a pacer with this client so that `Retry-After` signals push back
    /// every caller using the same pacer.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<RateLimiter>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches without a deadline.
    ///
    /// # Errors
    ///
    /// See [`fetch_until`](Self::fetch_until).
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError> {
        self.fetch_until(request, None).await
    }

    /// Fetches, giving up with `Cancelled` once `deadline` would be overrun.
    ///
    /// # Errors
    ///
    /// - `Exhausted` when every attempt failed with a retryable error
    /// - `Rejected` on a permanent HTTP status
    /// - `Cancelled` when the deadline passes between attempts
    /// - `InvalidRequest` when the URL cannot be built
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch_until(
        &self,
        request: &FetchRequest,
        deadline: Option<Instant>,
    ) -> Result<FetchOutcome, FetchError> {
        let url = request.full_url()?;
        let url_str = url.to_string();
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(FetchError::cancelled(url_str, 0, None));
        }

        let mut state = FetchState::Attempting(1);
        loop {
            state = match state {
                FetchState::Attempting(attempt) => {
                    self.run_attempt(&url, &url_str, timeout, attempt).await
                }
                FetchState::Backoff { delay, next, last } => {
                    if deadline.is_some_and(|d| Instant::now() + delay > d) {
                        warn!(
                            url = %url_str,
                            attempts = next - 1,
                            delay_ms = delay.as_millis(),
                            "deadline reached during backoff, cancelling"
                        );
                        FetchState::Done(Err(FetchError::cancelled(
                            &url_str,
                            next - 1,
                            Some(&last),
                        )))
                    } else {
                        tokio::time::sleep(delay).await;
                        FetchState::Attempting(next)
                    }
                }
                FetchState::Done(result) => return result,
            };
        }
    }

    async fn run_attempt(
        &self,
        url: &Url,
        url_str: &str,
        timeout: Duration,
        attempt: u32,
    ) -> FetchState {
        match self.attempt(url, timeout).await {
            Ok(outcome) => {
                match &outcome {
                    FetchOutcome::Payload(payload) => debug!(
                        url = %url_str,
                        attempt,
                        status = payload.status,
                        bytes = payload.body.len(),
                        outcome = "payload",
                        "fetch attempt succeeded"
                    ),
                    FetchOutcome::Absent { status } => debug!(
                        url = %url_str,
                        attempt,
                        status,
                        outcome = "absent",
                        "fetch attempt found no data"
                    ),
                }
                FetchState::Done(Ok(outcome))
            }
            Err(error) => {
                let failure = classify_error(&error);
                match self.policy.should_retry(failure, attempt) {
                    RetryDecision::Retry { delay, attempt: next } => {
                        let delay = self.backoff_delay(url_str, failure, &error, delay).await;
                        info!(
                            url = %url_str,
                            attempt,
                            outcome = ?failure,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "fetch attempt failed, backing off"
                        );
                        FetchState::Backoff {
                            delay,
                            next,
                            last: error,
                        }
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(
                            url = %url_str,
                            attempt,
                            outcome = ?failure,
                            reason = %reason,
                            error = %error,
                            "fetch failed"
                        );
                        let terminal = if failure == FailureType::Permanent {
                            FetchError::rejected(url_str, attempt, &error)
                        } else {
                            FetchError::exhausted(url_str, attempt, &error)
                        };
                        FetchState::Done(Err(terminal))
                    }
                }
            }
        }
    }

    /// A parseable `Retry-After` on a rate-limited response replaces the
    /// computed backoff.
    async fn backoff_delay(
        &self,
        url: &str,
        failure: FailureType,
        error: &AttemptError,
        computed: Duration,
    ) -> Duration {
        if failure != FailureType::RateLimited {
            return computed;
        }
        let Some(server_delay) = error.retry_after().and_then(parse_retry_after) else {
            return computed;
        };
        if let Some(pacer) = &self.pacer {
            pacer.record_rate_limit(url, server_delay).await;
        }
        server_delay
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Result<FetchOutcome, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AttemptError::from_send(url.as_str(), e))?;

        let status = response.status().as_u16();
        if is_absent_status(status) {
            return Ok(FetchOutcome::Absent { status });
        }

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(AttemptError::http_status_with_retry_after(
                url.as_str(),
                status,
                retry_after,
            ));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::timeout(url.as_str())
            } else {
                AttemptError::body(url.as_str(), e)
            }
        })?;

        if body.trim().is_empty() {
            return Ok(FetchOutcome::Absent { status });
        }

        Ok(FetchOutcome::Payload(RawPayload {
            url: final_url,
            status,
            body,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_encodes_query() {
        let request = FetchRequest::get("https://www.atptour.com/en/rankings/singles")
            .with_query("rankRange", "0-5000")
            .with_query("dateWeek", "2024-01-08");
        let url = request.full_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.atptour.com/en/rankings/singles?rankRange=0-5000&dateWeek=2024-01-08"
        );
    }

    #[test]
    fn test_full_url_without_query_is_unchanged() {
        let request = FetchRequest::get("https://www.atptour.com/en/players/a/b/overview");
        assert_eq!(
            request.full_url().unwrap().as_str(),
            "https://www.atptour.com/en/players/a/b/overview"
        );
    }

    #[test]
    fn test_full_url_invalid_is_invalid_request() {
        let err = FetchRequest::get("not a url").full_url().unwrap_err();
        assert_eq!(err.kind, super::super::FetchErrorKind::InvalidRequest);
    }

    #[test]
    fn test_request_timeout_override() {
        let request = FetchRequest::get("https://example.com").with_timeout(Duration::from_secs(2));
        assert_eq!(request.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_default_settings() {
        let settings = FetchSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.retry.max_attempts(), 3);
        assert!(FetchClient::new(&settings).is_ok());
    }
}
