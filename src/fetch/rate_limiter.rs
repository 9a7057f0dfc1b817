//! Per-host pacing for outbound requests.
//!
//! [`RateLimiter`] enforces a minimum delay between consecutive requests to the
//! same host. Requests to different hosts never wait on each other. A server
//! rate-limit signal (`Retry-After`) pushes the host's next slot further out so
//! that every caller sharing the limiter backs off, not only the one that was
//! throttled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tennis_ingest::fetch::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://www.atptour.com/en/rankings/singles").await;
//!
//! // Second request to the same host waits for the delay
//! limiter.acquire("https://www.atptour.com/en/players/x/y/overview").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-host request pacer.
///
/// Designed to be wrapped in `Arc` and shared between the updater and the
/// fetch client. Host state lives in a `DashMap`; the timing slot of each host
/// is guarded by a `tokio::sync::Mutex` so that waiting callers queue up in
/// order.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between requests to the same host.
    default_delay: Duration,
    disabled: bool,
    /// Arc lets a caller clone the state and drop the `DashMap` shard guard
    /// before awaiting the inner mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request may start. `None` before the first request.
    next_slot: Mutex<Option<Instant>>,
    /// Cumulative delay applied to this host (in milliseconds).
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_slot: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a pacer with the given minimum delay between same-host requests.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: default_delay.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone()
    }

    /// Waits until a request to `url`'s host may start, then claims the slot.
    ///
    /// The first request to a host proceeds immediately. A slot pushed out by
    /// [`record_rate_limit`](Self::record_rate_limit) is honoured even when the
    /// pacer is otherwise disabled.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        if self.disabled && !self.hosts.contains_key(&host) {
            return;
        }

        let state = self.host_state(&host);
        let mut slot = state.next_slot.lock().await;

        if let Some(next) = *slot {
            let now = Instant::now();
            if next > now {
                let delay = next - now;
                let cumulative = state.add_cumulative_delay(delay);

                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "pacing request"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive pacing delay - consider lowering request volume"
                    );
                }

                tokio::time::sleep_until(next).await;
            }
        } else {
            debug!(host = %host, "first request to host - no delay");
        }

        *slot = Some(Instant::now() + self.default_delay);
    }

    /// Records a server-mandated delay (from a Retry-After header).
    ///
    /// The next request to the host will not start before `delay` has elapsed.
    #[instrument(skip(self), fields(host))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        let delay = delay.min(MAX_RETRY_AFTER);
        let state = self.host_state(&host);
        let mut slot = state.next_slot.lock().await;
        let until = Instant::now() + delay;
        if slot.is_none_or(|next| next < until) {
            *slot = Some(until);
        }
        let cumulative = state.add_cumulative_delay(delay);

        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );

        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - source may be under heavy load"
            );
        }
    }
}

/// Extracts the lower-cased host from a URL.
///
/// Returns "unknown" for malformed URLs so they are still paced together.
///
/// ```
/// use tennis_ingest::fetch::rate_limiter::extract_host;
///
/// assert_eq!(extract_host("https://www.ATPtour.com/en"), "www.atptour.com");
/// assert_eq!(extract_host("http://127.0.0.1:8080/x"), "127.0.0.1");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds (`120`) and HTTP-dates
/// (`Wed, 21 Oct 2025 07:28:00 GMT`). Returns `None` if the value cannot be
/// parsed. Caps excessive values at 1 hour.
///
/// ```
/// use std::time::Duration;
/// use tennis_ingest::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
