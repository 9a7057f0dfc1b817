//! Retrying HTTP fetch layer.
//!
//! Every scrape request goes through [`FetchClient`], which classifies each
//! response as a payload, an absence signal or a failure, and retries transient
//! failures with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use tennis_ingest::fetch::{FetchClient, FetchOutcome, FetchRequest, FetchSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FetchClient::new(&FetchSettings::default())?;
//! let request = FetchRequest::get("https://www.atptour.com/en/rankings/singles")
//!     .with_query("rankRange", "0-5000");
//! match client.fetch(&request).await? {
//!     FetchOutcome::Payload(payload) => println!("{} bytes", payload.body.len()),
//!     FetchOutcome::Absent { status } => println!("no data ({status})"),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod rate_limiter;
mod retry;

pub use client::{
    DEFAULT_REQUEST_TIMEOUT, FetchClient, FetchOutcome, FetchRequest, FetchSettings, RawPayload,
};
pub use error::{AttemptError, FetchError, FetchErrorKind};
pub use rate_limiter::{RateLimiter, extract_host, parse_retry_after};
pub use retry::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_JITTER, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_http_status, is_absent_status,
};
