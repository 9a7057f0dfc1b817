//! User-Agent strings for outbound scrape traffic.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/tennis-ingest";

/// Browser engine prefix. The source serves reduced markup to bare bot agents,
/// so the tool identifies itself after a browser token.
const BROWSER_PREFIX: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for scrape requests.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_PREFIX} tennis-ingest/{version} (+{PROJECT_UA_URL})")
}
