//! Unit scrapers: one fetch-and-parse per unit of work.
//!
//! A unit is the smallest independently fetchable piece of source data:
//! - [`RankingScraper`] - one ranking table for a (type, date)
//! - [`PlayerScraper`] - one player's biography page
//! - [`TournamentScraper`] - one results archive page for a (year, type)
//!
//! Scrapers are stateless between calls. Each returns a tagged
//! [`UnitOutcome`] so that the caller can tell "the source has nothing" apart
//! from "we failed to get or understand it".

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fetch::{FetchClient, FetchError, FetchOutcome, FetchRequest};

/// Declares a lazily parsed static CSS selector.
macro_rules! selector {
    ($name:ident, $css:literal) => {
        #[allow(clippy::expect_used)]
        static $name: std::sync::LazyLock<scraper::Selector> = std::sync::LazyLock::new(|| {
            scraper::Selector::parse($css).expect(concat!("selector is valid: ", $css))
        });
    };
}

pub mod html;
mod player;
mod ranking;
mod tournament;

pub use player::{PlayerScraper, PlayerUnit, parse_player_page};
pub use ranking::{RankingRow, RankingScraper, RankingUnit, parse_published_dates, parse_ranking_page};
pub use tournament::{TournamentScraper, TournamentUnit, parse_tournament_page};

/// Errors that make a unit fail.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The fetch layer gave up.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page was fetched but its structure was not understood.
    #[error("failed to parse {url}: {message}")]
    Parse { url: String, message: String },
}

impl ScrapeError {
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether the failure came from the caller's deadline rather than the source.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_cancelled())
    }
}

/// Result of scraping one unit.
#[derive(Debug)]
pub enum UnitOutcome<R> {
    /// Validated records. May be a single record (players) or many (tables).
    Ok(Vec<R>),
    /// The source has no data for this unit.
    Absent,
    Failed(ScrapeError),
}

/// Output of a page parser before it is turned into a [`UnitOutcome`].
#[derive(Debug)]
pub struct ParsedPage<R> {
    /// Rows that passed validation.
    pub rows: Vec<R>,
    /// Candidate rows found on the page, valid or not.
    pub candidates: usize,
}

impl<R> ParsedPage<R> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            candidates: 0,
        }
    }
}

/// Fetches and parses one unit of a source entity.
#[async_trait]
pub trait UnitScraper: Send + Sync {
    type Unit: Clone + Debug + Eq + Hash + Send + Sync;
    type Record: Send;

    /// Absolute URL the unit is fetched from. Used for pacing and logs.
    fn unit_url(&self, unit: &Self::Unit) -> String;

    /// Fetches one unit. Never panics and never returns an `Err`: every
    /// failure is reported through [`UnitOutcome::Failed`].
    async fn fetch_unit(
        &self,
        unit: &Self::Unit,
        deadline: Option<Instant>,
    ) -> UnitOutcome<Self::Record>;
}

/// Fetches a page, mapping fetch absence to `Ok(None)`.
pub(crate) async fn fetch_page(
    client: &FetchClient,
    request: &FetchRequest,
    deadline: Option<Instant>,
) -> Result<Option<String>, ScrapeError> {
    match client.fetch_until(request, deadline).await? {
        FetchOutcome::Payload(payload) => Ok(Some(payload.body)),
        FetchOutcome::Absent { status } => {
            debug!(url = %request.url, status, "source reports no data");
            Ok(None)
        }
    }
}

/// Turns a parse result into a unit outcome.
///
/// A page without candidate rows means the source has no data for the unit.
/// A page whose candidates were all invalid is a parse failure.
pub(crate) fn finish_unit<R>(
    unit: &impl Debug,
    url: &str,
    parsed: Result<ParsedPage<R>, ScrapeError>,
) -> UnitOutcome<R> {
    match parsed {
        Ok(page) if page.candidates == 0 => {
            info!(?unit, url, "no data for unit");
            UnitOutcome::Absent
        }
        Ok(page) if page.rows.is_empty() => {
            let error = ScrapeError::parse(
                url,
                format!("{} candidate rows, none valid", page.candidates),
            );
            warn!(?unit, error = %error, "unit failed");
            UnitOutcome::Failed(error)
        }
        Ok(page) => {
            let dropped = page.candidates.saturating_sub(page.rows.len());
            if dropped > 0 {
                debug!(?unit, dropped, "dropped invalid rows");
            }
            UnitOutcome::Ok(page.rows)
        }
        Err(error) => {
            warn!(?unit, error = %error, "unit failed");
            UnitOutcome::Failed(error)
        }
    }
}

/// Standard fetch-then-parse flow shared by the scrapers.
pub(crate) async fn scrape_unit<R, U: Debug>(
    client: &FetchClient,
    unit: &U,
    request: &FetchRequest,
    deadline: Option<Instant>,
    parse: impl FnOnce(&str) -> Result<ParsedPage<R>, ScrapeError>,
) -> UnitOutcome<R> {
    match fetch_page(client, request, deadline).await {
        Ok(Some(body)) => finish_unit(unit, &request.url, parse(&body)),
        Ok(None) => {
            info!(?unit, url = %request.url, "no data for unit");
            UnitOutcome::Absent
        }
        Err(error) => {
            warn!(?unit, error = %error, "unit failed");
            UnitOutcome::Failed(error)
        }
    }
}
