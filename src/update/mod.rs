//! Incremental updates.
//!
//! Each operation resolves a scope into units, skips units already in
//! storage, scrapes the rest, and writes all collected records with a single
//! upsert per table. Unit failures end up in the [`UpdateReport`]; only
//! storage failures and an unresolvable scope abort a call.

mod orchestrator;
mod report;
mod scope;

use thiserror::Error;

use crate::scrape::ScrapeError;
use crate::storage::StorageError;

pub use orchestrator::{
    DEFAULT_CONCURRENCY, DEFAULT_UNIT_DELAY, MAX_CONCURRENCY, MIN_CONCURRENCY, TournamentRefresh,
    UpdateSettings, Updater, WEEKLY_RANKING_WEEKS,
};
pub use report::{UnitFailure, UnitSuccess, UpdateReport, WeeklyReport};
pub use scope::{
    MAX_PLAYERS_PER_RUN, MAX_RANKING_WEEKS, MAX_TOURNAMENT_YEAR, MIN_TOURNAMENT_YEAR, PlayerScope,
    RankingScope, RankingWindow, TournamentScope, last_mondays, prioritize_players,
};

/// Errors that abort an update call.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Reading or writing a table failed. Nothing from this call was stored.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The list of units could not be determined.
    #[error("could not resolve update scope: {0}")]
    Scope(#[source] ScrapeError),

    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },
}
