//! Read-only lookups over stored tables.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord};
use crate::storage::{StorageError, Table, TableStore};

/// Maximum number of players returned by [`search_players`].
pub const PLAYER_SEARCH_LIMIT: usize = 10;

/// Players whose name contains `query`, ignoring case. An empty query
/// matches nothing.
///
/// # Errors
///
/// Returns [`StorageError`] if the players table cannot be read.
pub fn search_players(store: &TableStore, query: &str) -> Result<Vec<PlayerRecord>, StorageError> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store
        .load(&Table::players())?
        .rows
        .into_iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .take(PLAYER_SEARCH_LIMIT)
        .collect())
}

/// Parses a comma separated id list, skipping blanks.
#[must_use]
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stored ranking rows, optionally restricted to some players and one date.
///
/// Returns `None` when the table was never written.
///
/// # Errors
///
/// Returns [`StorageError`] if the table cannot be read.
pub fn stored_rankings(
    store: &TableStore,
    ranking_type: RankingType,
    player_ids: &[String],
    date: Option<NaiveDate>,
) -> Result<Option<Vec<RankingRecord>>, StorageError> {
    let table = Table::rankings(ranking_type);
    if store.file_size(&table).is_none() {
        return Ok(None);
    }
    let ids: HashSet<&str> = player_ids.iter().map(String::as_str).collect();
    let rows = store
        .load(&table)?
        .rows
        .into_iter()
        .filter(|r| ids.is_empty() || ids.contains(r.player_id.as_str()))
        .filter(|r| date.is_none_or(|d| r.date == d))
        .collect();
    Ok(Some(rows))
}

/// Every stored tournament.
///
/// # Errors
///
/// Returns [`StorageError`] if the table cannot be read.
pub fn tournaments(store: &TableStore) -> Result<Vec<TournamentRecord>, StorageError> {
    Ok(store.load(&Table::tournaments())?.rows)
}
