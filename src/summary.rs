//! Per-table statistics of the stored data.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{RankingType, TournamentType};
use crate::storage::{StorageError, Table, TableStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSummary {
    pub count: usize,
    pub with_bio: usize,
    pub missing_bio: usize,
    pub countries: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingSummary {
    pub count: usize,
    pub unique_players: usize,
    pub unique_dates: usize,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TournamentSummary {
    pub count: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub types: Vec<TournamentType>,
    pub with_winners: usize,
    pub size_bytes: u64,
}

/// Summary of every table. A table that was never written is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSummary {
    pub data_dir: PathBuf,
    pub players: Option<PlayerSummary>,
    pub rankings_singles: Option<RankingSummary>,
    pub rankings_doubles: Option<RankingSummary>,
    pub tournaments: Option<TournamentSummary>,
}

/// Reads every table and computes its summary.
///
/// # Errors
///
/// Returns [`StorageError`] if a written table cannot be read.
pub fn summarize(store: &TableStore) -> Result<DataSummary, StorageError> {
    Ok(DataSummary {
        data_dir: store.root().to_path_buf(),
        players: summarize_players(store)?,
        rankings_singles: summarize_rankings(store, RankingType::Singles)?,
        rankings_doubles: summarize_rankings(store, RankingType::Doubles)?,
        tournaments: summarize_tournaments(store)?,
    })
}

fn summarize_players(store: &TableStore) -> Result<Option<PlayerSummary>, StorageError> {
    let table = Table::players();
    let Some(size_bytes) = store.file_size(&table) else {
        return Ok(None);
    };
    let rows = store.load(&table)?.rows;
    let with_bio = rows.iter().filter(|p| p.has_bio()).count();
    let countries: HashSet<&str> = rows.iter().filter_map(|p| p.country.as_deref()).collect();
    Ok(Some(PlayerSummary {
        count: rows.len(),
        with_bio,
        missing_bio: rows.len() - with_bio,
        countries: countries.len(),
        size_bytes,
    }))
}

fn summarize_rankings(
    store: &TableStore,
    ranking_type: RankingType,
) -> Result<Option<RankingSummary>, StorageError> {
    let table = Table::rankings(ranking_type);
    let Some(size_bytes) = store.file_size(&table) else {
        return Ok(None);
    };
    let rows = store.load(&table)?.rows;
    let players: HashSet<&str> = rows.iter().map(|r| r.player_id.as_str()).collect();
    let dates: BTreeSet<NaiveDate> = rows.iter().map(|r| r.date).collect();
    Ok(Some(RankingSummary {
        count: rows.len(),
        unique_players: players.len(),
        unique_dates: dates.len(),
        earliest_date: dates.first().copied(),
        latest_date: dates.last().copied(),
        size_bytes,
    }))
}

fn summarize_tournaments(store: &TableStore) -> Result<Option<TournamentSummary>, StorageError> {
    let table = Table::tournaments();
    let Some(size_bytes) = store.file_size(&table) else {
        return Ok(None);
    };
    let rows = store.load(&table)?.rows;
    let types: BTreeSet<TournamentType> = rows.iter().map(|t| t.tournament_type).collect();
    Ok(Some(TournamentSummary {
        count: rows.len(),
        first_year: rows.iter().map(|t| t.year).min(),
        last_year: rows.iter().map(|t| t.year).max(),
        types: types.into_iter().collect(),
        with_winners: rows.iter().filter(|t| t.has_winner()).count(),
        size_bytes,
    }))
}

/// Formats a byte count as `12.3 KB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

fn date_range(first: Option<NaiveDate>, last: Option<NaiveDate>) -> String {
    match (first, last) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "-".to_string(),
    }
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data directory: {}", self.data_dir.display())?;

        match &self.players {
            Some(p) => writeln!(
                f,
                "players: {} ({} with bio, {} missing, {} countries), {}",
                p.count,
                p.with_bio,
                p.missing_bio,
                p.countries,
                format_size(p.size_bytes)
            )?,
            None => writeln!(f, "players: no data")?,
        }

        for (label, summary) in [
            ("singles rankings", &self.rankings_singles),
            ("doubles rankings", &self.rankings_doubles),
        ] {
            match summary {
                Some(r) => writeln!(
                    f,
                    "{label}: {} rows, {} players, {} dates ({}), {}",
                    r.count,
                    r.unique_players,
                    r.unique_dates,
                    date_range(r.earliest_date, r.latest_date),
                    format_size(r.size_bytes)
                )?,
                None => writeln!(f, "{label}: no data")?,
            }
        }

        match &self.tournaments {
            Some(t) => {
                let types: Vec<&str> = t.types.iter().map(|t| t.as_str()).collect();
                write!(
                    f,
                    "tournaments: {} ({} with winners), years {}-{}, types [{}], {}",
                    t.count,
                    t.with_winners,
                    t.first_year.map_or_else(|| "?".to_string(), |y| y.to_string()),
                    t.last_year.map_or_else(|| "?".to_string(), |y| y.to_string()),
                    types.join(", "),
                    format_size(t.size_bytes)
                )
            }
            None => write!(f, "tournaments: no data"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::{PlayerRecord, RankingRecord, TournamentRecord};

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_summarize_empty_store() {
        let dir = TempDir::new().unwrap();
        let summary = summarize(&TableStore::new(dir.path())).unwrap();
        assert!(summary.players.is_none());
        assert!(summary.rankings_singles.is_none());
        assert!(summary.tournaments.is_none());
        assert!(summary.to_string().contains("players: no data"));
    }

    #[tokio::test]
    async fn test_summarize_written_tables() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::new(dir.path());

        let mut sinner = PlayerRecord::new("s0ag", "Jannik Sinner");
        sinner.country = Some("Italy".into());
        store
            .upsert(
                &Table::players(),
                vec![sinner, PlayerRecord::new("a0e2", "Carlos Alcaraz")],
            )
            .await
            .unwrap();

        let d1: NaiveDate = "2024-01-01".parse().unwrap();
        let d2: NaiveDate = "2024-01-08".parse().unwrap();
        store
            .upsert(
                &Table::rankings(RankingType::Singles),
                vec![
                    RankingRecord::new(RankingType::Singles, d1, "s0ag", 4, 6490),
                    RankingRecord::new(RankingType::Singles, d2, "s0ag", 4, 6490),
                    RankingRecord::new(RankingType::Singles, d2, "a0e2", 2, 8855),
                ],
            )
            .await
            .unwrap();

        let mut ao = TournamentRecord::new(2024, TournamentType::Gs, "Australian Open");
        ao.singles_winner_id = Some("s0ag".into());
        store
            .upsert(
                &Table::tournaments(),
                vec![ao, TournamentRecord::new(2023, TournamentType::Atp, "Brisbane")],
            )
            .await
            .unwrap();

        let summary = summarize(&store).unwrap();
        let players = summary.players.unwrap();
        assert_eq!((players.count, players.with_bio, players.countries), (2, 1, 1));

        let singles = summary.rankings_singles.unwrap();
        assert_eq!(singles.count, 3);
        assert_eq!(singles.unique_players, 2);
        assert_eq!(singles.unique_dates, 2);
        assert_eq!(singles.latest_date, Some(d2));
        assert!(summary.rankings_doubles.is_none());

        let tournaments = summary.tournaments.unwrap();
        assert_eq!(tournaments.first_year, Some(2023));
        assert_eq!(tournaments.with_winners, 1);
        assert_eq!(tournaments.types, vec![TournamentType::Atp, TournamentType::Gs]);
    }
}
