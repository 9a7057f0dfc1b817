//! What an update call covers, and how a scope becomes an ordered unit list.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::ops::RangeInclusive;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{PlayerRecord, RankingRecord, RankingType, TournamentType};

/// Largest `LastWeeks` window accepted from operators.
pub const MAX_RANKING_WEEKS: u32 = 500;

/// Largest player count accepted from operators per run.
pub const MAX_PLAYERS_PER_RUN: usize = 500;

/// Earliest results archive year accepted from operators.
pub const MIN_TOURNAMENT_YEAR: i32 = 1990;

/// Latest results archive year accepted from operators.
pub const MAX_TOURNAMENT_YEAR: i32 = 2030;

/// Which ranking publication dates to cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingWindow {
    /// Exactly these dates.
    Dates(Vec<NaiveDate>),
    /// The n most recent Mondays up to and including today.
    LastWeeks(u32),
    /// Every date the source lists.
    AllPublished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingScope {
    pub ranking_type: RankingType,
    pub window: RankingWindow,
    /// Refetch dates that are already stored.
    pub force: bool,
}

impl RankingScope {
    #[must_use]
    pub fn new(ranking_type: RankingType, window: RankingWindow) -> Self {
        Self {
            ranking_type,
            window,
            force: false,
        }
    }
}

/// Players to look up, best ranked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerScope {
    pub top_k: usize,
    /// Include players that already have biographical data.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentScope {
    pub years: RangeInclusive<i32>,
    pub types: Vec<TournamentType>,
    /// Refetch (year, type) pairs that are already stored.
    pub force: bool,
}

impl TournamentScope {
    /// Every (year, type) pair, year-major. Duplicate types are ignored.
    #[must_use]
    pub fn pairs(&self) -> Vec<(i32, TournamentType)> {
        let mut types = Vec::with_capacity(self.types.len());
        for tournament_type in &self.types {
            if !types.contains(tournament_type) {
                types.push(*tournament_type);
            }
        }
        self.years
            .clone()
            .flat_map(|year| types.iter().map(move |t| (year, *t)))
            .collect()
    }
}

/// The `n` most recent Mondays on or before `today`, oldest first.
///
/// Stops early at the start of the representable calendar.
#[must_use]
pub fn last_mondays(today: NaiveDate, n: u32) -> Vec<NaiveDate> {
    let offset = Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let Some(latest) = today.checked_sub_signed(offset) else {
        return Vec::new();
    };
    let mut dates: Vec<NaiveDate> = (0..i64::from(n))
        .map_while(|weeks_back| latest.checked_sub_signed(Duration::weeks(weeks_back)))
        .collect();
    dates.reverse();
    dates
}

/// Best position a player has held in one ranking type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BestRank {
    rank: u32,
    date: NaiveDate,
}

impl BestRank {
    /// Lower rank first; on a tie the more recent date first.
    fn sort_key(self) -> (u32, Reverse<NaiveDate>) {
        (self.rank, Reverse(self.date))
    }
}

fn best_ranks(rows: &[RankingRecord]) -> HashMap<&str, BestRank> {
    let mut best: HashMap<&str, BestRank> = HashMap::new();
    for row in rows {
        let candidate = BestRank {
            rank: row.rank,
            date: row.date,
        };
        best.entry(row.player_id.as_str())
            .and_modify(|current| {
                if candidate.sort_key() < current.sort_key() {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    best
}

/// Ranked players come before unranked ones.
fn compare_best(a: Option<BestRank>, b: Option<BestRank>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.sort_key().cmp(&b.sort_key()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders players by best singles rank ever held, then best doubles rank,
/// then id. Players never ranked come last.
#[must_use]
pub fn prioritize_players<'a>(
    players: &'a [PlayerRecord],
    singles: &[RankingRecord],
    doubles: &[RankingRecord],
) -> Vec<&'a PlayerRecord> {
    let best_singles = best_ranks(singles);
    let best_doubles = best_ranks(doubles);

    let mut ordered: Vec<&PlayerRecord> = players.iter().collect();
    ordered.sort_by(|a, b| {
        let id_a = a.player_id.as_str();
        let id_b = b.player_id.as_str();
        compare_best(
            best_singles.get(id_a).copied(),
            best_singles.get(id_b).copied(),
        )
        .then_with(|| {
            compare_best(
                best_doubles.get(id_a).copied(),
                best_doubles.get(id_b).copied(),
            )
        })
        .then_with(|| id_a.cmp(id_b))
    });
    ordered
}
