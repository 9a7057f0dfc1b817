//! Domain records persisted by the storage layer.
//!
//! Three entities are ingested from the source:
//! - [`RankingRecord`] - one row of a weekly singles or doubles ranking table
//! - [`PlayerRecord`] - biographical data for a player
//! - [`TournamentRecord`] - one tournament of a (year, type) results archive
//!
//! Each entity has an identity key type ([`RankingKey`], [`PlayerKey`],
//! [`TournamentKey`]) that is unique within its stored table.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string did not name a known variant of a domain enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/// Ranking table flavour. Each flavour is stored in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingType {
    Singles,
    Doubles,
}

impl RankingType {
    /// Both ranking types, in processing order.
    pub const ALL: [Self; 2] = [Self::Singles, Self::Doubles];

    /// Returns the lowercase label used in URLs and file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Singles => "singles",
            Self::Doubles => "doubles",
        }
    }
}

impl fmt::Display for RankingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singles" => Ok(Self::Singles),
            "doubles" => Ok(Self::Doubles),
            _ => Err(UnknownVariant::new("ranking type", s, "singles, doubles")),
        }
    }
}

/// Tournament category as used by the results archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentType {
    /// ATP Tour events.
    Atp,
    /// Challenger events.
    Ch,
    /// ITF Futures events.
    Fu,
    /// Grand Slams.
    Gs,
}

impl TournamentType {
    pub const ALL: [Self; 4] = [Self::Atp, Self::Ch, Self::Fu, Self::Gs];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atp => "atp",
            Self::Ch => "ch",
            Self::Fu => "fu",
            Self::Gs => "gs",
        }
    }

    /// Parses a comma-separated list such as `atp,gs`, preserving order and
    /// dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownVariant`] for the first entry that is not a valid type.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, UnknownVariant> {
        let mut types = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parsed = part.parse::<Self>()?;
            if !types.contains(&parsed) {
                types.push(parsed);
            }
        }
        Ok(types)
    }
}

impl fmt::Display for TournamentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atp" => Ok(Self::Atp),
            "ch" => Ok(Self::Ch),
            "fu" => Ok(Self::Fu),
            "gs" => Ok(Self::Gs),
            _ => Err(UnknownVariant::new("tournament type", s, "atp, ch, fu, gs")),
        }
    }
}

/// Playing hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Right,
    Left,
}

impl Handedness {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Left => "left",
        }
    }
}

impl FromStr for Handedness {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "right" | "right-handed" => Ok(Self::Right),
            "left" | "left-handed" => Ok(Self::Left),
            _ => Err(UnknownVariant::new("handedness", s, "right, left")),
        }
    }
}

/// Backhand technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackhandStyle {
    OneHanded,
    TwoHanded,
}

impl BackhandStyle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHanded => "one-handed",
            Self::TwoHanded => "two-handed",
        }
    }
}

impl FromStr for BackhandStyle {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-handed" => Ok(Self::OneHanded),
            "two-handed" => Ok(Self::TwoHanded),
            _ => Err(UnknownVariant::new(
                "backhand style",
                s,
                "one-handed, two-handed",
            )),
        }
    }
}

/// One player's position in a published ranking table.
///
/// Ranking rows are historical facts: once a key is stored its values are
/// never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub ranking_type: RankingType,
    pub date: NaiveDate,
    pub player_id: String,
    /// Position in the table, starting at 1. Ties share a rank.
    pub rank: u32,
    pub points: u32,
    /// Points change since the previous table, from the `pointsMove` cell.
    pub points_move: Option<i32>,
    pub tournaments_played: Option<u32>,
    pub dropping: Option<u32>,
    pub next_best: Option<u32>,
}

/// Identity key of a [`RankingRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RankingKey {
    pub ranking_type: RankingType,
    pub date: NaiveDate,
    pub player_id: String,
}

impl RankingRecord {
    /// Creates a ranking row with only the required columns set.
    #[must_use]
    pub fn new(
        ranking_type: RankingType,
        date: NaiveDate,
        player_id: impl Into<String>,
        rank: u32,
        points: u32,
    ) -> Self {
        Self {
            ranking_type,
            date,
            player_id: player_id.into(),
            rank,
            points,
            points_move: None,
            tournaments_played: None,
            dropping: None,
            next_best: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> RankingKey {
        RankingKey {
            ranking_type: self.ranking_type,
            date: self.date,
            player_id: self.player_id.clone(),
        }
    }

    /// Returns true when the row satisfies the table invariants.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.player_id.trim().is_empty() && self.rank > 0
    }
}

/// Biographical data for one player.
///
/// Every field except the id and name is optional; the source fills them in
/// over time and merges never replace a known value with a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    pub birthdate: Option<NaiveDate>,
    pub birthplace: Option<String>,
    pub country: Option<String>,
    pub height_cm: Option<u32>,
    pub weight_kg: Option<u32>,
    pub turned_pro_year: Option<i32>,
    pub handedness: Option<Handedness>,
    pub backhand_style: Option<BackhandStyle>,
    pub coach: Option<String>,
}

/// Identity key of a [`PlayerRecord`]: the source's player id.
pub type PlayerKey = String;

impl PlayerRecord {
    /// Creates a player with no biographical data.
    #[must_use]
    pub fn new(player_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            birthdate: None,
            birthplace: None,
            country: None,
            height_cm: None,
            weight_kg: None,
            turned_pro_year: None,
            handedness: None,
            backhand_style: None,
            coach: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> PlayerKey {
        self.player_id.clone()
    }

    /// Whether any of the core biographical fields is known.
    ///
    /// Core fields are birthdate, weight, height, country and handedness.
    #[must_use]
    pub fn has_bio(&self) -> bool {
        self.birthdate.is_some()
            || self.weight_kg.is_some()
            || self.height_cm.is_some()
            || self.country.is_some()
            || self.handedness.is_some()
    }

    /// Whether any optional field at all is known.
    #[must_use]
    pub fn has_any_detail(&self) -> bool {
        self.has_bio()
            || self.birthplace.is_some()
            || self.turned_pro_year.is_some()
            || self.backhand_style.is_some()
            || self.coach.is_some()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.player_id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

/// One tournament from a (year, type) results archive page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub year: i32,
    pub tournament_type: TournamentType,
    pub tournament_name: String,
    pub venue: Option<String>,
    /// Upper-case ISO country code taken from the flag icon.
    pub country_code: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub singles_winner_id: Option<String>,
    pub singles_winner_name: Option<String>,
    /// Empty when unknown.
    pub doubles_winner_ids: Vec<String>,
    pub doubles_winner_names: Vec<String>,
}

/// Identity key of a [`TournamentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TournamentKey {
    pub year: i32,
    pub tournament_type: TournamentType,
    pub tournament_name: String,
}

impl TournamentRecord {
    #[must_use]
    pub fn new(year: i32, tournament_type: TournamentType, name: impl Into<String>) -> Self {
        Self {
            year,
            tournament_type,
            tournament_name: name.into(),
            venue: None,
            country_code: None,
            start_date: None,
            end_date: None,
            singles_winner_id: None,
            singles_winner_name: None,
            doubles_winner_ids: Vec::new(),
            doubles_winner_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> TournamentKey {
        TournamentKey {
            year: self.year,
            tournament_type: self.tournament_type,
            tournament_name: self.tournament_name.clone(),
        }
    }

    /// A tournament is concluded once at least one winner is known.
    #[must_use]
    pub fn has_winner(&self) -> bool {
        self.singles_winner_id.is_some() || !self.doubles_winner_ids.is_empty()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.tournament_name.trim().is_empty()
    }
}
