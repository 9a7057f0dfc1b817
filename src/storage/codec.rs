//! Arrow encoding of the three record types.
//!
//! Each table has a fixed declared schema. Files are decoded by column name,
//! after the file schema has been checked against the declared one.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use arrow::array::{
    Array, ArrayRef, Date32Array, Int32Array, ListArray, ListBuilder, StringArray, StringBuilder,
    UInt32Array,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::temporal_conversions::date32_to_datetime;
use chrono::NaiveDate;

use super::error::StorageError;
use super::table::{MergePolicy, TableRecord};
use crate::model::{
    PlayerKey, PlayerRecord, RankingKey, RankingRecord, TournamentKey, TournamentRecord,
};

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    Date32Type::from_naive_date(date)
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    date32_to_datetime(days).map(|datetime| datetime.date())
}

fn string_list_type() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
}

// ==================== Column access ====================

/// Typed, name-based access to one decoded batch.
struct Columns<'a> {
    batch: &'a RecordBatch,
    path: &'a Path,
}

impl<'a> Columns<'a> {
    fn new(batch: &'a RecordBatch, path: &'a Path) -> Self {
        Self { batch, path }
    }

    fn get<T: Array + 'static>(&self, name: &str) -> Result<&'a T, StorageError> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| StorageError::decode(self.path, format!("missing column {name}")))?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| StorageError::decode(self.path, format!("column {name} has wrong type")))
    }

    fn required_str(&self, array: &StringArray, name: &str, row: usize) -> Result<String, StorageError> {
        opt_str(array, row)
            .ok_or_else(|| StorageError::decode(self.path, format!("null {name} in row {row}")))
    }

    fn required_date(&self, array: &Date32Array, name: &str, row: usize) -> Result<NaiveDate, StorageError> {
        opt_date(array, row)
            .ok_or_else(|| StorageError::decode(self.path, format!("invalid {name} in row {row}")))
    }

    fn parse<T>(&self, array: &StringArray, name: &str, row: usize) -> Result<T, StorageError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required_str(array, name, row)?;
        raw.parse()
            .map_err(|err| StorageError::decode(self.path, format!("{name} in row {row}: {err}")))
    }

    fn parse_opt<T>(&self, array: &StringArray, name: &str, row: usize) -> Result<Option<T>, StorageError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if array.is_null(row) {
            return Ok(None);
        }
        self.parse(array, name, row).map(Some)
    }

    fn string_list(&self, array: &ListArray, name: &str, row: usize) -> Result<Vec<String>, StorageError> {
        if array.is_null(row) {
            return Ok(Vec::new());
        }
        let values = array.value(row);
        let strings = values
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| StorageError::decode(self.path, format!("{name} items are not strings")))?;
        Ok((0..strings.len()).filter_map(|i| opt_str(strings, i)).collect())
    }
}

fn opt_str(array: &StringArray, row: usize) -> Option<String> {
    array.is_valid(row).then(|| array.value(row).to_string())
}

fn opt_date(array: &Date32Array, row: usize) -> Option<NaiveDate> {
    array.is_valid(row).then(|| days_to_date(array.value(row))).flatten()
}

fn opt_u32(array: &UInt32Array, row: usize) -> Option<u32> {
    array.is_valid(row).then(|| array.value(row))
}

fn opt_i32(array: &Int32Array, row: usize) -> Option<i32> {
    array.is_valid(row).then(|| array.value(row))
}

fn build_string_list<'a>(values: impl Iterator<Item = &'a [String]>) -> ListArray {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for items in values {
        for item in items {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    builder.finish()
}

/// Replaces `slot` with `incoming` when the incoming value is known and
/// differs. Returns whether anything changed.
fn fill<T: PartialEq>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(&value) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

fn fill_list(slot: &mut Vec<String>, incoming: Vec<String>) -> bool {
    if incoming.is_empty() || *slot == incoming {
        return false;
    }
    *slot = incoming;
    true
}

// ==================== Rankings ====================

static RANKING_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("ranking_type", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("player_id", DataType::Utf8, false),
        Field::new("rank", DataType::UInt32, false),
        Field::new("points", DataType::UInt32, false),
        Field::new("points_move", DataType::Int32, true),
        Field::new("tournaments_played", DataType::UInt32, true),
        Field::new("dropping", DataType::UInt32, true),
        Field::new("next_best", DataType::UInt32, true),
    ]))
});

impl TableRecord for RankingRecord {
    type Key = RankingKey;

    const MERGE: MergePolicy = MergePolicy::KeepExisting;

    fn key(&self) -> RankingKey {
        RankingRecord::key(self)
    }

    fn schema() -> SchemaRef {
        Arc::clone(&RANKING_SCHEMA)
    }

    fn is_valid(&self) -> bool {
        RankingRecord::is_valid(self)
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(rows.iter().map(|r| Some(r.ranking_type.as_str())).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| Some(date_to_days(r.date))).collect::<Date32Array>()),
            Arc::new(rows.iter().map(|r| Some(r.player_id.as_str())).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| Some(r.rank)).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| Some(r.points)).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| r.points_move).collect::<Int32Array>()),
            Arc::new(rows.iter().map(|r| r.tournaments_played).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| r.dropping).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| r.next_best).collect::<UInt32Array>()),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch, path: &Path) -> Result<Vec<Self>, StorageError> {
        let cols = Columns::new(batch, path);
        let ranking_type = cols.get::<StringArray>("ranking_type")?;
        let date = cols.get::<Date32Array>("date")?;
        let player_id = cols.get::<StringArray>("player_id")?;
        let rank = cols.get::<UInt32Array>("rank")?;
        let points = cols.get::<UInt32Array>("points")?;
        let points_move = cols.get::<Int32Array>("points_move")?;
        let tournaments_played = cols.get::<UInt32Array>("tournaments_played")?;
        let dropping = cols.get::<UInt32Array>("dropping")?;
        let next_best = cols.get::<UInt32Array>("next_best")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(RankingRecord {
                    ranking_type: cols.parse(ranking_type, "ranking_type", row)?,
                    date: cols.required_date(date, "date", row)?,
                    player_id: cols.required_str(player_id, "player_id", row)?,
                    rank: rank.value(row),
                    points: points.value(row),
                    points_move: opt_i32(points_move, row),
                    tournaments_played: opt_u32(tournaments_played, row),
                    dropping: opt_u32(dropping, row),
                    next_best: opt_u32(next_best, row),
                })
            })
            .collect()
    }
}

// ==================== Players ====================

static PLAYER_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("player_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("birthdate", DataType::Date32, true),
        Field::new("birthplace", DataType::Utf8, true),
        Field::new("country", DataType::Utf8, true),
        Field::new("height_cm", DataType::UInt32, true),
        Field::new("weight_kg", DataType::UInt32, true),
        Field::new("turned_pro_year", DataType::Int32, true),
        Field::new("handedness", DataType::Utf8, true),
        Field::new("backhand_style", DataType::Utf8, true),
        Field::new("coach", DataType::Utf8, true),
    ]))
});

impl TableRecord for PlayerRecord {
    type Key = PlayerKey;

    const MERGE: MergePolicy = MergePolicy::FillFromIncoming;

    fn key(&self) -> PlayerKey {
        PlayerRecord::key(self)
    }

    fn schema() -> SchemaRef {
        Arc::clone(&PLAYER_SCHEMA)
    }

    fn is_valid(&self) -> bool {
        PlayerRecord::is_valid(self)
    }

    fn fill_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        if !incoming.name.trim().is_empty() && incoming.name != self.name {
            self.name = incoming.name;
            changed = true;
        }
        changed |= fill(&mut self.birthdate, incoming.birthdate);
        changed |= fill(&mut self.birthplace, incoming.birthplace);
        changed |= fill(&mut self.country, incoming.country);
        changed |= fill(&mut self.height_cm, incoming.height_cm);
        changed |= fill(&mut self.weight_kg, incoming.weight_kg);
        changed |= fill(&mut self.turned_pro_year, incoming.turned_pro_year);
        changed |= fill(&mut self.handedness, incoming.handedness);
        changed |= fill(&mut self.backhand_style, incoming.backhand_style);
        changed |= fill(&mut self.coach, incoming.coach);
        changed
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(rows.iter().map(|r| Some(r.player_id.as_str())).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| Some(r.name.as_str())).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.birthdate.map(date_to_days)).collect::<Date32Array>()),
            Arc::new(rows.iter().map(|r| r.birthplace.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.country.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.height_cm).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| r.weight_kg).collect::<UInt32Array>()),
            Arc::new(rows.iter().map(|r| r.turned_pro_year).collect::<Int32Array>()),
            Arc::new(rows.iter().map(|r| r.handedness.map(|h| h.as_str())).collect::<StringArray>()),
            Arc::new(
                rows.iter()
                    .map(|r| r.backhand_style.map(|b| b.as_str()))
                    .collect::<StringArray>(),
            ),
            Arc::new(rows.iter().map(|r| r.coach.as_deref()).collect::<StringArray>()),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch, path: &Path) -> Result<Vec<Self>, StorageError> {
        let cols = Columns::new(batch, path);
        let player_id = cols.get::<StringArray>("player_id")?;
        let name = cols.get::<StringArray>("name")?;
        let birthdate = cols.get::<Date32Array>("birthdate")?;
        let birthplace = cols.get::<StringArray>("birthplace")?;
        let country = cols.get::<StringArray>("country")?;
        let height_cm = cols.get::<UInt32Array>("height_cm")?;
        let weight_kg = cols.get::<UInt32Array>("weight_kg")?;
        let turned_pro_year = cols.get::<Int32Array>("turned_pro_year")?;
        let handedness = cols.get::<StringArray>("handedness")?;
        let backhand_style = cols.get::<StringArray>("backhand_style")?;
        let coach = cols.get::<StringArray>("coach")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(PlayerRecord {
                    player_id: cols.required_str(player_id, "player_id", row)?,
                    name: cols.required_str(name, "name", row)?,
                    birthdate: opt_date(birthdate, row),
                    birthplace: opt_str(birthplace, row),
                    country: opt_str(country, row),
                    height_cm: opt_u32(height_cm, row),
                    weight_kg: opt_u32(weight_kg, row),
                    turned_pro_year: opt_i32(turned_pro_year, row),
                    handedness: cols.parse_opt(handedness, "handedness", row)?,
                    backhand_style: cols.parse_opt(backhand_style, "backhand_style", row)?,
                    coach: opt_str(coach, row),
                })
            })
            .collect()
    }
}

// ==================== Tournaments ====================

static TOURNAMENT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("tournament_type", DataType::Utf8, false),
        Field::new("tournament_name", DataType::Utf8, false),
        Field::new("venue", DataType::Utf8, true),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("start_date", DataType::Date32, true),
        Field::new("end_date", DataType::Date32, true),
        Field::new("singles_winner_id", DataType::Utf8, true),
        Field::new("singles_winner_name", DataType::Utf8, true),
        Field::new("doubles_winner_ids", string_list_type(), false),
        Field::new("doubles_winner_names", string_list_type(), false),
    ]))
});

impl TableRecord for TournamentRecord {
    type Key = TournamentKey;

    const MERGE: MergePolicy = MergePolicy::FillFromIncoming;

    fn key(&self) -> TournamentKey {
        TournamentRecord::key(self)
    }

    fn schema() -> SchemaRef {
        Arc::clone(&TOURNAMENT_SCHEMA)
    }

    fn is_valid(&self) -> bool {
        TournamentRecord::is_valid(self)
    }

    fn fill_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.venue, incoming.venue);
        changed |= fill(&mut self.country_code, incoming.country_code);
        changed |= fill(&mut self.start_date, incoming.start_date);
        changed |= fill(&mut self.end_date, incoming.end_date);
        changed |= fill(&mut self.singles_winner_id, incoming.singles_winner_id);
        changed |= fill(&mut self.singles_winner_name, incoming.singles_winner_name);
        changed |= fill_list(&mut self.doubles_winner_ids, incoming.doubles_winner_ids);
        changed |= fill_list(&mut self.doubles_winner_names, incoming.doubles_winner_names);
        changed
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(rows.iter().map(|r| Some(r.year)).collect::<Int32Array>()),
            Arc::new(
                rows.iter()
                    .map(|r| Some(r.tournament_type.as_str()))
                    .collect::<StringArray>(),
            ),
            Arc::new(rows.iter().map(|r| Some(r.tournament_name.as_str())).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.venue.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.country_code.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.start_date.map(date_to_days)).collect::<Date32Array>()),
            Arc::new(rows.iter().map(|r| r.end_date.map(date_to_days)).collect::<Date32Array>()),
            Arc::new(rows.iter().map(|r| r.singles_winner_id.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.singles_winner_name.as_deref()).collect::<StringArray>()),
            Arc::new(build_string_list(rows.iter().map(|r| r.doubles_winner_ids.as_slice()))),
            Arc::new(build_string_list(rows.iter().map(|r| r.doubles_winner_names.as_slice()))),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch, path: &Path) -> Result<Vec<Self>, StorageError> {
        let cols = Columns::new(batch, path);
        let year = cols.get::<Int32Array>("year")?;
        let tournament_type = cols.get::<StringArray>("tournament_type")?;
        let tournament_name = cols.get::<StringArray>("tournament_name")?;
        let venue = cols.get::<StringArray>("venue")?;
        let country_code = cols.get::<StringArray>("country_code")?;
        let start_date = cols.get::<Date32Array>("start_date")?;
        let end_date = cols.get::<Date32Array>("end_date")?;
        let singles_winner_id = cols.get::<StringArray>("singles_winner_id")?;
        let singles_winner_name = cols.get::<StringArray>("singles_winner_name")?;
        let doubles_winner_ids = cols.get::<ListArray>("doubles_winner_ids")?;
        let doubles_winner_names = cols.get::<ListArray>("doubles_winner_names")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(TournamentRecord {
                    year: year.value(row),
                    tournament_type: cols.parse(tournament_type, "tournament_type", row)?,
                    tournament_name: cols.required_str(tournament_name, "tournament_name", row)?,
                    venue: opt_str(venue, row),
                    country_code: opt_str(country_code, row),
                    start_date: opt_date(start_date, row),
                    end_date: opt_date(end_date, row),
                    singles_winner_id: opt_str(singles_winner_id, row),
                    singles_winner_name: opt_str(singles_winner_name, row),
                    doubles_winner_ids: cols.string_list(doubles_winner_ids, "doubles_winner_ids", row)?,
                    doubles_winner_names: cols.string_list(
                        doubles_winner_names,
                        "doubles_winner_names",
                        row,
                    )?,
                })
            })
            .collect()
    }
}
