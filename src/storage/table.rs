//! Table declarations: what is stored where, keyed how, merged how.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use super::error::StorageError;
use crate::model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord};

/// How an incoming row is combined with a stored row of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The stored row wins; the incoming duplicate is dropped.
    KeepExisting,
    /// Field by field, a known incoming value replaces the stored one and an
    /// unknown incoming value keeps it.
    FillFromIncoming,
}

/// A record type that can be persisted as a table.
pub trait TableRecord: Clone + Send + Sync + 'static {
    type Key: Clone + Ord + Hash + fmt::Debug + Send + Sync;

    const MERGE: MergePolicy;

    fn key(&self) -> Self::Key;

    /// The declared Arrow schema. Stored files must match it exactly.
    fn schema() -> SchemaRef;

    fn is_valid(&self) -> bool;

    /// Applies [`MergePolicy::FillFromIncoming`]. Returns whether any field
    /// changed.
    fn fill_from(&mut self, _incoming: Self) -> bool {
        false
    }

    /// Encodes rows in the declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`ArrowError`] if the arrays cannot form a batch.
    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError>;

    /// Decodes a batch read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Decode`] for missing columns or values that do
    /// not map to a record.
    fn from_batch(batch: &RecordBatch, path: &Path) -> Result<Vec<Self>, StorageError>;
}

/// Handle to one stored table.
///
/// Ranking types share a record type but live in separate files, so a table
/// also carries the filter deciding which records belong to it.
pub struct Table<R> {
    name: &'static str,
    accepts: fn(&R) -> bool,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Table<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Table<R> {}

impl<R> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

fn accept_all<R>(_: &R) -> bool {
    true
}

fn is_singles(record: &RankingRecord) -> bool {
    record.ranking_type == RankingType::Singles
}

fn is_doubles(record: &RankingRecord) -> bool {
    record.ranking_type == RankingType::Doubles
}

impl Table<RankingRecord> {
    #[must_use]
    pub fn rankings(ranking_type: RankingType) -> Self {
        match ranking_type {
            RankingType::Singles => Self {
                name: "singles_rankings",
                accepts: is_singles,
                _record: PhantomData,
            },
            RankingType::Doubles => Self {
                name: "doubles_rankings",
                accepts: is_doubles,
                _record: PhantomData,
            },
        }
    }
}

impl Table<PlayerRecord> {
    #[must_use]
    pub fn players() -> Self {
        Self {
            name: "players",
            accepts: accept_all,
            _record: PhantomData,
        }
    }
}

impl Table<TournamentRecord> {
    #[must_use]
    pub fn tournaments() -> Self {
        Self {
            name: "tournaments",
            accepts: accept_all,
            _record: PhantomData,
        }
    }
}

impl<R> Table<R> {
    /// Table name, also the file stem.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.parquet", self.name)
    }

    /// Whether `record` belongs in this table.
    #[must_use]
    pub fn accepts(&self, record: &R) -> bool {
        (self.accepts)(record)
    }
}

/// Rows of a table together with its declared schema.
#[derive(Debug, Clone)]
pub struct LoadedTable<R> {
    pub schema: SchemaRef,
    pub rows: Vec<R>,
}

impl<R: TableRecord> LoadedTable<R> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Re-encodes the rows. An empty table gives an empty batch with the
    /// declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`ArrowError`] if encoding fails.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        R::to_batch(&self.rows)
    }
}
