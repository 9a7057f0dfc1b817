//! Parquet table storage.
//!
//! One file per table under a data directory. Writes are whole-file:
//! load, merge in memory, write a temporary file, rename over the old one.
//! Readers therefore always see either the previous or the new file.
//!
//! # Example
//!
//! ```no_run
//! use tennis_ingest::model::RankingType;
//! use tennis_ingest::storage::{Table, TableStore};
//!
//! # async fn example() -> Result<(), tennis_ingest::storage::StorageError> {
//! let store = TableStore::new("./data");
//! let loaded = store.load(&Table::rankings(RankingType::Singles))?;
//! println!("{} stored ranking rows", loaded.len());
//! # Ok(())
//! # }
//! ```

mod codec;
mod error;
mod table;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::Schema;
use dashmap::DashMap;
use fs2::FileExt;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, instrument};

pub use error::StorageError;
pub use table::{LoadedTable, MergePolicy, Table, TableRecord};

/// Counts from one [`TableStore::upsert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Rows whose key was not stored before.
    pub inserted: usize,
    /// Rows merged into a stored row with the same key.
    pub merged: usize,
    /// Rows discarded: duplicates under keep-existing, invalid rows, or rows
    /// that belong to another table.
    pub dropped: usize,
    /// Rows in the table after the call.
    pub total: usize,
}

/// Owner of all table files under one data directory.
///
/// Cloning is cheap and clones share the per-table write locks.
#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
    /// Serialises writers within the process; the file lock covers other
    /// processes.
    locks: Arc<DashMap<String, Arc<TokioMutex<()>>>>,
}

impl TableStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn table_path<R>(&self, table: &Table<R>) -> PathBuf {
        self.root.join(table.file_name())
    }

    fn table_lock(&self, name: &str) -> Arc<TokioMutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Reads every stored row. A table that was never written loads as zero
    /// rows with the declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Schema`] when the file does not match the
    /// declared schema, or another [`StorageError`] if it cannot be read.
    pub fn load<R: TableRecord>(&self, table: &Table<R>) -> Result<LoadedTable<R>, StorageError> {
        let rows = read_rows::<R>(&self.table_path(table))?;
        Ok(LoadedTable {
            schema: R::schema(),
            rows,
        })
    }

    /// Identity keys of every stored row.
    ///
    /// # Errors
    ///
    /// Same as [`TableStore::load`].
    pub fn existing_keys<R: TableRecord>(
        &self,
        table: &Table<R>,
    ) -> Result<HashSet<R::Key>, StorageError> {
        Ok(self.load(table)?.rows.iter().map(TableRecord::key).collect())
    }

    /// Size of the table file in bytes, `None` when it was never written.
    #[must_use]
    pub fn file_size<R>(&self, table: &Table<R>) -> Option<u64> {
        fs::metadata(self.table_path(table)).ok().map(|meta| meta.len())
    }

    /// Merges `batch` into the stored table and rewrites the file.
    ///
    /// Rows are keyed by identity and combined per the record's
    /// [`MergePolicy`]. The file is only rewritten when something changed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the table cannot be read or written. On
    /// error the stored file is unchanged.
    #[instrument(skip(self, table, batch), fields(table = table.name(), rows = batch.len()))]
    pub async fn upsert<R: TableRecord>(
        &self,
        table: &Table<R>,
        batch: Vec<R>,
    ) -> Result<UpsertSummary, StorageError> {
        let path = self.table_path(table);
        let lock = self.table_lock(table.name());
        let _guard = lock.lock().await;

        let table = *table;
        let task_path = path.clone();
        let summary = tokio::task::spawn_blocking(move || upsert_blocking(&task_path, table, batch))
            .await
            .map_err(|err| StorageError::task(&path, err.to_string()))??;

        info!(
            inserted = summary.inserted,
            merged = summary.merged,
            dropped = summary.dropped,
            total = summary.total,
            "upsert complete"
        );
        Ok(summary)
    }
}

fn upsert_blocking<R: TableRecord>(
    path: &Path,
    table: Table<R>,
    incoming: Vec<R>,
) -> Result<UpsertSummary, StorageError> {
    if incoming.is_empty() {
        let total = read_rows::<R>(path)?.len();
        return Ok(UpsertSummary {
            total,
            ..UpsertSummary::default()
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let lock_path = path.with_extension("parquet.lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| StorageError::io(&lock_path, e))?;
    FileExt::lock_exclusive(&lock_file).map_err(|e| StorageError::io(&lock_path, e))?;

    let existing = read_rows::<R>(path)?;
    let (rows, summary, changed) = merge_rows(&table, existing, incoming);
    if changed {
        write_rows(path, &rows)?;
    } else {
        debug!(path = %path.display(), "no changes, file left as is");
    }
    // Closing the handle releases the lock.
    drop(lock_file);
    Ok(summary)
}

/// Combines stored and incoming rows. Returns the key-sorted rows, the
/// counts, and whether anything differs from `existing`.
fn merge_rows<R: TableRecord>(
    table: &Table<R>,
    existing: Vec<R>,
    incoming: Vec<R>,
) -> (Vec<R>, UpsertSummary, bool) {
    let mut rows: BTreeMap<R::Key, R> = existing.into_iter().map(|r| (r.key(), r)).collect();
    let mut summary = UpsertSummary::default();
    let mut changed = false;

    for record in incoming {
        if !record.is_valid() || !table.accepts(&record) {
            debug!(table = table.name(), key = ?record.key(), "dropping invalid row");
            summary.dropped += 1;
            continue;
        }
        match rows.entry(record.key()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                summary.inserted += 1;
                changed = true;
            }
            Entry::Occupied(mut slot) => match R::MERGE {
                MergePolicy::KeepExisting => summary.dropped += 1,
                MergePolicy::FillFromIncoming => {
                    summary.merged += 1;
                    changed |= slot.get_mut().fill_from(record);
                }
            },
        }
    }

    summary.total = rows.len();
    (rows.into_values().collect(), summary, changed)
}

fn read_rows<R: TableRecord>(path: &Path) -> Result<Vec<R>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| StorageError::parquet(path, e))?;
    check_schema(path, &R::schema(), builder.schema())?;
    let reader = builder.build().map_err(|e| StorageError::parquet(path, e))?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| StorageError::arrow(path, e))?;
        rows.extend(R::from_batch(&batch, path)?);
    }
    Ok(rows)
}

fn write_rows<R: TableRecord>(path: &Path, rows: &[R]) -> Result<(), StorageError> {
    let temp_path = path.with_extension("parquet.tmp");
    let result = write_temp(&temp_path, rows).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|e| StorageError::io(path, e))
    });
    if result.is_err() {
        // Best effort; the original error is the one worth reporting.
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    sync_parent_dir(path)?;
    debug!(path = %path.display(), rows = rows.len(), "table written");
    Ok(())
}

/// Writes `rows` to `temp_path` and syncs the file to disk.
fn write_temp<R: TableRecord>(temp_path: &Path, rows: &[R]) -> Result<(), StorageError> {
    let batch = R::to_batch(rows).map_err(|e| StorageError::arrow(temp_path, e))?;
    let file = File::create(temp_path).map_err(|e| StorageError::io(temp_path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| StorageError::parquet(temp_path, e))?;
    writer
        .write(&batch)
        .map_err(|e| StorageError::parquet(temp_path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| StorageError::parquet(temp_path, e))?;
    file.sync_all().map_err(|e| StorageError::io(temp_path, e))
}

/// Makes the rename durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StorageError> {
    let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| StorageError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

fn describe_schema(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|field| {
            let nullable = if field.is_nullable() { "?" } else { "" };
            format!("{}: {}{nullable}", field.name(), field.data_type())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_schema(path: &Path, declared: &Schema, found: &Schema) -> Result<(), StorageError> {
    let matches = declared.fields().len() == found.fields().len()
        && declared
            .fields()
            .iter()
            .zip(found.fields().iter())
            .all(|(want, got)| {
                want.name() == got.name()
                    && want.data_type() == got.data_type()
                    && want.is_nullable() == got.is_nullable()
            });
    if matches {
        Ok(())
    } else {
        Err(StorageError::schema(
            path,
            describe_schema(declared),
            describe_schema(found),
        ))
    }
}
