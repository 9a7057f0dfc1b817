//! Integration tests for Parquet table storage.

use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;
use tennis_ingest::model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord, TournamentType};
use tennis_ingest::storage::{StorageError, Table, TableStore};

fn date(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

fn singles(day: &str, player_id: &str, rank: u32, points: u32) -> RankingRecord {
    RankingRecord::new(RankingType::Singles, date(day), player_id, rank, points)
}

#[test]
fn test_never_written_table_loads_empty_with_schema() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    let loaded = store.load(&Table::rankings(RankingType::Doubles)).unwrap();
    assert!(loaded.is_empty());
    let names: Vec<&str> = loaded.schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names[..4], ["ranking_type", "date", "player_id", "rank"]);
    assert!(store.file_size(&Table::rankings(RankingType::Doubles)).is_none());
}

#[tokio::test]
async fn test_upsert_dedupes_within_batch_and_across_calls() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::rankings(RankingType::Singles);

    let first = store
        .upsert(
            &table,
            vec![
                singles("2024-01-08", "s0ag", 4, 6490),
                singles("2024-01-08", "s0ag", 4, 6490),
                singles("2024-01-08", "a0e2", 2, 8855),
            ],
        )
        .await
        .unwrap();
    assert_eq!((first.inserted, first.dropped, first.total), (2, 1, 2));

    // Rankings keep the stored row for a repeated key.
    let second = store
        .upsert(
            &table,
            vec![
                singles("2024-01-08", "s0ag", 1, 99_999),
                singles("2024-01-15", "s0ag", 4, 6500),
            ],
        )
        .await
        .unwrap();
    assert_eq!((second.inserted, second.dropped, second.total), (1, 1, 3));

    let rows = store.load(&table).unwrap().rows;
    let kept = rows
        .iter()
        .find(|r| r.player_id == "s0ag" && r.date == date("2024-01-08"))
        .unwrap();
    assert_eq!(kept.points, 6490);
    assert_eq!(kept.rank, 4);
}

#[tokio::test]
async fn test_rows_are_stored_in_key_order() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::rankings(RankingType::Singles);

    store
        .upsert(
            &table,
            vec![
                singles("2024-01-15", "b", 2, 10),
                singles("2024-01-08", "b", 2, 10),
                singles("2024-01-08", "a", 1, 20),
            ],
        )
        .await
        .unwrap();

    let keys: Vec<(NaiveDate, String)> = store
        .load(&table)
        .unwrap()
        .rows
        .into_iter()
        .map(|r| (r.date, r.player_id))
        .collect();
    assert_eq!(
        keys,
        vec![
            (date("2024-01-08"), "a".to_string()),
            (date("2024-01-08"), "b".to_string()),
            (date("2024-01-15"), "b".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_player_merge_fills_without_losing_known_fields() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::players();

    let mut stored = PlayerRecord::new("s0ag", "Jannik Sinner");
    stored.country = Some("Italy".into());
    stored.height_cm = Some(191);
    stored.coach = Some("Darren Cahill".into());
    store.upsert(&table, vec![stored]).await.unwrap();

    // A name-only row from a ranking page must not erase the bio.
    let summary = store
        .upsert(&table, vec![PlayerRecord::new("s0ag", "Jannik Sinner")])
        .await
        .unwrap();
    assert_eq!((summary.merged, summary.inserted, summary.total), (1, 0, 1));

    let mut bio = PlayerRecord::new("s0ag", "Jannik Sinner");
    bio.weight_kg = Some(77);
    store.upsert(&table, vec![bio]).await.unwrap();

    let rows = store.load(&table).unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].country.as_deref(), Some("Italy"));
    assert_eq!(rows[0].height_cm, Some(191));
    assert_eq!(rows[0].weight_kg, Some(77));
    assert_eq!(rows[0].coach.as_deref(), Some("Darren Cahill"));
}

#[tokio::test]
async fn test_tournament_winners_are_filled_in_later() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::tournaments();

    store
        .upsert(&table, vec![TournamentRecord::new(2024, TournamentType::Gs, "Australian Open")])
        .await
        .unwrap();

    let mut finished = TournamentRecord::new(2024, TournamentType::Gs, "Australian Open");
    finished.singles_winner_id = Some("s0ag".into());
    finished.doubles_winner_names = vec!["Rohan Bopanna".into(), "Matthew Ebden".into()];
    let summary = store.upsert(&table, vec![finished]).await.unwrap();
    assert_eq!(summary.merged, 1);

    let rows = store.load(&table).unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].has_winner());
    assert_eq!(rows[0].doubles_winner_names.len(), 2);
}

#[tokio::test]
async fn test_rows_for_other_ranking_type_are_dropped() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    let doubles = RankingRecord::new(RankingType::Doubles, date("2024-01-08"), "x", 1, 10);
    let summary = store
        .upsert(
            &Table::rankings(RankingType::Singles),
            vec![doubles, singles("2024-01-08", "y", 1, 10)],
        )
        .await
        .unwrap();
    assert_eq!((summary.inserted, summary.dropped), (1, 1));
}

#[tokio::test]
async fn test_concurrent_upserts_all_land() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let table = Table::rankings(RankingType::Singles);
            store
                .upsert(&table, vec![singles("2024-01-08", &format!("p{i}"), i + 1, 100)])
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rows = store.load(&Table::rankings(RankingType::Singles)).unwrap().rows;
    assert_eq!(rows.len(), 8);
}

#[tokio::test]
async fn test_upsert_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::tournaments();

    store
        .upsert(&table, vec![TournamentRecord::new(2023, TournamentType::Atp, "Brisbane")])
        .await
        .unwrap();

    assert!(store.table_path(&table).exists());
    assert!(!dir.path().join("tournaments.parquet.tmp").exists());
}

#[test]
fn test_schema_mismatch_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::players();

    let schema = Arc::new(Schema::new(vec![Field::new("player_id", DataType::Utf8, false)]));
    let column: ArrayRef = Arc::new(StringArray::from(vec!["s0ag"]));
    let batch = RecordBatch::try_new(Arc::clone(&schema), vec![column]).unwrap();
    let file = File::create(store.table_path(&table)).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let err = store.load(&table).unwrap_err();
    assert!(matches!(err, StorageError::Schema { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("player_id"));
}

#[tokio::test]
async fn test_failed_upsert_keeps_stored_file() {
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let table = Table::players();
    std::fs::write(store.table_path(&table), b"not parquet").unwrap();

    let err = store
        .upsert(&table, vec![PlayerRecord::new("s0ag", "Jannik Sinner")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Parquet { .. }), "unexpected error: {err}");
    assert_eq!(std::fs::read(store.table_path(&table)).unwrap(), b"not parquet");
}
