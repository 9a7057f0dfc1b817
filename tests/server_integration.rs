//! Integration tests for the HTTP surface over an ephemeral listener.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;
use tennis_ingest::model::{PlayerRecord, RankingRecord, RankingType};
use tennis_ingest::server::{self, AppState};
use tennis_ingest::storage::{Table, TableStore};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

const TOKEN: &str = "s3cret";

/// A running server; dropping it stops the server.
struct TestServer {
    base: String,
    _shutdown: oneshot::Sender<()>,
}

async fn spawn_server(source: &MockServer, store: TableStore) -> TestServer {
    let updater = support::updater(source, store)
        .with_today(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
    let state = AppState::new(updater, Some(TOKEN.to_string()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server::serve(listener, state, async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        _shutdown: tx,
    }
}

async fn seed_rankings(store: &TableStore) {
    let day = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    store
        .upsert(
            &Table::rankings(RankingType::Singles),
            vec![
                RankingRecord::new(RankingType::Singles, day, "s0ag", 4, 6490),
                RankingRecord::new(RankingType::Singles, day, "a0e2", 2, 8855),
            ],
        )
        .await
        .unwrap();
    store
        .upsert(
            &Table::players(),
            vec![
                PlayerRecord::new("s0ag", "Jannik Sinner"),
                PlayerRecord::new("a0e2", "Carlos Alcaraz"),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_and_read_only_routes() {
    let Some(source) = support::start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let server = spawn_server(&source, store.clone()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    // Nothing stored yet.
    let response = client
        .get(format!("{}/rankings/stored?ranking_type=singles", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("singles"));

    seed_rankings(&store).await;

    let rows: Vec<Value> = client
        .get(format!(
            "{}/rankings/stored?ranking_type=singles&player_ids=s0ag&ranking_date=2024-01-08",
            server.base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["player_id"], "s0ag");
    assert_eq!(rows[0]["date"], "2024-01-08");

    let found: Vec<Value> = client
        .get(format!("{}/players/search?q=alcaraz", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["player_id"], "a0e2");

    let tournaments: Vec<Value> = client
        .get(format!("{}/tournaments", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(tournaments.is_empty());
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let Some(source) = support::start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&source, TableStore::new(dir.path())).await;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("{}/admin/data-summary", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .post(format!("{}/tasks/update-weekly?token=nope", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let summary: Value = client
        .get(format!("{}/admin/data-summary?token={TOKEN}", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(summary["players"].is_null());
    assert!(summary["rankings_singles"].is_null());
}

#[tokio::test]
async fn test_admin_trigger_validation() {
    let Some(source) = support::start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&source, TableStore::new(dir.path())).await;
    let client = reqwest::Client::new();

    let weeks = client
        .post(format!("{}/admin/update-rankings?token={TOKEN}&max_weeks=0", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(weeks.status(), StatusCode::BAD_REQUEST);

    let years = client
        .post(format!(
            "{}/admin/update-tournaments?token={TOKEN}&start_year=2024&end_year=2020",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(years.status(), StatusCode::BAD_REQUEST);

    let types = client
        .post(format!(
            "{}/admin/update-tournaments?token={TOKEN}&start_year=2024&end_year=2024&types=wta",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(types.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_triggers_reject_oversized_scopes() {
    let Some(source) = support::start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&source)
        .await;
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&source, TableStore::new(dir.path())).await;
    let client = reqwest::Client::new();

    for query in [
        "update-tournaments?start_year=0&end_year=2000000000",
        "update-tournaments?start_year=1989&end_year=2000",
        "update-tournaments?start_year=2024&end_year=2031",
        "update-players?num_players=501",
        "update-rankings?ranking_type=singles&max_weeks=501",
    ] {
        let response = client
            .post(format!("{}/admin/{query}&token={TOKEN}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("between"), "{query}");
    }
}

#[tokio::test]
async fn test_admin_update_rankings_runs_update() {
    let Some(source) = support::start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/en/rankings/doubles"))
        .and(query_param("dateWeek", "2024-01-08"))
        .respond_with(ResponseTemplate::new(200).set_body_string(support::ranking_page(
            "2024-01-08",
            &[support::ranking_row(1, "b0ba", "Rohan Bopanna", 8_000)],
        )))
        .expect(1)
        .mount(&source)
        .await;

    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    let server = spawn_server(&source, store.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!(
            "{}/admin/update-rankings?token={TOKEN}&ranking_type=doubles&max_weeks=1",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["requested"], 1);
    assert_eq!(report["succeeded"][0]["unit"]["date"], "2024-01-08");
    assert_eq!(report["stored"]["inserted"], 1);

    let rows = store.load(&Table::rankings(RankingType::Doubles)).unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].player_id, "b0ba");
}
