//! Integration tests for incremental updates: a mock source, a temporary
//! data directory, and the real fetch, scrape and storage layers.

use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;
use tennis_ingest::model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord, TournamentType};
use tennis_ingest::storage::{Table, TableStore};
use tennis_ingest::update::{
    PlayerScope, RankingScope, RankingWindow, TournamentRefresh, TournamentScope, UpdateSettings,
    Updater,
};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = support::start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

fn date(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

async fn mount_ranking_week(server: &MockServer, day: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/en/rankings/singles"))
        .and(query_param("dateWeek", day))
        .respond_with(html(support::ranking_page(
            day,
            &[
                support::ranking_row(1, "s0ag", "Jannik Sinner", 11_830),
                support::ranking_row(2, "a0e2", "Carlos Alcaraz", 8_805),
            ],
        )))
        .with_priority(1)
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rankings_fetch_only_missing_dates() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    // 2024-01-01 is already stored and must not be requested.
    store
        .upsert(
            &Table::rankings(RankingType::Singles),
            vec![RankingRecord::new(RankingType::Singles, date("2024-01-01"), "s0ag", 4, 6490)],
        )
        .await
        .unwrap();
    mount_ranking_week(&mock_server, "2024-01-01", 0).await;
    Mock::given(method("GET"))
        .and(path("/en/rankings/singles"))
        .and(query_param("dateWeek", "2024-01-08"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    let rows: Vec<String> = [
        ("s0ag", "Jannik Sinner"),
        ("a0e2", "Carlos Alcaraz"),
        ("d643", "Novak Djokovic"),
        ("z355", "Alexander Zverev"),
        ("mm58", "Daniil Medvedev"),
    ]
    .iter()
    .zip(1u32..)
    .map(|((id, name), rank)| support::ranking_row(rank, id, name, 10_000 - rank * 100))
    .collect();
    Mock::given(method("GET"))
        .and(path("/en/rankings/singles"))
        .and(query_param("dateWeek", "2024-01-15"))
        .respond_with(html(support::ranking_page("2024-01-15", &rows)))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store.clone());
    let scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(vec![date("2024-01-15"), date("2024-01-01"), date("2024-01-08")]),
    );
    let report = updater.update_rankings(&scope).await.unwrap();

    assert_eq!(report.requested, 3);
    assert_eq!(report.already_stored, 1);
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].unit.date, date("2024-01-15"));
    assert_eq!(report.succeeded[0].records, 5);
    assert_eq!(report.absent.len(), 1);
    assert_eq!(report.absent[0].date, date("2024-01-08"));
    assert!(report.failed.is_empty());
    assert_eq!(report.stored.unwrap().inserted, 5);

    let mut dates: Vec<NaiveDate> = store
        .load(&Table::rankings(RankingType::Singles))
        .unwrap()
        .rows
        .into_iter()
        .map(|r| r.date)
        .collect();
    dates.dedup();
    assert_eq!(dates, vec![date("2024-01-01"), date("2024-01-15")]);

    // Names seen in the table seed the players table.
    let players = store.load(&Table::players()).unwrap().rows;
    assert_eq!(players.len(), 5);
    assert_eq!(report.players.unwrap().inserted, 5);
}

#[tokio::test]
async fn test_rankings_second_run_fetches_nothing() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    mount_ranking_week(&mock_server, "2024-01-08", 1).await;

    let updater = support::updater(&mock_server, store.clone());
    let scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(vec![date("2024-01-08")]),
    );
    let first = updater.update_rankings(&scope).await.unwrap();
    assert_eq!(first.succeeded.len(), 1);

    let second = updater.update_rankings(&scope).await.unwrap();
    assert_eq!(second.requested, 1);
    assert_eq!(second.already_stored, 1);
    assert_eq!(second.attempted(), 0);
    assert!(second.stored.is_none());
}

#[tokio::test]
async fn test_rankings_force_refetches_stored_dates() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    mount_ranking_week(&mock_server, "2024-01-08", 2).await;

    let updater = support::updater(&mock_server, store.clone());
    let mut scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(vec![date("2024-01-08")]),
    );
    updater.update_rankings(&scope).await.unwrap();
    scope.force = true;
    let report = updater.update_rankings(&scope).await.unwrap();

    assert_eq!(report.already_stored, 0);
    let stored = report.stored.unwrap();
    assert_eq!((stored.inserted, stored.dropped, stored.total), (0, 2, 2));
}

#[tokio::test]
async fn test_failed_unit_does_not_block_others() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    mount_ranking_week(&mock_server, "2024-01-08", 1).await;
    Mock::given(method("GET"))
        .and(path("/en/rankings/singles"))
        .and(query_param("dateWeek", "2024-01-15"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .expect(3)
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store.clone());
    let scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(vec![date("2024-01-08"), date("2024-01-15")]),
    );
    let report = updater.update_rankings(&scope).await.unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].unit.date, date("2024-01-15"));
    assert!(report.failed[0].reason.contains("503"));

    // The failed week is still missing and is retried by the next run.
    let dates: Vec<NaiveDate> = store
        .existing_keys(&Table::rankings(RankingType::Singles))
        .unwrap()
        .into_iter()
        .map(|key| key.date)
        .collect();
    assert!(dates.iter().all(|d| *d == date("2024-01-08")));
}

#[tokio::test]
async fn test_rankings_all_published_reads_date_list() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    mount_ranking_week(&mock_server, "2024-01-08", 1).await;
    Mock::given(method("GET"))
        .and(path("/en/rankings/singles"))
        .respond_with(html(support::published_dates_page(&["2024-01-08"])))
        .with_priority(5)
        .expect(1)
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store);
    let scope = RankingScope::new(RankingType::Singles, RankingWindow::AllPublished);
    let report = updater.update_rankings(&scope).await.unwrap();

    assert_eq!(report.requested, 1);
    assert_eq!(report.succeeded.len(), 1);
}

#[tokio::test]
async fn test_players_fetch_best_ranked_without_bio() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    store
        .upsert(
            &Table::rankings(RankingType::Singles),
            vec![
                RankingRecord::new(RankingType::Singles, date("2024-01-08"), "s0ag", 1, 11_830),
                RankingRecord::new(RankingType::Singles, date("2024-01-08"), "a0e2", 2, 8_805),
                RankingRecord::new(RankingType::Singles, date("2024-01-08"), "z355", 3, 7_600),
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
                PlayerRecord::new("z355", "Alexander Zverev"),
            ],
        )
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/en/players/jannik-sinner/s0ag/overview"))
        .respond_with(html(support::player_page("Italy", 191)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en/players/carlos-alcaraz/a0e2/overview"))
        .respond_with(html(support::player_page("Spain", 183)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/en/players/alexander-zverev/.*"))
        .respond_with(html(support::player_page("Germany", 198)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store.clone());
    let scope = PlayerScope {
        top_k: 2,
        force: false,
    };
    let report = updater.update_players(scope).await.unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.succeeded.len(), 2);

    let players = store.load(&Table::players()).unwrap().rows;
    let sinner = players.iter().find(|p| p.player_id == "s0ag").unwrap();
    assert_eq!(sinner.country.as_deref(), Some("Italy"));
    assert_eq!(sinner.height_cm, Some(191));
    assert!(sinner.has_bio());

    // The top two now have a bio, so the next run moves on to z355.
    let next = updater.update_players(scope).await.unwrap();
    assert_eq!(next.requested, 1);
    assert_eq!(next.succeeded.len(), 1);
    assert_eq!(next.succeeded[0].unit.player_id, "z355");

    let players = store.load(&Table::players()).unwrap().rows;
    assert!(players.iter().all(PlayerRecord::has_bio));

    let idle = updater.update_players(scope).await.unwrap();
    assert_eq!(idle.requested, 0);
    assert_eq!(idle.attempted(), 0);
    assert!(idle.stored.is_none());
}

#[tokio::test]
async fn test_player_page_without_bio_is_a_failure() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    store
        .upsert(&Table::players(), vec![PlayerRecord::new("x001", "Nobody Known")])
        .await
        .unwrap();
    Mock::given(method("GET"))
        .respond_with(html("<html><body>Player not found</body></html>".to_string()))
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store);
    let report = updater
        .update_players(PlayerScope {
            top_k: 10,
            force: false,
        })
        .await
        .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(report.stored.is_some());
}

#[tokio::test]
async fn test_tournaments_refetch_until_complete() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    let mut done = TournamentRecord::new(2023, TournamentType::Atp, "Brisbane");
    done.singles_winner_id = Some("r975".into());
    store
        .upsert(
            &Table::tournaments(),
            vec![done, TournamentRecord::new(2024, TournamentType::Atp, "Brisbane")],
        )
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/en/scores/results-archive"))
        .and(query_param("year", "2023"))
        .respond_with(html(support::tournament_page("Brisbane", Some(("r975", "Andy Murray")))))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en/scores/results-archive"))
        .and(query_param("year", "2024"))
        .and(query_param("tournamentType", "atp"))
        .respond_with(html(support::tournament_page("Brisbane", Some(("d875", "Grigor Dimitrov")))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let updater = support::updater(&mock_server, store.clone()).with_today(date("2025-03-01"));
    let scope = TournamentScope {
        years: 2023..=2024,
        types: vec![TournamentType::Atp],
        force: false,
    };
    let report = updater.update_tournaments(&scope).await.unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.already_stored, 1);
    assert_eq!(report.stored.unwrap().merged, 1);

    let rows = store.load(&Table::tournaments()).unwrap().rows;
    assert!(rows.iter().all(TournamentRecord::has_winner));
}

#[tokio::test]
async fn test_tournaments_first_seen_policy_skips_stored_pages() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    store
        .upsert(
            &Table::tournaments(),
            vec![TournamentRecord::new(2024, TournamentType::Atp, "Brisbane")],
        )
        .await
        .unwrap();
    Mock::given(method("GET"))
        .respond_with(html(support::tournament_page("Brisbane", None)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let settings = UpdateSettings {
        tournament_refresh: TournamentRefresh::FirstSeen,
        ..support::fast_update_settings()
    };
    let updater = Updater::new(support::fast_client(), &mock_server.uri(), store, settings).unwrap();
    let report = updater
        .update_tournaments(&TournamentScope {
            years: 2024..=2024,
            types: vec![TournamentType::Atp],
            force: false,
        })
        .await
        .unwrap();
    assert_eq!(report.already_stored, 1);
    assert_eq!(report.attempted(), 0);
}

#[tokio::test]
async fn test_concurrent_run_reports_units_in_date_order() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    // Earlier weeks answer slowest, so completion order is the reverse of
    // date order.
    let weeks = [
        ("2024-01-01", true, 300),
        ("2024-01-08", false, 250),
        ("2024-01-15", true, 200),
        ("2024-01-22", true, 150),
        ("2024-01-29", false, 100),
        ("2024-02-05", true, 50),
    ];
    for (day, published, delay_ms) in weeks {
        let response = if published {
            html(support::ranking_page(
                day,
                &[support::ranking_row(1, "s0ag", "Jannik Sinner", 11_830)],
            ))
        } else {
            ResponseTemplate::new(404)
        };
        Mock::given(method("GET"))
            .and(path("/en/rankings/singles"))
            .and(query_param("dateWeek", day))
            .respond_with(response.set_delay(Duration::from_millis(delay_ms)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let settings = UpdateSettings {
        concurrency: 4,
        ..support::fast_update_settings()
    };
    let updater =
        Updater::new(support::fast_client(), &mock_server.uri(), store.clone(), settings).unwrap();
    let scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(
            ["2024-01-29", "2024-01-01", "2024-02-05", "2024-01-15", "2024-01-08", "2024-01-22"]
                .into_iter()
                .map(date)
                .collect(),
        ),
    );
    let report = updater.update_rankings(&scope).await.unwrap();

    let succeeded: Vec<NaiveDate> = report.succeeded.iter().map(|s| s.unit.date).collect();
    assert_eq!(
        succeeded,
        vec![date("2024-01-01"), date("2024-01-15"), date("2024-01-22"), date("2024-02-05")]
    );
    let absent: Vec<NaiveDate> = report.absent.iter().map(|u| u.date).collect();
    assert_eq!(absent, vec![date("2024-01-08"), date("2024-01-29")]);
    assert!(report.failed.is_empty());
    assert_eq!(report.stored.unwrap().inserted, 4);
}

#[tokio::test]
async fn test_exhausted_run_budget_defers_units() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let settings = UpdateSettings {
        run_budget: Some(Duration::ZERO),
        ..support::fast_update_settings()
    };
    let updater =
        Updater::new(support::fast_client(), &mock_server.uri(), store.clone(), settings).unwrap();
    let scope = RankingScope::new(
        RankingType::Singles,
        RankingWindow::Dates(vec![date("2024-01-08"), date("2024-01-15")]),
    );
    let report = updater.update_rankings(&scope).await.unwrap();

    assert_eq!(report.deferred.len(), 2);
    assert_eq!(report.attempted(), 0);
    assert!(store.load(&Table::rankings(RankingType::Singles)).unwrap().is_empty());
}

#[tokio::test]
async fn test_weekly_update_covers_both_types_and_current_year() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    let store = TableStore::new(dir.path());

    Mock::given(method("GET"))
        .and(path_regex("^/en/rankings/(singles|doubles)$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(10)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en/scores/results-archive"))
        .and(query_param("year", "2024"))
        .respond_with(html(support::tournament_page("Brisbane", None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let today = date("2024-02-14");
    let updater = support::updater(&mock_server, store.clone()).with_today(today);
    let report = updater.update_weekly(today).await.unwrap();

    assert_eq!(report.singles.requested, 5);
    assert_eq!(report.singles.absent.len(), 5);
    assert_eq!(report.doubles.absent.len(), 5);
    assert_eq!(report.tournaments.succeeded.len(), 1);
    assert_eq!(store.load(&Table::tournaments()).unwrap().len(), 1);
}
