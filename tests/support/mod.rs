//! Shared helpers for integration tests: socket guard, fast settings and
//! HTML fixtures shaped like the source pages.

#![allow(dead_code)]

use std::net::TcpListener;
use std::panic::Location;
use std::time::Duration;

use tennis_ingest::fetch::{FetchClient, FetchSettings, RetryPolicy};
use tennis_ingest::storage::TableStore;
use tennis_ingest::update::{UpdateSettings, Updater};
use wiremock::MockServer;

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("TENNIS_INGEST_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost socket at {}:{}; wiremock-based test cannot run in this environment",
        location.file(),
        location.line()
    );
    if socket_tests_required() {
        panic!("{message}. Set TENNIS_INGEST_REQUIRE_SOCKET_TESTS=0 to allow local skip behavior.");
    }

    eprintln!(
        "{message}. Skipping test. Set TENNIS_INGEST_REQUIRE_SOCKET_TESTS=1 to fail-fast instead."
    );
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}

/// Three attempts with millisecond backoff and no jitter.
#[must_use]
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0)
        .with_jitter(Duration::ZERO)
}

#[must_use]
pub fn fast_client() -> FetchClient {
    let settings = FetchSettings {
        request_timeout: Duration::from_secs(5),
        retry: fast_retry(),
        ..FetchSettings::default()
    };
    FetchClient::new(&settings).unwrap()
}

/// No pacing between units.
#[must_use]
pub fn fast_update_settings() -> UpdateSettings {
    UpdateSettings {
        unit_delay: Duration::ZERO,
        ..UpdateSettings::default()
    }
}

#[must_use]
pub fn updater(server: &MockServer, store: TableStore) -> Updater {
    Updater::new(fast_client(), &server.uri(), store, fast_update_settings()).unwrap()
}

/// One ranking table row.
#[must_use]
pub fn ranking_row(rank: u32, player_id: &str, name: &str, points: u32) -> String {
    let slug = name.to_lowercase().replace(' ', "-");
    format!(
        r#"<tr class="lower-row">
             <td class="rank">{rank}</td>
             <td class="player"><a href="/en/players/{slug}/{player_id}/overview"><span>{name}</span></a></td>
             <td class="points">{points}</td>
             <td class="pointsMove">0</td>
             <td class="tourns">20</td>
           </tr>"#
    )
}

/// A ranking page for `date` whose week selector marks `date` as shown.
#[must_use]
pub fn ranking_page(date: &str, rows: &[String]) -> String {
    format!(
        r#"<html><body>
           <select id="dateWeek-filter"><option value="{date}" selected>{}</option></select>
           <table class="desktop-table"><tbody>{}</tbody></table>
           </body></html>"#,
        date.replace('-', "."),
        rows.join("")
    )
}

/// The undated ranking page: only the week selector listing `dates`.
#[must_use]
pub fn published_dates_page(dates: &[&str]) -> String {
    let options: String = dates
        .iter()
        .map(|d| format!(r#"<option value="{d}">{}</option>"#, d.replace('-', ".")))
        .collect();
    format!(r#"<html><body><select id="dateWeek-filter">{options}</select></body></html>"#)
}

/// A player overview page with a few biography fields.
#[must_use]
pub fn player_page(country: &str, height_cm: u32) -> String {
    format!(
        r#"<html><body><div class="pd_content"><ul>
           <li><span>Height</span><span>({height_cm}cm)</span></li>
           <li><span>Country</span><span>{country}</span></li>
           <li><span>Plays</span><span>Right-Handed, Two-Handed Backhand</span></li>
           </ul></div></body></html>"#
    )
}

/// A results archive page with one tournament, optionally with a singles winner.
#[must_use]
pub fn tournament_page(name: &str, winner: Option<(&str, &str)>) -> String {
    let winner = winner.map_or_else(String::new, |(id, winner_name)| {
        format!(
            r#"<div class="cta-holder"><dl class="winner"><dt>Singles Winner</dt>
               <dd><a href="/en/players/x/{id}/overview">{winner_name}</a></dd></dl></div>"#
        )
    });
    format!(
        r#"<html><body><ul class="events"><li>
           <div class="tournament-info"><span class="name">{name}</span>
           <span class="Date">1 - 7 January, 2024</span></div>
           {winner}
           </li></ul></body></html>"#
    )
}
