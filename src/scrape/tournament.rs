//! Results archive pages: every tournament of one type in one year.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::html::{element_text, non_empty, parse_date_range, player_id_from_href};
use super::{ParsedPage, UnitOutcome, UnitScraper, scrape_unit};
use crate::fetch::{FetchClient, FetchRequest};
use crate::model::{TournamentRecord, TournamentType};

selector!(EVENTS, "ul.events > li");
selector!(INFO, "div.tournament-info");
selector!(NAME, "span.name");
selector!(FLAG_USE, "svg.atp-flag use");
selector!(VENUE, "span.venue");
selector!(DATES, "span.Date");
selector!(WINNERS, "div.cta-holder dl.winner");
selector!(WINNER_LABEL, "dt");
selector!(LINK, "a");

#[allow(clippy::expect_used)]
static FLAG_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#flag-([a-z]+)").expect("flag href regex is valid"));

/// One results archive page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TournamentUnit {
    pub year: i32,
    pub tournament_type: TournamentType,
}

/// Scrapes `{base}/en/scores/results-archive?year={year}&tournamentType={type}`.
#[derive(Debug, Clone)]
pub struct TournamentScraper {
    client: FetchClient,
    base_url: String,
}

impl TournamentScraper {
    #[must_use]
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, unit: &TournamentUnit) -> FetchRequest {
        FetchRequest::get(format!("{}/en/scores/results-archive", self.base_url))
            .with_query("year", unit.year.to_string())
            .with_query("tournamentType", unit.tournament_type.as_str())
    }
}

#[async_trait]
impl UnitScraper for TournamentScraper {
    type Unit = TournamentUnit;
    type Record = TournamentRecord;

    fn unit_url(&self, unit: &TournamentUnit) -> String {
        let request = self.request(unit);
        request
            .full_url()
            .map_or(request.url, |u| u.to_string())
    }

    async fn fetch_unit(
        &self,
        unit: &TournamentUnit,
        deadline: Option<Instant>,
    ) -> UnitOutcome<TournamentRecord> {
        let request = self.request(unit);
        scrape_unit(&self.client, unit, &request, deadline, |body| {
            Ok(parse_tournament_page(body, unit))
        })
        .await
    }
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .and_then(|text| non_empty(&text))
}

fn country_code(info: ElementRef<'_>) -> Option<String> {
    let use_tag = info.select(&FLAG_USE).next()?;
    let href = use_tag
        .value()
        .attr("href")
        .or_else(|| use_tag.value().attr("xlink:href"))?;
    FLAG_HREF
        .captures(href)
        .map(|caps| caps[1].to_ascii_uppercase())
}

fn read_winners(event: ElementRef<'_>, record: &mut TournamentRecord) {
    for winner in event.select(&WINNERS) {
        let Some(label) = winner.select(&WINNER_LABEL).next().map(element_text) else {
            continue;
        };
        if label.contains("Singles") {
            if let Some(link) = winner.select(&LINK).next() {
                record.singles_winner_name = non_empty(&element_text(link));
                record.singles_winner_id = link.value().attr("href").and_then(player_id_from_href);
            }
        } else if label.contains("Doubles") {
            for link in winner.select(&LINK) {
                if let Some(name) = non_empty(&element_text(link)) {
                    record.doubles_winner_names.push(name);
                }
                if let Some(id) = link.value().attr("href").and_then(player_id_from_href) {
                    record.doubles_winner_ids.push(id);
                }
            }
        }
    }
}

/// Parses a results archive page. Tournaments without winners are kept; the
/// caller decides whether such a page counts as complete.
#[must_use]
pub fn parse_tournament_page(body: &str, unit: &TournamentUnit) -> ParsedPage<TournamentRecord> {
    let document = Html::parse_document(body);
    let mut page = ParsedPage::empty();

    for event in document.select(&EVENTS) {
        let Some(info) = event.select(&INFO).next() else {
            continue;
        };
        page.candidates += 1;

        let name = first_text(info, &NAME).unwrap_or_default();
        let mut record = TournamentRecord::new(unit.year, unit.tournament_type, name);
        record.country_code = country_code(info);
        record.venue = first_text(info, &VENUE)
            .map(|venue| venue.trim_end_matches('|').trim().to_string())
            .filter(|venue| !venue.is_empty());
        if let Some(dates) = first_text(info, &DATES) {
            (record.start_date, record.end_date) = parse_date_range(&dates);
        }
        read_winners(event, &mut record);

        if record.is_valid() {
            page.rows.push(record);
        } else {
            debug!(year = unit.year, tournament_type = %unit.tournament_type, "skipping unnamed tournament");
        }
    }
    page
}
