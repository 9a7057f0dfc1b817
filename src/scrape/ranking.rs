//! Weekly ranking tables.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::html::{
    element_text, non_empty, parse_count, parse_int, parse_iso_date, parse_rank,
    player_id_from_href,
};
use super::{ParsedPage, ScrapeError, UnitOutcome, UnitScraper, fetch_page, scrape_unit};
use crate::fetch::{FetchClient, FetchRequest};
use crate::model::{RankingRecord, RankingType};

/// Rows requested per table; covers the full published depth.
const RANK_RANGE: &str = "0-5000";

selector!(TABLE_ROWS, "table.desktop-table tbody tr.lower-row");
selector!(RANK_CELL, "td.rank");
selector!(PLAYER_LINK, "td.player a");
selector!(NAME_SPAN, "span");
selector!(POINTS_CELL, "td.points");
selector!(MOVE_CELL, "td.pointsMove");
selector!(TOURNAMENTS_CELL, "td.tourns");
selector!(DROPPING_CELL, "td.drop");
selector!(NEXT_BEST_CELL, "td.best");
selector!(WEEK_OPTIONS, "select#dateWeek-filter option");
selector!(SELECTED_WEEK, "select#dateWeek-filter option[selected]");

/// One ranking table: a ranking type at a publication date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RankingUnit {
    pub ranking_type: RankingType,
    pub date: NaiveDate,
}

/// A ranking row plus the player name shown next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingRow {
    pub ranking: RankingRecord,
    pub player_name: Option<String>,
}

/// Scrapes `{base}/en/rankings/{type}?rankRange=0-5000&dateWeek={date}`.
#[derive(Debug, Clone)]
pub struct RankingScraper {
    client: FetchClient,
    base_url: String,
}

impl RankingScraper {
    #[must_use]
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn table_url(&self, ranking_type: RankingType) -> String {
        format!("{}/en/rankings/{ranking_type}", self.base_url)
    }

    fn request(&self, unit: &RankingUnit) -> FetchRequest {
        FetchRequest::get(self.table_url(unit.ranking_type))
            .with_query("rankRange", RANK_RANGE)
            .with_query("dateWeek", unit.date.to_string())
    }

    /// Lists every publication date the source offers, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] when the page cannot be fetched. A page without
    /// the date selector yields an empty list.
    #[instrument(skip(self))]
    pub async fn published_dates(
        &self,
        ranking_type: RankingType,
    ) -> Result<Vec<NaiveDate>, ScrapeError> {
        let request = FetchRequest::get(self.table_url(ranking_type))
            .with_query("rankRange", RANK_RANGE);
        let Some(body) = fetch_page(&self.client, &request, None).await? else {
            warn!(%ranking_type, "ranking page absent, no published dates");
            return Ok(Vec::new());
        };
        let dates = parse_published_dates(&body);
        debug!(%ranking_type, count = dates.len(), "read published ranking dates");
        Ok(dates)
    }
}

#[async_trait]
impl UnitScraper for RankingScraper {
    type Unit = RankingUnit;
    type Record = RankingRow;

    fn unit_url(&self, unit: &RankingUnit) -> String {
        self.request(unit)
            .full_url()
            .map_or_else(|_| self.table_url(unit.ranking_type), |u| u.to_string())
    }

    async fn fetch_unit(
        &self,
        unit: &RankingUnit,
        deadline: Option<Instant>,
    ) -> UnitOutcome<RankingRow> {
        let request = self.request(unit);
        scrape_unit(&self.client, unit, &request, deadline, |body| {
            Ok(parse_ranking_page(body, unit))
        })
        .await
    }
}

/// Reads the date drop-down. The current week is labelled in its text
/// (`2024.10.28`) rather than its value.
#[must_use]
pub fn parse_published_dates(body: &str) -> Vec<NaiveDate> {
    let document = Html::parse_document(body);
    document
        .select(&WEEK_OPTIONS)
        .filter_map(option_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn option_date(option: ElementRef<'_>) -> Option<NaiveDate> {
    option
        .value()
        .attr("value")
        .and_then(parse_iso_date)
        .or_else(|| parse_iso_date(&element_text(option)))
}

fn cell_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(element_text)
}

/// Parses a ranking table page for `unit`.
///
/// A page whose selected week differs from the requested date is treated as
/// having no table for that date.
#[must_use]
pub fn parse_ranking_page(body: &str, unit: &RankingUnit) -> ParsedPage<RankingRow> {
    let document = Html::parse_document(body);

    if let Some(shown) = document.select(&SELECTED_WEEK).next().and_then(option_date)
        && shown != unit.date
    {
        debug!(requested = %unit.date, %shown, "source served a different week");
        return ParsedPage::empty();
    }

    let mut page = ParsedPage::empty();
    for row in document.select(&TABLE_ROWS) {
        page.candidates += 1;

        let rank = cell_text(row, &RANK_CELL).as_deref().and_then(parse_rank);
        let link = row.select(&PLAYER_LINK).next();
        let player_id = link
            .and_then(|a| a.value().attr("href"))
            .and_then(player_id_from_href);
        let player_name = link
            .map(|a| a.select(&NAME_SPAN).next().unwrap_or(a))
            .map(element_text)
            .and_then(|name| non_empty(&name));
        let points = cell_text(row, &POINTS_CELL).as_deref().and_then(parse_count);

        let (Some(rank), Some(player_id), Some(points)) = (rank, player_id, points) else {
            debug!(date = %unit.date, row = page.candidates, "skipping incomplete ranking row");
            continue;
        };

        let mut record = RankingRecord::new(unit.ranking_type, unit.date, player_id, rank, points);
        record.points_move = cell_text(row, &MOVE_CELL)
            .as_deref()
            .and_then(parse_int)
            .and_then(|n| i32::try_from(n).ok());
        record.tournaments_played = cell_text(row, &TOURNAMENTS_CELL)
            .as_deref()
            .and_then(parse_count);
        record.dropping = cell_text(row, &DROPPING_CELL).as_deref().and_then(parse_count);
        record.next_best = cell_text(row, &NEXT_BEST_CELL).as_deref().and_then(parse_count);

        if record.is_valid() {
            page.rows.push(RankingRow {
                ranking: record,
                player_name,
            });
        }
    }
    page
}
