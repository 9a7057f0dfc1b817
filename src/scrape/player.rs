//! Player biography pages.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::html::{
    element_text, non_empty, parse_bio_date, parse_height_cm, parse_plays, parse_weight_kg,
    player_slug,
};
use super::{ParsedPage, ScrapeError, UnitOutcome, UnitScraper, scrape_unit};
use crate::fetch::{FetchClient, FetchRequest};
use crate::model::PlayerRecord;

selector!(BIO_SECTION, "div.pd_content");
selector!(BIO_ITEMS, "li");

/// One player to look up. The name builds the URL slug and is carried into
/// the resulting record unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlayerUnit {
    pub player_id: String,
    pub name: String,
}

/// Scrapes `{base}/en/players/{slug}/{id}/overview`.
#[derive(Debug, Clone)]
pub struct PlayerScraper {
    client: FetchClient,
    base_url: String,
}

impl PlayerScraper {
    #[must_use]
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UnitScraper for PlayerScraper {
    type Unit = PlayerUnit;
    type Record = PlayerRecord;

    fn unit_url(&self, unit: &PlayerUnit) -> String {
        format!(
            "{}/en/players/{}/{}/overview",
            self.base_url,
            player_slug(&unit.name),
            unit.player_id
        )
    }

    async fn fetch_unit(
        &self,
        unit: &PlayerUnit,
        deadline: Option<Instant>,
    ) -> UnitOutcome<PlayerRecord> {
        let url = self.unit_url(unit);
        let request = FetchRequest::get(url.clone());
        scrape_unit(&self.client, unit, &request, deadline, |body| {
            let record = parse_player_page(body, unit)
                .ok_or_else(|| ScrapeError::parse(&url, "no biography section"))?;
            let valid = record.is_valid();
            Ok(ParsedPage {
                rows: if valid { vec![record] } else { Vec::new() },
                candidates: 1,
            })
        })
        .await
    }
}

/// Label and value spans that are direct children of a bio list item.
fn label_and_value(item: ElementRef<'_>) -> Option<(String, String)> {
    let mut spans = item
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "span");
    let label = element_text(spans.next()?);
    let value = element_text(spans.next()?);
    Some((label, value))
}

/// Parses a player overview page. Returns `None` when the page has no
/// biography section.
#[must_use]
pub fn parse_player_page(body: &str, unit: &PlayerUnit) -> Option<PlayerRecord> {
    let document = Html::parse_document(body);
    let section = document.select(&BIO_SECTION).next()?;

    let mut record = PlayerRecord::new(unit.player_id.clone(), unit.name.clone());
    for item in section.select(&BIO_ITEMS) {
        let Some((label, value)) = label_and_value(item) else {
            continue;
        };
        match label.as_str() {
            "Age" | "DOB" => record.birthdate = parse_bio_date(&value),
            "Weight" => record.weight_kg = parse_weight_kg(&value),
            "Height" => record.height_cm = parse_height_cm(&value),
            "Turned pro" | "Turned Pro" => record.turned_pro_year = value.trim().parse().ok(),
            "Country" => record.country = non_empty(&value),
            "Birthplace" => record.birthplace = non_empty(&value),
            "Plays" => (record.handedness, record.backhand_style) = parse_plays(&value),
            "Coach" => record.coach = non_empty(&value),
            other => debug!(player_id = %unit.player_id, label = other, "ignoring bio field"),
        }
    }
    Some(record)
}
