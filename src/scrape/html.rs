//! Text helpers shared by the page parsers.
//!
//! All functions are pure and tolerant: malformed input yields `None` rather
//! than an error, and the calling parser decides whether a missing value makes
//! the row invalid.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::ElementRef;

use crate::model::{BackhandStyle, Handedness};

#[allow(clippy::expect_used)]
static PLAYER_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/players/[^/]+/([^/]+)/").expect("player href regex is valid")
});

#[allow(clippy::expect_used)]
static BIO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})/(\d{2})/(\d{2})").expect("bio date regex is valid"));

#[allow(clippy::expect_used)]
static WEIGHT_KG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\s*kg\)").expect("weight kg regex is valid"));

#[allow(clippy::expect_used)]
static WEIGHT_LBS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*lbs").expect("weight lbs regex is valid"));

#[allow(clippy::expect_used)]
static HEIGHT_CM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\s*cm\)").expect("height cm regex is valid"));

#[allow(clippy::expect_used)]
static HEIGHT_FT_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\d+)'\s*(\d+)""#).expect("height ft/in regex is valid"));

// "3 - 9 January, 2022"
#[allow(clippy::expect_used)]
static RANGE_SAME_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*-\s*(\d+)\s+([A-Za-z]+),?\s+(\d{4})")
        .expect("same-month range regex is valid")
});

// "27 October - 2 November, 2025"
#[allow(clippy::expect_used)]
static RANGE_CROSS_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+([A-Za-z]+)\s*-\s*(\d+)\s+([A-Za-z]+),?\s+(\d{4})")
        .expect("cross-month range regex is valid")
});

// "23 December, 2024 - 5 January, 2025"
#[allow(clippy::expect_used)]
static RANGE_CROSS_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+([A-Za-z]+),?\s+(\d{4})\s*-\s*(\d+)\s+([A-Za-z]+),?\s+(\d{4})")
        .expect("cross-year range regex is valid")
});

/// Concatenates the text nodes of an element, collapsing whitespace.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses a table number such as `11,245`, `+3` or `-12`. `-` and blanks are `None`.
#[must_use]
pub fn parse_int(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.strip_prefix('+').unwrap_or(&cleaned).parse().ok()
}

/// Parses a non-negative table number.
#[must_use]
pub fn parse_count(text: &str) -> Option<u32> {
    parse_int(text).and_then(|n| u32::try_from(n).ok())
}

/// Parses a ranking position. Ties are rendered as `T5` and parse as 5.
#[must_use]
pub fn parse_rank(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('T').unwrap_or(trimmed);
    digits.trim().parse().ok()
}

/// Builds the URL slug for a player name: lower-case, hyphenated, ASCII only.
///
/// ```
/// use tennis_ingest::scrape::html::player_slug;
///
/// assert_eq!(player_slug("Felix Auger-Aliassime"), "felix-auger-aliassime");
/// assert_eq!(player_slug("J.J. Wolf"), "jj-wolf");
/// ```
#[must_use]
pub fn player_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Extracts the player id from a profile link such as
/// `/en/players/jannik-sinner/s0ag/overview`.
#[must_use]
pub fn player_id_from_href(href: &str) -> Option<String> {
    PLAYER_HREF
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Maps an English month name (full or abbreviated) to its number.
#[must_use]
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim().to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month_number(month)?, day.parse().ok()?)
}

/// Parses a tournament date range into start and end dates.
///
/// Accepts `3 - 9 January, 2022`, `27 October - 2 November, 2025` and
/// `23 December, 2024 - 5 January, 2025`. Unrecognised text yields `(None, None)`.
#[must_use]
pub fn parse_date_range(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let text = collapse_whitespace(text);

    if let Some(c) = RANGE_SAME_MONTH.captures(&text) {
        return (ymd(&c[4], &c[3], &c[1]), ymd(&c[4], &c[3], &c[2]));
    }
    if let Some(c) = RANGE_CROSS_MONTH.captures(&text) {
        return (ymd(&c[5], &c[2], &c[1]), ymd(&c[5], &c[4], &c[3]));
    }
    if let Some(c) = RANGE_CROSS_YEAR.captures(&text) {
        return (ymd(&c[3], &c[2], &c[1]), ymd(&c[6], &c[5], &c[4]));
    }
    (None, None)
}

/// Finds a `YYYY/MM/DD` date anywhere in the text.
#[must_use]
pub fn parse_bio_date(text: &str) -> Option<NaiveDate> {
    let c = BIO_DATE.captures(text)?;
    NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
}

/// Parses a `YYYY-MM-DD` or `YYYY.MM.DD` date.
#[must_use]
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let normalized = text.trim().replace('.', "-");
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()
}

/// Weight in kilograms, from `(80kg)` or converted from `176 lbs`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_weight_kg(text: &str) -> Option<u32> {
    if let Some(c) = WEIGHT_KG.captures(text) {
        return c[1].parse().ok();
    }
    let c = WEIGHT_LBS.captures(text)?;
    let lbs: u32 = c[1].parse().ok()?;
    Some((f64::from(lbs) * 0.453_592).round() as u32)
}

/// Height in centimetres, from `(188cm)` or converted from `6'2"`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_height_cm(text: &str) -> Option<u32> {
    if let Some(c) = HEIGHT_CM.captures(text) {
        return c[1].parse().ok();
    }
    let c = HEIGHT_FT_IN.captures(text)?;
    let feet: u32 = c[1].parse().ok()?;
    let inches: u32 = c[2].parse().ok()?;
    Some((f64::from(feet * 12 + inches) * 2.54).round() as u32)
}

/// Reads handedness and backhand style from a `Plays` value such as
/// `Right-Handed, Two-Handed Backhand`.
#[must_use]
pub fn parse_plays(text: &str) -> (Option<Handedness>, Option<BackhandStyle>) {
    let handedness = if text.contains("Right-Handed") {
        Some(Handedness::Right)
    } else if text.contains("Left-Handed") {
        Some(Handedness::Left)
    } else {
        None
    };
    let backhand = if text.contains("Two-Handed Backhand") {
        Some(BackhandStyle::TwoHanded)
    } else if text.contains("One-Handed Backhand") {
        Some(BackhandStyle::OneHanded)
    } else {
        None
    };
    (handedness, backhand)
}

/// Returns the trimmed text, or `None` when it is blank.
#[must_use]
pub fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
