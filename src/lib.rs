//! Tennis Ingest Library
//!
//! Incrementally ingests ATP rankings, player biographies and tournament
//! results from the public tour site into local Parquet tables.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - HTTP fetch client with retry, backoff and per-host pacing
//! - [`scrape`] - Unit scrapers for ranking, player and tournament pages
//! - [`update`] - Orchestration of incremental updates over a scope of units
//! - [`storage`] - Keyed Parquet tables with merge-on-write
//! - [`server`] - Admin triggers and read-only lookups over HTTP
//! - [`config`] - Config file parsing and resolved settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetch;
pub mod model;
pub mod query;
pub mod scrape;
pub mod server;
pub mod storage;
pub mod summary;
pub mod update;
pub mod user_agent;

// Re-export commonly used types
pub use config::AppConfig;
pub use fetch::{FetchClient, FetchError, FetchOutcome, FetchRequest, FetchSettings, RetryPolicy};
pub use model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord, TournamentType};
pub use scrape::{ScrapeError, UnitOutcome, UnitScraper};
pub use storage::{StorageError, Table, TableStore, UpsertSummary};
pub use summary::{DataSummary, summarize};
pub use update::{
    PlayerScope, RankingScope, RankingWindow, TournamentScope, UpdateError, UpdateReport,
    UpdateSettings, Updater, WeeklyReport,
};
