//! The update driver: resolve scope, diff against storage, fetch missing
//! units with bounded concurrency, persist once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::report::{UnitFailure, UnitSuccess, UpdateReport, WeeklyReport};
use super::scope::{
    PlayerScope, RankingScope, RankingWindow, TournamentScope, last_mondays, prioritize_players,
};
use super::UpdateError;
use crate::fetch::{FetchClient, RateLimiter};
use crate::model::{PlayerRecord, RankingRecord, RankingType, TournamentType};
use crate::scrape::{
    PlayerScraper, PlayerUnit, RankingRow, RankingScraper, RankingUnit, TournamentScraper,
    TournamentUnit, UnitOutcome, UnitScraper,
};
use crate::storage::{Table, TableStore};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 8;

/// Default concurrency: one unit at a time.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default pause between two units sent to the same host.
pub const DEFAULT_UNIT_DELAY: Duration = Duration::from_millis(1000);

/// Ranking weeks covered by the weekly run.
pub const WEEKLY_RANKING_WEEKS: u32 = 5;

/// When a stored (year, type) results page counts as done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentRefresh {
    /// Stored and final: rows exist, all have a winner, and the year is over.
    #[default]
    UntilComplete,
    /// Any stored row is enough.
    FirstSeen,
}

/// Immutable settings for an [`Updater`].
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub concurrency: usize,
    pub unit_delay: Duration,
    /// Wall-clock budget per call. Units not started in time are deferred.
    pub run_budget: Option<Duration>,
    pub tournament_refresh: TournamentRefresh,
    pub weekly_tournament_types: Vec<TournamentType>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            unit_delay: DEFAULT_UNIT_DELAY,
            run_budget: None,
            tournament_refresh: TournamentRefresh::default(),
            weekly_tournament_types: vec![TournamentType::Atp],
        }
    }
}

/// Units partitioned by outcome, plus the records of successful ones.
struct UnitRun<U, R> {
    succeeded: Vec<UnitSuccess<U>>,
    absent: Vec<U>,
    failed: Vec<UnitFailure<U>>,
    deferred: Vec<U>,
    records: Vec<R>,
}

impl<U, R> UnitRun<U, R> {
    fn into_report(self, requested: usize, already_stored: usize) -> (UpdateReport<U>, Vec<R>) {
        let report = UpdateReport {
            requested,
            already_stored,
            succeeded: self.succeeded,
            absent: self.absent,
            failed: self.failed,
            deferred: self.deferred,
            stored: None,
            players: None,
        };
        (report, self.records)
    }
}

/// Drives incremental updates of every table.
///
/// # Example
///
/// ```no_run
/// use tennis_ingest::fetch::{FetchClient, FetchSettings};
/// use tennis_ingest::model::RankingType;
/// use tennis_ingest::storage::TableStore;
/// use tennis_ingest::update::{RankingScope, RankingWindow, UpdateSettings, Updater};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FetchClient::new(&FetchSettings::default())?;
/// let updater = Updater::new(
///     client,
///     "https://www.atptour.com",
///     TableStore::new("./data"),
///     UpdateSettings::default(),
/// )?;
/// let scope = RankingScope::new(RankingType::Singles, RankingWindow::LastWeeks(4));
/// let report = updater.update_rankings(&scope).await?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Updater {
    rankings: RankingScraper,
    players: PlayerScraper,
    tournaments: TournamentScraper,
    store: TableStore,
    pacer: Arc<RateLimiter>,
    settings: UpdateSettings,
    today: Option<NaiveDate>,
}

impl Updater {
    /// Builds an updater. The client is given the updater's pacer so that
    /// server back-off signals delay later units.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidConcurrency`] if the concurrency is
    /// outside 1..=8.
    #[instrument(level = "debug", skip(client, store, settings), fields(concurrency = settings.concurrency))]
    pub fn new(
        client: FetchClient,
        base_url: &str,
        store: TableStore,
        settings: UpdateSettings,
    ) -> Result<Self, UpdateError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&settings.concurrency) {
            return Err(UpdateError::InvalidConcurrency {
                value: settings.concurrency,
            });
        }

        let pacer = Arc::new(RateLimiter::new(settings.unit_delay));
        let client = client.with_pacer(Arc::clone(&pacer));

        debug!(
            unit_delay_ms = settings.unit_delay.as_millis(),
            run_budget_secs = settings.run_budget.map(|b| b.as_secs()),
            tournament_refresh = ?settings.tournament_refresh,
            "creating updater"
        );

        Ok(Self {
            rankings: RankingScraper::new(client.clone(), base_url),
            players: PlayerScraper::new(client.clone(), base_url),
            tournaments: TournamentScraper::new(client, base_url),
            store,
            pacer,
            settings,
            today: None,
        })
    }

    /// Fixes the date used to resolve relative windows.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    #[must_use]
    pub fn store(&self) -> &TableStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn deadline(&self) -> Option<Instant> {
        self.settings.run_budget.map(|budget| Instant::now() + budget)
    }

    /// Fetches ranking tables for the dates in scope that are not stored yet.
    ///
    /// Player names seen in the tables are upserted into the players table.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Scope`] if the published date list cannot be
    /// fetched, or [`UpdateError::Storage`] if a table cannot be read or
    /// written. Unit failures are reported, not returned.
    #[instrument(skip(self, scope), fields(ranking_type = %scope.ranking_type, force = scope.force))]
    pub async fn update_rankings(
        &self,
        scope: &RankingScope,
    ) -> Result<UpdateReport<RankingUnit>, UpdateError> {
        let deadline = self.deadline();
        let mut dates = match &scope.window {
            RankingWindow::Dates(dates) => dates.clone(),
            RankingWindow::LastWeeks(n) => last_mondays(self.today(), *n),
            RankingWindow::AllPublished => self
                .rankings
                .published_dates(scope.ranking_type)
                .await
                .map_err(UpdateError::Scope)?,
        };
        dates.sort_unstable();
        dates.dedup();

        let table = Table::rankings(scope.ranking_type);
        let stored_dates: HashSet<NaiveDate> = if scope.force {
            HashSet::new()
        } else {
            self.store
                .existing_keys(&table)?
                .into_iter()
                .map(|key| key.date)
                .collect()
        };

        let requested = dates.len();
        let missing: Vec<RankingUnit> = dates
            .into_iter()
            .filter(|date| !stored_dates.contains(date))
            .map(|date| RankingUnit {
                ranking_type: scope.ranking_type,
                date,
            })
            .collect();
        let already_stored = requested - missing.len();
        info!(requested, missing = missing.len(), "resolved ranking scope");

        if missing.is_empty() {
            return Ok(UpdateReport::nothing_missing(requested));
        }

        let run = self.run_units(&self.rankings, missing, deadline).await;
        let (mut report, rows) = run.into_report(requested, already_stored);
        let (rankings, players) = split_ranking_rows(rows);

        report.stored = Some(self.store.upsert(&table, rankings).await?);
        if !players.is_empty() {
            report.players = Some(self.store.upsert(&Table::players(), players).await?);
        }
        info!(%report, "ranking update finished");
        Ok(report)
    }

    /// Fetches biographies for the best ranked players still lacking one.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Storage`] if a table cannot be read or written.
    #[instrument(skip(self, scope), fields(top_k = scope.top_k, force = scope.force))]
    pub async fn update_players(
        &self,
        scope: PlayerScope,
    ) -> Result<UpdateReport<PlayerUnit>, UpdateError> {
        let deadline = self.deadline();
        let players = self.store.load(&Table::players())?.rows;
        let singles = self.store.load(&Table::rankings(RankingType::Singles))?.rows;
        let doubles = self.store.load(&Table::rankings(RankingType::Doubles))?.rows;

        let ordered = prioritize_players(&players, &singles, &doubles);
        // Players with a bio leave the queue before the top-k cut.
        let missing: Vec<PlayerUnit> = ordered
            .into_iter()
            .filter(|player| scope.force || !player.has_bio())
            .take(scope.top_k)
            .map(|player| PlayerUnit {
                player_id: player.player_id.clone(),
                name: player.name.clone(),
            })
            .collect();
        let requested = missing.len();
        let already_stored = 0;
        info!(
            known_players = players.len(),
            requested,
            missing = missing.len(),
            "resolved player scope"
        );

        if missing.is_empty() {
            return Ok(UpdateReport::nothing_missing(requested));
        }

        let run = self.run_units(&self.players, missing, deadline).await;
        let (mut report, records) = run.into_report(requested, already_stored);
        report.stored = Some(self.store.upsert(&Table::players(), records).await?);
        info!(%report, "player update finished");
        Ok(report)
    }

    /// Fetches results archive pages for the (year, type) pairs in scope that
    /// are not stored, or not final under the refresh policy.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Storage`] if the table cannot be read or
    /// written.
    #[instrument(skip(self, scope), fields(years = ?scope.years, force = scope.force))]
    pub async fn update_tournaments(
        &self,
        scope: &TournamentScope,
    ) -> Result<UpdateReport<TournamentUnit>, UpdateError> {
        let deadline = self.deadline();
        let table = Table::tournaments();
        let done: HashSet<(i32, TournamentType)> = if scope.force {
            HashSet::new()
        } else {
            self.finished_tournament_pages()?
        };

        let pairs = scope.pairs();
        let requested = pairs.len();
        let missing: Vec<TournamentUnit> = pairs
            .into_iter()
            .filter(|pair| !done.contains(pair))
            .map(|(year, tournament_type)| TournamentUnit {
                year,
                tournament_type,
            })
            .collect();
        let already_stored = requested - missing.len();
        info!(requested, missing = missing.len(), "resolved tournament scope");

        if missing.is_empty() {
            return Ok(UpdateReport::nothing_missing(requested));
        }

        let run = self.run_units(&self.tournaments, missing, deadline).await;
        let (mut report, records) = run.into_report(requested, already_stored);
        report.stored = Some(self.store.upsert(&table, records).await?);
        info!(%report, "tournament update finished");
        Ok(report)
    }

    /// Weekly maintenance: any of the last five ranking weeks not yet stored,
    /// for both types, plus a full refetch of the current year's tournaments.
    ///
    /// # Errors
    ///
    /// Returns the first [`UpdateError`] raised by a sub-update.
    #[instrument(skip(self))]
    pub async fn update_weekly(&self, today: NaiveDate) -> Result<WeeklyReport, UpdateError> {
        let weeks = last_mondays(today, WEEKLY_RANKING_WEEKS);
        let singles = self
            .update_rankings(&RankingScope::new(
                RankingType::Singles,
                RankingWindow::Dates(weeks.clone()),
            ))
            .await?;
        let doubles = self
            .update_rankings(&RankingScope::new(
                RankingType::Doubles,
                RankingWindow::Dates(weeks),
            ))
            .await?;
        let tournaments = self
            .update_tournaments(&TournamentScope {
                years: today.year()..=today.year(),
                types: self.settings.weekly_tournament_types.clone(),
                force: true,
            })
            .await?;

        Ok(WeeklyReport {
            singles,
            doubles,
            tournaments,
        })
    }

    /// (year, type) pairs whose stored rows need no refetch.
    fn finished_tournament_pages(&self) -> Result<HashSet<(i32, TournamentType)>, UpdateError> {
        let rows = self.store.load(&Table::tournaments())?.rows;
        let mut complete: HashMap<(i32, TournamentType), bool> = HashMap::new();
        for row in &rows {
            let entry = complete
                .entry((row.year, row.tournament_type))
                .or_insert(true);
            *entry &= row.has_winner();
        }

        let current_year = self.today().year();
        Ok(complete
            .into_iter()
            .filter(|((year, _), all_won)| match self.settings.tournament_refresh {
                TournamentRefresh::FirstSeen => true,
                TournamentRefresh::UntilComplete => *all_won && *year < current_year,
            })
            .map(|(pair, _)| pair)
            .collect())
    }

    /// Fetches `units` in order with at most `concurrency` in flight, pacing
    /// each unit per host. Units not started before `deadline` are deferred.
    async fn run_units<S>(
        &self,
        scraper: &S,
        units: Vec<S::Unit>,
        deadline: Option<Instant>,
    ) -> UnitRun<S::Unit, S::Record>
    where
        S: UnitScraper + Clone + 'static,
    {
        let total = units.len();

        let outcomes: Vec<(S::Unit, Option<UnitOutcome<S::Record>>)> = stream::iter(units)
            .map(|unit| {
                let scraper = scraper.clone();
                let pacer = Arc::clone(&self.pacer);
                async move {
                    if past(deadline) {
                        return (unit, None);
                    }
                    pacer.acquire(&scraper.unit_url(&unit)).await;
                    if past(deadline) {
                        return (unit, None);
                    }
                    let outcome = scraper.fetch_unit(&unit, deadline).await;
                    (unit, Some(outcome))
                }
            })
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut run = UnitRun {
            succeeded: Vec::new(),
            absent: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            records: Vec::new(),
        };
        for (index, (unit, outcome)) in outcomes.into_iter().enumerate() {
            match outcome {
                None => run.deferred.push(unit),
                Some(UnitOutcome::Ok(records)) => {
                    debug!(progress = index + 1, total, ?unit, records = records.len(), "unit done");
                    run.succeeded.push(UnitSuccess {
                        unit,
                        records: records.len(),
                    });
                    run.records.extend(records);
                }
                Some(UnitOutcome::Absent) => run.absent.push(unit),
                Some(UnitOutcome::Failed(error)) if error.is_cancelled() => {
                    debug!(?unit, "unit cancelled by run budget");
                    run.deferred.push(unit);
                }
                Some(UnitOutcome::Failed(error)) => run.failed.push(UnitFailure {
                    unit,
                    reason: error.to_string(),
                }),
            }
        }

        if !run.deferred.is_empty() {
            warn!(deferred = run.deferred.len(), "run budget exhausted, units deferred");
        }
        run
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Splits ranking rows into ranking records and the (id, name) players they
/// mention, one player per id.
fn split_ranking_rows(rows: Vec<RankingRow>) -> (Vec<RankingRecord>, Vec<PlayerRecord>) {
    let mut players: BTreeMap<String, PlayerRecord> = BTreeMap::new();
    let mut rankings = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(name) = row.player_name {
            players
                .entry(row.ranking.player_id.clone())
                .or_insert_with(|| PlayerRecord::new(row.ranking.player_id.clone(), name));
        }
        rankings.push(row.ranking);
    }
    (rankings, players.into_values().collect())
}
