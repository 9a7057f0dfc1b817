//! Per-call update reports.

use std::fmt;

use serde::Serialize;

use crate::scrape::{RankingUnit, TournamentUnit};
use crate::storage::UpsertSummary;

/// A unit that produced records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSuccess<U> {
    pub unit: U,
    pub records: usize,
}

/// A unit that failed, with the reason shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure<U> {
    pub unit: U,
    pub reason: String,
}

/// Outcome of one update call.
///
/// Units are listed in processing order. A call where every unit failed is
/// still a successful call; only storage failures abort it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport<U> {
    /// Units in the resolved scope.
    pub requested: usize,
    /// Units skipped because they were already stored.
    pub already_stored: usize,
    pub succeeded: Vec<UnitSuccess<U>>,
    /// Units the source has no data for.
    pub absent: Vec<U>,
    pub failed: Vec<UnitFailure<U>>,
    /// Units not finished before the run budget ran out.
    pub deferred: Vec<U>,
    /// Write to the main table, `None` when nothing was fetched.
    pub stored: Option<UpsertSummary>,
    /// Player names discovered on ranking pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<UpsertSummary>,
}

impl<U> UpdateReport<U> {
    /// Report for a scope whose units are all stored already.
    #[must_use]
    pub fn nothing_missing(requested: usize) -> Self {
        Self {
            requested,
            already_stored: requested,
            succeeded: Vec::new(),
            absent: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            stored: None,
            players: None,
        }
    }

    /// Records collected across all successful units.
    #[must_use]
    pub fn records(&self) -> usize {
        self.succeeded.iter().map(|s| s.records).sum()
    }

    /// Units actually attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.absent.len() + self.failed.len()
    }
}

impl<U> fmt::Display for UpdateReport<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requested, {} already stored, {} succeeded ({} records), {} absent, {} failed, {} deferred",
            self.requested,
            self.already_stored,
            self.succeeded.len(),
            self.records(),
            self.absent.len(),
            self.failed.len(),
            self.deferred.len()
        )
    }
}

/// Outcome of the weekly maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyReport {
    pub singles: UpdateReport<RankingUnit>,
    pub doubles: UpdateReport<RankingUnit>,
    pub tournaments: UpdateReport<TournamentUnit>,
}

impl fmt::Display for WeeklyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "singles rankings: {}", self.singles)?;
        writeln!(f, "doubles rankings: {}", self.doubles)?;
        write!(f, "tournaments: {}", self.tournaments)
    }
}
