//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::builder::RangedI64ValueParser;
use clap::{Args as ClapArgs, Parser, Subcommand};

use tennis_ingest::config::AppConfig;
use tennis_ingest::model::{RankingType, TournamentType};
use tennis_ingest::update::{
    MAX_PLAYERS_PER_RUN, MAX_RANKING_WEEKS, MAX_TOURNAMENT_YEAR, MIN_TOURNAMENT_YEAR,
};

/// Incrementally ingest ATP rankings, player bios and tournament results
/// into local Parquet tables.
#[derive(Parser, Debug)]
#[command(name = "tennis-ingest")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: $XDG_CONFIG_HOME/tennis-ingest/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the table files
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Source site root
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Units fetched concurrently (1-8)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub concurrency: Option<u8>,

    /// Minimum delay between units sent to the same host in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub unit_delay_ms: Option<u64>,
}

impl GlobalArgs {
    /// Applies command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(url) = &self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(delay) = self.unit_delay_ms {
            config.unit_delay = std::time::Duration::from_millis(delay);
        }
    }

    /// Default log filter. `RUST_LOG` takes priority over this.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch ranking tables not stored yet
    UpdateRankings {
        /// Ranking type: singles or doubles
        ranking_type: RankingType,

        /// Only the N most recent weekly tables (default: every published date)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RANKING_WEEKS)))]
        max_weeks: Option<u32>,

        /// Refetch dates that are already stored
        #[arg(long)]
        force: bool,
    },

    /// Fetch biographies for the best ranked players lacking one
    UpdatePlayers {
        /// How many players to consider, best ranked first
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=MAX_PLAYERS_PER_RUN as u64))]
        num_players: u64,

        /// Refetch players that already have biographical data
        #[arg(long)]
        force: bool,
    },

    /// Fetch results archive pages for a range of years
    UpdateTournaments {
        /// First year (inclusive)
        #[arg(value_parser = year_parser())]
        start_year: i32,

        /// Last year (inclusive)
        #[arg(value_parser = year_parser())]
        end_year: i32,

        /// Comma separated tournament types: atp, ch, fu, gs
        #[arg(long, default_value = "atp", value_delimiter = ',')]
        types: Vec<TournamentType>,

        /// Refetch pages that are already stored
        #[arg(long)]
        force: bool,
    },

    /// Last five ranking weeks of both types plus current-year tournaments
    UpdateWeekly,

    /// Print per-table statistics of the stored data
    Summary,

    /// Serve the HTTP API
    Serve {
        /// Listen address (default from config, else 127.0.0.1:8080)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

fn year_parser() -> RangedI64ValueParser<i32> {
    clap::value_parser!(i32).range(i64::from(MIN_TOURNAMENT_YEAR)..=i64::from(MAX_TOURNAMENT_YEAR))
}
