//! CLI entry point for tennis-ingest.

use std::fmt::Display;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tennis_ingest::config::AppConfig;
use tennis_ingest::fetch::FetchClient;
use tennis_ingest::server::{self, AppState};
use tennis_ingest::storage::TableStore;
use tennis_ingest::summary::summarize;
use tennis_ingest::update::{PlayerScope, RankingScope, RankingWindow, TournamentScope, Updater};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.global.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let mut config = AppConfig::load(cli.global.config.as_deref())?;
    cli.global.apply(&mut config);
    debug!(
        concurrency = config.concurrency,
        unit_delay_ms = config.unit_delay.as_millis(),
        max_attempts = config.max_attempts,
        "configuration resolved"
    );

    let store = TableStore::new(&config.data_dir);

    let json = cli.global.json;
    if cli.command == Command::Summary {
        let store = store.clone();
        let summary = tokio::task::spawn_blocking(move || summarize(&store))
            .await
            .context("summary task failed")??;
        return print_result(&summary, json);
    }

    let client = FetchClient::new(&config.fetch_settings()).context("failed to build HTTP client")?;
    let updater = Updater::new(client, &config.base_url, store, config.update_settings())?;
    info!(base_url = %config.base_url, data_dir = %config.data_dir.display(), "tennis-ingest starting");

    match cli.command {
        Command::UpdateRankings {
            ranking_type,
            max_weeks,
            force,
        } => {
            let window = max_weeks.map_or(RankingWindow::AllPublished, RankingWindow::LastWeeks);
            let scope = RankingScope {
                ranking_type,
                window,
                force,
            };
            let report = updater.update_rankings(&scope).await?;
            print_result(&report, json)
        }
        Command::UpdatePlayers { num_players, force } => {
            let top_k = usize::try_from(num_players).context("num_players is too large")?;
            let report = updater.update_players(PlayerScope { top_k, force }).await?;
            print_result(&report, json)
        }
        Command::UpdateTournaments {
            start_year,
            end_year,
            types,
            force,
        } => {
            if start_year > end_year {
                anyhow::bail!("start year {start_year} is after end year {end_year}");
            }
            let scope = TournamentScope {
                years: start_year..=end_year,
                types,
                force,
            };
            let report = updater.update_tournaments(&scope).await?;
            print_result(&report, json)
        }
        Command::UpdateWeekly => {
            let today = updater.today();
            let report = updater.update_weekly(today).await?;
            print_result(&report, json)
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.bind.clone());
            if config.admin_token.is_none() {
                warn!("no admin token configured, admin routes are open");
            }
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            let state = AppState::new(updater, config.admin_token.clone());
            server::serve(listener, state, shutdown_signal()).await?;
            info!("server stopped");
            Ok(())
        }
        Command::Summary => Ok(()),
    }
}

fn print_result<T: Serialize + Display>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
