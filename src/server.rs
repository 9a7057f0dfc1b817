//! HTTP surface: admin triggers, the scheduled weekly task, and read-only
//! lookups over stored tables. Every response body is JSON.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::model::{PlayerRecord, RankingRecord, RankingType, TournamentRecord, TournamentType};
use crate::query;
use crate::scrape::{PlayerUnit, RankingUnit, TournamentUnit};
use crate::storage::{StorageError, TableStore};
use crate::summary::{DataSummary, summarize};
use crate::update::{
    MAX_PLAYERS_PER_RUN, MAX_RANKING_WEEKS, MAX_TOURNAMENT_YEAR, MIN_TOURNAMENT_YEAR,
    PlayerScope, RankingScope, RankingWindow, TournamentScope, UpdateError, UpdateReport,
    Updater, WeeklyReport,
};

/// Default `num_players` for the players trigger.
const DEFAULT_NUM_PLAYERS: usize = 100;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    updater: Arc<Updater>,
    store: TableStore,
    admin_token: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(updater: Updater, admin_token: Option<String>) -> Self {
        let store = updater.store().clone();
        Self {
            updater: Arc::new(updater),
            store,
            admin_token,
        }
    }

    fn authorize(&self, token: Option<&str>) -> Result<(), ApiError> {
        match &self.admin_token {
            Some(expected) if token != Some(expected.as_str()) => Err(ApiError::Unauthorized),
            _ => Ok(()),
        }
    }
}

/// Errors mapped onto HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Update(UpdateError::Scope(_)) => StatusCode::BAD_GATEWAY,
            Self::Update(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Runs a storage read off the async runtime.
async fn read_store<T, F>(store: &TableStore, read: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&TableStore) -> Result<T, StorageError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || read(&store))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct StoredRankingsQuery {
    #[serde(default = "default_ranking_type")]
    ranking_type: RankingType,
    #[serde(default)]
    player_ids: String,
    ranking_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct UpdateRankingsQuery {
    #[serde(default = "default_ranking_type")]
    ranking_type: RankingType,
    max_weeks: Option<u32>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct UpdatePlayersQuery {
    num_players: Option<usize>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateTournamentsQuery {
    start_year: i32,
    end_year: i32,
    types: Option<String>,
    #[serde(default)]
    force: bool,
}

fn default_ranking_type() -> RankingType {
    RankingType::Singles
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/players/search", get(search_players))
        .route("/rankings/stored", get(stored_rankings))
        .route("/tournaments", get(list_tournaments))
        .route("/admin/data-summary", get(data_summary))
        .route("/admin/update-rankings", post(update_rankings))
        .route("/admin/update-players", post(update_players))
        .route("/admin/update-tournaments", post(update_tournaments))
        .route("/tasks/update-weekly", post(update_weekly))
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn search_players(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<PlayerRecord>>, ApiError> {
    let players = read_store(&state.store, move |store| {
        query::search_players(store, &params.q)
    })
    .await?;
    Ok(Json(players))
}

async fn stored_rankings(
    State(state): State<AppState>,
    Query(params): Query<StoredRankingsQuery>,
) -> Result<Json<Vec<RankingRecord>>, ApiError> {
    let ids = query::parse_id_list(&params.player_ids);
    let ranking_type = params.ranking_type;
    let rows = read_store(&state.store, move |store| {
        query::stored_rankings(store, ranking_type, &ids, params.ranking_date)
    })
    .await?;
    rows.map(Json).ok_or_else(|| {
        ApiError::NotFound(format!("no {ranking_type} rankings stored, run an update first"))
    })
}

async fn list_tournaments(
    State(state): State<AppState>,
) -> Result<Json<Vec<TournamentRecord>>, ApiError> {
    Ok(Json(read_store(&state.store, query::tournaments).await?))
}

async fn data_summary(
    State(state): State<AppState>,
    Query(auth): Query<TokenQuery>,
) -> Result<Json<DataSummary>, ApiError> {
    state.authorize(auth.token.as_deref())?;
    Ok(Json(read_store(&state.store, summarize).await?))
}

#[instrument(skip(state, auth))]
async fn update_rankings(
    State(state): State<AppState>,
    Query(auth): Query<TokenQuery>,
    Query(params): Query<UpdateRankingsQuery>,
) -> Result<Json<UpdateReport<RankingUnit>>, ApiError> {
    state.authorize(auth.token.as_deref())?;
    let window = match params.max_weeks {
        Some(weeks) if !(1..=MAX_RANKING_WEEKS).contains(&weeks) => {
            return Err(ApiError::BadRequest(format!(
                "max_weeks must be between 1 and {MAX_RANKING_WEEKS}"
            )));
        }
        Some(weeks) => RankingWindow::LastWeeks(weeks),
        None => RankingWindow::AllPublished,
    };
    let scope = RankingScope {
        ranking_type: params.ranking_type,
        window,
        force: params.force,
    };
    Ok(Json(state.updater.update_rankings(&scope).await?))
}

#[instrument(skip(state, auth))]
async fn update_players(
    State(state): State<AppState>,
    Query(auth): Query<TokenQuery>,
    Query(params): Query<UpdatePlayersQuery>,
) -> Result<Json<UpdateReport<PlayerUnit>>, ApiError> {
    state.authorize(auth.token.as_deref())?;
    let top_k = params.num_players.unwrap_or(DEFAULT_NUM_PLAYERS);
    if !(1..=MAX_PLAYERS_PER_RUN).contains(&top_k) {
        return Err(ApiError::BadRequest(format!(
            "num_players must be between 1 and {MAX_PLAYERS_PER_RUN}"
        )));
    }
    let scope = PlayerScope {
        top_k,
        force: params.force,
    };
    Ok(Json(state.updater.update_players(scope).await?))
}

#[instrument(skip(state, auth))]
async fn update_tournaments(
    State(state): State<AppState>,
    Query(auth): Query<TokenQuery>,
    Query(params): Query<UpdateTournamentsQuery>,
) -> Result<Json<UpdateReport<TournamentUnit>>, ApiError> {
    state.authorize(auth.token.as_deref())?;
    for (name, year) in [("start_year", params.start_year), ("end_year", params.end_year)] {
        if !(MIN_TOURNAMENT_YEAR..=MAX_TOURNAMENT_YEAR).contains(&year) {
            return Err(ApiError::BadRequest(format!(
                "{name} must be between {MIN_TOURNAMENT_YEAR} and {MAX_TOURNAMENT_YEAR}"
            )));
        }
    }
    if params.start_year > params.end_year {
        return Err(ApiError::BadRequest(format!(
            "start_year {} is after end_year {}",
            params.start_year, params.end_year
        )));
    }
    let types = match params.types.as_deref() {
        Some(raw) => {
            TournamentType::parse_list(raw).map_err(|err| ApiError::BadRequest(err.to_string()))?
        }
        None => state.updater.settings().weekly_tournament_types.clone(),
    };
    if types.is_empty() {
        return Err(ApiError::BadRequest("types must name at least one type".into()));
    }
    let scope = TournamentScope {
        years: params.start_year..=params.end_year,
        types,
        force: params.force,
    };
    Ok(Json(state.updater.update_tournaments(&scope).await?))
}

#[instrument(skip(state, auth))]
async fn update_weekly(
    State(state): State<AppState>,
    Query(auth): Query<TokenQuery>,
) -> Result<Json<WeeklyReport>, ApiError> {
    state.authorize(auth.token.as_deref())?;
    let today = state.updater.today();
    Ok(Json(state.updater.update_weekly(today).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{FetchClient, FetchSettings};
    use crate::scrape::ScrapeError;
    use crate::update::UpdateSettings;

    fn state(token: Option<&str>) -> AppState {
        let client = FetchClient::new(&FetchSettings::default()).unwrap();
        let updater = Updater::new(
            client,
            "http://127.0.0.1:9",
            TableStore::new("/nonexistent"),
            UpdateSettings::default(),
        )
        .unwrap();
        AppState::new(updater, token.map(str::to_string))
    }

    #[test]
    fn test_authorize_without_configured_token() {
        let state = state(None);
        assert!(state.authorize(None).is_ok());
        assert!(state.authorize(Some("anything")).is_ok());
    }

    #[test]
    fn test_authorize_with_configured_token() {
        let state = state(Some("s3cret"));
        assert!(state.authorize(Some("s3cret")).is_ok());
        assert!(matches!(state.authorize(None), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(Some("nope")), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_error_status_mapping() {
        let scope = ApiError::Update(UpdateError::Scope(ScrapeError::parse("http://x", "bad")));
        assert_eq!(scope.status(), StatusCode::BAD_GATEWAY);

        let storage = ApiError::Storage(StorageError::decode("/d/x.parquet", "bad"));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
