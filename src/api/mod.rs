// HTTP API routes (match creation, match queries, completion hooks).

mod response;
mod tokens;

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::{Database, MatchStatus};
use crate::error::MatchError;
use crate::game_mode::{GameType, MatchMode};
use crate::issuer::{create_match_with_tokens, IssuedMatch, MatchRequest, TeamTokens};
use crate::lifecycle;
use crate::metrics;
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::redemption;

pub use response::{admin_error, success, ApiJson};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct NewMatchRequest {
    pub match_type: Option<String>,
    pub mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokensRequest {
    pub selected_mode: Option<String>,
}

#[derive(Deserialize)]
pub struct ListMatchesParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct SetWinnerRequest {
    pub winner_team_id: i64,
    pub match_elo: Option<i64>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Config) -> Self {
        let rate_limiter = RateLimiter::new(!config.local_mode);
        Self {
            db,
            config: Arc::new(config),
            rate_limiter,
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        // Match creation
        .route("/matches/new", post(new_match))
        .route("/api/match/generate-tokens", post(generate_tokens))
        // Match queries
        .route("/api/matches", get(list_matches))
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/readiness", get(match_readiness))
        // Completion hooks
        .route("/api/matches/{id}/status", post(update_match_status))
        .route("/api/matches/{id}/winner", post(set_match_winner))
        // Tokens
        .route("/api/tokens/validate", post(tokens::validate))
        .route("/api/tokens/redeem", post(tokens::redeem))
        .route("/api/tokens/deactivate", post(tokens::deactivate))
        .route("/api/tokens/{token}/match", get(tokens::match_for_token))
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
        .layer(CorsLayer::permissive())
}

async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let started = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

// ── Service handlers ──────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> Response {
    match state.db.store_counts().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "service": "matchgate-backend", "store": counts })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "service": "matchgate-backend" })),
            )
                .into_response()
        }
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::gather_metrics(),
    )
}

// ── Match creation ────────────────────────────────────────────────────

/// Validate the game type / mode pair, apply the rate limit and issue.
async fn issue_for(
    state: &AppState,
    requester: &str,
    game_type: GameType,
    mode: MatchMode,
) -> Result<IssuedMatch, MatchError> {
    let settings = &state.config.settings;
    if !settings.mode_enabled(mode) {
        return Err(MatchError::ModeDisabled(mode.as_str().to_string()));
    }
    state
        .rate_limiter
        .check_limit(requester, RateLimitType::for_mode(mode))?;

    create_match_with_tokens(
        &state.db,
        settings,
        &MatchRequest {
            match_type: game_type.as_str().to_string(),
            match_status: MatchStatus::Waiting,
            mode: mode.as_str().to_string(),
            requester_id: requester.to_string(),
            tokens_per_team: game_type.tokens_per_team(),
        },
    )
    .await
}

fn parse_game_type(value: Option<&str>, field: &str) -> Result<GameType, MatchError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(MatchError::Validation(format!("{field} is required")));
    }
    GameType::from_str_name(value).ok_or_else(|| {
        MatchError::Validation(format!(
            "Invalid {field} '{value}', expected one of: {}",
            GameType::valid_names()
        ))
    })
}

async fn new_match(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<NewMatchRequest>,
) -> Response {
    let game_type = match parse_game_type(req.match_type.as_deref(), "match_type") {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    let mode_name = req.mode.as_deref().map(str::trim).unwrap_or_default();
    let Some(mode) = MatchMode::from_str_name(mode_name) else {
        return MatchError::Validation("mode must be 'practice' or 'ranked'".to_string())
            .into_response();
    };

    match issue_for(&state, auth.id(), game_type, mode).await {
        Ok(issued) => success(
            StatusCode::CREATED,
            json!({
                "match_id": issued.match_id,
                "expires_at": issued.expires_at,
                "match_type": game_type.as_str(),
                "tokens": issued.tokens,
            }),
        ),
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedTokens {
    success: bool,
    match_id: i64,
    tokens: TeamTokens,
    expires_at: i64,
    match_type: &'static str,
    tokens_per_team: u32,
    total_tokens: usize,
}

async fn generate_tokens(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<GenerateTokensRequest>,
) -> Response {
    let game_type = match parse_game_type(req.selected_mode.as_deref(), "selectedMode") {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    match issue_for(&state, auth.id(), game_type, MatchMode::Practice).await {
        Ok(issued) => (
            StatusCode::CREATED,
            Json(GeneratedTokens {
                success: true,
                match_id: issued.match_id,
                total_tokens: issued.tokens.len(),
                tokens: issued.tokens,
                expires_at: issued.expires_at,
                match_type: game_type.as_str(),
                tokens_per_team: game_type.tokens_per_team(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Match queries ─────────────────────────────────────────────────────

async fn list_matches(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<ListMatchesParams>,
) -> Response {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => match MatchStatus::from_str_name(s) {
            Some(status) => Some(status),
            None => {
                return MatchError::Validation(format!("Unknown match status '{s}'"))
                    .into_response()
            }
        },
    };
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    match state.db.list_matches_by_status(status, limit).await {
        Ok(matches) => success(StatusCode::OK, matches),
        Err(e) => MatchError::from(e).into_response(),
    }
}

async fn get_match(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    match lifecycle::get_match_detail(&state.db, id).await {
        Ok(Some(detail)) => success(StatusCode::OK, detail),
        Ok(None) => MatchError::NotFound("Match").into_response(),
        Err(e) => MatchError::from(e).into_response(),
    }
}

async fn match_readiness(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match redemption::check_match_readiness(&state.db, id).await {
        Ok(Some(readiness)) => success(StatusCode::OK, readiness),
        Ok(None) => MatchError::NotFound("Match").into_response(),
        Err(e) => MatchError::from(e).into_response(),
    }
}

// ── Completion hooks (admin) ──────────────────────────────────────────

async fn update_match_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Response {
    if let Err(e) = auth.require_admin() {
        return admin_error(e);
    }
    let Some(to) = MatchStatus::from_str_name(req.status.trim()) else {
        return admin_error(MatchError::Validation(format!(
            "Unknown match status '{}'",
            req.status
        )));
    };
    match lifecycle::update_match_status(&state.db, id, to).await {
        Ok(m) => success(StatusCode::OK, m),
        Err(e) => admin_error(e),
    }
}

async fn set_match_winner(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<SetWinnerRequest>,
) -> Response {
    if let Err(e) = auth.require_admin() {
        return admin_error(e);
    }
    match lifecycle::set_match_winner(&state.db, id, req.winner_team_id, req.match_elo).await {
        Ok(m) => success(StatusCode::OK, m),
        Err(e) => admin_error(e),
    }
}
