// Token routes used by game servers (validate, redeem, lookup) plus the
// admin deactivation hook.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::response::{admin_error, success, ApiJson};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::MatchError;
use crate::lifecycle;
use crate::redemption;
use crate::validator;

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub token: Option<String>,
    pub player_id: Option<String>,
    pub ign: Option<String>,
}

fn required(value: Option<&str>, field: &str) -> Result<String, MatchError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(MatchError::Validation(format!("{field} is required"))),
    }
}

/// Classify a token. Unknown tokens are a normal outcome, not an error.
pub async fn validate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TokenRequest>,
) -> Response {
    let token = match required(req.token.as_deref(), "token") {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    match validator::validate_token(&state.db, &token).await {
        Ok(outcome) => success(StatusCode::OK, outcome),
        Err(e) => MatchError::from(e).into_response(),
    }
}

pub async fn redeem(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RedeemRequest>,
) -> Response {
    let token = match required(req.token.as_deref(), "token") {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    let player_id = match required(req.player_id.as_deref(), "player_id") {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match redemption::mark_token_as_used(&state.db, &token, &player_id, req.ign.as_deref()).await
    {
        Ok(t) => success(
            StatusCode::OK,
            json!({
                "match_id": t.match_id,
                "game_team_id": t.game_team_id,
                "redeemed_by": t.redeemed_by,
                "ign": t.ign,
                "redeemed_at": t.redeemed_at,
            }),
        ),
        Err(e) => e.into_response(),
    }
}

pub async fn match_for_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    match lifecycle::get_match_by_token(&state.db, &token).await {
        Ok(Some(found)) => success(StatusCode::OK, found),
        Ok(None) => MatchError::NotFound("Token").into_response(),
        Err(e) => MatchError::from(e).into_response(),
    }
}

pub async fn deactivate(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<TokenRequest>,
) -> Response {
    if let Err(e) = auth.require_admin() {
        return admin_error(e);
    }
    let token = match required(req.token.as_deref(), "token") {
        Ok(t) => t,
        Err(e) => return admin_error(e),
    };
    match lifecycle::deactivate_token(&state.db, &token).await {
        Ok(()) => {
            tracing::info!("Token deactivated by {}", auth.id());
            success(StatusCode::OK, json!({ "deactivated": true }))
        }
        Err(e) => admin_error(e),
    }
}
