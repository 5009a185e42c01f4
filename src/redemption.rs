// Redemption tracking: binding tokens to players and reporting whether a
// match has every seat filled.

use serde::Serialize;

use crate::db::{self, Database, GameToken, Match, MatchStatus, TeamSide};
use crate::error::MatchError;
use crate::metrics;
use crate::validator::{classify, TokenValidation};

fn record(outcome: &str) {
    metrics::TOKEN_REDEMPTIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

pub async fn mark_token_as_used(
    db: &Database,
    token: &str,
    player_id: &str,
    ign: Option<&str>,
) -> Result<GameToken, MatchError> {
    mark_token_as_used_at(db, token, player_id, ign, db::now_millis()).await
}

/// Record that `player_id` consumed `token`.
///
/// Replaying the same player is a no-op success (an `ign` supplied on the
/// replay still updates the stored one). A token held by someone else is
/// rejected with `TokenAlreadyRedeemed`.
pub async fn mark_token_as_used_at(
    db: &Database,
    token: &str,
    player_id: &str,
    ign: Option<&str>,
    now: i64,
) -> Result<GameToken, MatchError> {
    let player_id = player_id.trim();
    if player_id.is_empty() {
        return Err(MatchError::Validation("player_id is required".to_string()));
    }
    let ign = ign.map(str::trim).filter(|s| !s.is_empty());

    let current = db.get_token(token).await?;
    check_redeemable(current.as_ref(), player_id, now).map_err(|e| {
        record(e.code());
        e
    })?;

    if !db.redeem_token(token, player_id, ign, now).await? {
        // Lost a race between the read above and the conditional write.
        let latest = db.get_token(token).await?;
        let err = check_redeemable(latest.as_ref(), player_id, now)
            .err()
            .unwrap_or(MatchError::TokenAlreadyRedeemed);
        record(err.code());
        return Err(err);
    }

    let redeemed = db
        .get_token(token)
        .await?
        .ok_or(MatchError::NotFound("Token"))?;
    record("redeemed");
    tracing::info!(
        "Token for match {} redeemed by {} (team {})",
        redeemed.match_id,
        player_id,
        redeemed.game_team_id
    );
    Ok(redeemed)
}

fn check_redeemable(
    token: Option<&GameToken>,
    player_id: &str,
    now: i64,
) -> Result<(), MatchError> {
    match classify(token, now) {
        TokenValidation::NotFound => Err(MatchError::NotFound("Token")),
        TokenValidation::Inactive => Err(MatchError::TokenInactive),
        TokenValidation::Expired => Err(MatchError::TokenExpired),
        TokenValidation::Valid {
            redeemed_by: Some(holder),
            ..
        } if holder != player_id => Err(MatchError::TokenAlreadyRedeemed),
        TokenValidation::Valid { .. } => Ok(()),
    }
}

// ── Readiness ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideFill {
    pub used: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReadiness {
    pub match_id: i64,
    pub ready: bool,
    pub used: usize,
    pub total: usize,
    pub red: SideFill,
    pub blue: SideFill,
    /// The match deadline has passed as of the check.
    pub expired: bool,
    pub status: MatchStatus,
    pub effective_status: MatchStatus,
}

/// Count redeemed seats per side. Tokens belonging to neither team are
/// ignored.
pub fn compute_readiness(m: &Match, tokens: &[GameToken], now: i64) -> MatchReadiness {
    let mut red = SideFill::default();
    let mut blue = SideFill::default();
    for token in tokens {
        let side = match m.side_of(token.game_team_id) {
            Some(TeamSide::Red) => &mut red,
            Some(TeamSide::Blue) => &mut blue,
            None => continue,
        };
        side.total += 1;
        if token.is_redeemed() {
            side.used += 1;
        }
    }
    let used = red.used + blue.used;
    let total = red.total + blue.total;
    MatchReadiness {
        match_id: m.id,
        ready: total > 0 && used == total,
        used,
        total,
        red,
        blue,
        expired: m.is_past_deadline(now),
        status: m.match_status,
        effective_status: m.effective_status(now),
    }
}

/// Readiness of a match, or `None` if the match does not exist.
pub async fn check_match_readiness(
    db: &Database,
    match_id: i64,
) -> Result<Option<MatchReadiness>, sqlx::Error> {
    check_match_readiness_at(db, match_id, db::now_millis()).await
}

pub async fn check_match_readiness_at(
    db: &Database,
    match_id: i64,
    now: i64,
) -> Result<Option<MatchReadiness>, sqlx::Error> {
    let Some(m) = db.get_match(match_id).await? else {
        return Ok(None);
    };
    let tokens = db.list_tokens_for_teams(m.red_team_id, m.blue_team_id).await?;
    Ok(Some(compute_readiness(&m, &tokens, now)))
}
