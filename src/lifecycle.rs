// Match queries and the external completion hooks: status transitions,
// winner recording and token deactivation.

use serde::Serialize;

use crate::db::{self, Database, GameToken, Match, MatchStatus, TeamSide};
use crate::error::MatchError;

/// One seat in the match detail view.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSeat {
    pub token: String,
    pub redeemed_by: Option<String>,
    pub ign: Option<String>,
    pub is_used: bool,
    pub is_active: bool,
}

impl From<&GameToken> for TokenSeat {
    fn from(t: &GameToken) -> Self {
        Self {
            token: t.token.clone(),
            redeemed_by: t.redeemed_by.clone(),
            ign: t.ign.clone(),
            is_used: t.is_redeemed(),
            is_active: t.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub summary: Match,
    pub effective_status: MatchStatus,
    pub red_team: Vec<TokenSeat>,
    pub blue_team: Vec<TokenSeat>,
    pub used_tokens: usize,
    pub total_tokens: usize,
}

pub async fn get_match_detail(
    db: &Database,
    match_id: i64,
) -> Result<Option<MatchDetail>, sqlx::Error> {
    let Some(m) = db.get_match(match_id).await? else {
        return Ok(None);
    };
    let tokens = db.list_tokens_for_teams(m.red_team_id, m.blue_team_id).await?;

    let mut red_team = Vec::new();
    let mut blue_team = Vec::new();
    for t in &tokens {
        match m.side_of(t.game_team_id) {
            Some(TeamSide::Red) => red_team.push(TokenSeat::from(t)),
            Some(TeamSide::Blue) => blue_team.push(TokenSeat::from(t)),
            None => {}
        }
    }
    let used_tokens = red_team
        .iter()
        .chain(blue_team.iter())
        .filter(|s| s.is_used)
        .count();

    Ok(Some(MatchDetail {
        effective_status: m.effective_status(db::now_millis()),
        total_tokens: red_team.len() + blue_team.len(),
        used_tokens,
        red_team,
        blue_team,
        summary: m,
    }))
}

/// Match an active token belongs to, with the side it plays on.
#[derive(Debug, Clone, Serialize)]
pub struct TokenMatch {
    #[serde(rename = "match")]
    pub summary: Match,
    pub game_team_id: i64,
    pub side: TeamSide,
}

pub async fn get_match_by_token(
    db: &Database,
    token: &str,
) -> Result<Option<TokenMatch>, sqlx::Error> {
    let Some((m, game_team_id)) = db.get_match_by_token(token).await? else {
        return Ok(None);
    };
    let Some(side) = m.side_of(game_team_id) else {
        tracing::warn!(
            "Token team {} is not part of match {}",
            game_team_id,
            m.id
        );
        return Ok(None);
    };
    Ok(Some(TokenMatch {
        summary: m,
        game_team_id,
        side,
    }))
}

/// Move a match to `to`. Terminal matches cannot move, and `expired` is
/// reserved for the reaper. A waiting match past its deadline counts as
/// expired even before the reaper has archived it.
pub async fn update_match_status(
    db: &Database,
    match_id: i64,
    to: MatchStatus,
) -> Result<Match, MatchError> {
    let m = db
        .get_match(match_id)
        .await?
        .ok_or(MatchError::NotFound("Match"))?;

    let from = m.effective_status(db::now_millis());
    if !from.can_transition_to(to) {
        return Err(MatchError::InvalidStatusTransition { from, to });
    }
    if !db.update_match_status(match_id, m.match_status, to).await? {
        // Someone else moved it first; report against the current status.
        let current = db
            .get_match(match_id)
            .await?
            .map(|m| m.match_status)
            .unwrap_or(from);
        return Err(MatchError::InvalidStatusTransition { from: current, to });
    }

    tracing::info!("Match {} moved from {} to {}", match_id, from, to);
    db.get_match(match_id)
        .await?
        .ok_or(MatchError::NotFound("Match"))
}

/// Record the winning team and complete the match.
pub async fn set_match_winner(
    db: &Database,
    match_id: i64,
    winner_team_id: i64,
    match_elo: Option<i64>,
) -> Result<Match, MatchError> {
    let m = db
        .get_match(match_id)
        .await?
        .ok_or(MatchError::NotFound("Match"))?;

    if m.side_of(winner_team_id).is_none() {
        return Err(MatchError::Validation(format!(
            "team {winner_team_id} does not play in match {match_id}"
        )));
    }
    let from = m.effective_status(db::now_millis());
    if !from.can_transition_to(MatchStatus::Completed) {
        return Err(MatchError::InvalidStatusTransition {
            from,
            to: MatchStatus::Completed,
        });
    }
    if !db
        .set_match_winner(match_id, m.match_status, winner_team_id, match_elo)
        .await?
    {
        let current = db
            .get_match(match_id)
            .await?
            .map(|m| m.match_status)
            .unwrap_or(from);
        return Err(MatchError::InvalidStatusTransition {
            from: current,
            to: MatchStatus::Completed,
        });
    }

    tracing::info!("Match {} won by team {}", match_id, winner_team_id);
    db.get_match(match_id)
        .await?
        .ok_or(MatchError::NotFound("Match"))
}

/// Revoke a token so it can no longer be validated or redeemed.
pub async fn deactivate_token(db: &Database, token: &str) -> Result<(), MatchError> {
    if !db.deactivate_token(token).await? {
        return Err(MatchError::NotFound("Token"));
    }
    Ok(())
}
