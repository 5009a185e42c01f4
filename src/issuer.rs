// Token issuer: creates a match, its two game teams and every entry token in
// a single transaction.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::config::MatchSettings;
use crate::db::{self, Database, MatchStatus, NewMatch};
use crate::error::MatchError;
use crate::game_mode::MatchMode;
use crate::metrics;
use crate::retry::{retry_insert, RetryError};

/// Everything needed to open a match.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub match_type: String,
    pub match_status: MatchStatus,
    pub mode: String,
    pub requester_id: String,
    pub tokens_per_team: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTokens {
    pub red_team: Vec<String>,
    pub blue_team: Vec<String>,
}

impl TeamTokens {
    pub fn len(&self) -> usize {
        self.red_team.len() + self.blue_team.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.red_team.iter().chain(self.blue_team.iter())
    }
}

/// Result of a successful issuance.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedMatch {
    pub match_id: i64,
    pub red_team_id: i64,
    pub blue_team_id: i64,
    pub tokens: TeamTokens,
    pub created_at: i64,
    pub expires_at: i64,
}

/// A fresh unguessable token string (random UUIDv4).
pub fn random_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reject malformed requests before anything touches the store.
pub fn validate_request(req: &MatchRequest, settings: &MatchSettings) -> Result<(), MatchError> {
    if req.tokens_per_team == 0 {
        return Err(MatchError::Validation(
            "tokens_per_team must be at least 1".to_string(),
        ));
    }
    if req.tokens_per_team > settings.max_tokens_per_team {
        return Err(MatchError::Validation(format!(
            "tokens_per_team must be at most {}",
            settings.max_tokens_per_team
        )));
    }
    if req.requester_id.trim().is_empty() {
        return Err(MatchError::Validation("requester id is required".to_string()));
    }
    if req.match_type.trim().is_empty() || req.mode.trim().is_empty() {
        return Err(MatchError::Validation(
            "match_type and mode are required".to_string(),
        ));
    }
    if req.match_status.is_terminal() {
        return Err(MatchError::Validation(format!(
            "a match cannot be created as {}",
            req.match_status
        )));
    }
    if let Some(mode) = MatchMode::from_str_name(&req.mode) {
        if !settings.mode_enabled(mode) {
            return Err(MatchError::ModeDisabled(mode.as_str().to_string()));
        }
    }
    Ok(())
}

pub async fn create_match_with_tokens(
    db: &Database,
    settings: &MatchSettings,
    req: &MatchRequest,
) -> Result<IssuedMatch, MatchError> {
    create_match_with_tokens_at(db, settings, req, db::now_millis(), random_token).await
}

/// Issue a match as of `now`, drawing token candidates from `generate`.
///
/// All rows are written in one transaction; any failure (including retry
/// exhaustion) rolls the whole batch back.
pub async fn create_match_with_tokens_at<G>(
    db: &Database,
    settings: &MatchSettings,
    req: &MatchRequest,
    now: i64,
    mut generate: G,
) -> Result<IssuedMatch, MatchError>
where
    G: FnMut() -> String,
{
    validate_request(req, settings)?;

    let expires_at = now.saturating_add(settings.match_ttl_millis());

    let mut tx = db.begin().await?;

    let red = db::insert_game_team(&mut tx, now).await?;
    let blue = db::insert_game_team(&mut tx, now).await?;

    let created = db::insert_match(
        &mut tx,
        &NewMatch {
            match_type: &req.match_type,
            match_status: req.match_status,
            mode: &req.mode,
            red_team_id: red.id,
            blue_team_id: blue.id,
            created_by: &req.requester_id,
            created_at: now,
            expires_at,
        },
    )
    .await?;

    let slot = TokenSlot {
        match_id: created.id,
        game_team_id: red.id,
        created_at: now,
        expires_at,
    };
    let red_tokens = issue_team_tokens(
        &mut tx,
        settings.token_retry_limit,
        &mut generate,
        slot,
        req.tokens_per_team,
    )
    .await?;

    let slot = TokenSlot {
        game_team_id: blue.id,
        ..slot
    };
    let blue_tokens = issue_team_tokens(
        &mut tx,
        settings.token_retry_limit,
        &mut generate,
        slot,
        req.tokens_per_team,
    )
    .await?;

    tx.commit().await?;

    metrics::MATCHES_CREATED_TOTAL
        .with_label_values(&[req.match_type.as_str()])
        .inc();
    metrics::TOKENS_ISSUED_TOTAL.inc_by((red_tokens.len() + blue_tokens.len()) as u64);
    tracing::info!(
        "Match {} created by {} ({} / {}), {} tokens per team, expires at {}",
        created.id,
        req.requester_id,
        req.match_type,
        req.mode,
        req.tokens_per_team,
        expires_at
    );

    Ok(IssuedMatch {
        match_id: created.id,
        red_team_id: red.id,
        blue_team_id: blue.id,
        tokens: TeamTokens {
            red_team: red_tokens,
            blue_team: blue_tokens,
        },
        created_at: now,
        expires_at,
    })
}

/// Row values shared by every token of one team.
#[derive(Debug, Clone, Copy)]
struct TokenSlot {
    match_id: i64,
    game_team_id: i64,
    created_at: i64,
    expires_at: i64,
}

async fn issue_team_tokens<G>(
    conn: &mut SqliteConnection,
    max_attempts: u32,
    generate: &mut G,
    slot: TokenSlot,
    count: u32,
) -> Result<Vec<String>, MatchError>
where
    G: FnMut() -> String,
{
    let mut issued = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let token = retry_insert(
            max_attempts,
            &mut *conn,
            &mut *generate,
            move |conn, candidate| {
                Box::pin(async move {
                    let inserted = db::insert_token_if_absent(
                        conn,
                        &candidate,
                        slot.match_id,
                        slot.game_team_id,
                        slot.created_at,
                        slot.expires_at,
                    )
                    .await?;
                    if !inserted {
                        metrics::TOKEN_COLLISIONS_TOTAL.inc();
                    }
                    Ok::<bool, sqlx::Error>(inserted)
                })
            },
        )
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts } => {
                metrics::TOKEN_GENERATION_EXHAUSTED_TOTAL.inc();
                tracing::error!(
                    "Token space exhausted for match {}: no unique token after {attempts} attempts",
                    slot.match_id
                );
                MatchError::TokenGenerationExhausted { attempts }
            }
            RetryError::Failed(e) => MatchError::Persistence(e),
        })?;
        issued.push(token);
    }
    Ok(issued)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tokens_per_team: u32) -> MatchRequest {
        MatchRequest {
            match_type: "bedwars".to_string(),
            match_status: MatchStatus::Waiting,
            mode: "practice".to_string(),
            requester_id: "user-1".to_string(),
            tokens_per_team,
        }
    }

    #[test]
    fn test_validate_request() {
        let settings = MatchSettings::default();
        assert!(validate_request(&request(4), &settings).is_ok());
        assert!(matches!(
            validate_request(&request(0), &settings),
            Err(MatchError::Validation(_))
        ));
        assert!(matches!(
            validate_request(&request(6), &settings),
            Err(MatchError::Validation(_))
        ));

        let mut anonymous = request(1);
        anonymous.requester_id = "  ".to_string();
        assert!(validate_request(&anonymous, &settings).is_err());

        let mut finished = request(1);
        finished.match_status = MatchStatus::Completed;
        assert!(validate_request(&finished, &settings).is_err());

        let mut ranked = request(1);
        ranked.mode = "ranked".to_string();
        assert!(matches!(
            validate_request(&ranked, &settings),
            Err(MatchError::ModeDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_tokens_per_team() {
        let db = Database::open_in_memory().await.unwrap();
        let settings = MatchSettings::default();

        let issued = create_match_with_tokens(&db, &settings, &request(4))
            .await
            .unwrap();
        assert_eq!(issued.tokens.red_team.len(), 4);
        assert_eq!(issued.tokens.blue_team.len(), 4);
        assert_eq!(issued.tokens.len(), 8);
        assert_eq!(issued.expires_at - issued.created_at, 600_000);

        let m = db.get_match(issued.match_id).await.unwrap().unwrap();
        assert_eq!(m.red_team_id, issued.red_team_id);
        assert_eq!(m.blue_team_id, issued.blue_team_id);
        assert_eq!(m.created_by, "user-1");
        assert_eq!(m.expires_at, issued.expires_at);

        for token in &issued.tokens.red_team {
            let t = db.get_token(token).await.unwrap().unwrap();
            assert_eq!(t.game_team_id, issued.red_team_id);
            assert_eq!(t.expires_at, issued.expires_at);
            assert!(t.is_active);
            assert!(t.redeemed_by.is_none());
        }
    }

    #[tokio::test]
    async fn test_collision_is_retried() {
        let db = Database::open_in_memory().await.unwrap();
        let settings = MatchSettings::default();

        let mut first = vec!["t-1".to_string()];
        create_match_with_tokens_at(&db, &settings, &request(1), 0, || {
            first.pop().unwrap_or_else(|| "t-2".to_string())
        })
        .await
        .unwrap();

        // Replays t-1 and t-2 before producing fresh strings.
        let mut queue = vec!["t-4", "t-3", "t-2", "t-1"];
        let issued = create_match_with_tokens_at(&db, &settings, &request(1), 0, || {
            queue.pop().unwrap().to_string()
        })
        .await
        .unwrap();
        assert_eq!(issued.tokens.red_team, vec!["t-3".to_string()]);
        assert_eq!(issued.tokens.blue_team, vec!["t-4".to_string()]);
    }

    #[tokio::test]
    async fn test_exhaustion_rolls_back_everything() {
        let db = Database::open_in_memory().await.unwrap();
        let settings = MatchSettings {
            token_retry_limit: 3,
            ..MatchSettings::default()
        };

        let result =
            create_match_with_tokens_at(&db, &settings, &request(1), 0, || "same".to_string())
                .await;
        assert!(matches!(
            result,
            Err(MatchError::TokenGenerationExhausted { attempts: 3 })
        ));

        let counts = db.store_counts().await.unwrap();
        assert_eq!(counts.matches, 0);
        assert_eq!(counts.game_teams, 0);
        assert_eq!(counts.game_tokens, 0);
    }
}
