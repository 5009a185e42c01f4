// Read-only token classification.

use serde::Serialize;

use crate::db::{self, Database, GameToken};
use crate::metrics;

/// Outcome of presenting a token string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenValidation {
    NotFound,
    Inactive,
    Expired,
    Valid {
        match_id: i64,
        game_team_id: i64,
        redeemed_by: Option<String>,
    },
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Valid { .. } => "valid",
        }
    }
}

/// Classify a token row as of `now`. Checked in order: missing, inactive,
/// expired.
pub fn classify(token: Option<&GameToken>, now: i64) -> TokenValidation {
    let Some(token) = token else {
        return TokenValidation::NotFound;
    };
    if !token.is_active {
        return TokenValidation::Inactive;
    }
    if token.is_expired(now) {
        return TokenValidation::Expired;
    }
    TokenValidation::Valid {
        match_id: token.match_id,
        game_team_id: token.game_team_id,
        redeemed_by: token.redeemed_by.clone(),
    }
}

pub async fn validate_token(db: &Database, token: &str) -> Result<TokenValidation, sqlx::Error> {
    validate_token_at(db, token, db::now_millis()).await
}

pub async fn validate_token_at(
    db: &Database,
    token: &str,
    now: i64,
) -> Result<TokenValidation, sqlx::Error> {
    let row = db.get_token(token).await?;
    let outcome = classify(row.as_ref(), now);
    metrics::TOKEN_VALIDATIONS_TOTAL
        .with_label_values(&[outcome.label()])
        .inc();
    tracing::debug!("Token validation: {}", outcome.label());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(is_active: bool, expires_at: i64) -> GameToken {
        GameToken {
            id: 1,
            token: "abc".to_string(),
            match_id: 7,
            game_team_id: 3,
            redeemed_by: None,
            ign: None,
            redeemed_at: None,
            created_at: 0,
            expires_at,
            is_active,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 0), TokenValidation::NotFound);
        assert_eq!(
            classify(Some(&token(false, 100)), 0),
            TokenValidation::Inactive
        );
        // Inactive wins over expired.
        assert_eq!(
            classify(Some(&token(false, 100)), 500),
            TokenValidation::Inactive
        );
        assert_eq!(
            classify(Some(&token(true, 100)), 101),
            TokenValidation::Expired
        );
        assert_eq!(
            classify(Some(&token(true, 100)), 100),
            TokenValidation::Valid {
                match_id: 7,
                game_team_id: 3,
                redeemed_by: None
            }
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(TokenValidation::Valid {
            match_id: 1,
            game_team_id: 2,
            redeemed_by: Some("p1".to_string()),
        })
        .unwrap();
        assert_eq!(json["status"], "valid");
        assert_eq!(json["match_id"], 1);
        assert_eq!(json["redeemed_by"], "p1");

        let json = serde_json::to_value(TokenValidation::NotFound).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "not_found" }));
    }
}
