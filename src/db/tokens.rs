// Game token persistence. The `token` column carries the store-wide
// uniqueness constraint that issuance relies on.

use sqlx::SqliteConnection;

use super::{Database, GameToken, Match};

/// Insert a token unless the string is already taken.
///
/// Returns `Ok(false)` on a uniqueness conflict so callers can regenerate
/// and retry without a check-then-insert race.
pub async fn insert_token_if_absent(
    conn: &mut SqliteConnection,
    token: &str,
    match_id: i64,
    game_team_id: i64,
    created_at: i64,
    expires_at: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO game_tokens (token, match_id, game_team_id, created_at, expires_at, is_active) \
         VALUES (?, ?, ?, ?, ?, 1) ON CONFLICT(token) DO NOTHING",
    )
    .bind(token)
    .bind(match_id)
    .bind(game_team_id)
    .bind(created_at)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

impl Database {
    pub async fn get_token(&self, token: &str) -> Result<Option<GameToken>, sqlx::Error> {
        sqlx::query_as::<_, GameToken>("SELECT * FROM game_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await
    }

    /// All tokens bound to either of the two given game teams.
    pub async fn list_tokens_for_teams(
        &self,
        red_team_id: i64,
        blue_team_id: i64,
    ) -> Result<Vec<GameToken>, sqlx::Error> {
        sqlx::query_as::<_, GameToken>(
            "SELECT * FROM game_tokens WHERE game_team_id IN (?, ?) ORDER BY id",
        )
        .bind(red_team_id)
        .bind(blue_team_id)
        .fetch_all(self.pool())
        .await
    }

    /// Attach a player to a token.
    ///
    /// The write only lands if the token is active, unexpired at `now`, and
    /// either unredeemed or already redeemed by `player_id`. `ign` is kept
    /// when not supplied and `redeemed_at` records the first redemption.
    /// Returns false if any of those conditions failed.
    pub async fn redeem_token(
        &self,
        token: &str,
        player_id: &str,
        ign: Option<&str>,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE game_tokens \
             SET redeemed_by = ?, ign = COALESCE(?, ign), redeemed_at = COALESCE(redeemed_at, ?) \
             WHERE token = ? AND is_active = 1 AND expires_at >= ? \
               AND (redeemed_by IS NULL OR redeemed_by = ?)",
        )
        .bind(player_id)
        .bind(ign)
        .bind(now)
        .bind(token)
        .bind(now)
        .bind(player_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deactivate_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE game_tokens SET is_active = 0 WHERE token = ?")
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The match an active token belongs to, with the token's team id.
    pub async fn get_match_by_token(
        &self,
        token: &str,
    ) -> Result<Option<(Match, i64)>, sqlx::Error> {
        let Some(token) = self.get_token(token).await? else {
            return Ok(None);
        };
        if !token.is_active {
            return Ok(None);
        }
        Ok(self
            .get_match(token.match_id)
            .await?
            .map(|m| (m, token.game_team_id)))
    }
}
