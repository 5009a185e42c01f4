// Match and game-team persistence.

use sqlx::{Sqlite, SqliteConnection, Transaction};

use super::{Database, GameTeam, Match, MatchStatus};

/// Column values for a match row inserted inside an issuing transaction.
#[derive(Debug, Clone)]
pub struct NewMatch<'a> {
    pub match_type: &'a str,
    pub match_status: MatchStatus,
    pub mode: &'a str,
    pub red_team_id: i64,
    pub blue_team_id: i64,
    pub created_by: &'a str,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Insert a game team with an empty slot list.
pub async fn insert_game_team(
    conn: &mut SqliteConnection,
    created_at: i64,
) -> Result<GameTeam, sqlx::Error> {
    sqlx::query_as::<_, GameTeam>(
        "INSERT INTO game_teams (bots, created_at) VALUES ('[]', ?) RETURNING id, bots, created_at",
    )
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await
}

pub async fn insert_match(
    conn: &mut SqliteConnection,
    new: &NewMatch<'_>,
) -> Result<Match, sqlx::Error> {
    sqlx::query_as::<_, Match>(
        "INSERT INTO matches (match_type, match_status, mode, red_team_id, blue_team_id, created_by, created_at, expires_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.match_type)
    .bind(new.match_status)
    .bind(new.mode)
    .bind(new.red_team_id)
    .bind(new.blue_team_id)
    .bind(new.created_by)
    .bind(new.created_at)
    .bind(new.expires_at)
    .fetch_one(&mut *conn)
    .await
}

impl Database {
    /// Start a transaction for multi-row writes.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool().begin().await
    }

    // ── Matches ───────────────────────────────────────────────────────

    pub async fn get_match(&self, id: i64) -> Result<Option<Match>, sqlx::Error> {
        sqlx::query_as::<_, Match>("SELECT * FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    /// Most recent matches first, optionally filtered by status.
    pub async fn list_matches_by_status(
        &self,
        status: Option<MatchStatus>,
        limit: i64,
    ) -> Result<Vec<Match>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Match>(
                    "SELECT * FROM matches WHERE match_status = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query_as::<_, Match>("SELECT * FROM matches ORDER BY id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
            }
        }
    }

    /// Waiting matches whose deadline is strictly before `now`.
    pub async fn list_expired_waiting_matches(&self, now: i64) -> Result<Vec<Match>, sqlx::Error> {
        sqlx::query_as::<_, Match>(
            "SELECT * FROM matches WHERE match_status = 'waiting' AND expires_at < ? ORDER BY id",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await
    }

    /// Move a match from waiting to expired. Returns false when the match is
    /// no longer waiting or not yet past its deadline.
    pub async fn expire_match_if_waiting(&self, id: i64, now: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE matches SET match_status = 'expired' \
             WHERE id = ? AND match_status = 'waiting' AND expires_at < ?",
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set the status. Returns false if the stored status is no
    /// longer `from`.
    pub async fn update_match_status(
        &self,
        id: i64,
        from: MatchStatus,
        to: MatchStatus,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE matches SET match_status = ? WHERE id = ? AND match_status = ?")
                .bind(to)
                .bind(id)
                .bind(from)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the winner and mark the match completed, provided it is still
    /// in status `from`.
    pub async fn set_match_winner(
        &self,
        id: i64,
        from: MatchStatus,
        winner_team_id: i64,
        match_elo: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE matches SET winner_team_id = ?, match_elo = COALESCE(?, match_elo), match_status = 'completed' \
             WHERE id = ? AND match_status = ?",
        )
        .bind(winner_team_id)
        .bind(match_elo)
        .bind(id)
        .bind(from)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Game teams ────────────────────────────────────────────────────

    pub async fn get_game_team(&self, id: i64) -> Result<Option<GameTeam>, sqlx::Error> {
        sqlx::query_as::<_, GameTeam>("SELECT id, bots, created_at FROM game_teams WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }
}
