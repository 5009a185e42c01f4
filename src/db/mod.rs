// Database access layer (SQLite via sqlx): match, game team and token stores.

mod matches;
mod tokens;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub use matches::{insert_game_team, insert_match, NewMatch};
pub use tokens::insert_token_if_absent;

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle state of a match.
///
/// `Completed` and `Expired` are terminal. Only the reaper moves a match to
/// `Expired`; the other transitions belong to external completion logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MatchStatus {
    Waiting,
    InProgress,
    Completed,
    Expired,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    /// Transitions callers may request. `Expired` is never a valid target here.
    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::InProgress)
                | (Self::Waiting, Self::Completed)
                | (Self::InProgress, Self::Completed)
        )
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a match a game team plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Red,
    Blue,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Match {
    pub id: i64,
    pub match_type: String,
    pub match_status: MatchStatus,
    pub mode: String,
    pub red_team_id: i64,
    pub blue_team_id: i64,
    pub winner_team_id: Option<i64>,
    pub match_elo: Option<i64>,
    pub created_by: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Match {
    pub fn is_past_deadline(&self, now: i64) -> bool {
        self.expires_at < now
    }

    /// Status as observed at `now`: a waiting match past its deadline reads
    /// as expired even if the reaper has not processed it yet.
    pub fn effective_status(&self, now: i64) -> MatchStatus {
        if self.match_status == MatchStatus::Waiting && self.is_past_deadline(now) {
            MatchStatus::Expired
        } else {
            self.match_status
        }
    }

    pub fn side_of(&self, game_team_id: i64) -> Option<TeamSide> {
        if game_team_id == self.red_team_id {
            Some(TeamSide::Red)
        } else if game_team_id == self.blue_team_id {
            Some(TeamSide::Blue)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameTeam {
    pub id: i64,
    /// JSON array of bot/slot identifiers, in slot order.
    pub bots: String,
    pub created_at: i64,
}

impl GameTeam {
    pub fn slots(&self) -> Vec<i64> {
        serde_json::from_str(&self.bots).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameToken {
    pub id: i64,
    pub token: String,
    pub match_id: i64,
    pub game_team_id: i64,
    pub redeemed_by: Option<String>,
    pub ign: Option<String>,
    pub redeemed_at: Option<i64>,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_active: bool,
}

impl GameToken {
    pub fn is_redeemed(&self) -> bool {
        self.redeemed_by.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Row counts per table, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub matches: i64,
    pub game_teams: i64,
    pub game_tokens: i64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Database opened: {database_url}");

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Private in-memory database on a single connection. Used by tests.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_teams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bots TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_type TEXT NOT NULL,
                match_status TEXT NOT NULL DEFAULT 'waiting',
                mode TEXT NOT NULL,
                red_team_id INTEGER NOT NULL REFERENCES game_teams(id),
                blue_team_id INTEGER NOT NULL REFERENCES game_teams(id),
                winner_team_id INTEGER REFERENCES game_teams(id),
                match_elo INTEGER,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                CHECK (red_team_id <> blue_team_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_matches_status_expires ON matches (match_status, expires_at)",
        )
        .execute(&self.pool)
        .await?;

        // Team references are fixed at creation.
        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS matches_teams_immutable
            BEFORE UPDATE OF red_team_id, blue_team_id ON matches
            WHEN NEW.red_team_id <> OLD.red_team_id OR NEW.blue_team_id <> OLD.blue_team_id
            BEGIN
                SELECT RAISE(ABORT, 'match team references are immutable');
            END
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL UNIQUE,
                match_id INTEGER NOT NULL REFERENCES matches(id),
                game_team_id INTEGER NOT NULL REFERENCES game_teams(id),
                redeemed_by TEXT,
                ign TEXT,
                redeemed_at INTEGER,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_game_tokens_team ON game_tokens (game_team_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_game_tokens_match ON game_tokens (match_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn store_counts(&self) -> Result<StoreCounts, sqlx::Error> {
        let matches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM matches")
            .fetch_one(&self.pool)
            .await?;
        let game_teams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game_teams")
            .fetch_one(&self.pool)
            .await?;
        let game_tokens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreCounts {
            matches,
            game_teams,
            game_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn seed_match(db: &Database, status: MatchStatus, expires_at: i64) -> Match {
        let mut tx = db.pool().begin().await.unwrap();
        let red = insert_game_team(&mut tx, 1_000).await.unwrap();
        let blue = insert_game_team(&mut tx, 1_000).await.unwrap();
        let m = insert_match(
            &mut tx,
            &NewMatch {
                match_type: "pvp",
                match_status: status,
                mode: "practice",
                red_team_id: red.id,
                blue_team_id: blue.id,
                created_by: "user-1",
                created_at: 1_000,
                expires_at,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        m
    }

    #[test]
    fn test_match_status_names() {
        for status in [
            MatchStatus::Waiting,
            MatchStatus::InProgress,
            MatchStatus::Completed,
            MatchStatus::Expired,
        ] {
            assert_eq!(MatchStatus::from_str_name(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::from_str_name("Queuing"), None);
    }

    #[test]
    fn test_status_transitions() {
        assert!(MatchStatus::Waiting.can_transition_to(MatchStatus::InProgress));
        assert!(MatchStatus::Waiting.can_transition_to(MatchStatus::Completed));
        assert!(MatchStatus::InProgress.can_transition_to(MatchStatus::Completed));
        assert!(!MatchStatus::Waiting.can_transition_to(MatchStatus::Expired));
        assert!(!MatchStatus::InProgress.can_transition_to(MatchStatus::Waiting));
        assert!(!MatchStatus::Completed.can_transition_to(MatchStatus::InProgress));
        assert!(!MatchStatus::Expired.can_transition_to(MatchStatus::Completed));
        assert!(MatchStatus::Expired.is_terminal());
        assert!(!MatchStatus::Waiting.is_terminal());
    }

    #[tokio::test]
    async fn test_create_and_get_match() {
        let db = test_db().await;
        let m = seed_match(&db, MatchStatus::Waiting, 5_000).await;

        let fetched = db.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(fetched.match_status, MatchStatus::Waiting);
        assert_eq!(fetched.match_type, "pvp");
        assert_ne!(fetched.red_team_id, fetched.blue_team_id);
        assert_eq!(fetched.side_of(fetched.red_team_id), Some(TeamSide::Red));
        assert_eq!(fetched.side_of(fetched.blue_team_id), Some(TeamSide::Blue));
        assert_eq!(fetched.side_of(-1), None);

        let team = db.get_game_team(fetched.red_team_id).await.unwrap().unwrap();
        assert!(team.slots().is_empty());

        assert!(db.get_match(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_effective_status() {
        let db = test_db().await;
        let m = seed_match(&db, MatchStatus::Waiting, 5_000).await;
        assert_eq!(m.effective_status(5_000), MatchStatus::Waiting);
        assert_eq!(m.effective_status(5_001), MatchStatus::Expired);

        let playing = seed_match(&db, MatchStatus::InProgress, 5_000).await;
        assert_eq!(playing.effective_status(10_000), MatchStatus::InProgress);
    }

    #[tokio::test]
    async fn test_team_references_are_immutable() {
        let db = test_db().await;
        let m = seed_match(&db, MatchStatus::Waiting, 5_000).await;
        let result = sqlx::query("UPDATE matches SET red_team_id = blue_team_id + 100 WHERE id = ?")
            .bind(m.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_token_insert_if_absent() {
        let db = test_db().await;
        let m = seed_match(&db, MatchStatus::Waiting, 5_000).await;
        let mut conn = db.pool().acquire().await.unwrap();

        assert!(insert_token_if_absent(&mut conn, "tok-1", m.id, m.red_team_id, 1_000, 5_000)
            .await
            .unwrap());
        assert!(!insert_token_if_absent(&mut conn, "tok-1", m.id, m.blue_team_id, 1_000, 5_000)
            .await
            .unwrap());
        drop(conn);

        let token = db.get_token("tok-1").await.unwrap().unwrap();
        assert_eq!(token.game_team_id, m.red_team_id);
        assert!(token.is_active);
        assert!(!token.is_redeemed());

        let counts = db.store_counts().await.unwrap();
        assert_eq!(counts.game_tokens, 1);
        assert_eq!(counts.matches, 1);
        assert_eq!(counts.game_teams, 2);
    }

    #[tokio::test]
    async fn test_list_matches_by_status() {
        let db = test_db().await;
        seed_match(&db, MatchStatus::Waiting, 5_000).await;
        seed_match(&db, MatchStatus::Waiting, 6_000).await;
        seed_match(&db, MatchStatus::Completed, 5_000).await;

        let waiting = db
            .list_matches_by_status(Some(MatchStatus::Waiting), 50)
            .await
            .unwrap();
        assert_eq!(waiting.len(), 2);

        let all = db.list_matches_by_status(None, 50).await.unwrap();
        assert_eq!(all.len(), 3);

        let limited = db.list_matches_by_status(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
