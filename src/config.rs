// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::game_mode::MatchMode;

/// Tournament-wide match settings. Passed explicitly to the operations that
/// need them.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// How long a freshly issued match (and its tokens) stays claimable.
    pub match_ttl: Duration,
    /// Interval between expiry sweeps.
    pub reaper_interval: Duration,
    /// Generate/insert attempts per token before giving up.
    pub token_retry_limit: u32,
    pub max_tokens_per_team: u32,
    pub allow_practice: bool,
    pub allow_ranked: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            match_ttl: Duration::from_secs(10 * 60),
            reaper_interval: Duration::from_secs(5 * 60),
            token_retry_limit: 10,
            max_tokens_per_team: 5,
            allow_practice: true,
            allow_ranked: false,
        }
    }
}

impl MatchSettings {
    pub fn match_ttl_millis(&self) -> i64 {
        i64::try_from(self.match_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    pub fn mode_enabled(&self, mode: MatchMode) -> bool {
        match mode {
            MatchMode::Practice => self.allow_practice,
            MatchMode::Ranked => self.allow_ranked,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// HMAC secret shared with the auth service that signs bearer tokens.
    pub jwt_secret: String,
    /// Whether to run in local mode (no auth, no rate limiting).
    pub local_mode: bool,
    pub settings: MatchSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:matchgate.db?mode=rwc".to_string(),
            port: 3000,
            jwt_secret: "matchgate-dev-secret-change-in-production".to_string(),
            local_mode: false,
            settings: MatchSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:matchgate.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `JWT_SECRET` - bearer token signing secret
    /// - `LOCAL_MODE` - Set to `true` to enable local mode
    /// - `MATCH_TTL_SECS` - match/token lifetime (default: 600)
    /// - `REAPER_INTERVAL_SECS` - expiry sweep interval (default: 300)
    /// - `TOKEN_RETRY_LIMIT` - attempts per token (default: 10)
    /// - `MAX_TOKENS_PER_TEAM` - upper bound on team size (default: 5)
    /// - `ALLOW_PRACTICE_MATCHES` / `ALLOW_RANKED_MATCHES` - mode switches
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let defaults = Config::default();

        let database_url = std::env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env_parse("PORT"))
            .unwrap_or(defaults.port);

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            defaults.jwt_secret
        });

        let local_mode =
            args.contains(&"--local".to_string()) || env_flag("LOCAL_MODE").unwrap_or(false);

        let base = MatchSettings::default();
        let settings = MatchSettings {
            match_ttl: env_parse("MATCH_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.match_ttl),
            reaper_interval: env_parse::<u64>("REAPER_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(base.reaper_interval),
            token_retry_limit: env_parse::<u32>("TOKEN_RETRY_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(base.token_retry_limit),
            max_tokens_per_team: env_parse::<u32>("MAX_TOKENS_PER_TEAM")
                .filter(|n| *n > 0)
                .unwrap_or(base.max_tokens_per_team),
            allow_practice: env_flag("ALLOW_PRACTICE_MATCHES").unwrap_or(base.allow_practice),
            allow_ranked: env_flag("ALLOW_RANKED_MATCHES").unwrap_or(base.allow_ranked),
        };

        Config {
            database_url,
            port,
            jwt_secret,
            local_mode,
            settings,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Subject used for the implicit caller in local mode.
pub const LOCAL_USER_ID: &str = "local";
