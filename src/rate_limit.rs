// In-memory rate limiter for match creation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::MatchError;
use crate::game_mode::MatchMode;

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Practice matches created per hour.
    PracticeMatches,
    /// Ranked matches created per hour.
    RankedMatches,
}

impl RateLimitType {
    pub fn for_mode(mode: MatchMode) -> Self {
        match mode {
            MatchMode::Practice => RateLimitType::PracticeMatches,
            MatchMode::Ranked => RateLimitType::RankedMatches,
        }
    }

    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::PracticeMatches => 30,
            RateLimitType::RankedMatches => 10,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::PracticeMatches => write!(f, "practice matches per hour"),
            RateLimitType::RankedMatches => write!(f, "ranked matches per hour"),
        }
    }
}

/// Key for the rate limit map: (requester id, limit_type).
type LimitKey = (String, RateLimitType);

/// Thread-safe in-memory sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    /// A disabled limiter (local mode) admits everything.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LimitKey, Vec<Instant>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event for `requester` if it is within the limit.
    pub fn check_limit(&self, requester: &str, limit_type: RateLimitType) -> Result<(), MatchError> {
        self.check_limit_at(requester, limit_type, Instant::now())
    }

    fn check_limit_at(
        &self,
        requester: &str,
        limit_type: RateLimitType,
        now: Instant,
    ) -> Result<(), MatchError> {
        if !self.enabled {
            return Ok(());
        }
        let max = limit_type.max_count();

        let mut map = self.entries();
        prune(&mut map, now);
        let entries = map
            .entry((requester.to_string(), limit_type))
            .or_default();

        if entries.len() >= max {
            tracing::warn!("Rate limit hit for {requester}: {limit_type}");
            return Err(MatchError::RateLimited(format!(
                "Rate limit exceeded: max {max} {limit_type}"
            )));
        }

        entries.push(now);
        Ok(())
    }

    /// Get the current count for a requester and limit type.
    pub fn current_count(&self, requester: &str, limit_type: RateLimitType) -> usize {
        let window = limit_type.window();
        let now = Instant::now();
        let key = (requester.to_string(), limit_type);
        let mut map = self.entries();
        let count = match map.get_mut(&key) {
            Some(entries) => {
                entries.retain(|t| now.duration_since(*t) < window);
                entries.len()
            }
            None => 0,
        };
        if count == 0 {
            map.remove(&key);
        }
        count
    }
}

/// Drop expired events, and every key left with none.
fn prune(map: &mut HashMap<LimitKey, Vec<Instant>>, now: Instant) {
    map.retain(|(_, limit_type), entries| {
        let window = limit_type.window();
        entries.retain(|t| now.duration_since(*t) < window);
        !entries.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_limit() {
        let limiter = RateLimiter::new(true);
        for _ in 0..10 {
            assert!(limiter
                .check_limit("u1", RateLimitType::RankedMatches)
                .is_ok());
        }
        assert_eq!(limiter.current_count("u1", RateLimitType::RankedMatches), 10);
    }

    #[test]
    fn test_exceeds_limit() {
        let limiter = RateLimiter::new(true);
        for _ in 0..10 {
            limiter
                .check_limit("u1", RateLimitType::RankedMatches)
                .unwrap();
        }
        let err = limiter
            .check_limit("u1", RateLimitType::RankedMatches)
            .unwrap_err();
        assert!(matches!(err, MatchError::RateLimited(_)));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: max 10 ranked matches per hour"
        );
    }

    #[test]
    fn test_separate_requesters_and_types() {
        let limiter = RateLimiter::new(true);
        for _ in 0..10 {
            limiter
                .check_limit("u1", RateLimitType::RankedMatches)
                .unwrap();
        }
        assert!(limiter
            .check_limit("u2", RateLimitType::RankedMatches)
            .is_ok());
        assert!(limiter
            .check_limit("u1", RateLimitType::PracticeMatches)
            .is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(true);
        let start = Instant::now();
        for _ in 0..10 {
            limiter
                .check_limit_at("u1", RateLimitType::RankedMatches, start)
                .unwrap();
        }
        let later = start + Duration::from_secs(3601);
        assert!(limiter
            .check_limit_at("u1", RateLimitType::RankedMatches, later)
            .is_ok());
    }

    #[test]
    fn test_idle_requesters_are_forgotten() {
        let limiter = RateLimiter::new(true);
        let start = Instant::now();
        for requester in ["u1", "u2", "u3"] {
            limiter
                .check_limit_at(requester, RateLimitType::PracticeMatches, start)
                .unwrap();
        }
        assert_eq!(limiter.entries().len(), 3);

        let later = start + Duration::from_secs(3601);
        limiter
            .check_limit_at("u4", RateLimitType::RankedMatches, later)
            .unwrap();
        let map = limiter.entries();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&("u4".to_string(), RateLimitType::RankedMatches)));
    }

    #[test]
    fn test_count_of_unknown_requester_leaves_no_key() {
        let limiter = RateLimiter::new(true);
        assert_eq!(limiter.current_count("nobody", RateLimitType::RankedMatches), 0);
        assert!(limiter.entries().is_empty());
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = RateLimiter::new(false);
        for _ in 0..50 {
            assert!(limiter
                .check_limit("u1", RateLimitType::RankedMatches)
                .is_ok());
        }
        assert_eq!(limiter.current_count("u1", RateLimitType::RankedMatches), 0);
    }
}
