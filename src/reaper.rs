// Expiry reaper: periodically moves waiting matches past their deadline to
// `expired`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::MatchSettings;
use crate::db::{self, Database, Match};
use crate::metrics;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Waiting matches found past their deadline.
    pub scanned: usize,
    pub archived: usize,
    pub failed: usize,
}

pub async fn archive_old_queued_matches(db: &Database) -> Result<SweepReport, sqlx::Error> {
    archive_old_queued_matches_at(db, db::now_millis()).await
}

/// Run one sweep as of `now`.
///
/// Failing to list candidates fails the sweep. Failing to expire a single
/// match is logged and counted, and the sweep moves on to the next one.
pub async fn archive_old_queued_matches_at(
    db: &Database,
    now: i64,
) -> Result<SweepReport, sqlx::Error> {
    let started = Instant::now();
    let candidates = db.list_expired_waiting_matches(now).await?;
    let report = expire_candidates(&candidates, now, |id| db.expire_match_if_waiting(id, now)).await;
    metrics::REAPER_SWEEP_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

    if report.scanned > 0 {
        tracing::info!(
            "Reaper sweep: {} expired match(es) found, {} archived, {} failed",
            report.scanned,
            report.archived,
            report.failed
        );
    }
    Ok(report)
}

async fn expire_candidates<F, Fut>(candidates: &[Match], now: i64, mut expire: F) -> SweepReport
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<bool, sqlx::Error>>,
{
    let mut report = SweepReport {
        scanned: candidates.len(),
        ..SweepReport::default()
    };
    for m in candidates {
        match expire(m.id).await {
            Ok(true) => {
                report.archived += 1;
                metrics::MATCHES_EXPIRED_TOTAL.inc();
                let age = Duration::from_millis(u64::try_from(now - m.created_at).unwrap_or(0));
                tracing::info!(
                    "Archived match {} ({}), {}s old",
                    m.id,
                    m.match_type,
                    age.as_secs()
                );
            }
            // Started or completed since the scan.
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                metrics::REAPER_FAILURES_TOTAL.inc();
                tracing::error!("Reaper: failed to expire match {}: {e}", m.id);
            }
        }
    }
    report
}

/// Sweep period to use for a configured interval. A zero period falls back
/// to the default.
fn sweep_period(every: Duration) -> Duration {
    if every.is_zero() {
        let fallback = MatchSettings::default().reaper_interval;
        tracing::warn!(
            "Reaper interval of zero requested, using {}s",
            fallback.as_secs()
        );
        fallback
    } else {
        every
    }
}

/// Spawn the background sweep. The first sweep runs immediately.
pub fn spawn_reaper(db: Arc<Database>, every: Duration) -> tokio::task::JoinHandle<()> {
    let period = sweep_period(every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = archive_old_queued_matches(&db).await {
                metrics::REAPER_FAILURES_TOTAL.inc();
                tracing::error!("Reaper: sweep failed: {e}");
            }
        }
    })
}
