// Prometheus metrics definitions for the matchgate backend.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Issuance ─────────────────────────────────────────────────────

    /// Matches created, by match type.
    pub static ref MATCHES_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("matchgate_matches_created_total", "Total matches created"),
        &["match_type"],
    )
    .unwrap();

    pub static ref TOKENS_ISSUED_TOTAL: IntCounter = IntCounter::new(
        "matchgate_tokens_issued_total",
        "Total entry tokens issued",
    )
    .unwrap();

    /// Candidate tokens that hit an existing token string.
    pub static ref TOKEN_COLLISIONS_TOTAL: IntCounter = IntCounter::new(
        "matchgate_token_collisions_total",
        "Generated tokens rejected by the uniqueness constraint",
    )
    .unwrap();

    /// Issuance requests that ran out of retries. Non-zero means the token
    /// space or generator needs attention.
    pub static ref TOKEN_GENERATION_EXHAUSTED_TOTAL: IntCounter = IntCounter::new(
        "matchgate_token_generation_exhausted_total",
        "Issuance requests that exhausted the token retry budget",
    )
    .unwrap();

    // ── Validation & redemption ──────────────────────────────────────

    pub static ref TOKEN_VALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("matchgate_token_validations_total", "Token validations by outcome"),
        &["outcome"],
    )
    .unwrap();

    pub static ref TOKEN_REDEMPTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("matchgate_token_redemptions_total", "Token redemptions by outcome"),
        &["outcome"],
    )
    .unwrap();

    // ── Reaper ───────────────────────────────────────────────────────

    pub static ref MATCHES_EXPIRED_TOTAL: IntCounter = IntCounter::new(
        "matchgate_matches_expired_total",
        "Waiting matches moved to expired by the reaper",
    )
    .unwrap();

    pub static ref REAPER_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "matchgate_reaper_failures_total",
        "Reaper errors (per match or whole sweep)",
    )
    .unwrap();

    pub static ref REAPER_SWEEP_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("matchgate_reaper_sweep_duration_seconds", "Reaper sweep duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .unwrap();

    // ── HTTP ─────────────────────────────────────────────────────────

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("matchgate_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "matchgate_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(MATCHES_CREATED_TOTAL.clone()),
            Box::new(TOKENS_ISSUED_TOTAL.clone()),
            Box::new(TOKEN_COLLISIONS_TOTAL.clone()),
            Box::new(TOKEN_GENERATION_EXHAUSTED_TOTAL.clone()),
            Box::new(TOKEN_VALIDATIONS_TOTAL.clone()),
            Box::new(TOKEN_REDEMPTIONS_TOTAL.clone()),
            Box::new(MATCHES_EXPIRED_TOTAL.clone()),
            Box::new(REAPER_FAILURES_TOTAL.clone()),
            Box::new(REAPER_SWEEP_DURATION_SECONDS.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::error!("Failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: numeric segments become `:id` and
/// token-shaped segments (UUIDs) become `:token`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else if uuid::Uuid::parse_str(segment).is_ok() {
                ":token"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/matches"), "/api/matches");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_normalize_path_with_ids() {
        assert_eq!(normalize_path("/api/matches/42"), "/api/matches/:id");
        assert_eq!(
            normalize_path("/api/matches/42/readiness"),
            "/api/matches/:id/readiness"
        );
    }

    #[test]
    fn test_normalize_path_with_tokens() {
        assert_eq!(
            normalize_path("/api/tokens/67e55044-10b1-426f-9247-bb680e5fe0c8/match"),
            "/api/tokens/:token/match"
        );
        assert_eq!(normalize_path("/api/tokens/redeem"), "/api/tokens/redeem");
    }

    #[test]
    fn test_register_twice_and_gather() {
        register_metrics();
        register_metrics();
        TOKENS_ISSUED_TOTAL.inc();
        let output = gather_metrics();
        assert!(output.contains("matchgate_tokens_issued_total"));
    }

    #[test]
    fn test_metric_increments() {
        MATCHES_CREATED_TOTAL.with_label_values(&["pvp"]).inc();
        TOKEN_VALIDATIONS_TOTAL.with_label_values(&["valid"]).inc();
        TOKEN_REDEMPTIONS_TOTAL
            .with_label_values(&["redeemed"])
            .inc();
        let before = MATCHES_EXPIRED_TOTAL.get();
        MATCHES_EXPIRED_TOTAL.inc();
        assert_eq!(MATCHES_EXPIRED_TOTAL.get(), before + 1);
        REAPER_SWEEP_DURATION_SECONDS.observe(0.01);
        API_REQUEST_DURATION_SECONDS
            .with_label_values(&["/api/matches"])
            .observe(0.05);
        API_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/matches", "200"])
            .inc();
    }
}
