use std::sync::Arc;

use matchgate_backend::api::{self, AppState};
use matchgate_backend::config::Config;
use matchgate_backend::db::Database;
use matchgate_backend::{metrics, reaper};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    if config.local_mode {
        tracing::warn!("Local mode enabled: authentication and rate limiting are off");
    }

    // Background sweep moving stale waiting matches to expired
    reaper::spawn_reaper(db.clone(), config.settings.reaper_interval);

    let port = config.port;
    let app = api::router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to port {port}: {e}"));

    tracing::info!("Matchgate backend listening on port {port}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
