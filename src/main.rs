//! Crunch - A fitness club member registry with geodesic distance statistics.
//!
//! # API Endpoints
//!
//! - `GET /` - Welcome page
//! - `GET /login`, `POST /login` - Login form and credential check
//! - `POST /logout` - End the session
//! - `GET /users`, `POST /users` - List or register members (login required)
//! - `GET /distances` - Distance statistics across all members
//! - `GET /health` - Health check
//!
//! # Configuration
//!
//! - `CRUNCH_PORT` - Listen port (default 8080)
//! - `CRUNCH_DATABASE_URL` - SQLite URL (default `sqlite:crunch.db?mode=rwc`)
//! - `CRUNCH_SEED_FILE` - JSON file of members to load at startup
//! - `CRUNCH_SEED_CLEAR` - Set to `true` to remove existing members before seeding
//! - `CRUNCH_SESSION_TIMEOUT_MINUTES` - Idle session lifetime (default 60)

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crunch::api::{AppState, router};
use crunch::session::{DEFAULT_SESSION_TIMEOUT_MINUTES, SessionStore};
use crunch::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 8080;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:crunch.db?mode=rwc";

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Passwords never reach the logs at any level
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("crunch=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("CRUNCH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("CRUNCH_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let session_timeout: i64 = env::var("CRUNCH_SESSION_TIMEOUT_MINUTES")
        .ok()
        .and_then(|m| m.parse().ok())
        .unwrap_or(DEFAULT_SESSION_TIMEOUT_MINUTES);

    let seed_file = env::var("CRUNCH_SEED_FILE").ok();
    let seed_clear = env::var("CRUNCH_SEED_CLEAR").is_ok_and(|v| v.eq_ignore_ascii_case("true"));

    info!(port, db_url = %db_url, session_timeout, "Starting Crunch server");

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    if let Some(path) = seed_file {
        storage.load_seed(&path, seed_clear).await?;
    }

    let sessions = SessionStore::new(session_timeout);
    spawn_session_sweeper(sessions.clone());

    let app = router(AppState { storage, sessions });

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Crunch is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop sessions that have been idle past their timeout.
fn spawn_session_sweeper(sessions: SessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                debug!(purged, "Expired sessions removed");
            }
        }
    });
}
