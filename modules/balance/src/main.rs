//! Balance Module Service: focus sessions with enforced breaks.
//!
//! Traefik points a ForwardAuth middleware at `/auth/check`; while a break
//! is running, guarded sites answer 403 (or redirect) until it ends.
//!
//! Default: http://0.0.0.0:9202/

mod db;
mod rhythm;
mod routes;

use db::Db;
use rhythm::{Rhythm, RhythmConfig};
use routes::AppState;
use std::sync::Arc;
use std::time::Instant;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let port: u16 = env_or("BALANCE_PORT", 9202);
    let db_path = std::env::var("BALANCE_DB_PATH")
        .unwrap_or_else(|_| "./.db/balance.db".to_string());

    let defaults = RhythmConfig::default();
    let config = RhythmConfig {
        session_minutes: env_or("BALANCE_SESSION_MINUTES", defaults.session_minutes),
        short_break_minutes: env_or("BALANCE_SHORT_BREAK_MINUTES", defaults.short_break_minutes),
        long_break_minutes: env_or("BALANCE_LONG_BREAK_MINUTES", defaults.long_break_minutes),
        long_break_every: env_or("BALANCE_LONG_BREAK_EVERY", defaults.long_break_every),
    };
    let blocked_redirect = std::env::var("BALANCE_BLOCKED_REDIRECT")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let db = match Db::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to open database at {}: {}", db_path, e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Opened balance database at {} ({} min sessions, {}/{} min breaks, long every {})",
        db_path,
        config.session_minutes,
        config.short_break_minutes,
        config.long_break_minutes,
        config.long_break_every,
    );
    if let Some(url) = &blocked_redirect {
        log::info!("Blocked requests redirect to {}", url);
    }

    let state = Arc::new(AppState {
        rhythm: Rhythm::new(db, config),
        blocked_redirect,
        start_time: Instant::now(),
    });

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::router(state).layer(cors);

    // Traefik reaches the check over the network, not loopback
    let addr = format!("0.0.0.0:{}", port);
    log::info!("Balance Module Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
