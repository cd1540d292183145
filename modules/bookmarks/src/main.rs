//! Bookmarks Module Service: saved URLs that expire unless pinned.
//!
//! Unpinned bookmarks live for `BOOKMARKS_EXPIRY_DAYS` and are removed by a
//! periodic sweep. Subscribed RSS/Atom feeds are polled and every new item
//! becomes an unpinned bookmark.
//!
//! Default: http://127.0.0.1:9201/

mod db;
mod feeds;
mod routes;

use db::Db;
use routes::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};

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

    let port: u16 = env_or("BOOKMARKS_PORT", 9201);
    let db_path = std::env::var("BOOKMARKS_DB_PATH")
        .unwrap_or_else(|_| "./.db/bookmarks.db".to_string());
    let expiry_days: i64 = env_or("BOOKMARKS_EXPIRY_DAYS", 7);
    let sweep_secs: u64 = env_or("BOOKMARKS_SWEEP_INTERVAL_SECS", 3600);
    let poll_secs: u64 = env_or("BOOKMARKS_FEED_POLL_INTERVAL_SECS", 1800);

    let db = match Db::open(&db_path, expiry_days) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to open database at {}: {}", db_path, e);
            std::process::exit(1);
        }
    };
    log::info!("Opened bookmarks database at {} (expiry {} days)", db_path, expiry_days);

    let state = Arc::new(AppState {
        db,
        http: reqwest::Client::new(),
        start_time: Instant::now(),
    });

    // Expiry sweep; the first tick fires immediately so stale rows go at startup
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs.max(1)));
            loop {
                interval.tick().await;
                match state.db.sweep_expired(chrono::Utc::now()) {
                    Ok(0) => {}
                    Ok(n) => log::info!("[BOOKMARKS] Swept {} expired bookmarks", n),
                    Err(e) => log::error!("[BOOKMARKS] Sweep failed: {}", e),
                }
            }
        });
    }

    // Feed polling (0 = disabled)
    if poll_secs > 0 {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
            interval.tick().await; // skip immediate tick
            loop {
                interval.tick().await;
                if let Err(e) = feeds::poll_all(&state.db, &state.http).await {
                    log::error!("[FEEDS] Scheduled poll failed: {}", e);
                }
            }
        });
        log::info!("Feed polling enabled (every {}s)", poll_secs);
    }

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::router(state).layer(cors);

    let addr = format!("127.0.0.1:{}", port);
    log::info!("Bookmarks Module Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
