use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod config;
mod controllers;
mod db;
mod models;
mod notes;

use config::Config;
use db::Database;
use notes::NoteIndex;

pub struct AppState {
    pub db: Arc<Database>,
    pub index: Arc<NoteIndex>,
    pub config: Config,
    /// Server start time for uptime calculation
    pub started_at: std::time::Instant,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;
    log::info!("Kasten v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = std::fs::create_dir_all(&config.notes_dir) {
        log::error!("Failed to create notes directory {:?}: {}", config.notes_dir, e);
    }
    log::info!("Using notes directory: {:?}", config.notes_dir);

    log::info!("Opening index database at {}", config.database_url);
    let db = Arc::new(
        Database::new(&config.database_url)
            .map_err(|e| std::io::Error::other(format!("Failed to open database: {}", e)))?,
    );

    let index = Arc::new(NoteIndex::new(config.notes_dir.clone(), db.clone()));
    if let Err(e) = index.rescan() {
        log::error!("[KASTEN] Initial scan failed: {}", e);
    }

    // Periodic full rescan (0 = disabled)
    if config.rescan_interval_secs > 0 {
        let index_bg = index.clone();
        let every = config.rescan_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(every));
            interval.tick().await; // skip immediate tick
            loop {
                interval.tick().await;
                let index = index_bg.clone();
                match tokio::task::spawn_blocking(move || index.rescan()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => log::error!("[KASTEN] Periodic rescan failed: {}", e),
                    Err(e) => log::error!("[KASTEN] Periodic rescan task panicked: {}", e),
                }
            }
        });
        log::info!("Background rescan task spawned (every {}s)", every);
    }

    let started_at = std::time::Instant::now();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                index: Arc::clone(&index),
                config: config.clone(),
                started_at,
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config_routes)
            .configure(controllers::notes::config)
    })
    .bind(("0.0.0.0", port))?
    .run();

    log::info!("Kasten listening on http://0.0.0.0:{}", port);

    let server_handle = server.handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        log::info!("Received Ctrl+C, shutting down...");

        let server_stop = server_handle.stop(true);
        if tokio::time::timeout(std::time::Duration::from_secs(5), server_stop).await.is_err() {
            log::warn!("Timeout waiting for HTTP server to stop, forcing exit...");
        }

        log::info!("Shutdown complete");
    });

    server.await
}
