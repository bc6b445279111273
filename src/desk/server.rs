use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::api::{self, AppState, BoardSettings};
use super::db::{DbHandle, DeskDb};
use super::feed::BroadcastFeed;
use super::notify;
use crate::config::DeskConfig;

/// Configuration for the desk server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: std::path::PathBuf,
    pub dev_mode: bool,
    pub feed_capacity: usize,
    pub board: BoardSettings,
    pub notifications: crate::config::NotificationsSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: std::path::PathBuf::from(".brodesk/brodesk.db"),
            dev_mode: false,
            feed_capacity: super::feed::DEFAULT_CAPACITY,
            board: BoardSettings::default(),
            notifications: Default::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &DeskConfig) -> Self {
        let toml = &config.toml;
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            db_path: config.db_path(),
            dev_mode: toml.server.dev_mode,
            feed_capacity: toml.board.feed_capacity,
            board: BoardSettings {
                drag_activation_distance: toml.board.drag_activation_distance,
            },
            notifications: toml.notifications.clone(),
        }
    }
}

/// Full application router: API, change-feed WebSocket and request tracing.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the desk server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = DeskDb::new(&config.db_path).context("Failed to initialize desk database")?;
    let db = DbHandle::new(db);
    let feed = BroadcastFeed::new(config.feed_capacity);
    let sink = notify::sink_from_config(&config.notifications, Some(db.clone()))?;
    let state = Arc::new(AppState::new(db, feed, sink).with_board_settings(config.board));

    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, db = %config.db_path.display(), "BroDesk listening");
    println!("BroDesk running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
