//! # palaver-server
//!
//! Real-time chat server binary.
//!
//! This binary provides:
//! - **WebSocket endpoint** (`/ws`) carrying the JSON event protocol:
//!   join, messaging, friend requests, reactions, read receipts and
//!   typing indicators
//! - **SQLite-backed directory store** for users, chats and messages
//! - **REST endpoints** (axum) for health checks and instance info

mod api;
mod config;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_core::{ChatCore, CoreConfig};
use palaver_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,palaver_server=debug,palaver_core=debug")
            }),
        )
        .init();

    info!("Starting Palaver server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the directory store
    // -----------------------------------------------------------------------
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    // -----------------------------------------------------------------------
    // 4. Build the coordination core
    // -----------------------------------------------------------------------
    let core = Arc::new(ChatCore::new(
        database,
        CoreConfig {
            typing_timeout: Duration::from_millis(config.typing_timeout_ms),
            max_message_len: config.max_message_len,
        },
    ));

    let http_addr = config.http_addr;
    let state = AppState {
        core,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
