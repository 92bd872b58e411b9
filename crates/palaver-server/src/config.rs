//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use palaver_shared::constants::{
    APP_NAME, DEFAULT_HTTP_PORT, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_TYPING_TIMEOUT_MS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database. When unset, the store
    /// picks the platform-appropriate data directory.
    /// Env: `DB_PATH`
    /// Default: none
    pub db_path: Option<PathBuf>,

    /// Typing indicator auto-expiry window, in milliseconds.
    /// Env: `TYPING_TIMEOUT_MS`
    /// Default: `1000` (the client-side debounce interval)
    pub typing_timeout_ms: u64,

    /// Maximum accepted message content length, in bytes.
    /// Env: `MAX_MESSAGE_LEN`
    /// Default: `4096`
    pub max_message_len: usize,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Palaver"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            db_path: None,
            typing_timeout_ms: DEFAULT_TYPING_TIMEOUT_MS,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            instance_name: APP_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("TYPING_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.typing_timeout_ms = ms;
            } else {
                tracing::warn!(value = %val, "Invalid TYPING_TIMEOUT_MS, using default");
            }
        }

        if let Ok(val) = std::env::var("MAX_MESSAGE_LEN") {
            if let Ok(len) = val.parse::<usize>() {
                config.max_message_len = len;
            } else {
                tracing::warn!(value = %val, "Invalid MAX_MESSAGE_LEN, using default");
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
