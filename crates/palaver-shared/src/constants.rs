/// Application name
pub const APP_NAME: &str = "Palaver";

/// How long a typing indicator stays alive without a refresh, in
/// milliseconds. Matches the client-side debounce interval.
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 1_000;

/// Maximum chat message length in bytes
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4_096;

/// Minimum number of distinct participants in a conversation
pub const MIN_CHAT_PARTICIPANTS: usize = 2;

/// Default HTTP/WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 3000;
