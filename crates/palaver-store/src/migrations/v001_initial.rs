//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `friendships`, `friend_requests`,
//! `chats`, `chat_participants`, `messages`, `reactions` and
//! `message_reads`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username   TEXT NOT NULL UNIQUE,        -- case-sensitive
    is_online  INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    last_seen  TEXT,                        -- RFC-3339, set on transition to offline
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Friendships (one row per unordered pair, user_a < user_b)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    user_a     TEXT NOT NULL,
    user_b     TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_a, user_b),
    CHECK (user_a < user_b),
    FOREIGN KEY (user_a) REFERENCES users(id),
    FOREIGN KEY (user_b) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Pending friend requests (directed edges)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    from_id    TEXT NOT NULL,
    to_id      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (from_id, to_id),
    FOREIGN KEY (from_id) REFERENCES users(id),
    FOREIGN KEY (to_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_friend_requests_to ON friend_requests(to_id);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    participant_key TEXT NOT NULL UNIQUE,       -- sorted participant ids joined with ':'
    last_message_id TEXT,                       -- points into messages(id); set after insert
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_participants (
    chat_id TEXT NOT NULL,
    user_id TEXT NOT NULL,

    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_chat_participants_user ON chat_participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    chat_id    TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    content    TEXT NOT NULL,
    kind       TEXT NOT NULL DEFAULT 'text',    -- text | image | gif
    created_at TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, created_at DESC);

-- ----------------------------------------------------------------
-- Reactions (append-only, rowid preserves arrival order)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_reactions_message ON reactions(message_id);

-- ----------------------------------------------------------------
-- Read receipts (composite PK makes marking idempotent)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_reads (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    read_at    TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
