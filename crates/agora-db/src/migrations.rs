use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                display_name    TEXT,
                bio             TEXT,
                avatar_url      TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            -- Friendship is never stored directly; it is derived from
            -- approved rows in either direction.
            CREATE TABLE friend_requests (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                from_user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'approved', 'denied')),
                created_at      TEXT NOT NULL,
                responded_at    TEXT,
                CHECK (from_user_id != to_user_id)
            );

            CREATE UNIQUE INDEX idx_friend_requests_pending_pair
                ON friend_requests(from_user_id, to_user_id) WHERE status = 'pending';
            CREATE INDEX idx_friend_requests_to ON friend_requests(to_user_id, status);

            CREATE TABLE posts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_posts_user ON posts(user_id, created_at);

            CREATE TABLE user_groups (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                description     TEXT,
                owner_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE group_memberships (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id        INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_admin        INTEGER NOT NULL DEFAULT 0,
                joined_at       TEXT NOT NULL,
                UNIQUE (group_id, user_id)
            );

            CREATE TABLE group_posts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id        INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_group_posts_group ON group_posts(group_id, created_at);

            -- Participants are stored ordered so a pair maps to one row.
            CREATE TABLE conversations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user1_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user2_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                CHECK (user1_id < user2_id),
                UNIQUE (user1_id, user2_id)
            );

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                timestamp       TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
