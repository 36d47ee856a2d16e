use agora_types::api::UserUpdate;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::UserRow;

pub(crate) const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, \
     display_name, bio, avatar_url, created_at, updated_at";

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        display_name: row.get(5)?,
        bio: row.get(6)?,
        avatar_url: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn insert(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (username, email, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![username, email, password_hash, now],
    )?;
    let id = conn.last_insert_rowid();
    by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
}

pub fn by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_user).optional()?)
}

pub fn by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
    Ok(conn.query_row(&sql, [username], map_user).optional()?)
}

pub fn email_taken(conn: &Connection, email: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Apply the fields present in `update`; absent fields keep their value.
pub fn update_profile(conn: &Connection, id: i64, update: &UserUpdate) -> Result<Option<UserRow>> {
    conn.execute(
        "UPDATE users SET
             display_name = COALESCE(?2, display_name),
             bio          = COALESCE(?3, bio),
             avatar_url   = COALESCE(?4, avatar_url),
             updated_at   = ?5
         WHERE id = ?1",
        params![id, update.display_name, update.bio, update.avatar_url, Utc::now()],
    )?;
    by_id(conn, id)
}

/// Flip the soft-delete flag. Returns false when no such user exists.
pub fn set_active(conn: &Connection, id: i64, active: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, active, Utc::now()],
    )?;
    Ok(changed == 1)
}
