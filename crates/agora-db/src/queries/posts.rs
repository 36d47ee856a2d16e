use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::PostRow;
use crate::queries::friends::FRIEND_IDS_SQL;

const POST_COLUMNS: &str = "id, user_id, content, created_at, updated_at";

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn collect(conn: &Connection, sql: &str, user_id: Option<i64>) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = match user_id {
        Some(id) => stmt.query_map([id], map_post)?,
        None => stmt.query_map([], map_post)?,
    }
    .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert(conn: &Connection, user_id: i64, content: &str) -> Result<PostRow> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO posts (user_id, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![user_id, content, now],
    )?;
    let id = conn.last_insert_rowid();
    by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("post {} vanished after insert", id))
}

pub fn by_id(conn: &Connection, id: i64) -> Result<Option<PostRow>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_post).optional()?)
}

/// Every post, newest first.
pub fn all(conn: &Connection) -> Result<Vec<PostRow>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC");
    collect(conn, &sql, None)
}

/// One user's posts (their wall), newest first.
pub fn by_user(conn: &Connection, user_id: i64) -> Result<Vec<PostRow>> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
    );
    collect(conn, &sql, Some(user_id))
}

/// Posts by `user_id` or any approved friend, newest first.
pub fn feed(conn: &Connection, user_id: i64) -> Result<Vec<PostRow>> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE user_id = ?1 OR user_id IN ({FRIEND_IDS_SQL})
         ORDER BY created_at DESC, id DESC"
    );
    collect(conn, &sql, Some(user_id))
}

pub fn update_content(conn: &Connection, id: i64, content: &str) -> Result<Option<PostRow>> {
    conn.execute(
        "UPDATE posts SET content = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, content, Utc::now()],
    )?;
    by_id(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? == 1)
}
