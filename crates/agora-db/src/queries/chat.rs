use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{ConversationRow, MessageRow};

const CONVERSATION_COLUMNS: &str = "id, user1_id, user2_id, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, timestamp";

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

/// Participant pairs are stored with the smaller id first.
fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a <= b { (a, b) } else { (b, a) }
}

pub fn conversation_by_id(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_conversation).optional()?)
}

/// The conversation between two users, regardless of argument order.
pub fn conversation_between(conn: &Connection, a: i64, b: i64) -> Result<Option<ConversationRow>> {
    let (user1, user2) = ordered(a, b);
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user1_id = ?1 AND user2_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![user1, user2], map_conversation)
        .optional()?)
}

/// Return the conversation between `a` and `b`, creating it if needed.
pub fn get_or_create_conversation(conn: &Connection, a: i64, b: i64) -> Result<ConversationRow> {
    if let Some(existing) = conversation_between(conn, a, b)? {
        return Ok(existing);
    }
    let (user1, user2) = ordered(a, b);
    conn.execute(
        "INSERT INTO conversations (user1_id, user2_id, created_at) VALUES (?1, ?2, ?3)",
        params![user1, user2, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    conversation_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("conversation {} vanished after insert", id))
}

/// Conversations `user_id` takes part in, most recently created first.
pub fn conversations_for(conn: &Connection, user_id: i64) -> Result<Vec<ConversationRow>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE user1_id = ?1 OR user2_id = ?1
         ORDER BY id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], map_conversation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    sender_id: i64,
    content: &str,
) -> Result<MessageRow> {
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_id, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![conversation_id, sender_id, content, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_message)?)
}

/// Message history in append order.
pub fn messages(conn: &Connection, conversation_id: i64) -> Result<Vec<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([conversation_id], map_message)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
