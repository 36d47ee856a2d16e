use agora_types::models::FriendRequestStatus;
use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{FriendRequestRow, UserRow};
use crate::queries::users::{USER_COLUMNS, map_user};

const REQUEST_COLUMNS: &str = "id, from_user_id, to_user_id, status, created_at, responded_at";

/// Ids of everyone with an approved request to or from `?1`.
pub(crate) const FRIEND_IDS_SQL: &str = "SELECT to_user_id FROM friend_requests
     WHERE from_user_id = ?1 AND status = 'approved'
     UNION
     SELECT from_user_id FROM friend_requests
     WHERE to_user_id = ?1 AND status = 'approved'";

fn map_request(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    let status: String = row.get(3)?;
    let status = status
        .parse::<FriendRequestStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(FriendRequestRow {
        id: row.get(0)?,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        status,
        created_at: row.get(4)?,
        responded_at: row.get(5)?,
    })
}

/// Insert a pending request. A second pending request for the same ordered
/// pair fails with a unique violation.
pub fn insert_request(conn: &Connection, from_user_id: i64, to_user_id: i64) -> Result<FriendRequestRow> {
    conn.execute(
        "INSERT INTO friend_requests (from_user_id, to_user_id, status, created_at)
         VALUES (?1, ?2, 'pending', ?3)",
        params![from_user_id, to_user_id, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    request_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("friend request {} vanished after insert", id))
}

pub fn request_by_id(conn: &Connection, id: i64) -> Result<Option<FriendRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_request).optional()?)
}

/// The pending request sent by `from_user_id` to `to_user_id`, if any.
pub fn pending_between(
    conn: &Connection,
    from_user_id: i64,
    to_user_id: i64,
) -> Result<Option<FriendRequestRow>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM friend_requests
         WHERE from_user_id = ?1 AND to_user_id = ?2 AND status = 'pending'"
    );
    Ok(conn
        .query_row(&sql, params![from_user_id, to_user_id], map_request)
        .optional()?)
}

/// Pending requests addressed to `user_id`, oldest first.
pub fn incoming_pending(conn: &Connection, user_id: i64) -> Result<Vec<FriendRequestRow>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM friend_requests
         WHERE to_user_id = ?1 AND status = 'pending'
         ORDER BY created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], map_request)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Move a pending request to `status`. Returns the updated row, or `None`
/// when the request was no longer pending.
pub fn resolve(
    conn: &Connection,
    id: i64,
    status: FriendRequestStatus,
) -> Result<Option<FriendRequestRow>> {
    let changed = conn.execute(
        "UPDATE friend_requests SET status = ?2, responded_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        params![id, status.as_str(), Utc::now()],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    request_by_id(conn, id)
}

/// Whether an approved request exists between `a` and `b` in either direction.
pub fn are_friends(conn: &Connection, a: i64, b: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM friend_requests
             WHERE status = 'approved'
               AND ((from_user_id = ?1 AND to_user_id = ?2)
                 OR (from_user_id = ?2 AND to_user_id = ?1))
             LIMIT 1",
            params![a, b],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Everyone `user_id` is friends with, ordered by username.
pub fn friends_of(conn: &Connection, user_id: i64) -> Result<Vec<UserRow>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id IN ({FRIEND_IDS_SQL}) ORDER BY username"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], map_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
