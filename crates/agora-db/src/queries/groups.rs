use agora_types::api::GroupUpdate;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{GroupPostRow, GroupRow, MemberRow, MembershipRow};

const GROUP_COLUMNS: &str = "id, name, description, owner_id, created_at";
const MEMBERSHIP_COLUMNS: &str = "id, group_id, user_id, is_admin, joined_at";

fn map_group(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_membership(row: &Row<'_>) -> rusqlite::Result<MembershipRow> {
    Ok(MembershipRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        is_admin: row.get(3)?,
        joined_at: row.get(4)?,
    })
}

fn map_group_post(row: &Row<'_>) -> rusqlite::Result<GroupPostRow> {
    Ok(GroupPostRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// -- Groups --

/// Insert a group row. A duplicate name fails with a unique violation.
pub fn insert_group(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    owner_id: i64,
) -> Result<GroupRow> {
    conn.execute(
        "INSERT INTO user_groups (name, description, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, description, owner_id, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("group {} vanished after insert", id))
}

pub fn by_id(conn: &Connection, id: i64) -> Result<Option<GroupRow>> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM user_groups WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_group).optional()?)
}

pub fn name_taken(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM user_groups WHERE name = ?1", [name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub fn list(conn: &Connection) -> Result<Vec<GroupRow>> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM user_groups ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_group)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Apply the fields present in `update`; absent fields keep their value.
pub fn update(conn: &Connection, id: i64, update: &GroupUpdate) -> Result<Option<GroupRow>> {
    conn.execute(
        "UPDATE user_groups SET
             name        = COALESCE(?2, name),
             description = COALESCE(?3, description)
         WHERE id = ?1",
        params![id, update.name, update.description],
    )?;
    by_id(conn, id)
}

// -- Memberships --

pub fn membership(conn: &Connection, group_id: i64, user_id: i64) -> Result<Option<MembershipRow>> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM group_memberships WHERE group_id = ?1 AND user_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![group_id, user_id], map_membership)
        .optional()?)
}

pub fn is_member(conn: &Connection, group_id: i64, user_id: i64) -> Result<bool> {
    Ok(membership(conn, group_id, user_id)?.is_some())
}

pub fn is_admin(conn: &Connection, group_id: i64, user_id: i64) -> Result<bool> {
    Ok(membership(conn, group_id, user_id)?.is_some_and(|m| m.is_admin))
}

/// Insert a membership row. An existing row for the same (group, user)
/// fails with a unique violation; see [`crate::is_unique_violation`].
pub fn insert_membership(
    conn: &Connection,
    group_id: i64,
    user_id: i64,
    is_admin: bool,
) -> Result<MembershipRow> {
    conn.execute(
        "INSERT INTO group_memberships (group_id, user_id, is_admin, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![group_id, user_id, is_admin, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM group_memberships WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_membership)?)
}

/// Returns false when there was no such membership.
pub fn delete_membership(conn: &Connection, group_id: i64, user_id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM group_memberships WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, user_id],
    )?;
    Ok(deleted == 1)
}

/// Members with their usernames, in join order.
pub fn members(conn: &Connection, group_id: i64) -> Result<Vec<MemberRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.user_id, u.username, m.is_admin, m.joined_at
         FROM group_memberships m
         JOIN users u ON u.id = m.user_id
         WHERE m.group_id = ?1
         ORDER BY m.id",
    )?;
    let rows = stmt
        .query_map([group_id], |row| {
            Ok(MemberRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                is_admin: row.get(2)?,
                joined_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// -- Group posts --

pub fn insert_post(conn: &Connection, group_id: i64, user_id: i64, content: &str) -> Result<GroupPostRow> {
    conn.execute(
        "INSERT INTO group_posts (group_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![group_id, user_id, content, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(
        "SELECT id, group_id, user_id, content, created_at FROM group_posts WHERE id = ?1",
        [id],
        map_group_post,
    )?)
}

/// Posts in a group, newest first.
pub fn posts(conn: &Connection, group_id: i64) -> Result<Vec<GroupPostRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, user_id, content, created_at FROM group_posts
         WHERE group_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([group_id], map_group_post)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
