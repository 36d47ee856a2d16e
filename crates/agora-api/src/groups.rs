use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::Connection;
use tracing::info;

use agora_db::models::GroupRow;
use agora_db::{groups, is_unique_violation};
use agora_types::api::{
    Detail, GroupCreate, GroupMemberRead, GroupPostRead, GroupRead, GroupUpdate, PostCreate,
};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::posts::require_content;
use crate::state::AppState;

const NAME_TAKEN: &str = "A group with this name already exists.";
const NOT_A_MEMBER: &str = "You are not a member of this group.";
const JOINED: &str = "Joined the group successfully.";
const ALREADY_A_MEMBER: &str = "Already a member of this group.";

/// Outcome of a join. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

impl JoinOutcome {
    fn detail(self) -> &'static str {
        match self {
            Self::Joined => JOINED,
            Self::AlreadyMember => ALREADY_A_MEMBER,
        }
    }
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<GroupCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = user.id;
    let group = state
        .transact(move |conn| create_group(conn, owner_id, &body))
        .await?;

    info!("{} ({}) created group {} ({})", user.username, user.id, group.name, group.id);
    Ok((StatusCode::CREATED, Json(GroupRead::from(group))))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<GroupRead>>, ApiError> {
    let rows = state.transact(|conn| Ok(groups::list(conn)?)).await?;
    Ok(Json(rows.into_iter().map(GroupRead::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<GroupRead>, ApiError> {
    let group = state.transact(move |conn| find_group(conn, group_id)).await?;
    Ok(Json(group.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    Json(body): Json<GroupUpdate>,
) -> Result<Json<GroupRead>, ApiError> {
    let user_id = user.id;
    let group = state
        .transact(move |conn| update_group(conn, group_id, user_id, &body))
        .await?;
    Ok(Json(group.into()))
}

pub async fn join(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    let user_id = user.id;
    let outcome = state
        .transact(move |conn| join_group(conn, group_id, user_id))
        .await?;

    if outcome == JoinOutcome::Joined {
        info!("{} ({}) joined group {}", user.username, user.id, group_id);
    }
    Ok(Json(Detail::new(outcome.detail())))
}

pub async fn leave(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    let user_id = user.id;
    state
        .transact(move |conn| {
            find_group(conn, group_id)?;
            if !groups::delete_membership(conn, group_id, user_id)? {
                return Err(ApiError::bad_request(NOT_A_MEMBER));
            }
            Ok(())
        })
        .await?;

    info!("{} ({}) left group {}", user.username, user.id, group_id);
    Ok(Json(Detail::new("Left the group successfully.")))
}

pub async fn members(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<GroupMemberRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| {
            require_member(conn, group_id, user_id)?;
            Ok(groups::members(conn, group_id)?)
        })
        .await?;
    Ok(Json(rows.into_iter().map(GroupMemberRead::from).collect()))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((group_id, member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let admin_id = user.id;
    state
        .transact(move |conn| remove_from_group(conn, group_id, admin_id, member_id))
        .await?;

    info!(
        "{} ({}) removed user {} from group {}",
        user.username, user.id, member_id, group_id
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<GroupPostRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| {
            require_member(conn, group_id, user_id)?;
            Ok(groups::posts(conn, group_id)?)
        })
        .await?;
    Ok(Json(rows.into_iter().map(GroupPostRead::from).collect()))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    Json(body): Json<PostCreate>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&body.content)?;

    let user_id = user.id;
    let post = state
        .transact(move |conn| {
            require_member(conn, group_id, user_id)?;
            Ok(groups::insert_post(conn, group_id, user_id, &body.content)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(GroupPostRead::from(post))))
}

// -- Rules --

/// Create a group and make its creator the first admin, in one unit of work.
pub fn create_group(conn: &Connection, owner_id: i64, body: &GroupCreate) -> Result<GroupRow, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Group name must not be empty."));
    }
    if groups::name_taken(conn, name)? {
        return Err(ApiError::conflict(NAME_TAKEN));
    }

    let group = match groups::insert_group(conn, name, body.description.as_deref(), owner_id) {
        Ok(group) => group,
        Err(e) if is_unique_violation(&e) => return Err(ApiError::conflict(NAME_TAKEN)),
        Err(e) => return Err(e.into()),
    };
    groups::insert_membership(conn, group.id, owner_id, true)?;
    Ok(group)
}

/// Admin-only partial update. Fields left out keep their value.
pub fn update_group(
    conn: &Connection,
    group_id: i64,
    user_id: i64,
    body: &GroupUpdate,
) -> Result<GroupRow, ApiError> {
    let group = find_group(conn, group_id)?;
    if !groups::is_admin(conn, group_id, user_id)? {
        return Err(ApiError::forbidden("Only group admins can update the group."));
    }

    let mut update = body.clone();
    if let Some(name) = update.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::bad_request("Group name must not be empty."));
        }
        if *name != group.name && groups::name_taken(conn, name)? {
            return Err(ApiError::conflict(NAME_TAKEN));
        }
    }

    match groups::update(conn, group_id, &update) {
        Ok(Some(group)) => Ok(group),
        Ok(None) => Err(ApiError::not_found("Group not found.")),
        Err(e) if is_unique_violation(&e) => Err(ApiError::conflict(NAME_TAKEN)),
        Err(e) => Err(e.into()),
    }
}

/// Idempotent: joining twice reports `AlreadyMember` and leaves one row.
pub fn join_group(conn: &Connection, group_id: i64, user_id: i64) -> Result<JoinOutcome, ApiError> {
    find_group(conn, group_id)?;
    if groups::is_member(conn, group_id, user_id)? {
        return Ok(JoinOutcome::AlreadyMember);
    }

    match groups::insert_membership(conn, group_id, user_id, false) {
        Ok(_) => Ok(JoinOutcome::Joined),
        Err(e) if is_unique_violation(&e) => Ok(JoinOutcome::AlreadyMember),
        Err(e) => Err(e.into()),
    }
}

pub fn remove_from_group(
    conn: &Connection,
    group_id: i64,
    admin_id: i64,
    member_id: i64,
) -> Result<(), ApiError> {
    find_group(conn, group_id)?;
    if !groups::is_admin(conn, group_id, admin_id)? {
        return Err(ApiError::forbidden("Only group admins can remove members."));
    }
    if !groups::delete_membership(conn, group_id, member_id)? {
        return Err(ApiError::not_found("Member is not part of this group."));
    }
    Ok(())
}

fn find_group(conn: &Connection, group_id: i64) -> Result<GroupRow, ApiError> {
    groups::by_id(conn, group_id)?.ok_or_else(|| ApiError::not_found("Group not found."))
}

/// 404 for an unknown group, 403 for a non-member.
fn require_member(conn: &Connection, group_id: i64, user_id: i64) -> Result<(), ApiError> {
    find_group(conn, group_id)?;
    if !groups::is_member(conn, group_id, user_id)? {
        return Err(ApiError::forbidden(NOT_A_MEMBER));
    }
    Ok(())
}
