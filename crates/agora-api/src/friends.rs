//! Friend requests. Friendship itself is never stored: two users are friends
//! when an approved request exists between them in either direction.

use axum::{Extension, Json, extract::State};
use rusqlite::Connection;
use tracing::info;

use agora_db::models::FriendRequestRow;
use agora_db::{friends, is_unique_violation, users};
use agora_types::api::{FriendRequestCreate, FriendRequestRead, FriendRequestRespond};
use agora_types::models::FriendAction;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

const REQUEST_ALREADY_PENDING: &str = "A friend request between these users is already pending.";

pub async fn send_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<FriendRequestCreate>,
) -> Result<Json<FriendRequestRead>, ApiError> {
    let from_user_id = user.id;
    let request = state
        .transact(move |conn| create_request(conn, from_user_id, body.to_user_id))
        .await?;

    info!(
        "{} ({}) sent friend request {} to {}",
        user.username, user.id, request.id, request.to_user_id
    );
    Ok(Json(request.into()))
}

pub async fn incoming(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<FriendRequestRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| Ok(friends::incoming_pending(conn, user_id)?))
        .await?;
    Ok(Json(rows.into_iter().map(FriendRequestRead::from).collect()))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<FriendRequestRespond>,
) -> Result<Json<FriendRequestRead>, ApiError> {
    let user_id = user.id;
    let request = state
        .transact(move |conn| respond_to_request(conn, user_id, body.request_id, body.action))
        .await?;

    info!(
        "{} ({}) marked friend request {} as {}",
        user.username, user.id, request.id, request.status
    );
    Ok(Json(request.into()))
}

pub fn create_request(
    conn: &Connection,
    from_user_id: i64,
    to_user_id: i64,
) -> Result<FriendRequestRow, ApiError> {
    if from_user_id == to_user_id {
        return Err(ApiError::bad_request(
            "You cannot send a friend request to yourself.",
        ));
    }
    if users::by_id(conn, to_user_id)?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }
    if friends::are_friends(conn, from_user_id, to_user_id)? {
        return Err(ApiError::bad_request("You are already friends with this user."));
    }
    if friends::pending_between(conn, from_user_id, to_user_id)?.is_some()
        || friends::pending_between(conn, to_user_id, from_user_id)?.is_some()
    {
        return Err(ApiError::conflict(REQUEST_ALREADY_PENDING));
    }

    match friends::insert_request(conn, from_user_id, to_user_id) {
        Ok(row) => Ok(row),
        Err(e) if is_unique_violation(&e) => Err(ApiError::conflict(REQUEST_ALREADY_PENDING)),
        Err(e) => Err(e.into()),
    }
}

/// Only the recipient may answer, and only once.
pub fn respond_to_request(
    conn: &Connection,
    user_id: i64,
    request_id: i64,
    action: FriendAction,
) -> Result<FriendRequestRow, ApiError> {
    let request = friends::request_by_id(conn, request_id)?
        .ok_or_else(|| ApiError::not_found("Friend request not found."))?;
    if request.to_user_id != user_id {
        return Err(ApiError::forbidden(
            "You can only respond to requests sent to you.",
        ));
    }

    friends::resolve(conn, request_id, action.resulting_status())?
        .ok_or_else(|| ApiError::conflict("This friend request has already been handled."))
}
