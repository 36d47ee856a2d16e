use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::Connection;
use tracing::info;

use agora_db::models::PostRow;
use agora_db::{posts, users};
use agora_types::api::{PostCreate, PostRead};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

fn to_reads(rows: Vec<PostRow>) -> Vec<PostRead> {
    rows.into_iter().map(PostRead::from).collect()
}

/// Reject empty or whitespace-only content.
pub(crate) fn require_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::bad_request("Content must not be empty."));
    }
    Ok(())
}

pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<PostRead>>, ApiError> {
    let rows = state.transact(|conn| Ok(posts::all(conn)?)).await?;
    Ok(Json(to_reads(rows)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<PostCreate>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&body.content)?;

    let user_id = user.id;
    let post = state
        .transact(move |conn| Ok(posts::insert(conn, user_id, &body.content)?))
        .await?;
    Ok((StatusCode::CREATED, Json(PostRead::from(post))))
}

pub async fn get(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<PostRead>, ApiError> {
    let post = state
        .transact(move |conn| find_post(conn, post_id))
        .await?;
    Ok(Json(post.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(post_id): Path<i64>,
    Json(body): Json<PostCreate>,
) -> Result<Json<PostRead>, ApiError> {
    require_content(&body.content)?;

    let user_id = user.id;
    let post = state
        .transact(move |conn| {
            owned_post(conn, post_id, user_id)?;
            posts::update_content(conn, post_id, &body.content)?
                .ok_or_else(|| ApiError::not_found("Post not found."))
        })
        .await?;
    Ok(Json(post.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.id;
    state
        .transact(move |conn| {
            owned_post(conn, post_id, user_id)?;
            Ok(posts::delete(conn, post_id)?)
        })
        .await?;

    info!("{} ({}) deleted post {}", user.username, user.id, post_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Posts by the caller and their friends, newest first.
pub async fn feed(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<PostRead>>, ApiError> {
    let user_id = user.id;
    let rows = state.transact(move |conn| Ok(posts::feed(conn, user_id)?)).await?;
    Ok(Json(to_reads(rows)))
}

pub async fn wall(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<PostRead>>, ApiError> {
    let rows = state
        .transact(move |conn| {
            if users::by_id(conn, user_id)?.is_none() {
                return Err(ApiError::not_found("User not found."));
            }
            Ok(posts::by_user(conn, user_id)?)
        })
        .await?;
    Ok(Json(to_reads(rows)))
}

fn find_post(conn: &Connection, post_id: i64) -> Result<PostRow, ApiError> {
    posts::by_id(conn, post_id)?.ok_or_else(|| ApiError::not_found("Post not found."))
}

fn owned_post(conn: &Connection, post_id: i64, user_id: i64) -> Result<PostRow, ApiError> {
    let post = find_post(conn, post_id)?;
    if post.user_id != user_id {
        return Err(ApiError::forbidden("You can only modify your own posts."));
    }
    Ok(post)
}
