use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use agora_db::{friends, users};
use agora_types::api::{Detail, FriendRead, UserRead, UserUpdate};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserRead> {
    Json(user.into())
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserRead>, ApiError> {
    let user_id = user.id;
    let updated = state
        .transact(move |conn| {
            users::update_profile(conn, user_id, &update)?
                .ok_or_else(|| ApiError::not_found("User not found."))
        })
        .await?;
    Ok(Json(updated.into()))
}

/// Soft-delete: the account stays, but its tokens stop authenticating.
pub async fn deactivate_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Detail>, ApiError> {
    let user_id = user.id;
    state
        .transact(move |conn| Ok(users::set_active(conn, user_id, false)?))
        .await?;

    info!("{} ({}) deactivated their account", user.username, user.id);
    Ok(Json(Detail::new("Account deactivated.")))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRead>, ApiError> {
    let user = state
        .transact(move |conn| {
            users::by_id(conn, user_id)?.ok_or_else(|| ApiError::not_found("User not found."))
        })
        .await?;
    Ok(Json(user.into()))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<FriendRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| Ok(friends::friends_of(conn, user_id)?))
        .await?;
    Ok(Json(rows.into_iter().map(FriendRead::from).collect()))
}
