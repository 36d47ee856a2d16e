use axum::{
    Extension, Json,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use agora_db::models::ConversationRow;
use agora_db::{chat, friends, users};
use agora_gateway::connection::{Participant, handle_connection, post_message};
use agora_types::api::{ConversationRead, DirectMessageCreate, MessageCreate, MessageRead};

use crate::error::ApiError;
use crate::middleware::{CurrentUser, authenticate};
use crate::posts::require_content;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuth {
    pub token: Option<String>,
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<ConversationRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| Ok(chat::conversations_for(conn, user_id)?))
        .await?;
    Ok(Json(rows.into_iter().map(ConversationRead::from).collect()))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(chat_id): Path<i64>,
) -> Result<Json<Vec<MessageRead>>, ApiError> {
    let user_id = user.id;
    let rows = state
        .transact(move |conn| {
            participant_conversation(conn, chat_id, user_id)?;
            Ok(chat::messages(conn, chat_id)?)
        })
        .await?;
    Ok(Json(rows.into_iter().map(MessageRead::from).collect()))
}

pub async fn send_in_chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(chat_id): Path<i64>,
    Json(body): Json<MessageCreate>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&body.content)?;

    let user_id = user.id;
    state
        .transact(move |conn| participant_conversation(conn, chat_id, user_id))
        .await?;

    let message = post_message(&state.db, &state.chat, chat_id, user.id, body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Direct message to a friend. Opens the conversation on first use.
pub async fn send_direct(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<DirectMessageCreate>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&body.content)?;

    let sender_id = user.id;
    let receiver_id = body.receiver_id;
    let conversation = state
        .transact(move |conn| open_direct_conversation(conn, sender_id, receiver_id))
        .await?;

    let message =
        post_message(&state.db, &state.chat, conversation.id, user.id, body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Browsers cannot set headers on a WebSocket handshake, so the bearer token
/// rides in the query string and is checked here, before the upgrade.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(auth): Query<WsAuth>,
) -> Result<Response, ApiError> {
    let token = auth.token.ok_or_else(ApiError::unauthenticated)?;
    let user = authenticate(&state, &token).await?;

    let user_id = user.id;
    state
        .transact(move |conn| participant_conversation(conn, chat_id, user_id))
        .await?;

    info!("{} ({}) opening live chat {}", user.username, user.id, chat_id);
    let registry = state.chat.clone();
    let db = state.db.clone();
    let participant = Participant {
        conversation_id: chat_id,
        user_id: user.id,
        username: user.username,
    };
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, registry, db, participant)))
}

/// 404 for an unknown conversation, 403 when the user is not one of its two
/// participants.
pub fn participant_conversation(
    conn: &Connection,
    chat_id: i64,
    user_id: i64,
) -> Result<ConversationRow, ApiError> {
    let conversation = chat::conversation_by_id(conn, chat_id)?
        .ok_or_else(|| ApiError::not_found("Chat not found."))?;
    if !conversation.has_participant(user_id) {
        return Err(ApiError::forbidden("You are not a participant in this chat."));
    }
    Ok(conversation)
}

pub fn open_direct_conversation(
    conn: &Connection,
    sender_id: i64,
    receiver_id: i64,
) -> Result<ConversationRow, ApiError> {
    if sender_id == receiver_id {
        return Err(ApiError::bad_request("You cannot message yourself."));
    }
    if users::by_id(conn, receiver_id)?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }
    if !friends::are_friends(conn, sender_id, receiver_id)? {
        return Err(ApiError::forbidden("Users are not friends."));
    }
    Ok(chat::get_or_create_conversation(conn, sender_id, receiver_id)?)
}
