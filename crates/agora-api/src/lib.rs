//! REST surface for Agora.
//!
//! [`router`] assembles every route over a shared [`state::AppState`]. The
//! binary adds CORS and HTTP tracing on top.

pub mod auth;
pub mod chat;
pub mod error;
pub mod friends;
pub mod groups;
pub mod middleware;
pub mod posts;
pub mod state;
pub mod users;


use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

async fn health() -> Json<Value> {
    Json(json!({ "message": "Agora API is running" }))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Token arrives as a query parameter and is checked in the handler
        .route("/chat/ws/{chat_id}", get(chat::ws_upgrade));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        // Users
        .route(
            "/users/me",
            get(users::me).put(users::update_me).delete(users::deactivate_me),
        )
        .route("/users/{id}", get(users::get_user))
        .route("/friends", get(users::list_friends))
        // Friend requests
        .route(
            "/friend-request",
            get(friends::incoming).post(friends::send_request),
        )
        .route("/friend-request/respond", post(friends::respond))
        // Posts
        .route("/post", get(posts::list_all).post(posts::create))
        .route("/post/feed", get(posts::feed))
        .route(
            "/post/{id}",
            get(posts::get).put(posts::update).delete(posts::delete),
        )
        .route("/wall/{user_id}", get(posts::wall))
        // Groups
        .route("/groups", get(groups::list).post(groups::create))
        .route("/groups/{id}", get(groups::get).put(groups::update))
        .route("/groups/{id}/join", post(groups::join))
        .route("/groups/{id}/leave", post(groups::leave))
        .route(
            "/groups/{id}/posts",
            get(groups::list_posts).post(groups::create_post),
        )
        .route("/groups/{id}/members", get(groups::members))
        .route("/groups/{id}/members/{user_id}", delete(groups::remove_member))
        // Chat
        .route("/chat/chats", get(chat::list_chats))
        .route(
            "/chat/chats/{chat_id}/messages",
            get(chat::get_messages).post(chat::send_in_chat),
        )
        .route("/chat/send", post(chat::send_direct))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
