use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use agora_db::models::UserRow;
use agora_db::users;
use agora_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner};

/// The authenticated, active user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// Verify signature and expiry, returning the claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::unauthenticated()
    })?;
    Ok(data.claims)
}

/// Resolve a bearer token to exactly one active user, or fail with
/// `Unauthenticated`. Read-only.
pub async fn authenticate(state: &AppStateInner, token: &str) -> Result<UserRow, ApiError> {
    let claims = decode_token(&state.jwt_secret, token)?;
    if claims.sub.is_empty() {
        return Err(ApiError::unauthenticated());
    }

    let user = state
        .transact(move |conn| Ok(users::by_username(conn, &claims.sub)?))
        .await?;
    match user {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ApiError::unauthenticated()),
    }
}

/// Extract the bearer token from the Authorization header and attach the
/// resolved [`CurrentUser`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(ApiError::unauthenticated)?;

    let user = authenticate(&state, bearer.token()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
