//! API error type and its single mapping onto HTTP responses.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use agora_types::api::Detail;

pub const CREDENTIALS_NOT_VALID: &str = "Could not validate credentials.";
pub const INCORRECT_USERNAME_OR_PASSWORD: &str = "Incorrect username or password.";

/// Every failure a handler can report. Mapped once, in [`IntoResponse`],
/// to a status code and a `{"detail": "..."}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or unresolvable bearer token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Login failed. Deliberately says nothing about which half was wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated(CREDENTIALS_NOT_VALID.to_string())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            Self::Unauthenticated(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::BadRequest(m)
            | Self::Conflict(m) => m,
            Self::InvalidCredentials => INCORRECT_USERNAME_OR_PASSWORD.to_string(),
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error.".to_string()
            }
        };

        let body = Json(Detail { detail });
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_kind_maps_to_its_status() {
        let cases = [
            (ApiError::unauthenticated(), StatusCode::UNAUTHORIZED),
            (ApiError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("no"), StatusCode::FORBIDDEN),
            (ApiError::not_found("gone"), StatusCode::NOT_FOUND),
            (ApiError::bad_request("bad"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("dup"), StatusCode::CONFLICT),
            (ApiError::from(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn unauthorized_responses_advertise_bearer() {
        let resp = ApiError::unauthenticated().into_response();
        assert_eq!(resp.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
        let resp = ApiError::forbidden("no").into_response();
        assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
