use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{Extension, Form, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use rusqlite::Connection;
use tracing::info;

use agora_db::models::UserRow;
use agora_db::{is_unique_violation, users};
use agora_types::api::{Claims, Detail, LoginForm, RegisterRequest, TokenResponse, UserRead};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, AppStateInner};

const USERNAME_TAKEN: &str = "Username is already taken.";
const EMAIL_REGISTERED: &str = "Email is already registered.";

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let password_hash = hash_password(&state.hasher, req.password.clone()).await?;
    let user = state
        .transact(move |conn| register_user(conn, &req.username, &req.email, &password_hash))
        .await?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(UserRead::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = form.username.clone();
    let user = state
        .transact(move |conn| Ok(users::by_username(conn, &username)?))
        .await?;

    // Unknown, deactivated and wrong-password logins all look the same,
    // and all pay for one Argon2 verification.
    let (user, stored_hash) = match user {
        Some(user) if user.is_active => {
            let hash = user.password_hash.clone();
            (Some(user), hash)
        }
        _ => (None, decoy_hash(&state).await?),
    };
    let verified = verify_password(&state.hasher, form.password, stored_hash).await?;
    let user = match user {
        Some(user) if verified => user,
        _ => return Err(ApiError::InvalidCredentials),
    };

    let token = create_token(&state.jwt_secret, &user.username, state.token_ttl)?;
    info!("{} ({}) logged in", user.username, user.id);
    Ok(Json(TokenResponse::bearer(token)))
}

/// Tokens are stateless; logging out only confirms the token was valid.
pub async fn logout(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<Detail> {
    info!("{} ({}) logged out", user.username, user.id);
    Json(Detail::new(
        "Logged out successfully. Please remove the token on the client side.",
    ))
}

/// Create the user unless the username or email is already in use.
pub fn register_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, ApiError> {
    if users::by_username(conn, username)?.is_some() {
        return Err(ApiError::conflict(USERNAME_TAKEN));
    }
    if users::email_taken(conn, email)? {
        return Err(ApiError::conflict(EMAIL_REGISTERED));
    }

    match users::insert(conn, username, email, password_hash) {
        Ok(user) => Ok(user),
        // Lost a race with a concurrent registration.
        Err(e) if is_unique_violation(&e) => {
            Err(ApiError::conflict(duplicate_detail(conn, username)?))
        }
        Err(e) => Err(e.into()),
    }
}

/// Which of the two unique fields an existing account already holds.
fn duplicate_detail(conn: &Connection, username: &str) -> Result<&'static str, ApiError> {
    if users::by_username(conn, username)?.is_some() {
        Ok(USERNAME_TAKEN)
    } else {
        Ok(EMAIL_REGISTERED)
    }
}

async fn decoy_hash(state: &AppStateInner) -> Result<String, ApiError> {
    state
        .login_decoy
        .get_or_try_init(|| hash_password(&state.hasher, "agora-login-decoy".to_string()))
        .await
        .cloned()
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = req.username.chars().count();
    if !(3..=50).contains(&username_len) || req.username.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request(
            "Username must be 3 to 50 characters without spaces.",
        ));
    }
    if !is_plausible_email(&req.email) {
        return Err(ApiError::bad_request("Email address is not valid."));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters.",
        ));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > 255 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Hash with Argon2id on the blocking pool.
pub async fn hash_password(hasher: &Argon2<'static>, password: String) -> Result<String, ApiError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("argon2 error: {}", e)))
    })
    .await?
}

pub async fn verify_password(
    hasher: &Argon2<'static>,
    password: String,
    stored_hash: String,
) -> Result<bool, ApiError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
        Ok(hasher.verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await?
}

/// Mint an HS256 token whose subject is the username.
pub fn create_token(secret: &str, username: &str, ttl: Duration) -> anyhow::Result<String> {
    let now = Utc::now();
    let expires = now
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow::anyhow!("token lifetime {} is out of range", ttl))?;
    let claims = Claims {
        sub: username.to_string(),
        iat: now.timestamp() as usize,
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn token_subject_round_trips() {
        let token = create_token("secret", "alice", Duration::minutes(5)).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = create_token("secret", "alice", Duration::minutes(5)).unwrap();
        assert!(matches!(
            decode_token("other", &token),
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token("secret", "alice", Duration::hours(-2)).unwrap();
        assert!(matches!(
            decode_token("secret", &token),
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[test]
    fn duplicate_detail_names_the_field_in_use() {
        let db = agora_db::Database::open_in_memory().unwrap();
        db.unit_of_work(|conn| {
            users::insert(conn, "alice", "alice@example.com", "h")?;
            assert_eq!(duplicate_detail(conn, "alice")?, USERNAME_TAKEN);
            assert_eq!(duplicate_detail(conn, "alicia")?, EMAIL_REGISTERED);
            Ok::<_, ApiError>(())
        })
        .unwrap();
    }

    #[test]
    fn oversized_lifetime_is_an_error_not_a_panic() {
        let result = create_token("secret", "alice", Duration::minutes(1_000_000_000_000));
        assert!(result.is_err());
    }

    #[test]
    fn registration_validation() {
        assert!(validate_registration(&request("alice", "a@example.com", "password1")).is_ok());
        assert!(validate_registration(&request("al", "a@example.com", "password1")).is_err());
        assert!(validate_registration(&request("al ice", "a@example.com", "password1")).is_err());
        assert!(validate_registration(&request("alice", "not-an-email", "password1")).is_err());
        assert!(validate_registration(&request("alice", "a@b@c", "password1")).is_err());
        assert!(validate_registration(&request("alice", "a@example.com", "short")).is_err());
    }

    #[tokio::test]
    async fn password_hash_verifies_only_the_same_password() {
        let hasher = Argon2::default();
        let hash = hash_password(&hasher, "correct horse".into()).await.unwrap();
        assert!(!hash.contains("correct horse"));
        assert!(verify_password(&hasher, "correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password(&hasher, "wrong horse".into(), hash).await.unwrap());
    }
}
