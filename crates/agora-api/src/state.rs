use std::sync::Arc;

use argon2::Argon2;
use chrono::Duration;
use rusqlite::Connection;
use tokio::sync::OnceCell;

use agora_db::Database;
use agora_gateway::ChatRegistry;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub hasher: Argon2<'static>,
    pub chat: ChatRegistry,
    /// Hash checked when a login names no usable account, so those attempts
    /// cost the same Argon2 work as a wrong password.
    pub login_decoy: OnceCell<String>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, token_ttl: Duration) -> Self {
        Self {
            db,
            jwt_secret,
            token_ttl,
            hasher: Argon2::default(),
            chat: ChatRegistry::new(),
            login_decoy: OnceCell::new(),
        }
    }

    /// Run `f` as one unit of work on the blocking pool.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise; the connection is
    /// released before this returns in both cases.
    pub async fn transact<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.unit_of_work(f)).await?
    }
}
