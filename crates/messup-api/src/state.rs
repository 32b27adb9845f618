use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use messup_db::Database;
use messup_gateway::Dispatcher;
use messup_types::models::User;

use crate::auth::Authenticator;
use crate::error::ApiError;
use crate::media::MediaStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub authenticator: Arc<dyn Authenticator>,
    pub media: Arc<dyn MediaStore>,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        dispatcher: Dispatcher,
        authenticator: Arc<dyn Authenticator>,
        media: Arc<dyn MediaStore>,
    ) -> AppState {
        Arc::new(Self {
            db,
            dispatcher,
            authenticator,
            media,
        })
    }
}

/// Run blocking DB work off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}

pub async fn require_user_by_id(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    with_db(state, move |db| db.get_user_by_id(id))
        .await?
        .map(|row| row.into_user())
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {}", id)))
}

pub async fn require_user_by_username(state: &AppState, username: &str) -> Result<User, ApiError> {
    let name = username.to_string();
    with_db(state, move |db| db.get_user_by_username(&name))
        .await?
        .map(|row| row.into_user())
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {}", username)))
}
