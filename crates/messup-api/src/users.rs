use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use messup_types::models::User;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::{AppState, require_user_by_id, require_user_by_username, with_db};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Find one user by username, or by email when no username is given.
/// A username that does not match is NotFound even if an email was passed
/// too.
pub async fn search_user(
    state: &AppState,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<User, ApiError> {
    fn present(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    match (present(username), present(email)) {
        (Some(username), _) => require_user_by_username(state, username).await,
        (None, Some(email)) => {
            let lookup = email.to_string();
            with_db(state, move |db| db.get_user_by_email(&lookup))
                .await?
                .map(|row| row.into_user())
                .ok_or_else(|| ApiError::NotFound(format!("user not found with email: {}", email)))
        }
        (None, None) => Err(ApiError::Validation(
            "either username or email must be provided".into(),
        )),
    }
}

// -- Handlers --

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(require_user_by_id(&state, identity.user_id).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(_identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(require_user_by_username(&state, &username).await?))
}

/// GET /users/search?username=&email=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(_identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user = search_user(&state, query.username.as_deref(), query.email.as_deref()).await?;
    Ok(Json(user))
}
