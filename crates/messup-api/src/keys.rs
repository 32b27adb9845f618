use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::info;

use messup_types::models::KeySlot;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::{AppState, require_user_by_username, with_db};

/// Store an opaque key blob for `owner`, replacing whatever was there.
pub async fn put_key(
    state: &AppState,
    owner: &Identity,
    slot: KeySlot,
    blob: Bytes,
) -> Result<(), ApiError> {
    if blob.is_empty() {
        return Err(ApiError::Validation("key blob must not be empty".into()));
    }

    let user_id = owner.user_id;
    let len = blob.len();
    with_db(state, move |db| db.put_key_blob(user_id, slot, &blob)).await?;

    info!("{} stored {} key blob ({} bytes)", owner.username, slot, len);
    Ok(())
}

/// Public blobs are readable by anyone signed in; private blobs only by
/// their owner.
pub async fn get_key(
    state: &AppState,
    actor: &Identity,
    username: &str,
    slot: KeySlot,
) -> Result<Vec<u8>, ApiError> {
    let owner = require_user_by_username(state, username).await?;
    if slot == KeySlot::Private && owner.id != actor.user_id {
        return Err(ApiError::Unauthorized(
            "private keys are only readable by their owner".into(),
        ));
    }

    let owner_id = owner.id;
    with_db(state, move |db| db.get_key_blob(owner_id, slot))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no {} key for {}", slot, owner.username)))
}

// -- Handlers --

pub async fn upload(
    State(state): State<AppState>,
    Path(slot): Path<KeySlot>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    put_key(&state, &identity, slot, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download(
    State(state): State<AppState>,
    Path((username, slot)): Path<(String, KeySlot)>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let blob = get_key(&state, &identity, &username, slot).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], blob))
}
