use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, error};
use uuid::Uuid;

use messup_types::models::{Notification, NotificationType};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// Store a notification for `recipient_id`. Delivery is pull-only; nothing
/// is pushed to live connections.
pub async fn notify(
    state: &AppState,
    recipient_id: Uuid,
    kind: NotificationType,
    content: impl Into<String>,
    reference_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) -> Result<Notification, ApiError> {
    let content = content.into();
    let notification = with_db(state, move |db| {
        db.insert_notification(recipient_id, kind, &content, reference_id, metadata)
    })
    .await?;

    debug!("Stored {} notification {} for {}", kind, notification.id, recipient_id);
    Ok(notification)
}

/// `notify` for side effects of an operation that already succeeded: a
/// failure is logged and otherwise ignored.
pub(crate) async fn notify_best_effort(
    state: &AppState,
    recipient_id: Uuid,
    kind: NotificationType,
    content: impl Into<String>,
    reference_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) {
    if let Err(e) = notify(state, recipient_id, kind, content, reference_id, metadata).await {
        error!("Failed to store {} notification for {}: {}", kind, recipient_id, e);
    }
}

pub async fn get_unread(state: &AppState, user_id: Uuid) -> Result<Vec<Notification>, ApiError> {
    with_db(state, move |db| db.get_notifications(user_id, true)).await
}

pub async fn get_all(state: &AppState, user_id: Uuid) -> Result<Vec<Notification>, ApiError> {
    with_db(state, move |db| db.get_notifications(user_id, false)).await
}

/// Flip a notification to read. Unknown ids, and ids belonging to someone
/// else, are NotFound.
pub async fn mark_read(state: &AppState, actor: &Identity, id: Uuid) -> Result<(), ApiError> {
    let user_id = actor.user_id;
    let found = with_db(state, move |db| db.mark_notification_read(id, user_id)).await?;
    if !found {
        return Err(ApiError::NotFound(format!("notification not found: {}", id)));
    }
    Ok(())
}

// -- Handlers --

pub async fn list_unread(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(get_unread(&state, identity.user_id).await?))
}

pub async fn list_all(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(get_all(&state, identity.user_id).await?))
}

pub async fn read_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    mark_read(&state, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
