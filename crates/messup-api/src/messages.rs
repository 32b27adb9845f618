use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use messup_types::api::{SendGroupMessageRequest, SendPrivateMessageRequest};
use messup_types::events::GatewayEvent;
use messup_types::models::{
    GroupMessage, MediaType, MessageStatus, NotificationType, PrivateMessage,
};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::groups::require_member;
use crate::notifications::notify_best_effort;
use crate::state::{AppState, require_user_by_id, require_user_by_username, with_db};

/// Persist a private message, then try to push it to the receiver.
///
/// The message is stored at SENT before any push is attempted. A successful
/// push advances it to DELIVERED; an offline receiver leaves it at SENT and
/// gets a MESSAGE notification instead. Push problems never fail the call.
pub async fn send_private_message(
    state: &AppState,
    sender: &Identity,
    req: SendPrivateMessageRequest,
) -> Result<PrivateMessage, ApiError> {
    let media_ref = req.media_ref.filter(|r| !r.trim().is_empty());
    if req.content.trim().is_empty() && media_ref.is_none() {
        return Err(ApiError::Validation(
            "message content must not be empty".into(),
        ));
    }

    let sender_user = require_user_by_id(state, sender.user_id).await?;
    let receiver_user = require_user_by_username(state, &req.receiver).await?;

    let media_type = req.media_type.unwrap_or(if media_ref.is_some() {
        MediaType::None
    } else {
        MediaType::Text
    });

    let (sender_id, receiver_id) = (sender_user.id, receiver_user.id);
    let content = req.content;
    let mut message = with_db(state, move |db| {
        db.insert_private_message(sender_id, receiver_id, &content, media_ref.as_deref(), media_type)
    })
    .await?;

    let pushed = state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::PrivateMessage {
                message: message.clone(),
            },
        )
        .await;

    if pushed {
        let id = message.id;
        match with_db(state, move |db| db.mark_delivered(id)).await {
            Ok(true) => message.status = MessageStatus::Delivered,
            Ok(false) => {}
            Err(e) => warn!("Failed to mark message {} delivered: {}", id, e),
        }
    } else {
        debug!("{} is offline, message {} stays SENT", receiver_user.username, message.id);
        notify_best_effort(
            state,
            receiver_id,
            NotificationType::Message,
            format!("New message from {}", sender_user.username),
            Some(message.id),
            Some(serde_json::json!({ "senderId": sender_id })),
        )
        .await;
    }

    Ok(message)
}

/// Mark a message READ and send the sender a read receipt if they are
/// connected. Unknown ids, and messages `actor` did not receive, are ignored.
pub async fn mark_as_read(
    state: &AppState,
    actor: &Identity,
    message_id: Uuid,
) -> Result<Option<PrivateMessage>, ApiError> {
    let actor_id = actor.user_id;
    let updated = with_db(state, move |db| {
        match db.get_private_message(message_id)? {
            Some(m) if m.receiver_id == actor_id => db.mark_read(message_id),
            _ => Ok(None),
        }
    })
    .await?;

    let Some(message) = updated else {
        debug!("Ignoring read mark for {} by {}", message_id, actor.username);
        return Ok(None);
    };

    state
        .dispatcher
        .send_to_user(
            message.sender_id,
            GatewayEvent::ReadReceipt {
                message_id: message.id,
                status: message.status,
            },
        )
        .await;

    Ok(Some(message))
}

/// Everything exchanged between `me` and `other`, oldest first.
pub async fn fetch_history(
    state: &AppState,
    me: &Identity,
    other: &str,
) -> Result<Vec<PrivateMessage>, ApiError> {
    let other = require_user_by_username(state, other).await?;
    let (a, b) = (me.user_id, other.id);
    with_db(state, move |db| db.get_conversation(a, b)).await
}

/// Post to a group and broadcast to its live subscribers. Membership is
/// checked before anything is written.
pub async fn send_group_message(
    state: &AppState,
    sender: &Identity,
    group_id: Uuid,
    content: &str,
) -> Result<GroupMessage, ApiError> {
    require_member(state, group_id, sender.user_id).await?;

    if content.trim().is_empty() {
        return Err(ApiError::Validation(
            "message content must not be empty".into(),
        ));
    }

    let sender_id = sender.user_id;
    let content = content.to_string();
    let message = with_db(state, move |db| db.insert_group_message(group_id, sender_id, &content)).await?;

    let reached = state
        .dispatcher
        .publish(
            group_id,
            GatewayEvent::GroupMessage {
                message: message.clone(),
            },
        )
        .await;

    info!(
        "{} posted {} to group {} ({} live subscribers)",
        sender.username, message.id, group_id, reached
    );
    Ok(message)
}

pub async fn fetch_group_history(
    state: &AppState,
    actor: &Identity,
    group_id: Uuid,
) -> Result<Vec<GroupMessage>, ApiError> {
    require_member(state, group_id, actor.user_id).await?;
    with_db(state, move |db| db.get_group_messages(group_id)).await
}

// -- Handlers --

pub async fn send_private(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendPrivateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = send_private_message(&state, &identity, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn private_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(fetch_history(&state, &identity, &username).await?))
}

/// Always 204: a read mark for an unknown message is not an error.
pub async fn read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    mark_as_read(&state, &identity, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendGroupMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = send_group_message(&state, &identity, group_id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn group_history(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(fetch_group_history(&state, &identity, group_id).await?))
}
