use std::cmp::Reverse;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use messup_db::{AcceptOutcome, NewRequestOutcome};
use messup_types::api::{FriendRequestCreate, FriendStatus, RecentChat};
use messup_types::models::{
    FriendRequest, Friendship, NotificationType, RequestStatus, User,
};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::notifications::notify_best_effort;
use crate::state::{AppState, require_user_by_id, require_user_by_username, with_db};

/// Send a friend request from `sender` to the user named `receiver`.
///
/// Self-requests are a Validation error. Existing friends, or a pending
/// request in either direction, are a Conflict. On success the receiver gets
/// a FRIEND_REQUEST notification.
pub async fn send_friend_request(
    state: &AppState,
    sender: &Identity,
    receiver: &str,
) -> Result<FriendRequest, ApiError> {
    if receiver == sender.username {
        return Err(ApiError::Validation(
            "cannot send a friend request to yourself".into(),
        ));
    }

    let sender_user = require_user_by_id(state, sender.user_id).await?;
    let receiver_user = require_user_by_username(state, receiver).await?;
    if sender_user.id == receiver_user.id {
        return Err(ApiError::Validation(
            "cannot send a friend request to yourself".into(),
        ));
    }

    let (sender_id, receiver_id) = (sender_user.id, receiver_user.id);
    let outcome = with_db(state, move |db| db.create_friend_request(sender_id, receiver_id)).await?;

    let request = match outcome {
        NewRequestOutcome::Created(request) => request,
        NewRequestOutcome::AlreadyFriends => {
            return Err(ApiError::Conflict("already friends".into()));
        }
        NewRequestOutcome::AlreadyPending(_) => {
            return Err(ApiError::Conflict("request pending".into()));
        }
    };

    info!(
        "Friend request {} from {} to {}",
        request.id, sender_user.username, receiver_user.username
    );

    notify_best_effort(
        state,
        receiver_id,
        NotificationType::FriendRequest,
        format!("{} has sent you a friend request.", sender_user.username),
        Some(sender_id),
        Some(serde_json::json!({
            "senderId": sender_id,
            "receiverId": receiver_id,
            "requestId": request.id,
        })),
    )
    .await;

    Ok(request)
}

async fn require_request_for(
    state: &AppState,
    actor: &Identity,
    request_id: Uuid,
) -> Result<FriendRequest, ApiError> {
    let request = with_db(state, move |db| db.get_friend_request(request_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("friend request not found: {}", request_id)))?;

    if request.receiver_id != actor.user_id {
        return Err(ApiError::Unauthorized(
            "only the receiver can answer a friend request".into(),
        ));
    }
    Ok(request)
}

/// Accept a pending request addressed to `actor`, creating the friendship.
/// A request that is no longer pending is a Conflict and writes nothing.
pub async fn accept_friend_request(
    state: &AppState,
    actor: &Identity,
    request_id: Uuid,
) -> Result<Friendship, ApiError> {
    require_request_for(state, actor, request_id).await?;

    match with_db(state, move |db| db.accept_friend_request(request_id)).await? {
        AcceptOutcome::Accepted(friendship) => {
            info!(
                "Friend request {} accepted: {} <-> {}",
                request_id, friendship.user1_id, friendship.user2_id
            );
            Ok(friendship)
        }
        AcceptOutcome::NotFound => Err(ApiError::NotFound(format!(
            "friend request not found: {}",
            request_id
        ))),
        AcceptOutcome::NotPending(status) => Err(ApiError::Conflict(format!(
            "request already {}",
            status.as_str().to_lowercase()
        ))),
    }
}

/// Reject a pending request addressed to `actor`. The request row is
/// removed; the returned copy carries its terminal REJECTED status.
pub async fn reject_friend_request(
    state: &AppState,
    actor: &Identity,
    request_id: Uuid,
) -> Result<FriendRequest, ApiError> {
    let request = require_request_for(state, actor, request_id).await?;
    if request.status != RequestStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "request already {}",
            request.status.as_str().to_lowercase()
        )));
    }

    let rejected = with_db(state, move |db| db.reject_friend_request(request_id))
        .await?
        .ok_or_else(|| ApiError::Conflict("request is no longer pending".into()))?;

    info!("Friend request {} rejected", request_id);
    Ok(rejected)
}

/// Everyone joined to `user_id` by a friendship edge.
pub async fn get_friends(state: &AppState, user_id: Uuid) -> Result<Vec<User>, ApiError> {
    with_db(state, move |db| {
        let friend_ids: Vec<Uuid> = db
            .get_friendships_of(user_id)?
            .iter()
            .map(|f| f.other(user_id))
            .collect();
        db.get_users_by_ids(&friend_ids)
    })
    .await
}

/// Pending requests waiting for `user_id` to answer.
pub async fn incoming_requests(state: &AppState, user_id: Uuid) -> Result<Vec<FriendRequest>, ApiError> {
    with_db(state, move |db| db.get_incoming_requests(user_id)).await
}

pub async fn friend_status(
    state: &AppState,
    me: &Identity,
    other: &str,
) -> Result<FriendStatus, ApiError> {
    let other = require_user_by_username(state, other).await?;
    let (me_id, other_id) = (me.user_id, other.id);
    if me_id == other_id {
        return Ok(FriendStatus {
            is_friend: false,
            request_pending: false,
            can_send_request: false,
        });
    }

    let (friendship, pending) = with_db(state, move |db| {
        Ok((
            db.get_friendship(me_id, other_id)?,
            db.get_pending_between(me_id, other_id)?,
        ))
    })
    .await?;

    let is_friend = friendship.is_some();
    let request_pending = pending.is_some();
    Ok(FriendStatus {
        is_friend,
        request_pending,
        can_send_request: !is_friend && !request_pending,
    })
}

/// One entry per friend with the latest message exchanged, most recently
/// active conversations first. Friends never messaged come last.
pub async fn recent_chats(state: &AppState, user_id: Uuid) -> Result<Vec<RecentChat>, ApiError> {
    let friends = get_friends(state, user_id).await?;

    let mut chats = with_db(state, move |db| {
        friends
            .into_iter()
            .map(|friend| {
                let last_message = db.get_latest_between(user_id, friend.id)?;
                Ok(RecentChat {
                    friend,
                    last_message,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    chats.sort_by_key(|chat| Reverse(chat.last_message.as_ref().map(|m| m.timestamp)));
    Ok(chats)
}

// -- Handlers --

pub async fn create_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<FriendRequestCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let request = send_friend_request(&state, &identity, &req.receiver).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(incoming_requests(&state, identity.user_id).await?))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(accept_friend_request(&state, &identity, request_id).await?))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(reject_friend_request(&state, &identity, request_id).await?))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(get_friends(&state, identity.user_id).await?))
}

pub async fn status(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(friend_status(&state, &identity, &username).await?))
}

pub async fn list_recent_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(recent_chats(&state, identity.user_id).await?))
}
