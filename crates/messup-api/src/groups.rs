use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use messup_types::api::{AddMemberRequest, CreateGroupRequest, CreateGroupResponse};
use messup_types::events::GatewayEvent;
use messup_types::models::{Group, GroupMember, NotificationType};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::notifications::notify_best_effort;
use crate::state::{AppState, require_user_by_id, require_user_by_username, with_db};

/// Create a group owned by `creator` with the named users as plain members.
///
/// Every username must resolve before anything is written. The group, its
/// memberships and the "Group created by X" system message commit together;
/// the system message is broadcast on the group topic afterwards.
pub async fn create_group(
    state: &AppState,
    creator: &Identity,
    name: &str,
    member_usernames: &[String],
) -> Result<Group, ApiError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("group name must not be empty".into()));
    }

    let creator_user = require_user_by_id(state, creator.user_id).await?;

    let usernames = member_usernames.to_vec();
    let creator_id = creator_user.id;
    let members = with_db(state, move |db| {
        let mut members = vec![(creator_id, true)];
        for username in &usernames {
            let Some(row) = db.get_user_by_username(username)? else {
                return Ok(Err(username.clone()));
            };
            if !members.iter().any(|(id, _)| *id == row.id) {
                members.push((row.id, false));
            }
        }
        Ok(Ok(members))
    })
    .await?
    .map_err(|username| ApiError::NotFound(format!("user not found: {}", username)))?;

    let system_message = format!("Group created by {}", creator_user.username);
    let member_list = members.clone();
    let (group, message) = with_db(state, move |db| {
        db.create_group(&name, creator_id, &member_list, &system_message)
    })
    .await?;

    info!(
        "Group {} ({}) created by {} with {} members",
        group.name,
        group.id,
        creator_user.username,
        members.len()
    );

    state
        .dispatcher
        .publish(group.id, GatewayEvent::GroupMessage { message })
        .await;

    for (user_id, _) in members.iter().filter(|(id, _)| *id != creator_id) {
        invite_notification(state, *user_id, &group, &creator_user.username).await;
    }

    Ok(group)
}

async fn invite_notification(state: &AppState, user_id: Uuid, group: &Group, inviter: &str) {
    notify_best_effort(
        state,
        user_id,
        NotificationType::GroupInvitation,
        format!("{} added you to the group {}.", inviter, group.name),
        Some(group.id),
        None,
    )
    .await;
}

pub async fn require_group(state: &AppState, group_id: Uuid) -> Result<Group, ApiError> {
    with_db(state, move |db| db.get_group(group_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group not found: {}", group_id)))
}

pub async fn is_member(state: &AppState, group_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
    with_db(state, move |db| db.is_group_member(group_id, user_id)).await
}

/// NotFound for a missing group, Unauthorized unless `user_id` belongs to it.
pub async fn require_member(state: &AppState, group_id: Uuid, user_id: Uuid) -> Result<Group, ApiError> {
    let group = require_group(state, group_id).await?;
    if !is_member(state, group_id, user_id).await? {
        return Err(ApiError::Unauthorized(format!(
            "not a member of group {}",
            group_id
        )));
    }
    Ok(group)
}

/// Add the user named `username` to a group. Only admins of the group may
/// add members; adding an existing member is a Conflict.
pub async fn add_member(
    state: &AppState,
    actor: &Identity,
    group_id: Uuid,
    username: &str,
) -> Result<GroupMember, ApiError> {
    let group = require_group(state, group_id).await?;

    let actor_id = actor.user_id;
    let actor_membership = with_db(state, move |db| db.get_group_member(group_id, actor_id)).await?;
    if !actor_membership.is_some_and(|m| m.is_admin) {
        return Err(ApiError::Unauthorized(
            "only group admins can add members".into(),
        ));
    }

    let user = require_user_by_username(state, username).await?;
    let user_id = user.id;
    let member = with_db(state, move |db| db.add_group_member(group_id, user_id))
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!("{} is already a member", user.username))
        })?;

    info!("{} added {} to group {}", actor.username, member.username, group.id);
    invite_notification(state, member.user_id, &group, &actor.username).await;

    Ok(member)
}

pub async fn list_groups_of(state: &AppState, user_id: Uuid) -> Result<Vec<Group>, ApiError> {
    with_db(state, move |db| db.get_groups_of_user(user_id)).await
}

pub async fn list_members(state: &AppState, actor: &Identity, group_id: Uuid) -> Result<Vec<GroupMember>, ApiError> {
    require_member(state, group_id, actor.user_id).await?;
    with_db(state, move |db| db.get_group_members(group_id)).await
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group = create_group(&state, &identity, &req.name, &req.members).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse { group_id: group.id }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(list_groups_of(&state, identity.user_id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(require_member(&state, group_id, identity.user_id).await?))
}

pub async fn add(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = add_member(&state, &identity, group_id, &req.username).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn members(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(list_members(&state, &identity, group_id).await?))
}
