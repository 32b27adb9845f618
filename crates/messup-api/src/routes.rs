use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};

use crate::media::MAX_MEDIA_SIZE;
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, friends, gateway, groups, keys, media, messages, notifications, users};

/// Every HTTP and WebSocket route. Everything except registration, login,
/// media downloads and the gateway upgrade sits behind bearer-token auth.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(gateway::ws_upgrade))
        .route("/media/{id}", get(media::download));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/search", get(users::search))
        .route("/users/{username}", get(users::get_user))
        // Friends
        .route(
            "/friends/requests",
            get(friends::list_requests).post(friends::create_request),
        )
        .route("/friends/requests/{id}/accept", post(friends::accept_request))
        .route("/friends/requests/{id}/reject", post(friends::reject_request))
        .route("/friends", get(friends::list_friends))
        .route("/friends/status/{username}", get(friends::status))
        .route("/chats/recent", get(friends::list_recent_chats))
        // Groups
        .route("/groups", get(groups::list).post(groups::create))
        .route("/groups/{id}", get(groups::get))
        .route("/groups/{id}/members", get(groups::members).post(groups::add))
        .route(
            "/groups/{id}/messages",
            get(messages::group_history).post(messages::send_group),
        )
        // Private messages
        .route("/messages/private", post(messages::send_private))
        .route("/messages/private/{username}", get(messages::private_history))
        .route("/messages/{id}/read", post(messages::read))
        // Notifications
        .route("/notifications", get(notifications::list_all))
        .route("/notifications/unread", get(notifications::list_unread))
        .route("/notifications/{id}/read", post(notifications::read_notification))
        // Keys and media
        .route("/keys/{slot}", put(keys::upload))
        .route("/keys/{username}/{slot}", get(keys::download))
        .route(
            "/media",
            post(media::upload).layer(DefaultBodyLimit::max(MAX_MEDIA_SIZE + 1)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
