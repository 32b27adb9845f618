use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use messup_gateway::SessionHandle;
use messup_types::api::SendPrivateMessageRequest;
use messup_types::events::{GatewayCommand, GatewayEvent};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::groups::is_member;
use crate::messages::{mark_as_read, send_group_message, send_private_message};
use crate::state::AppState;

/// Server pings every 15 seconds; two missed pongs drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Time a client without `?token=` has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /gateway. A `?token=` is verified before the upgrade so a bad token
/// gets a plain 401; without one the client must send `Identify` first.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = match query.token {
        Some(token) => Some(state.authenticator.verify(&token)?),
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, identity)))
}

async fn handle_connection(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match identity {
        Some(identity) => identity,
        None => match wait_for_identify(&mut receiver, &state).await {
            Some(identity) => identity,
            None => {
                warn!("WebSocket client failed to identify, closing");
                return;
            }
        },
    };

    info!("{} ({}) connected to gateway", identity.username, identity.user_id);

    let ready = GatewayEvent::Ready {
        user_id: identity.user_id,
        username: identity.username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, state, identity).await;
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Option<Identity> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return state.authenticator.verify(&token).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|e| {
        error!("Failed to encode gateway event: {}", e);
    })?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    state: AppState,
    identity: Identity,
) {
    let (handle, mut events) = state.dispatcher.connect(identity.user_id).await;
    let conn_id = handle.conn_id();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed = 0;
                    } else {
                        missed += 1;
                        if missed >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_state = state.clone();
    let recv_identity = identity.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Err(e) =
                            handle_command(&recv_state, &recv_identity, &recv_handle, cmd).await
                        {
                            reply_error(&recv_handle, e);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        reply_error(
                            &recv_handle,
                            ApiError::Validation(format!("malformed command: {}", e)),
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.disconnect(identity.user_id, conn_id).await;
    if state.dispatcher.is_online(identity.user_id).await {
        info!(
            "{} ({}) connection {} closed, newer connection still live",
            identity.username, identity.user_id, conn_id
        );
    } else {
        info!("{} ({}) disconnected from gateway", identity.username, identity.user_id);
    }
}

/// Report a failed command back to the connection that sent it.
fn reply_error(handle: &SessionHandle, err: ApiError) {
    if let ApiError::Internal(e) = &err {
        error!("Gateway command failed: {:#}", e);
    }
    handle.send(GatewayEvent::Error {
        kind: err.kind().to_string(),
        message: err.public_message(),
    });
}

async fn handle_command(
    state: &AppState,
    identity: &Identity,
    handle: &SessionHandle,
    cmd: GatewayCommand,
) -> Result<(), ApiError> {
    match cmd {
        GatewayCommand::Identify { .. } => {}

        GatewayCommand::SendPrivateMessage {
            receiver,
            content,
            media_ref,
            media_type,
        } => {
            let req = SendPrivateMessageRequest {
                receiver,
                content,
                media_ref,
                media_type,
            };
            send_private_message(state, identity, req).await?;
        }

        GatewayCommand::MarkAsRead { message_id } => {
            mark_as_read(state, identity, message_id).await?;
        }

        GatewayCommand::SendGroupMessage { group_id, content } => {
            send_group_message(state, identity, group_id, &content).await?;
        }

        GatewayCommand::Subscribe { group_ids } => {
            let mut joined = 0;
            for group_id in group_ids {
                if is_member(state, group_id, identity.user_id).await? {
                    state.dispatcher.subscribe(group_id, handle).await;
                    joined += 1;
                } else {
                    debug!("{} is not in group {}, not subscribing", identity.username, group_id);
                }
            }
            info!("{} ({}) subscribed to {} groups", identity.username, identity.user_id, joined);
        }

        GatewayCommand::Unsubscribe { group_ids } => {
            for group_id in group_ids {
                state.dispatcher.unsubscribe(group_id, handle.conn_id()).await;
            }
        }
    }
    Ok(())
}
