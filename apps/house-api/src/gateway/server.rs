//! WebSocket upgrade handler and the per-connection reader/writer pumps.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use house_common::{ChatFrame, InboundFrame, UserId};
use tokio::time;

use crate::auth::middleware::AuthUser;
use crate::AppState;

use super::session::{OnlineSession, OutboundQueue, SelfSender};

/// Largest inbound message accepted from a client.
const MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// A connection that sends nothing (not even a pong) for this long is dead.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Ping cadence; must stay well under `READ_TIMEOUT`.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on a single socket write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/ws/chat", get(ws_upgrade))
}

async fn ws_upgrade(
    user: AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_connection(socket, state, user))
}

async fn handle_connection(socket: WebSocket, state: AppState, user: AuthUser) {
    let (session, outbound) = OnlineSession::new(
        user.user_id,
        user.username.clone(),
        state.config.hub.outbound_capacity,
    );
    let session_id = session.session_id;
    let me = session.self_sender();

    if let Err(err) = state.hub.register(session).await {
        tracing::error!(%err, user_id = user.user_id, "cannot register session");
        return;
    }

    tracing::info!(
        user_id = user.user_id,
        username = %user.username,
        session_id,
        "chat session established"
    );

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_pump(ws_tx, outbound, user.user_id, session_id));

    // Either pump ending ends the connection. A finished reader leaves the
    // writer to flush a close frame once the hub drops the session below.
    tokio::select! {
        _ = read_pump(&state, &user, &me, ws_rx) => {}
        _ = &mut writer => {}
    }

    if let Err(err) = state.hub.unregister(user.user_id, session_id).await {
        tracing::debug!(%err, user_id = user.user_id, session_id, "unregister after hub shutdown");
    }

    tracing::info!(user_id = user.user_id, session_id, "chat session ended");
}

/// Read frames until the client leaves, errors, or goes quiet past the read
/// deadline. Every received frame, pongs included, resets the deadline.
async fn read_pump(
    state: &AppState,
    user: &AuthUser,
    me: &SelfSender,
    mut ws_rx: SplitStream<WebSocket>,
) {
    loop {
        let msg = match time::timeout(READ_TIMEOUT, ws_rx.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(?e, user_id = user.user_id, "ws read error");
                break;
            }
            Ok(None) => break,
            Err(_elapsed) => {
                tracing::debug!(user_id = user.user_id, "read deadline exceeded");
                break;
            }
        };

        match msg {
            Message::Text(text) => handle_inbound(state, user.user_id, me, text.as_str()).await,
            Message::Close(_) => break,
            Message::Binary(_) => {
                tracing::debug!(user_id = user.user_id, "discarding binary frame");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        }
    }
}

/// Stamp, persist and route one client frame.
async fn handle_inbound(state: &AppState, sender_id: UserId, me: &SelfSender, text: &str) {
    let frame = match InboundFrame::decode(text) {
        Ok(inbound) => inbound.stamp(sender_id),
        Err(e) => {
            tracing::debug!(%e, user_id = sender_id, "discarding malformed frame");
            return;
        }
    };

    // A failed write still routes: the receiver is online right now.
    if let Err(err) = state
        .messages
        .create_message(frame.sender_id, frame.receiver_id, &frame.content)
        .await
    {
        tracing::warn!(%err, sender_id, receiver_id = frame.receiver_id, "failed to persist message");
    }

    if let Err(err) = state.hub.route_with_receipt(frame, me.clone()).await {
        tracing::warn!(%err, sender_id, "failed to route message");
    }
}

/// Drain the outbound queue onto the socket and keep the connection alive.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: OutboundQueue,
    user_id: UserId,
    session_id: u64,
) {
    let mut ping = time::interval(PING_INTERVAL);
    ping.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Hub dropped the session: replaced, overflowed or unregistered.
                    let _ = send_timed(&mut ws_tx, Message::Close(None)).await;
                    tracing::debug!(user_id, session_id, "outbound queue closed");
                    return;
                };
                if let Err(reason) = send_frame(&mut ws_tx, &frame).await {
                    tracing::debug!(user_id, session_id, reason, "write failed");
                    return;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) = send_timed(&mut ws_tx, Message::Ping(Default::default())).await {
                    tracing::debug!(user_id, session_id, reason, "ping failed");
                    return;
                }
            }
        }
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ChatFrame,
) -> Result<(), &'static str> {
    let json = serde_json::to_string(frame).map_err(|_| "encode error")?;
    send_timed(ws_tx, Message::Text(json.into())).await
}

async fn send_timed(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: Message,
) -> Result<(), &'static str> {
    match time::timeout(WRITE_TIMEOUT, ws_tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err("socket error"),
        Err(_elapsed) => Err("write deadline exceeded"),
    }
}
