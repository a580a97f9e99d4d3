use std::collections::HashSet;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::auth::Identity;
use crate::chat::presence;
use crate::chat::router::PairingKey;
use crate::state::AppState;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::{broadcast, next_connection_id, ConnectionHandle};

/// Ping interval: server sends WebSocket ping every 30 seconds so dead
/// connections are noticed even when the peer vanished without a close.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the connection's mpsc channel
/// - Reader loop: processes incoming frames strictly in arrival order
///
/// Any part of the system can push to this client by cloning the
/// connection's sender. Whatever ends the reader loop, the cleanup block
/// at the bottom always runs: conversation subscriptions are dropped, the
/// session is deregistered, and an offline transition fires if this was
/// the user's last connection.
pub async fn run_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let conn = ConnectionHandle {
        id: next_connection_id(),
        identity,
        sender: tx.clone(),
    };

    let came_online = state.sessions.register(conn.clone());

    // The newcomer gets a one-time snapshot of who is online; afterwards
    // they track presence incrementally from the transition events.
    broadcast::send_to_connection(
        &conn,
        &ServerEvent::OnlineUsers {
            user_ids: state.sessions.online_user_ids(),
        },
    );

    // Broadcast the online transition only on the first connection; a
    // second device must not re-announce the user.
    if came_online {
        presence::broadcast_online(&state, conn.user_id());
    }

    tracing::info!(
        user_id = conn.user_id(),
        username = %conn.username(),
        connection_id = conn.id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Conversations this connection has joined. Owned by the reader loop:
    // events from one connection are handled one at a time, in order.
    let mut joined: HashSet<PairingKey> = HashSet::new();

    // Reader loop: process incoming WebSocket frames
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(text.as_str(), &conn, &mut joined, &state).await;
                }
                Message::Binary(_) => {
                    // The protocol is JSON text; binary frames are ignored
                    tracing::debug!(
                        user_id = conn.user_id(),
                        "Received binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = conn.user_id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = conn.user_id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = conn.user_id(), "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Drop conversation subscriptions before presence, so no conversation
    // event can still target this connection once it reads as offline.
    state.conversations.drop_connection(conn.id, &joined);

    let went_offline = state.sessions.deregister(conn.user_id(), conn.id);
    if went_offline {
        presence::broadcast_offline(&state, conn.user_id());
    }

    tracing::info!(
        user_id = conn.user_id(),
        username = %conn.username(),
        connection_id = conn.id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
