use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthError;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Auth is via query param
/// ?token=JWT — browsers cannot set headers on WebSocket handshakes.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid or missing
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Verifies the session token before any
/// event flows. On auth failure, upgrades then immediately closes with a
/// distinguishable close code, so clients can tell "re-login" apart from
/// network flakiness. On success, runs the connection actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        tracing::warn!("WebSocket handshake without token");
        return close_after_upgrade(ws, CLOSE_TOKEN_INVALID, "Token required");
    };

    match state.verifier.verify_session_token(&token).await {
        Ok(identity) => {
            tracing::info!(
                user_id = identity.user_id,
                username = %identity.username,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, identity))
        }
        Err(err) => {
            let (close_code, reason) = match err {
                AuthError::Expired => (CLOSE_TOKEN_EXPIRED, "Token expired"),
                AuthError::Invalid => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(
                close_code = close_code,
                reason = reason,
                "WebSocket auth failed"
            );
            close_after_upgrade(ws, close_code, reason)
        }
    }
}

/// Upgrade the connection, then immediately close with the given code.
/// Rejection has to happen post-upgrade for the close code to reach the
/// client at all.
fn close_after_upgrade(ws: WebSocketUpgrade, code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}
