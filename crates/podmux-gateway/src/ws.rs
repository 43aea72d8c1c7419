// SPDX-License-Identifier: Apache-2.0

//! WebSocket bridge: translates one mobile client connection to the
//! `podmux-session` command/event surface.
//!
//! JSON text frames over `tokio::select!` between the socket and the
//! session's event channel, with ping/pong handling and best-effort error
//! reporting back to the client rather than a hard disconnect on a single
//! bad frame.
//!
//! The registry key and the backend session id are the same string here —
//! one WebSocket connection addresses exactly one already-started session,
//! identified by the `:session_id` path segment.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use podmux_backend::BackendCommand;
use podmux_runtime::{SessionRegistry, StopMode, StopSource};
use podmux_session::SessionCoordinator;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct WsState {
    pub coordinator: Arc<SessionCoordinator>,
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "sinceSeq")]
    pub since_seq: Option<u64>,
}

/// Client-to-server envelope. Not named anywhere in the server-to-client
/// event definitions; this shape is an implementation decision recorded
/// in DESIGN.md.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingMessage {
    Command {
        command: BackendCommand,
        #[serde(rename = "requestId")]
        request_id: Option<String>,
    },
    Stop {
        mode: WireStopMode,
    },
    ForceTerminate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireStopMode {
    Abort,
    Terminate,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, query.since_seq))
}

async fn handle_socket(mut socket: WebSocket, state: WsState, session_id: String, since_seq: Option<u64>) {
    info!(session = %session_id, "WebSocket client connected");

    let Some(active_handle) = state.registry.get(&session_id) else {
        warn!(session = %session_id, "WebSocket connect for unknown/unstarted session");
        let _ = socket
            .send(Message::Text(
                serde_json::json!({
                    "type": "stop_failed",
                    "source": "server",
                    "reason": "session not active",
                })
                .to_string(),
            ))
            .await;
        return;
    };

    let (_subscriber_id, replay, mut events) = {
        let mut active = active_handle.lock().await;
        active.subscribe_from(since_seq)
    };

    for event in replay {
        if socket.send(Message::Text(event.to_string())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(&state, &session_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(e)) => {
                        debug!(session = %session_id, "WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(ev) => {
                        if socket.send(Message::Text(ev.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    info!(session = %session_id, "WebSocket client disconnected");
}

async fn handle_incoming(state: &WsState, session_id: &str, text: &str) {
    match serde_json::from_str::<IncomingMessage>(text) {
        Ok(IncomingMessage::Command { command, request_id }) => {
            if command.is_fire_and_forget() {
                if let Err(e) = state.coordinator.send_fire_and_forget(session_id, command).await {
                    warn!(session = %session_id, "fire-and-forget command failed: {e}");
                }
            } else if let Err(e) = state
                .coordinator
                .forward_client_command(session_id, session_id, command, request_id)
                .await
            {
                warn!(session = %session_id, "command forwarding failed: {e}");
            }
        }
        Ok(IncomingMessage::Stop { mode }) => {
            let mode = match mode {
                WireStopMode::Abort => StopMode::Abort,
                WireStopMode::Terminate => StopMode::Terminate,
            };
            if let Err(e) = state
                .coordinator
                .begin_pending_stop(session_id, session_id, mode, StopSource::User)
                .await
            {
                warn!(session = %session_id, "stop request failed: {e}");
            }
        }
        Ok(IncomingMessage::ForceTerminate) => {
            if let Err(e) = state
                .coordinator
                .force_terminate_session_process(session_id, session_id)
                .await
            {
                warn!(session = %session_id, "force terminate failed: {e}");
            }
        }
        Err(e) => {
            warn!(session = %session_id, "invalid incoming message JSON: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_envelope_parses_request_id() {
        let text = r#"{"type":"command","command":{"type":"prompt","text":"hi"},"requestId":"r1"}"#;
        let parsed: IncomingMessage = serde_json::from_str(text).unwrap();
        match parsed {
            IncomingMessage::Command { request_id, .. } => assert_eq!(request_id, Some("r1".to_string())),
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn stop_envelope_parses_mode() {
        let text = r#"{"type":"stop","mode":"abort"}"#;
        let parsed: IncomingMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(parsed, IncomingMessage::Stop { mode: WireStopMode::Abort }));
    }
}
