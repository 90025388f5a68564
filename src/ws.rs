//! WebSocket transport for the live game channel.
//!
//! One task per client channel: it decodes inbound frames and forwards
//! them to the session runtime, and it writes out both the session's
//! broadcast stream and events addressed to this client alone. A client
//! that stops draining its queue falls behind the broadcast channel and is
//! dropped here, never blocking the session task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::app::AppState;
use crate::protocol::{parse_client_frame, ErrorKind, ServerEvent};
use crate::runtime::SessionCommand;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Upgrade handler for `/ws/game/{code}/`.
pub async fn game_socket(
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::info!(%code, "websocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, code, state))
}

async fn handle_socket(socket: WebSocket, code: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let Some((handle, mut events)) = state.hub.attach(&code).await else {
        let event = ServerEvent::error(
            ErrorKind::NoSuchSession,
            format!("no session with code {}", code),
        );
        send_event(&mut sender, &event).await.ok();
        return;
    };

    let conn = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let (reply_tx, mut replies) = tokio::sync::mpsc::unbounded_channel();
    if handle
        .commands
        .send(SessionCommand::Attach {
            conn,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }
    tracing::info!(%code, conn, "websocket attached");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // This client cannot keep up with the fan-out; cut it
                    // loose rather than let it hold the session back.
                    tracing::warn!(%code, conn, skipped, "client lagged, dropping");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            reply = replies.recv() => match reply {
                Some(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_client_frame(&text) {
                    Ok(message) => {
                        if handle
                            .commands
                            .send(SessionCommand::Message { conn, message })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(frame_error) => {
                        let event = ServerEvent::error(frame_error.kind, frame_error.message);
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%code, conn, error = %e, "websocket error");
                    break;
                }
            }
        }
    }

    // The runtime marks the player disconnected and auto-pauses when the
    // host's channel goes away.
    let _ = handle.commands.send(SessionCommand::Closed { conn });
    tracing::info!(%code, conn, "websocket closed");
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &ServerEvent,
) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}
