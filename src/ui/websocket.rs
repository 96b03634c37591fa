//! Live status stream for UI clients
//!
//! Each client gets the current status on connect, then every session
//! event and status change. Clients may send `{"command":"start"}` or
//! `{"command":"stop"}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::session::{SessionEvent, SessionStatus};
use crate::ui::server::AppState;

/// Server → client frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiMessage {
    Status { status: SessionStatus },
    Event { event: SessionEvent },
}

/// Client → server frames
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    Start,
    Stop,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(socket: WebSocket, state: Arc<AppState>) {
    tracing::debug!("UI client connected");
    let (mut sender, mut receiver) = socket.split();

    let mut status_rx = state.session.subscribe();
    let mut events_rx = state.session.events();

    let initial = UiMessage::Status {
        status: state.session.status(),
    };
    if send_json(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if send_json(&mut sender, &UiMessage::Status { status }).await.is_err() {
                    break;
                }
            }
            event = events_rx.recv() => match event {
                Ok(event) => {
                    if send_json(&mut sender, &UiMessage::Event { event }).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("UI client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<UiCommand>(&text) {
                    Ok(UiCommand::Start) => {
                        // Failures surface through the event stream
                        let session = state.session.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session.start().await {
                                tracing::warn!("Start from UI failed: {}", e);
                            }
                        });
                    }
                    Ok(UiCommand::Stop) => state.session.stop(),
                    Err(e) => tracing::warn!("Ignoring UI message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("UI socket error: {}", e);
                    break;
                }
            },
        }
    }
    tracing::debug!("UI client disconnected");
}

async fn send_json<S>(sender: &mut S, message: &UiMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
