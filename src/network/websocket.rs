//! WebSocket transport over tokio-tungstenite
//!
//! One writer task drains the outgoing queue into the socket; one reader task
//! parses inbound frames into [`ServerEvent`]s. The single socket preserves
//! message order in both directions.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::AppConfig;
use crate::constants::OUTGOING_QUEUE_CAPACITY;
use crate::error::NetworkError;
use crate::network::connection::{Connector, LiveConnection, ServerEvent};
use crate::protocol::{ClientMessage, ServerMessage};

/// Status reported when the remote closes without a close frame
const CLOSE_NO_STATUS: u16 = 1005;

/// Status reported when the socket ends without any close handshake
const CLOSE_ABNORMAL: u16 = 1006;

/// Connects to the configured bidirectional endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &AppConfig) -> Result<LiveConnection, NetworkError> {
        let url = config
            .live
            .endpoint_url()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        // The URL carries the credential; log only the base endpoint
        tracing::info!("Connecting to {}", config.live.endpoint);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        tracing::info!("WebSocket connected, sending setup for {}", config.live.model);

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let setup = encode(&ClientMessage::setup(config))?;
        ws_tx
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        // Bounded so a stalled link drops frames instead of buffering them
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(OUTGOING_QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();

        // Writer: exits and closes the socket when the outgoing queue drops
        let writer_events = in_tx.clone();
        tokio::spawn(async move {
            let mut sent: u64 = 0;
            while let Some(message) = out_rx.recv().await {
                let text = match encode(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Dropping unencodable message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    let _ = writer_events
                        .send(ServerEvent::Failed(NetworkError::SendFailed(e.to_string())));
                    return;
                }
                sent += 1;
            }
            tracing::debug!("Writer finished after {} messages", sent);
            let _ = ws_tx.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text.to_string(),
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => text.to_string(),
                        Err(_) => {
                            tracing::warn!("Ignoring non-UTF-8 binary frame ({} bytes)", bytes.len());
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        tracing::info!("Remote closed stream: {} {}", code, reason);
                        let _ = in_tx.send(ServerEvent::Closed { code, reason });
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx
                            .send(ServerEvent::Failed(NetworkError::ReceiveFailed(e.to_string())));
                        return;
                    }
                };

                if let Some(message) = parse_server_message(&text) {
                    if in_tx.send(ServerEvent::Message(message)).is_err() {
                        return;
                    }
                }
            }
            let _ = in_tx.send(ServerEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: "stream ended".to_string(),
            });
        });

        Ok(LiveConnection::new(out_tx, in_rx, vec![reader]))
    }
}

fn encode(message: &ClientMessage) -> Result<String, NetworkError> {
    serde_json::to_string(message).map_err(|e| NetworkError::InvalidMessage(e.to_string()))
}

/// Parse one inbound frame. Malformed frames are logged and skipped.
fn parse_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("Skipping malformed server message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_frame() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}}
        ]}}}"#;
        let message = parse_server_message(text).unwrap();
        assert_eq!(message.audio_payloads().count(), 1);
    }

    #[test]
    fn test_parse_skips_garbage() {
        assert!(parse_server_message("{not json").is_none());
        assert!(parse_server_message("[1,2,3]").is_none());
    }

    #[tokio::test]
    async fn test_connect_without_credential_fails_before_dialing() {
        let mut config = AppConfig::default();
        config.live.api_key = None;
        let result = WebSocketConnector::new().connect(&config).await;
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
    }
}
