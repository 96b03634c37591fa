//! Transport-agnostic connection to the remote endpoint

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::error::NetworkError;
use crate::protocol::{ClientMessage, ServerMessage};

/// Normal closure status code
pub const CLOSE_NORMAL: u16 = 1000;

/// Everything the transport reports, in arrival order
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A parsed server message
    Message(ServerMessage),
    /// The remote side closed the stream
    Closed { code: u16, reason: String },
    /// The transport failed
    Failed(NetworkError),
}

impl ServerEvent {
    /// Close frame with the normal status code
    pub fn is_normal_close(&self) -> bool {
        matches!(self, ServerEvent::Closed { code, .. } if *code == CLOSE_NORMAL)
    }
}

/// An open stream, setup already sent
pub struct LiveConnection {
    outgoing: mpsc::Sender<ClientMessage>,
    incoming: mpsc::UnboundedReceiver<ServerEvent>,
    /// Tasks aborted on close
    tasks: Vec<JoinHandle<()>>,
}

impl LiveConnection {
    pub fn new(
        outgoing: mpsc::Sender<ClientMessage>,
        incoming: mpsc::UnboundedReceiver<ServerEvent>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            tasks,
        }
    }

    /// Separate the sending half (owned by the session record) from the
    /// event stream (owned by the event loop)
    pub fn split(self) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let handle = ConnectionHandle {
            outgoing: Some(self.outgoing),
            tasks: self.tasks,
        };
        (handle, self.incoming)
    }
}

/// Sending half of a connection. Dropping it closes the stream.
pub struct ConnectionHandle {
    outgoing: Option<mpsc::Sender<ClientMessage>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Queue a message for the writer. Never blocks: when the writer is
    /// behind and the queue is full the message is dropped and `Ok(false)`
    /// is returned.
    pub fn send(&self, message: ClientMessage) -> Result<bool, NetworkError> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| NetworkError::SendFailed("connection closed".to_string()))?;
        match outgoing.try_send(message) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => {
                Err(NetworkError::SendFailed("writer stopped".to_string()))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.outgoing.as_ref().map_or(false, |tx| !tx.is_closed())
    }

    /// Best-effort close. Idempotent.
    pub fn close(&mut self) {
        // The writer sends a close frame once its queue is dropped
        if self.outgoing.take().is_some() {
            tracing::debug!("Closing remote stream");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens connections to the remote endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and send the setup message. Readiness is signalled later by
    /// `setupComplete` on the event stream.
    async fn connect(&self, config: &AppConfig) -> Result<LiveConnection, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, mut rx) = mpsc::channel(4);
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let (mut handle, _events) = LiveConnection::new(tx, in_rx, Vec::new()).split();

        assert!(handle
            .send(ClientMessage::audio("audio/pcm;rate=16000", "AAAA".into()))
            .unwrap());
        assert!(rx.recv().await.is_some());

        handle.close();
        handle.close();
        assert!(!handle.is_open());
        assert!(handle.send(ClientMessage::audio("audio/pcm", String::new())).is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_buffering() {
        let (tx, mut rx) = mpsc::channel(2);
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let (handle, _events) = LiveConnection::new(tx, in_rx, Vec::new()).split();

        let frame = |data: &str| ClientMessage::audio("audio/pcm;rate=16000", data.into());
        assert!(handle.send(frame("AAAA")).unwrap());
        assert!(handle.send(frame("BBBB")).unwrap());
        // Writer stalled: the third frame is dropped, the link stays usable
        assert!(!handle.send(frame("CCCC")).unwrap());
        assert!(handle.is_open());

        assert!(rx.recv().await.is_some());
        assert!(handle.send(frame("DDDD")).unwrap());
    }

    #[tokio::test]
    async fn test_close_aborts_tasks() {
        let (tx, _rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let (guard_tx, guard_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = guard_tx;
            std::future::pending::<()>().await
        });
        let (handle, _events) = LiveConnection::new(tx, in_rx, vec![task]).split();

        drop(handle);
        // Aborting drops the task's future, and the guard with it
        assert!(guard_rx.await.is_err());
    }

    #[test]
    fn test_normal_close_detection() {
        let normal = ServerEvent::Closed {
            code: 1000,
            reason: String::new(),
        };
        let abnormal = ServerEvent::Closed {
            code: 1011,
            reason: "internal".into(),
        };
        assert!(normal.is_normal_close());
        assert!(!abnormal.is_normal_close());
    }
}
