//! Session state machine types published to the UI

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

/// Lifecycle of one live session.
///
/// `Connecting` → `Open` (server confirmed setup) → `Closed` or `Error`.
/// A fresh `start()` is allowed from `Closed` and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    /// Whether a session currently holds (or is acquiring) resources
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of the authoritative session record
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// True while any playback chunk is still sounding
    pub remote_speaking: bool,
    /// Human-readable cause of the last failure
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub frames_sent: u64,
    pub chunks_played: u64,
    /// Malformed audio payloads skipped
    pub chunks_dropped: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Closed,
            remote_speaking: false,
            error: None,
            error_kind: None,
            session_id: None,
            started_at: None,
            frames_sent: 0,
            chunks_played: 0,
            chunks_dropped: 0,
        }
    }
}

impl SessionStatus {
    /// Fresh record for a new session attempt
    pub fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            session_id: Some(Uuid::new_v4()),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub(crate) fn record_error(&mut self, err: &Error) {
        self.state = ConnectionState::Error;
        self.remote_speaking = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}

/// Notifications pushed to subscribers, in the order they happen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged { state: ConnectionState },
    SpeakingChanged { speaking: bool },
    /// The remote turn finished audibly
    TurnComplete,
    Text { text: String },
    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;

    #[test]
    fn test_connecting_resets_counters() {
        let status = SessionStatus::connecting();
        assert_eq!(status.state, ConnectionState::Connecting);
        assert!(status.session_id.is_some());
        assert_eq!(status.frames_sent, 0);
        assert!(status.error.is_none());
    }

    #[test]
    fn test_record_error_clears_speaking() {
        let mut status = SessionStatus::connecting();
        status.remote_speaking = true;
        status.record_error(&Error::from(AudioError::PermissionDenied("refused".into())));

        assert_eq!(status.state, ConnectionState::Error);
        assert!(!status.remote_speaking);
        assert_eq!(status.error_kind, Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_event_wire_shape() {
        let event = SessionEvent::StateChanged {
            state: ConnectionState::Open,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["state"], "open");
    }
}
