//! Error types for the live voice session

use serde::Serialize;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Engine closed")]
    EngineClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// PCM codec errors
#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Remote stream errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Stream closed by remote (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Failure taxonomy surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    ConnectionError,
    DecodeError,
    InitializationError,
}

impl Error {
    /// Classify this error into the taxonomy the UI renders.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Audio(AudioError::PermissionDenied(_)) => ErrorKind::PermissionDenied,
            Error::Audio(_) => ErrorKind::DeviceUnavailable,
            Error::Codec(_) => ErrorKind::DecodeError,
            Error::Network(_) => ErrorKind::ConnectionError,
            Error::Initialization(_) | Error::Config(_) | Error::Io(_) => {
                ErrorKind::InitializationError
            }
        }
    }
}

impl AudioError {
    /// Map a cpal backend message onto our taxonomy. Platform hosts report a
    /// refused microphone only through the backend description.
    pub fn from_backend(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("permission")
            || lower.contains("denied")
            || lower.contains("not authorized")
            || lower.contains("not permitted")
        {
            AudioError::PermissionDenied(description.to_string())
        } else {
            AudioError::CpalError(description.to_string())
        }
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotFound("device no longer available".to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                AudioError::UnsupportedFormat("stream configuration not supported".to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => {
                AudioError::from_backend(&err.description)
            }
            other => AudioError::StreamError(other.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                AudioError::DeviceNotFound("device no longer available".to_string())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                AudioError::from_backend(&err.description)
            }
            other => AudioError::UnsupportedFormat(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotFound("device no longer available".to_string())
            }
            cpal::PlayStreamError::BackendSpecific { err } => {
                AudioError::from_backend(&err.description)
            }
        }
    }
}

impl From<cpal::StreamError> for AudioError {
    fn from(err: cpal::StreamError) -> Self {
        match err {
            cpal::StreamError::DeviceNotAvailable => {
                AudioError::DeviceNotFound("device disconnected".to_string())
            }
            cpal::StreamError::BackendSpecific { err } => AudioError::from_backend(&err.description),
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::from(AudioError::PermissionDenied("user refused".into()));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = Error::from(AudioError::DeviceNotFound("no mic".into()));
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);

        let err = Error::from(NetworkError::ConnectionFailed("refused".into()));
        assert_eq!(err.kind(), ErrorKind::ConnectionError);

        let err = Error::from(CodecError::DecodingFailed("bad base64".into()));
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        let err = Error::Initialization("no credential".into());
        assert_eq!(err.kind(), ErrorKind::InitializationError);
    }

    #[test]
    fn test_backend_permission_classification() {
        assert!(matches!(
            AudioError::from_backend("Access denied by the operating system"),
            AudioError::PermissionDenied(_)
        ));
        assert!(matches!(
            AudioError::from_backend("ALSA function 'snd_pcm_open' failed"),
            AudioError::CpalError(_)
        ));
    }
}
