//! # Navigator Live
//!
//! Real-time voice conversation with a remote multimodal assistant.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               LOCAL HOST                                  │
//! │                                                                           │
//! │  ┌─────────────┐   4096-sample    ┌─────────────┐   base64 PCM blob       │
//! │  │ Microphone  │ ───────────────▶ │ PcmEncoder  │ ─────────────┐          │
//! │  │  (16 kHz)   │   frames         │ f32 → i16   │              │          │
//! │  └─────────────┘                  └─────────────┘              │          │
//! │                                                                ▼          │
//! │  ┌─────────────────────────────────────────────────────────────────────┐  │
//! │  │            Session event loop (session::event_loop)                 │  │
//! │  │   connecting ──setupComplete──▶ open ──stop/close──▶ closed | error │  │
//! │  └─────────────────────────────────────────────────────────────────────┘  │
//! │         ▲                                                      │          │
//! │         │ serverContent (inline audio, turnComplete)           │          │
//! │         │                                                      ▼          │
//! │  ┌─────────────┐   chunk    ┌───────────────────┐      ┌──────────────┐   │
//! │  │ PcmDecoder  │ ─────────▶ │ PlaybackScheduler │ ───▶ │   Speaker    │   │
//! │  │ i16 → f32   │            │ cursor + active   │      │   (24 kHz)   │   │
//! │  └─────────────┘            └───────────────────┘      └──────────────┘   │
//! └────────────────────────────────────┬──────────────────────────────────────┘
//!                                      │ WebSocket (tokio-tungstenite)
//!                                      ▼
//!                        Remote bidirectional speech endpoint
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorKind, Result};
pub use session::{ConnectionState, LiveSession, SessionEvent, SessionStatus};

/// Application-wide constants
pub mod constants {
    /// Microphone sample rate expected by the remote endpoint
    pub const INPUT_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of the audio the remote endpoint speaks back
    pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

    /// Samples per captured frame
    pub const CAPTURE_BLOCK_SIZE: usize = 4096;

    /// Both directions are mono
    pub const CHANNELS: u16 = 1;

    /// Default remote model
    pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

    /// Default prebuilt voice
    pub const DEFAULT_VOICE: &str = "Zephyr";

    /// Persona sent with the session setup
    pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Navigator AI, a calm and helpful \
        emergency assistant. Keep answers brief and actionable.";

    /// Bidirectional streaming endpoint
    pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
        google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

    /// How long the remote endpoint may take to confirm setup
    pub const SETUP_TIMEOUT_MS: u64 = 15_000;

    /// Audio frames allowed to wait for the socket writer
    pub const OUTGOING_QUEUE_CAPACITY: usize = 8;

    /// Default port for the local control UI
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Capacity of the broadcast channel carrying session events
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}
