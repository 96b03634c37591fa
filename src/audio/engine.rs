//! Device seams used by the session
//!
//! The session never touches cpal directly. It asks an [`AudioDevices`]
//! implementation for a capture engine and a playback engine, which lets
//! tests drive the whole lifecycle with a manual clock and no hardware.

use std::sync::Arc;

use crate::audio::buffer::{CapturedFrame, ChunkId, PlaybackChunk};
use crate::error::AudioError;

/// Receives every captured frame, in capture order
pub type FrameSink = Box<dyn FnMut(CapturedFrame) + Send>;

/// Receives a capture failure after the stream has started
pub type CaptureErrorSink = Box<dyn FnMut(AudioError) + Send>;

/// Invoked once per chunk when it finishes sounding
pub type ChunkEndedCallback = Arc<dyn Fn(ChunkId) + Send + Sync>;

/// Capture parameters
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device id; default input device if `None`
    pub device_id: Option<String>,
    pub sample_rate: u32,
    pub block_size: usize,
}

/// Playback parameters
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Device id; default output device if `None`
    pub device_id: Option<String>,
    pub sample_rate: u32,
}

/// An acquired microphone.
///
/// Opening acquires the device; no frames flow until [`CaptureEngine::begin`].
pub trait CaptureEngine: Send {
    /// Start delivering fixed-size frames to `sink`
    fn begin(&mut self, sink: FrameSink, on_error: CaptureErrorSink) -> Result<(), AudioError>;

    /// Release the device. Idempotent.
    fn stop(&mut self);

    /// Whether frames are currently flowing
    fn is_streaming(&self) -> bool;
}

/// A buffer-scheduling output engine with its own clock
pub trait PlaybackEngine: Send + Sync {
    /// Current position of the playback clock in seconds
    fn current_time(&self) -> f64;

    /// Queue `chunk` to start sounding at `start_at` seconds on the playback
    /// clock. The engine reports natural completion through the callback it
    /// was opened with.
    fn schedule(&self, id: ChunkId, chunk: PlaybackChunk, start_at: f64)
        -> Result<(), AudioError>;

    /// Silence and forget every queued chunk without reporting completion
    fn cancel_all(&self);

    /// Release the device. Idempotent.
    fn close(&self);
}

/// Factory for device engines
pub trait AudioDevices: Send + Sync {
    fn open_capture(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureEngine>, AudioError>;

    fn open_playback(
        &self,
        config: &PlaybackConfig,
        on_ended: ChunkEndedCallback,
    ) -> Result<Arc<dyn PlaybackEngine>, AudioError>;
}
