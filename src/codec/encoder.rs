//! PCM frame encoder
//!
//! Turns captured float frames into base64 PCM blobs tagged with the input
//! sample rate, ready to be wrapped in a realtime input message.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::audio::buffer::CapturedFrame;
use crate::codec::pcm;
use crate::error::CodecError;

/// One encoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub mime_type: String,
    /// Base64 of little-endian 16-bit PCM
    pub data: String,
    pub sequence: u64,
}

/// PCM encoder with fixed block size and sample rate
pub struct PcmEncoder {
    block_size: usize,
    sample_rate: u32,
    mime_type: String,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total PCM bytes produced (before base64)
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            block_size,
            sample_rate,
            mime_type: format!("audio/pcm;rate={}", sample_rate),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a captured frame.
    ///
    /// The frame must hold exactly `block_size` samples.
    pub fn encode(&mut self, frame: &CapturedFrame) -> Result<EncodedFrame, CodecError> {
        if frame.samples.len() != self.block_size {
            return Err(CodecError::InvalidFrameSize(frame.samples.len()));
        }

        let bytes = pcm::encode_samples(&frame.samples);
        self.frames_encoded += 1;
        self.bytes_produced += bytes.len() as u64;

        Ok(EncodedFrame {
            mime_type: self.mime_type.clone(),
            data: BASE64.encode(&bytes),
            sequence: frame.sequence,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.block_size as f32 * 1000.0 / self.sample_rate as f32
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }

    pub fn reset_stats(&mut self) {
        self.frames_encoded = 0;
        self.bytes_produced = 0;
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}
