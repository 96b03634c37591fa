//! PCM chunk decoder
//!
//! Turns base64 PCM payloads from the remote endpoint into playback chunks
//! tagged with the fixed output sample rate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::audio::buffer::PlaybackChunk;
use crate::codec::pcm;
use crate::error::CodecError;

/// PCM decoder for the output rate domain
pub struct PcmDecoder {
    sample_rate: u32,
    /// Chunks decoded
    chunks_decoded: u64,
    /// Malformed payloads rejected
    chunks_rejected: u64,
    /// Total samples produced
    samples_produced: u64,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunks_decoded: 0,
            chunks_rejected: 0,
            samples_produced: 0,
        }
    }

    /// Decode one base64 payload
    pub fn decode(&mut self, data: &str) -> Result<PlaybackChunk, CodecError> {
        match self.decode_inner(data) {
            Ok(samples) => {
                self.chunks_decoded += 1;
                self.samples_produced += samples.len() as u64;
                Ok(PlaybackChunk::new(samples, self.sample_rate))
            }
            Err(e) => {
                self.chunks_rejected += 1;
                Err(e)
            }
        }
    }

    fn decode_inner(&self, data: &str) -> Result<Vec<f32>, CodecError> {
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| CodecError::DecodingFailed(format!("invalid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(CodecError::DecodingFailed("empty audio payload".to_string()));
        }
        pcm::decode_samples(&bytes)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            chunks_decoded: self.chunks_decoded,
            chunks_rejected: self.chunks_rejected,
            samples_produced: self.samples_produced,
        }
    }

    pub fn reset_stats(&mut self) {
        self.chunks_decoded = 0;
        self.chunks_rejected = 0;
        self.samples_produced = 0;
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub chunks_decoded: u64,
    pub chunks_rejected: u64,
    pub samples_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::CapturedFrame;
    use crate::codec::PcmEncoder;

    #[test]
    fn test_decode_tags_output_rate() {
        let mut decoder = PcmDecoder::new(24_000);
        // 12000 zero samples = 0.5 s
        let payload = BASE64.encode(vec![0u8; 24_000]);
        let chunk = decoder.decode(&payload).unwrap();
        assert_eq!(chunk.sample_rate, 24_000);
        assert_eq!(chunk.len(), 12_000);
        assert_eq!(chunk.duration_secs(), 0.5);
    }

    #[test]
    fn test_encoder_output_decodes() {
        let mut encoder = PcmEncoder::new(4, 16_000);
        let mut decoder = PcmDecoder::new(24_000);
        let frame = CapturedFrame::new(vec![-1.0, -0.5, 0.0, 0.5], 16_000, 0);

        let encoded = encoder.encode(&frame).unwrap();
        let chunk = decoder.decode(&encoded.data).unwrap();
        assert_eq!(chunk.samples[0], -1.0);
        assert_eq!(chunk.samples[1], -0.5);
        assert_eq!(chunk.samples[2], 0.0);
        assert!((chunk.samples[3] - 0.5).abs() <= 2.0 / 32768.0);
    }

    #[test]
    fn test_malformed_payloads_counted() {
        let mut decoder = PcmDecoder::new(24_000);
        assert!(decoder.decode("not base64!!").is_err());
        assert!(decoder.decode("").is_err());
        // three bytes: odd PCM length
        assert!(decoder.decode(&BASE64.encode([1u8, 2, 3])).is_err());

        let stats = decoder.stats();
        assert_eq!(stats.chunks_rejected, 3);
        assert_eq!(stats.chunks_decoded, 0);
    }
}
