//! Audio frame types and fixed-size block assembly
//!
//! Device callbacks deliver arbitrarily sized, possibly multi-channel
//! buffers. The remote endpoint wants fixed-size mono frames, so capture
//! goes through a [`BlockAccumulator`] before encoding.

/// A fixed-size block of microphone samples in the input rate domain.
/// Encoded and sent immediately, never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Input sample rate
    pub sample_rate: u32,
    /// Capture order, starting at zero for each session
    pub sequence: u64,
}

impl CapturedFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decoded remote audio in the output rate domain
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    /// Mono samples in [-1, 1)
    pub samples: Vec<f32>,
    /// Output sample rate
    pub sample_rate: u32,
}

impl PlaybackChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Chunk duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Identifies a scheduled playback chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub u64);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk-{}", self.0)
    }
}

/// Collects channel 0 of interleaved device buffers into fixed-size frames
pub struct BlockAccumulator {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    sequence: u64,
}

impl BlockAccumulator {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size),
            sequence: 0,
        }
    }

    /// Append an interleaved buffer and emit every completed frame in order
    pub fn push_interleaved<F>(&mut self, data: &[f32], channels: u16, mut emit: F)
    where
        F: FnMut(CapturedFrame),
    {
        let channels = channels.max(1) as usize;
        for sample in data.iter().step_by(channels) {
            self.pending.push(*sample);
            if self.pending.len() == self.block_size {
                let samples =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                emit(CapturedFrame::new(samples, self.sample_rate, self.sequence));
                self.sequence += 1;
            }
        }
    }

    /// Samples waiting for the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.sequence
    }

    /// Drop buffered samples and restart numbering
    pub fn reset(&mut self) {
        self.pending.clear();
        self.sequence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_emits_fixed_blocks() {
        let mut acc = BlockAccumulator::new(4, 16_000);
        let mut frames = Vec::new();

        acc.push_interleaved(&[0.1, 0.2, 0.3], 1, |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(acc.pending_len(), 3);

        acc.push_interleaved(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9], 1, |f| frames.push(f));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frames[1].samples, vec![0.5, 0.6, 0.7, 0.8]);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(acc.pending_len(), 1);
    }

    #[test]
    fn test_accumulator_takes_first_channel() {
        let mut acc = BlockAccumulator::new(2, 16_000);
        let mut frames = Vec::new();

        // L, R, L, R
        acc.push_interleaved(&[0.5, -1.0, 0.25, -1.0], 2, |f| frames.push(f));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![0.5, 0.25]);
    }

    #[test]
    fn test_accumulator_reset() {
        let mut acc = BlockAccumulator::new(2, 16_000);
        acc.push_interleaved(&[0.0, 0.0, 0.0], 1, |_| {});
        assert_eq!(acc.frames_emitted(), 1);
        acc.reset();
        assert_eq!(acc.frames_emitted(), 0);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = PlaybackChunk::new(vec![0.0; 12_000], 24_000);
        assert_eq!(chunk.duration_secs(), 0.5);

        let frame = CapturedFrame::new(vec![0.0; 4096], 16_000, 0);
        assert!((frame.duration_secs() - 0.256).abs() < 1e-9);
    }
}
