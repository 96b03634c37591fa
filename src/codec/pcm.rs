//! 16-bit PCM sample conversion
//!
//! Encoding clamps to [-1, 1] and scales the two halves separately
//! (0x8000 below zero, 0x7FFF above) so both extremes are representable.
//! Decoding divides by 32768 uniformly.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Convert one float sample to a signed 16-bit sample
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Convert one signed 16-bit sample back to float
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encode float samples to little-endian 16-bit PCM bytes
pub fn encode_samples(samples: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(f32_to_i16(sample));
    }
    buf.freeze()
}

/// Decode little-endian 16-bit PCM bytes to float samples
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::DecodingFailed(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}
