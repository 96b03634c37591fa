//! PCM codec
//!
//! 16-bit little-endian PCM carried as base64 in both directions.

pub mod decoder;
pub mod encoder;
pub mod pcm;

pub use decoder::PcmDecoder;
pub use encoder::{EncodedFrame, PcmEncoder};
