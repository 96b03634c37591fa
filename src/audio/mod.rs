//! Audio subsystem: microphone frames in, scheduled speaker chunks out

pub mod buffer;
pub mod capture;
pub mod device;
pub mod engine;
pub mod playback;
pub mod scheduler;

pub use buffer::{BlockAccumulator, CapturedFrame, ChunkId, PlaybackChunk};
pub use capture::MicrophoneCapture;
pub use device::{list_devices, AudioDeviceInfo, CpalDevices};
pub use engine::{AudioDevices, CaptureConfig, CaptureEngine, PlaybackConfig, PlaybackEngine};
pub use playback::DevicePlayback;
pub use scheduler::PlaybackScheduler;
