//! Microphone capture
//!
//! The cpal input stream lives on a dedicated thread for its whole life.
//! Opening the capture acquires the device and reports the outcome back
//! synchronously, so a refused microphone surfaces as an error from
//! [`MicrophoneCapture::open`] rather than as silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::BlockAccumulator;
use crate::audio::device::{get_default_input_device, get_device_by_id};
use crate::audio::engine::{CaptureConfig, CaptureEngine, CaptureErrorSink, FrameSink};
use crate::error::AudioError;

/// An acquired microphone delivering fixed-size mono frames
pub struct MicrophoneCapture {
    /// Device name, for logging
    device_name: String,

    /// Keeps the stream thread alive
    running: Arc<AtomicBool>,

    /// Gates frame delivery
    streaming: Arc<AtomicBool>,

    /// Frame consumer, installed by `begin`
    sink: Arc<Mutex<Option<FrameSink>>>,

    /// Failure consumer, installed by `begin`
    on_error: Arc<Mutex<Option<CaptureErrorSink>>>,

    /// Frames delivered since `begin`
    frames_delivered: Arc<AtomicU64>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,
}

impl MicrophoneCapture {
    /// Acquire the configured (or default) input device
    pub fn open(config: &CaptureConfig) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let streaming = Arc::new(AtomicBool::new(false));
        let sink: Arc<Mutex<Option<FrameSink>>> = Arc::new(Mutex::new(None));
        let on_error: Arc<Mutex<Option<CaptureErrorSink>>> = Arc::new(Mutex::new(None));
        let frames_delivered = Arc::new(AtomicU64::new(0));

        let (ready_tx, ready_rx) = bounded::<Result<String, AudioError>>(1);

        let thread_config = config.clone();
        let running_for_loop = running.clone();
        let streaming_cb = streaming.clone();
        let sink_cb = sink.clone();
        let on_error_cb = on_error.clone();
        let delivered_cb = frames_delivered.clone();

        let handle = thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || {
                let built = build_input_stream(
                    &thread_config,
                    streaming_cb,
                    sink_cb,
                    on_error_cb,
                    delivered_cb,
                );

                let (stream, name) = match built {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(name));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(std::time::Duration::from_millis(10));
                }

                // Stream is dropped here, releasing the device
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("capture thread exited during setup".into()))
            .and_then(|result| result);

        match ready {
            Ok(device_name) => {
                tracing::info!(
                    "Microphone acquired: {} ({} Hz, {}-sample frames)",
                    device_name,
                    config.sample_rate,
                    config.block_size
                );
                Ok(Self {
                    device_name,
                    running,
                    streaming,
                    sink,
                    on_error,
                    frames_delivered,
                    thread_handle: Some(handle),
                })
            }
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }
}

fn build_input_stream(
    config: &CaptureConfig,
    streaming: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<FrameSink>>>,
    on_error: Arc<Mutex<Option<CaptureErrorSink>>>,
    frames_delivered: Arc<AtomicU64>,
) -> Result<(cpal::Stream, String), AudioError> {
    let device = match &config.device_id {
        Some(id) => get_device_by_id(id)?,
        None => get_default_input_device()?,
    };
    let name = device.name.clone();
    let cpal_device = device.into_inner();

    let default_config = cpal_device.default_input_config()?;
    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels;
    let mut accumulator = BlockAccumulator::new(config.block_size, config.sample_rate);

    let stream = cpal_device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !streaming.load(Ordering::Relaxed) {
                return;
            }
            let mut sink = sink.lock();
            if let Some(sink) = sink.as_mut() {
                accumulator.push_interleaved(data, channels, |frame| {
                    frames_delivered.fetch_add(1, Ordering::Relaxed);
                    sink(frame);
                });
            }
        },
        move |err| {
            let err = AudioError::from(err);
            tracing::error!("Capture stream error: {}", err);
            if let Some(on_error) = on_error.lock().as_mut() {
                on_error(err);
            }
        },
        None,
    )?;

    Ok((stream, name))
}

impl CaptureEngine for MicrophoneCapture {
    fn begin(&mut self, sink: FrameSink, on_error: CaptureErrorSink) -> Result<(), AudioError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::EngineClosed);
        }
        *self.sink.lock() = Some(sink);
        *self.on_error.lock() = Some(on_error);
        self.frames_delivered.store(0, Ordering::SeqCst);
        self.streaming.store(true, Ordering::SeqCst);
        tracing::debug!("Capture streaming from {}", self.device_name);
        Ok(())
    }

    fn stop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Microphone released: {}", self.device_name);
        }

        self.sink.lock().take();
        self.on_error.lock().take();
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst)
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
