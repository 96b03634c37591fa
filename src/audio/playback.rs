//! Speaker output with sample-accurate scheduling
//!
//! The output callback renders a timeline of queued chunks. The playback
//! clock is the number of frames rendered so far divided by the output
//! rate, so a chunk scheduled at `t` starts exactly at frame `t * rate`.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::{ChunkId, PlaybackChunk};
use crate::audio::device::{get_default_output_device, get_device_by_id};
use crate::audio::engine::{ChunkEndedCallback, PlaybackConfig, PlaybackEngine};
use crate::error::AudioError;

struct QueuedChunk {
    id: ChunkId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl QueuedChunk {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Chunks waiting to sound, ordered by start frame and never overlapping
#[derive(Default)]
struct Timeline {
    chunks: VecDeque<QueuedChunk>,
    /// First frame the output callback has not rendered yet
    next_frame: u64,
}

impl Timeline {
    /// Queue a chunk. A start already rendered past plays the whole chunk
    /// from the next frame, and later chunks move back to stay contiguous.
    fn insert(&mut self, mut chunk: QueuedChunk) {
        if chunk.start_frame < self.next_frame {
            tracing::debug!(
                "{} arrived {} frames late",
                chunk.id,
                self.next_frame - chunk.start_frame
            );
            chunk.start_frame = self.next_frame;
        }
        let pos = self
            .chunks
            .iter()
            .rposition(|c| c.start_frame <= chunk.start_frame)
            .map(|i| i + 1)
            .unwrap_or(0);
        if let Some(prev) = pos.checked_sub(1).and_then(|i| self.chunks.get(i)) {
            chunk.start_frame = chunk.start_frame.max(prev.end_frame());
        }
        self.chunks.insert(pos, chunk);

        let mut end = self.chunks[pos].end_frame();
        for later in self.chunks.iter_mut().skip(pos + 1) {
            if later.start_frame >= end {
                break;
            }
            later.start_frame = end;
            end = later.end_frame();
        }
    }

    /// Mono sample at `frame`, collecting chunks that have finished
    fn sample_at(&mut self, frame: u64, finished: &mut Vec<ChunkId>) -> f32 {
        while let Some(front) = self.chunks.front() {
            if frame >= front.end_frame() {
                finished.push(front.id);
                self.chunks.pop_front();
                continue;
            }
            if frame >= front.start_frame {
                return front.samples[(frame - front.start_frame) as usize];
            }
            break;
        }
        0.0
    }

    /// Render interleaved output starting at `first_frame`
    fn render(
        &mut self,
        out: &mut [f32],
        channels: usize,
        first_frame: u64,
        finished: &mut Vec<ChunkId>,
    ) -> u64 {
        let mut frames = 0u64;
        for frame in out.chunks_mut(channels) {
            let value = self.sample_at(first_frame + frames, finished);
            for slot in frame.iter_mut() {
                *slot = value;
            }
            frames += 1;
        }
        // Chunks that ended exactly on the buffer boundary
        let next = first_frame + frames;
        self.next_frame = next;
        while let Some(front) = self.chunks.front() {
            if next >= front.end_frame() {
                finished.push(front.id);
                self.chunks.pop_front();
            } else {
                break;
            }
        }
        frames
    }
}

/// Output device driven by a shared timeline
pub struct DevicePlayback {
    device_name: String,
    sample_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    frames_rendered: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DevicePlayback {
    /// Acquire the configured (or default) output device
    pub fn open(config: &PlaybackConfig, on_ended: ChunkEndedCallback) -> Result<Self, AudioError> {
        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = bounded::<Result<String, AudioError>>(1);

        let thread_config = config.clone();
        let timeline_cb = timeline.clone();
        let rendered_cb = frames_rendered.clone();
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("speaker-playback".to_string())
            .spawn(move || {
                let built =
                    build_output_stream(&thread_config, timeline_cb, rendered_cb, on_ended);

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

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(std::time::Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("playback thread exited during setup".into()))
            .and_then(|result| result);

        match ready {
            Ok(device_name) => {
                tracing::info!("Speaker acquired: {} ({} Hz)", device_name, config.sample_rate);
                Ok(Self {
                    device_name,
                    sample_rate: config.sample_rate,
                    timeline,
                    frames_rendered,
                    running,
                    thread_handle: Mutex::new(Some(handle)),
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
}

fn build_output_stream(
    config: &PlaybackConfig,
    timeline: Arc<Mutex<Timeline>>,
    frames_rendered: Arc<AtomicU64>,
    on_ended: ChunkEndedCallback,
) -> Result<(cpal::Stream, String), AudioError> {
    let device = match &config.device_id {
        Some(id) => get_device_by_id(id)?,
        None => get_default_output_device()?,
    };
    let name = device.name.clone();
    let cpal_device = device.into_inner();

    let default_config = cpal_device.default_output_config()?;
    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels.max(1) as usize;
    let mut finished = Vec::new();

    let stream = cpal_device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let first = frames_rendered.load(Ordering::Acquire);
            let frames = timeline.lock().render(data, channels, first, &mut finished);
            frames_rendered.store(first + frames, Ordering::Release);

            for id in finished.drain(..) {
                on_ended(id);
            }
        },
        move |err| {
            tracing::error!("Playback stream error: {}", AudioError::from(err));
        },
        None,
    )?;

    Ok((stream, name))
}

impl PlaybackEngine for DevicePlayback {
    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn schedule(&self, id: ChunkId, chunk: PlaybackChunk, start_at: f64) -> Result<(), AudioError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::EngineClosed);
        }
        if chunk.sample_rate != self.sample_rate {
            return Err(AudioError::UnsupportedFormat(format!(
                "chunk at {} Hz on a {} Hz output",
                chunk.sample_rate, self.sample_rate
            )));
        }
        let start_frame = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        self.timeline.lock().insert(QueuedChunk {
            id,
            start_frame,
            samples: chunk.samples,
        });
        Ok(())
    }

    fn cancel_all(&self) {
        let dropped = {
            let mut timeline = self.timeline.lock();
            let n = timeline.chunks.len();
            timeline.chunks.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!("Cancelled {} queued chunks", dropped);
        }
    }

    fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.timeline.lock().chunks.clear();

        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
            tracing::info!("Speaker released: {}", self.device_name);
        }
    }
}

impl Drop for DevicePlayback {
    fn drop(&mut self) {
        self.close();
    }
}
