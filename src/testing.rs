//! In-crate fakes for device and transport seams

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::buffer::{CapturedFrame, ChunkId, PlaybackChunk};
use crate::audio::engine::{
    AudioDevices, CaptureConfig, CaptureEngine, CaptureErrorSink, ChunkEndedCallback, FrameSink,
    PlaybackConfig, PlaybackEngine,
};
use crate::config::AppConfig;
use crate::constants::OUTGOING_QUEUE_CAPACITY;
use crate::error::{AudioError, NetworkError};
use crate::network::{Connector, LiveConnection, ServerEvent};
use crate::protocol::{ClientMessage, ServerMessage};

/// Playback engine with a manual clock
pub struct FakePlayback {
    time: Mutex<f64>,
    scheduled: Mutex<Vec<(ChunkId, f64, usize)>>,
    on_ended: Mutex<Option<ChunkEndedCallback>>,
    fail_next: AtomicBool,
    cancels: AtomicUsize,
    closed: AtomicBool,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self {
            time: Mutex::new(0.0),
            scheduled: Mutex::new(Vec::new()),
            on_ended: Mutex::new(None),
            fail_next: AtomicBool::new(false),
            cancels: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_time(&self, time: f64) {
        *self.time.lock() = time;
    }

    pub fn fail_next_schedule(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn scheduled_starts(&self) -> Vec<f64> {
        self.scheduled.lock().iter().map(|(_, start, _)| *start).collect()
    }

    pub fn scheduled_ids(&self) -> Vec<ChunkId> {
        self.scheduled.lock().iter().map(|(id, _, _)| *id).collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate natural completion of a chunk
    pub fn finish(&self, id: ChunkId) {
        let callback = self.on_ended.lock().clone();
        if let Some(callback) = callback {
            callback(id);
        }
    }
}

impl PlaybackEngine for FakePlayback {
    fn current_time(&self) -> f64 {
        *self.time.lock()
    }

    fn schedule(&self, id: ChunkId, chunk: PlaybackChunk, start_at: f64) -> Result<(), AudioError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AudioError::StreamError("fake schedule failure".to_string()));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(AudioError::EngineClosed);
        }
        self.scheduled.lock().push((id, start_at, chunk.len()));
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shared view of a fake microphone
#[derive(Default)]
pub struct CaptureControl {
    sink: Mutex<Option<FrameSink>>,
    on_error: Mutex<Option<CaptureErrorSink>>,
    streaming: AtomicBool,
    stopped: AtomicBool,
}

impl CaptureControl {
    /// Push a frame as if the device produced it
    pub fn emit(&self, frame: CapturedFrame) -> bool {
        if !self.streaming.load(Ordering::SeqCst) {
            return false;
        }
        match self.sink.lock().as_mut() {
            Some(sink) => {
                sink(frame);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, err: AudioError) {
        if let Some(on_error) = self.on_error.lock().as_mut() {
            on_error(err);
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct FakeCapture {
    control: Arc<CaptureControl>,
}

impl CaptureEngine for FakeCapture {
    fn begin(&mut self, sink: FrameSink, on_error: CaptureErrorSink) -> Result<(), AudioError> {
        *self.control.sink.lock() = Some(sink);
        *self.control.on_error.lock() = Some(on_error);
        self.control.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.control.streaming.store(false, Ordering::SeqCst);
        self.control.stopped.store(true, Ordering::SeqCst);
        self.control.sink.lock().take();
    }

    fn is_streaming(&self) -> bool {
        self.control.is_streaming()
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Device factory handing out fakes, with injectable failures
pub struct FakeDevices {
    pub capture: Arc<CaptureControl>,
    pub playback: Arc<FakePlayback>,
    pub capture_error: Mutex<Option<AudioError>>,
    pub captures_opened: AtomicUsize,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            capture: Arc::new(CaptureControl::default()),
            playback: Arc::new(FakePlayback::new()),
            capture_error: Mutex::new(None),
            captures_opened: AtomicUsize::new(0),
        }
    }

    pub fn failing_capture(err: AudioError) -> Self {
        let devices = Self::new();
        *devices.capture_error.lock() = Some(err);
        devices
    }
}

impl AudioDevices for FakeDevices {
    fn open_capture(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureEngine>, AudioError> {
        if let Some(err) = self.capture_error.lock().clone() {
            return Err(err);
        }
        self.captures_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            control: self.capture.clone(),
        }))
    }

    fn open_playback(
        &self,
        _config: &PlaybackConfig,
        on_ended: ChunkEndedCallback,
    ) -> Result<Arc<dyn PlaybackEngine>, AudioError> {
        *self.playback.on_ended.lock() = Some(on_ended);
        self.playback.closed.store(false, Ordering::SeqCst);
        Ok(self.playback.clone())
    }
}

/// Remote side of a fake connection
pub struct FakeRemote {
    pub to_client: mpsc::UnboundedSender<ServerEvent>,
    pub from_client: mpsc::Receiver<ClientMessage>,
}

impl FakeRemote {
    pub fn push_json(&self, json: &str) {
        let msg: ServerMessage = serde_json::from_str(json).expect("valid server json");
        let _ = self.to_client.send(ServerEvent::Message(msg));
    }

    pub fn setup_complete(&self) {
        self.push_json(r#"{"setupComplete":{}}"#);
    }
}

/// Connector that hands its remote ends to the test
pub struct FakeConnector {
    remotes: Mutex<Vec<FakeRemote>>,
    fail_with: Mutex<Option<NetworkError>>,
    gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            remotes: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            gate: Mutex::new(None),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: NetworkError) -> Self {
        let connector = Self::new();
        *connector.fail_with.lock() = Some(err);
        connector
    }

    /// Hold the next connect until the returned sender fires
    pub fn gated(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn take_remote(&self) -> FakeRemote {
        self.remotes.lock().pop().expect("a connection was opened")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _config: &AppConfig) -> Result<LiveConnection, NetworkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        let (out_tx, out_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.remotes.lock().push(FakeRemote {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(LiveConnection::new(out_tx, in_rx, Vec::new()))
    }
}
