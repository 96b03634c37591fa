//! Live session lifecycle
//!
//! `start()` acquires, in order, the microphone, the speaker and the remote
//! stream. After every suspension point it re-checks the epoch it started
//! under; a concurrent `stop()` bumps the epoch, so a cancelled start drops
//! whatever it acquired and returns quietly. `stop()` is synchronous and
//! idempotent.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

use crate::audio::engine::{AudioDevices, CaptureConfig, ChunkEndedCallback, PlaybackConfig};
use crate::audio::scheduler::PlaybackScheduler;
use crate::codec::{PcmDecoder, PcmEncoder};
use crate::config::AppConfig;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use crate::network::Connector;
use crate::session::event_loop::{EventLoop, LocalEvent};
use crate::session::record::Shared;
use crate::session::state::{ConnectionState, SessionEvent, SessionStatus};

/// One live voice conversation at a time
pub struct LiveSession {
    config: AppConfig,
    devices: Arc<dyn AudioDevices>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl LiveSession {
    pub fn new(
        config: AppConfig,
        devices: Arc<dyn AudioDevices>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            devices,
            connector,
            shared: Shared::new(EVENT_CHANNEL_CAPACITY),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current snapshot of the session record
    pub fn status(&self) -> SessionStatus {
        self.shared.record.lock().status.clone()
    }

    /// Status updates (state and speaking transitions)
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.subscribe_status()
    }

    /// Ordered event stream
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.subscribe_events()
    }

    /// Start a session.
    ///
    /// Returns once the remote stream is open and the setup message is sent;
    /// the session becomes `Open` when the server confirms setup. A no-op if
    /// a session is already connecting or open.
    pub async fn start(&self) -> Result<()> {
        let epoch = {
            let mut record = self.shared.record.lock();
            if record.status.state.is_active() {
                tracing::debug!("start() ignored, session already {}", record.status.state);
                return Ok(());
            }
            record.epoch += 1;
            record.status = SessionStatus::connecting();
            self.shared.publish(
                &record,
                vec![SessionEvent::StateChanged {
                    state: ConnectionState::Connecting,
                }],
            );
            tracing::info!(
                "Starting live session {}",
                record.status.session_id.map(|id| id.to_string()).unwrap_or_default()
            );
            record.epoch
        };

        match self.acquire(epoch).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.shared.terminate(epoch, Some(&err), true) {
                    Err(err)
                } else {
                    // Cancelled by stop(); the failure is moot
                    tracing::debug!("Start cancelled: {}", err);
                    Ok(())
                }
            }
        }
    }

    async fn acquire(&self, epoch: u64) -> Result<()> {
        self.config.validate()?;

        // Microphone first, so a refusal never opens a stream
        let capture_config = CaptureConfig {
            device_id: self.config.audio.input_device.clone(),
            sample_rate: self.config.audio.input_sample_rate,
            block_size: self.config.audio.block_size,
        };
        let devices = self.devices.clone();
        let capture = tokio::task::spawn_blocking(move || devices.open_capture(&capture_config))
            .await
            .map_err(|e| Error::Initialization(format!("capture setup task failed: {}", e)))??;
        if self
            .shared
            .adopt(epoch, capture, |r, c| r.capture = Some(c))
            .is_some()
        {
            return Ok(());
        }

        let (local_tx, local_rx) = mpsc::unbounded_channel::<LocalEvent>();
        let ended_tx = local_tx.clone();
        let on_ended: ChunkEndedCallback = Arc::new(move |id| {
            let _ = ended_tx.send(LocalEvent::ChunkEnded(id));
        });
        let playback_config = PlaybackConfig {
            device_id: self.config.audio.output_device.clone(),
            sample_rate: self.config.audio.output_sample_rate,
        };
        let devices = self.devices.clone();
        let playback =
            tokio::task::spawn_blocking(move || devices.open_playback(&playback_config, on_ended))
                .await
                .map_err(|e| Error::Initialization(format!("playback setup task failed: {}", e)))??;
        if self
            .shared
            .adopt(epoch, playback.clone(), |r, p| r.playback = Some(p))
            .is_some()
        {
            playback.close();
            return Ok(());
        }

        let connection = self.connector.connect(&self.config).await?;
        let (handle, incoming) = connection.split();

        let event_loop = EventLoop {
            epoch,
            shared: self.shared.clone(),
            incoming,
            local_rx,
            local_tx,
            scheduler: PlaybackScheduler::new(playback),
            encoder: PcmEncoder::new(
                self.config.audio.block_size,
                self.config.audio.input_sample_rate,
            ),
            decoder: PcmDecoder::new(self.config.audio.output_sample_rate),
            setup_timeout: Duration::from_millis(self.config.live.setup_timeout_ms),
            opened: false,
        };

        // Spawn under the lock so the loop cannot tear down before its handle
        // is stored
        let stale = {
            let mut record = self.shared.record.lock();
            if record.epoch != epoch {
                Some(handle)
            } else {
                record.resources.connection = Some(handle);
                record.resources.event_loop = Some(tokio::spawn(event_loop.run()));
                None
            }
        };
        if stale.is_some() {
            tracing::debug!("Stream opened after stop(), closing it");
        }
        Ok(())
    }

    /// Release everything. Safe to call repeatedly and before `start()`
    /// completes. An `Error` state stays visible; anything else ends `Closed`.
    pub fn stop(&self) {
        let (mut resources, events) = {
            let mut record = self.shared.record.lock();
            record.epoch += 1;
            let resources = std::mem::take(&mut record.resources);

            let mut events = Vec::new();
            if record.status.remote_speaking {
                record.status.remote_speaking = false;
                events.push(SessionEvent::SpeakingChanged { speaking: false });
            }
            if record.status.state.is_active() {
                record.status.state = ConnectionState::Closed;
                events.push(SessionEvent::StateChanged {
                    state: ConnectionState::Closed,
                });
            }
            (resources, events)
        };

        let had_resources = !resources.is_empty();
        resources.release(true);

        if !events.is_empty() {
            let record = self.shared.record.lock();
            self.shared.publish(&record, events);
        }
        if had_resources {
            tracing::info!("Live session stopped");
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}
