//! Per-session event loop
//!
//! One task processes server messages, captured frames and chunk
//! completions in order. The playback scheduler lives here and is mutated
//! from nowhere else.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::buffer::{CapturedFrame, ChunkId, PlaybackChunk};
use crate::audio::scheduler::PlaybackScheduler;
use crate::codec::{PcmDecoder, PcmEncoder};
use crate::error::{AudioError, Error, NetworkError};
use crate::network::{ServerEvent, CLOSE_NORMAL};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::record::Shared;
use crate::session::state::{ConnectionState, SessionEvent};

/// Events raised on device threads
#[derive(Debug)]
pub(crate) enum LocalEvent {
    Frame(CapturedFrame),
    CaptureFailed(AudioError),
    ChunkEnded(ChunkId),
}

pub(crate) struct EventLoop {
    pub epoch: u64,
    pub shared: Arc<Shared>,
    pub incoming: mpsc::UnboundedReceiver<ServerEvent>,
    pub local_rx: mpsc::UnboundedReceiver<LocalEvent>,
    /// Cloned into the capture sink once the stream opens
    pub local_tx: mpsc::UnboundedSender<LocalEvent>,
    pub scheduler: PlaybackScheduler,
    pub encoder: PcmEncoder,
    pub decoder: PcmDecoder,
    /// Deadline for the remote endpoint to confirm setup
    pub setup_timeout: Duration,
    pub opened: bool,
}

impl EventLoop {
    pub async fn run(mut self) {
        tracing::debug!("Event loop started (epoch {})", self.epoch);
        let setup_deadline = tokio::time::sleep(self.setup_timeout);
        tokio::pin!(setup_deadline);
        loop {
            let flow = tokio::select! {
                event = self.incoming.recv() => match event {
                    Some(event) => self.on_server_event(event),
                    None => self.on_server_event(ServerEvent::Closed {
                        code: 1006,
                        reason: "transport dropped".to_string(),
                    }),
                },
                Some(event) = self.local_rx.recv() => self.on_local_event(event),
                _ = &mut setup_deadline, if !self.opened => self.on_setup_timeout(),
            };
            if flow.is_break() {
                break;
            }
        }
        tracing::debug!("Event loop finished (epoch {})", self.epoch);
    }

    fn on_server_event(&mut self, event: ServerEvent) -> ControlFlow<()> {
        match event {
            ServerEvent::Message(message) => self.on_message(message),
            ServerEvent::Closed { code, .. } if code == CLOSE_NORMAL => {
                self.shared.terminate(self.epoch, None, false);
                ControlFlow::Break(())
            }
            ServerEvent::Closed { code, reason } => {
                self.fail(Error::Network(NetworkError::Closed { code, reason }))
            }
            ServerEvent::Failed(err) => self.fail(Error::Network(err)),
        }
    }

    fn on_local_event(&mut self, event: LocalEvent) -> ControlFlow<()> {
        match event {
            LocalEvent::Frame(frame) => self.on_frame(frame),
            LocalEvent::CaptureFailed(err) => self.fail(Error::Audio(err)),
            LocalEvent::ChunkEnded(id) => self.on_chunk_ended(id),
        }
    }

    fn on_message(&mut self, message: ServerMessage) -> ControlFlow<()> {
        if message.setup_complete.is_some() {
            self.on_open()?;
        }

        if let Some(go_away) = &message.go_away {
            tracing::warn!(
                "Server is going away (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            );
        }

        if message.is_interrupted() && self.scheduler.interrupt() {
            tracing::info!("Remote turn interrupted");
            self.set_speaking(false, Vec::new())?;
        }

        for blob in message.audio_payloads() {
            match self.decoder.decode(&blob.data) {
                Ok(chunk) => self.play(chunk)?,
                Err(e) => {
                    tracing::warn!("Dropping undecodable audio chunk: {}", e);
                    let mut record = self.shared.record.lock();
                    if record.epoch == self.epoch {
                        record.status.chunks_dropped += 1;
                    }
                }
            }
        }

        let texts: Vec<SessionEvent> = message
            .texts()
            .map(|text| SessionEvent::Text {
                text: text.to_string(),
            })
            .collect();
        if !texts.is_empty() {
            let record = self.shared.record.lock();
            if record.epoch != self.epoch {
                return ControlFlow::Break(());
            }
            self.shared.publish(&record, texts);
        }

        if message.is_turn_complete() {
            if self.scheduler.turn_complete() {
                self.publish_if_current(vec![SessionEvent::TurnComplete])?;
            } else {
                tracing::debug!(
                    "Turn complete on the wire, {} chunks still sounding",
                    self.scheduler.active_count()
                );
            }
        }

        ControlFlow::Continue(())
    }

    /// Server confirmed setup: the channel is ready, start the microphone
    fn on_open(&mut self) -> ControlFlow<()> {
        let frames_tx = self.local_tx.clone();
        let errors_tx = self.local_tx.clone();

        let begun = {
            let mut record = self.shared.record.lock();
            if record.epoch != self.epoch {
                return ControlFlow::Break(());
            }
            if record.status.state != ConnectionState::Connecting {
                return ControlFlow::Continue(());
            }
            let begun = match record.resources.capture.as_mut() {
                Some(capture) => capture.begin(
                    Box::new(move |frame| {
                        let _ = frames_tx.send(LocalEvent::Frame(frame));
                    }),
                    Box::new(move |err| {
                        let _ = errors_tx.send(LocalEvent::CaptureFailed(err));
                    }),
                ),
                None => Err(AudioError::EngineClosed),
            };
            if begun.is_ok() {
                self.opened = true;
                record.status.state = ConnectionState::Open;
                self.shared.publish(
                    &record,
                    vec![SessionEvent::StateChanged {
                        state: ConnectionState::Open,
                    }],
                );
            }
            begun
        };

        match begun {
            Ok(()) => {
                tracing::info!("Live session open, streaming microphone");
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(Error::Audio(e)),
        }
    }

    fn on_setup_timeout(&mut self) -> ControlFlow<()> {
        tracing::warn!(
            "Remote endpoint did not confirm setup within {:?}",
            self.setup_timeout
        );
        self.fail(Error::Network(NetworkError::ConnectionFailed(format!(
            "setup not confirmed within {} ms",
            self.setup_timeout.as_millis()
        ))))
    }

    fn play(&mut self, chunk: PlaybackChunk) -> ControlFlow<()> {
        // Nothing may be scheduled after teardown
        if !self.shared.is_current(self.epoch) {
            return ControlFlow::Break(());
        }
        let was_speaking = self.scheduler.is_speaking();
        match self.scheduler.schedule(chunk) {
            Ok(_) => {
                if !was_speaking {
                    self.set_speaking(true, Vec::new())?;
                }
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(Error::Audio(e)),
        }
    }

    fn on_frame(&mut self, frame: CapturedFrame) -> ControlFlow<()> {
        let encoded = match self.encoder.encode(&frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("Skipping captured frame {}: {}", frame.sequence, e);
                return ControlFlow::Continue(());
            }
        };

        let sent = {
            let mut record = self.shared.record.lock();
            if record.epoch != self.epoch {
                return ControlFlow::Break(());
            }
            if record.status.state != ConnectionState::Open {
                return ControlFlow::Continue(());
            }
            let sent = match record.resources.connection.as_ref() {
                Some(connection) => {
                    connection.send(ClientMessage::audio(encoded.mime_type, encoded.data))
                }
                None => Err(NetworkError::SendFailed("no connection".to_string())),
            };
            if let Ok(true) = sent {
                record.status.frames_sent += 1;
            }
            sent
        };

        match sent {
            Ok(true) => {
                tracing::trace!("Sent frame {}", encoded.sequence);
                ControlFlow::Continue(())
            }
            Ok(false) => {
                tracing::warn!("Link is behind, dropped frame {}", encoded.sequence);
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(Error::Network(e)),
        }
    }

    /// Single completion handler for every chunk
    fn on_chunk_ended(&mut self, id: ChunkId) -> ControlFlow<()> {
        let outcome = self.scheduler.chunk_ended(id);
        {
            let mut record = self.shared.record.lock();
            if record.epoch != self.epoch {
                return ControlFlow::Break(());
            }
            record.status.chunks_played = self.scheduler.chunks_played();
        }

        if outcome.became_idle {
            let events = (0..outcome.turns_finished)
                .map(|_| SessionEvent::TurnComplete)
                .collect();
            self.set_speaking(false, events)?;
        }
        ControlFlow::Continue(())
    }

    /// Flip the speaking flag and publish it, followed by `then`
    fn set_speaking(&self, speaking: bool, then: Vec<SessionEvent>) -> ControlFlow<()> {
        let mut record = self.shared.record.lock();
        if record.epoch != self.epoch {
            return ControlFlow::Break(());
        }
        record.status.remote_speaking = speaking;
        let mut events = vec![SessionEvent::SpeakingChanged { speaking }];
        events.extend(then);
        self.shared.publish(&record, events);
        ControlFlow::Continue(())
    }

    fn publish_if_current(&self, events: Vec<SessionEvent>) -> ControlFlow<()> {
        let record = self.shared.record.lock();
        if record.epoch != self.epoch {
            return ControlFlow::Break(());
        }
        self.shared.publish(&record, events);
        ControlFlow::Continue(())
    }

    /// Terminal failure: full teardown, then surface the error
    fn fail(&self, err: Error) -> ControlFlow<()> {
        self.shared.terminate(self.epoch, Some(&err), false);
        ControlFlow::Break(())
    }
}
