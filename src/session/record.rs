//! The single authoritative session record
//!
//! Every callback site (start continuation, server events, capture frames,
//! chunk completion) carries the epoch it was created under and checks it
//! against the record before acting. `stop()` and every terminal failure
//! bump the epoch, so late callbacks from a torn-down session are inert.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::audio::engine::{CaptureEngine, PlaybackEngine};
use crate::error::Error;
use crate::network::ConnectionHandle;
use crate::session::state::{ConnectionState, SessionEvent, SessionStatus};

/// Everything a live session holds. Released together.
#[derive(Default)]
pub(crate) struct Resources {
    pub capture: Option<Box<dyn CaptureEngine>>,
    pub playback: Option<Arc<dyn PlaybackEngine>>,
    pub connection: Option<ConnectionHandle>,
    pub event_loop: Option<JoinHandle<()>>,
}

impl Resources {
    /// Release every resource. Idempotent.
    ///
    /// `abort_loop` is false when the event loop tears itself down.
    pub fn release(&mut self, abort_loop: bool) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        if let Some(playback) = self.playback.take() {
            playback.cancel_all();
            playback.close();
        }
        if let Some(handle) = self.event_loop.take() {
            if abort_loop {
                handle.abort();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_none()
            && self.playback.is_none()
            && self.connection.is_none()
            && self.event_loop.is_none()
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.release(true);
    }
}

pub(crate) struct SessionRecord {
    pub epoch: u64,
    pub status: SessionStatus,
    pub resources: Resources,
}

/// State shared by the session handle and its event loop
pub(crate) struct Shared {
    pub record: Mutex<SessionRecord>,
    status_tx: watch::Sender<SessionStatus>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl Shared {
    pub fn new(event_capacity: usize) -> Arc<Self> {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (events_tx, _) = broadcast::channel(event_capacity);
        Arc::new(Self {
            record: Mutex::new(SessionRecord {
                epoch: 0,
                status: SessionStatus::default(),
                resources: Resources::default(),
            }),
            status_tx,
            events_tx,
        })
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.record.lock().epoch == epoch
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Publish the record's status and `events`. Call with the record locked
    /// so publications keep mutation order.
    pub fn publish(&self, record: &SessionRecord, events: Vec<SessionEvent>) {
        self.status_tx.send_replace(record.status.clone());
        for event in events {
            // No subscribers is fine
            let _ = self.events_tx.send(event);
        }
    }

    /// Store `value` if `epoch` is still current; otherwise hand it back so
    /// the caller drops it outside the lock.
    pub fn adopt<T>(&self, epoch: u64, value: T, store: impl FnOnce(&mut Resources, T)) -> Option<T> {
        let mut record = self.record.lock();
        if record.epoch != epoch {
            return Some(value);
        }
        store(&mut record.resources, value);
        None
    }

    /// End the session under `epoch`: bump the epoch, release everything,
    /// then publish `Error` (with `error`) or `Closed`. Returns false if the
    /// epoch was already stale.
    pub fn terminate(&self, epoch: u64, error: Option<&Error>, abort_loop: bool) -> bool {
        let (mut resources, was_speaking) = {
            let mut record = self.record.lock();
            if record.epoch != epoch {
                return false;
            }
            record.epoch += 1;
            let was_speaking = record.status.remote_speaking;
            match error {
                Some(err) => record.status.record_error(err),
                None => {
                    record.status.state = ConnectionState::Closed;
                    record.status.remote_speaking = false;
                }
            }
            (std::mem::take(&mut record.resources), was_speaking)
        };

        resources.release(abort_loop);

        let mut events = Vec::new();
        if was_speaking {
            events.push(SessionEvent::SpeakingChanged { speaking: false });
        }
        match error {
            Some(err) => {
                tracing::error!("Live session failed ({:?}): {}", err.kind(), err);
                events.push(SessionEvent::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                events.push(SessionEvent::StateChanged {
                    state: ConnectionState::Error,
                });
            }
            None => {
                tracing::info!("Live session closed");
                events.push(SessionEvent::StateChanged {
                    state: ConnectionState::Closed,
                });
            }
        }

        let record = self.record.lock();
        self.publish(&record, events);
        true
    }
}
