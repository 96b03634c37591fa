//! Gapless playback scheduling
//!
//! Chunks arrive at irregular network intervals. A single cursor holds the
//! earliest time new audio may begin; each chunk starts at the cursor (or
//! now, if the cursor fell behind) and pushes it forward by its duration.
//! Arrival order on the one stream is the playback order.
//!
//! The active set tracks everything scheduled but not yet finished.
//! Remote speaking is exactly "active set non-empty", and a turn-complete
//! signal is only reported once the set drains. Turns that complete on the
//! wire while earlier audio still sounds are counted, and all of them are
//! reported when the set drains.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::audio::buffer::{ChunkId, PlaybackChunk};
use crate::audio::engine::PlaybackEngine;
use crate::error::AudioError;

/// Where a chunk landed on the playback clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start: f64,
    pub end: f64,
}

/// Result of a chunk finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkEndedOutcome {
    /// The active set just became empty
    pub became_idle: bool,
    /// Turns whose completion was waiting on this drain
    pub turns_finished: u32,
}

pub struct PlaybackScheduler {
    engine: Arc<dyn PlaybackEngine>,
    next_start_time: f64,
    active: BTreeSet<ChunkId>,
    next_id: u64,
    turns_pending: u32,
    chunks_played: u64,
}

impl PlaybackScheduler {
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> Self {
        Self {
            engine,
            next_start_time: 0.0,
            active: BTreeSet::new(),
            next_id: 0,
            turns_pending: 0,
            chunks_played: 0,
        }
    }

    /// Schedule a chunk right after everything already queued
    pub fn schedule(&mut self, chunk: PlaybackChunk) -> Result<ScheduledChunk, AudioError> {
        let now = self.engine.current_time();
        if self.next_start_time < now {
            self.next_start_time = now;
        }

        let id = ChunkId(self.next_id);
        let start = self.next_start_time;
        let end = start + chunk.duration_secs();

        self.engine.schedule(id, chunk, start)?;

        self.next_id += 1;
        self.next_start_time = end;
        self.active.insert(id);

        tracing::trace!("Scheduled {} at {:.3}s..{:.3}s", id, start, end);
        Ok(ScheduledChunk { id, start, end })
    }

    /// Completion handler for every chunk. Unknown ids (already cancelled)
    /// are ignored.
    pub fn chunk_ended(&mut self, id: ChunkId) -> ChunkEndedOutcome {
        if !self.active.remove(&id) {
            return ChunkEndedOutcome::default();
        }
        self.chunks_played += 1;

        if !self.active.is_empty() {
            return ChunkEndedOutcome::default();
        }

        ChunkEndedOutcome {
            became_idle: true,
            turns_finished: std::mem::take(&mut self.turns_pending),
        }
    }

    /// The remote endpoint finished sending a turn. Returns true when the
    /// turn is also finished audibly; otherwise the report is deferred to
    /// the chunk that drains the active set.
    pub fn turn_complete(&mut self) -> bool {
        if self.active.is_empty() {
            true
        } else {
            self.turns_pending += 1;
            false
        }
    }

    /// Drop everything queued (remote barge-in). Returns true if anything
    /// was sounding.
    pub fn interrupt(&mut self) -> bool {
        let was_speaking = !self.active.is_empty();
        self.engine.cancel_all();
        self.active.clear();
        self.turns_pending = 0;
        self.next_start_time = self.engine.current_time();
        was_speaking
    }

    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn chunks_played(&self) -> u64 {
        self.chunks_played
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlayback;
    use proptest::prelude::*;

    fn chunk(secs: f64) -> PlaybackChunk {
        PlaybackChunk::new(vec![0.0; (secs * 24_000.0).round() as usize], 24_000)
    }

    fn scheduler() -> (Arc<FakePlayback>, PlaybackScheduler) {
        let engine = Arc::new(FakePlayback::new());
        let scheduler = PlaybackScheduler::new(engine.clone());
        (engine, scheduler)
    }

    #[test]
    fn test_back_to_back_chunks_are_contiguous() {
        let (engine, mut scheduler) = scheduler();
        engine.set_time(1.0);

        let first = scheduler.schedule(chunk(0.5)).unwrap();
        let second = scheduler.schedule(chunk(0.3)).unwrap();

        assert_eq!(first.start, 1.0);
        assert_eq!(second.start, first.start + 0.5);
        assert_eq!(engine.scheduled_starts(), vec![1.0, 1.5]);
    }

    #[test]
    fn test_late_chunk_resets_cursor_to_now() {
        let (engine, mut scheduler) = scheduler();

        let first = scheduler.schedule(chunk(0.5)).unwrap();
        assert_eq!(first.end, 0.5);

        engine.set_time(2.0);
        let second = scheduler.schedule(chunk(0.25)).unwrap();
        assert_eq!(second.start, 2.0);
        assert_eq!(scheduler.next_start_time(), 2.25);
    }

    #[test]
    fn test_speaking_until_last_chunk_ends() {
        let (_engine, mut scheduler) = scheduler();
        let a = scheduler.schedule(chunk(0.1)).unwrap();
        let b = scheduler.schedule(chunk(0.1)).unwrap();
        assert!(scheduler.is_speaking());

        // Turn completes on the wire while audio is still sounding.
        assert!(!scheduler.turn_complete());
        assert!(scheduler.is_speaking());

        let outcome = scheduler.chunk_ended(a.id);
        assert_eq!(outcome, ChunkEndedOutcome::default());
        assert!(scheduler.is_speaking());

        let outcome = scheduler.chunk_ended(b.id);
        assert!(outcome.became_idle);
        assert_eq!(outcome.turns_finished, 1);
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.chunks_played(), 2);
    }

    #[test]
    fn test_turn_complete_when_idle_is_immediate() {
        let (_engine, mut scheduler) = scheduler();
        assert!(scheduler.turn_complete());

        let a = scheduler.schedule(chunk(0.1)).unwrap();
        let outcome = scheduler.chunk_ended(a.id);
        assert!(outcome.became_idle);
        assert_eq!(outcome.turns_finished, 0);
    }

    #[test]
    fn test_overlapping_turns_each_reported() {
        let (_engine, mut scheduler) = scheduler();
        let a = scheduler.schedule(chunk(0.2)).unwrap();
        assert!(!scheduler.turn_complete());

        // Next turn's audio arrives before the first turn drained
        let b = scheduler.schedule(chunk(0.2)).unwrap();
        assert!(!scheduler.turn_complete());

        assert_eq!(scheduler.chunk_ended(a.id), ChunkEndedOutcome::default());
        let outcome = scheduler.chunk_ended(b.id);
        assert!(outcome.became_idle);
        assert_eq!(outcome.turns_finished, 2);
    }

    #[test]
    fn test_interrupt_clears_active_set() {
        let (engine, mut scheduler) = scheduler();
        let a = scheduler.schedule(chunk(1.0)).unwrap();
        scheduler.schedule(chunk(1.0)).unwrap();
        scheduler.turn_complete();

        engine.set_time(0.4);
        assert!(scheduler.interrupt());
        assert!(!scheduler.is_speaking());
        assert_eq!(engine.cancel_count(), 1);
        assert_eq!(scheduler.next_start_time(), 0.4);

        // Late completion for a cancelled chunk is ignored.
        assert_eq!(scheduler.chunk_ended(a.id), ChunkEndedOutcome::default());
    }

    #[test]
    fn test_engine_failure_leaves_state_untouched() {
        let (engine, mut scheduler) = scheduler();
        engine.fail_next_schedule();
        assert!(scheduler.schedule(chunk(0.5)).is_err());
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.next_start_time(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_no_overlap_and_no_artificial_gap(
            arrivals in proptest::collection::vec((0u32..2_000, 1u32..24_000), 1..40)
        ) {
            let (engine, mut scheduler) = scheduler();
            let mut clock = 0.0f64;
            let mut previous: Option<ScheduledChunk> = None;

            for (delay_ms, samples) in arrivals {
                clock += delay_ms as f64 / 1000.0;
                engine.set_time(clock);
                let placed = scheduler
                    .schedule(PlaybackChunk::new(vec![0.0; samples as usize], 24_000))
                    .unwrap();

                prop_assert!(placed.start >= clock);
                if let Some(prev) = previous {
                    prop_assert!(placed.start >= prev.end);
                    if clock <= prev.end {
                        prop_assert_eq!(placed.start, prev.end);
                    }
                }
                previous = Some(placed);
            }
        }
    }
}
