//! # Completed Result Queue
//!
//! Hand-off from worker threads to the driver thread.
//!
//! ## Overflow Policy
//!
//! The queue is bounded. When a worker publishes into a full queue:
//!
//! ```text
//! 1. same session already queued  -> replace it (older view is useless)
//! 2. otherwise                    -> evict the oldest result, finish and
//!                                    dirty its session so it reschedules
//! ```
//!
//! Publishing never blocks and never loses a session: every discarded
//! result releases its session's in-flight flag or is superseded by a
//! newer result for the same session.
//!
//! Case 1 does not occur when results come from the coordinator: a session
//! stays in flight until its result is drained and released, so it has at
//! most one result queued. The branch only guards producers that finish a
//! session early; the coordinator path always takes case 2.

use std::collections::VecDeque;
use std::sync::Arc;

use cavecloak_index::TrackedBlock;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coordinator::{ComputationBuffers, SessionShared};
use crate::snapshot::PlayerSnapshot;

/// Default capacity of the completed result queue.
pub const COMPLETED_RESULT_QUEUE_CAPACITY: usize = 128;

/// Output of one worker computation.
pub struct ViewComputationResult {
    /// Session the computation belongs to.
    pub session: Arc<SessionShared>,
    /// Player state at scheduling time.
    pub snapshot: PlayerSnapshot,
    buffers: ComputationBuffers,
}

impl ViewComputationResult {
    pub(crate) fn new(session: Arc<SessionShared>, snapshot: PlayerSnapshot, buffers: ComputationBuffers) -> Self {
        Self { session, snapshot, buffers }
    }

    /// Tracked blocks sorted by ascending distance from the eye.
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[TrackedBlock] {
        &self.buffers.blocks
    }

    /// Squared eye distance of each entry of [`Self::blocks`].
    #[inline]
    #[must_use]
    pub fn distances_squared(&self) -> &[f64] {
        &self.buffers.distances_squared
    }

    /// Number of blocks in the result.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.blocks.len()
    }

    /// True when no tracked block was in range.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.blocks.is_empty()
    }

    /// Hands the buffers back to the session for the next computation.
    pub fn recycle(self) {
        self.session.restore_buffers(self.buffers);
    }

    /// Recycles the buffers, then marks the session idle. Buffers go home
    /// first so a session is never schedulable without them.
    pub fn release(self) {
        let session = Arc::clone(&self.session);
        self.recycle();
        session.finish();
    }
}

/// What happened to a published result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Appended normally.
    Queued,
    /// Replaced a queued result of the same session.
    ReplacedSameSession,
    /// Appended after evicting the oldest queued result.
    EvictedOldest,
}

/// Bounded multi-producer, single-consumer result queue.
pub struct CompletedResultQueue {
    queue: Mutex<VecDeque<ViewComputationResult>>,
    capacity: usize,
}

impl CompletedResultQueue {
    /// Creates a queue holding at most `capacity` results (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Publishes a result, applying the overflow policy when full.
    pub fn offer(&self, result: ViewComputationResult) -> OfferOutcome {
        let mut queue = self.queue.lock();
        if queue.len() < self.capacity {
            queue.push_back(result);
            return OfferOutcome::Queued;
        }

        if let Some(slot) = queue.iter().position(|queued| Arc::ptr_eq(&queued.session, &result.session)) {
            let player = result.snapshot.player;
            let replaced = std::mem::replace(&mut queue[slot], result);
            drop(queue);
            replaced.recycle();
            debug!("Replaced queued computation result with newer data (player={player:?})");
            return OfferOutcome::ReplacedSameSession;
        }

        let evicted = queue.pop_front();
        queue.push_back(result);
        drop(queue);
        if let Some(evicted) = evicted {
            warn!(
                "Evicted queued computation result due to capacity limit (player={:?})",
                evicted.snapshot.player
            );
            let session = Arc::clone(&evicted.session);
            evicted.recycle();
            session.mark_dirty();
            session.finish();
        }
        OfferOutcome::EvictedOldest
    }

    /// Takes the oldest result.
    pub fn poll(&self) -> Option<ViewComputationResult> {
        self.queue.lock().pop_front()
    }

    /// Number of queued results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Maximum number of queued results.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards every queued result, releasing their sessions.
    pub fn clear(&self) {
        let drained: Vec<_> = self.queue.lock().drain(..).collect();
        for result in drained {
            result.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlayerId;
    use cavecloak_index::WorldName;
    use cgmath::{Point3, Vector3};

    fn result_for(session: &Arc<SessionShared>, tick: u64) -> ViewComputationResult {
        assert!(session.try_begin());
        let buffers = if session.has_buffers() { session.checkout_buffers() } else { ComputationBuffers::default() };
        let snapshot = PlayerSnapshot {
            player: session.player(),
            world: WorldName::new("world"),
            chunk_x: 0,
            chunk_z: 0,
            chunk_radius: 3,
            eye: Point3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, 0.0, 1.0),
            scheduled_tick: tick,
        };
        ViewComputationResult::new(Arc::clone(session), snapshot, buffers)
    }

    #[test]
    fn test_same_session_result_is_replaced() {
        let queue = CompletedResultQueue::new(2);
        let a = Arc::new(SessionShared::new(PlayerId(1)));
        let b = Arc::new(SessionShared::new(PlayerId(2)));

        assert_eq!(queue.offer(result_for(&a, 1)), OfferOutcome::Queued);
        assert_eq!(queue.offer(result_for(&b, 1)), OfferOutcome::Queued);

        // Simulate a second computation for `a` finishing while the first waits.
        a.finish();
        assert_eq!(queue.offer(result_for(&a, 2)), OfferOutcome::ReplacedSameSession);
        assert_eq!(queue.len(), 2);

        let first = queue.poll().unwrap();
        assert_eq!(first.snapshot.player, PlayerId(1));
        assert_eq!(first.snapshot.scheduled_tick, 2);
    }

    #[test]
    fn test_full_queue_evicts_oldest_and_dirties_it() {
        let queue = CompletedResultQueue::new(1);
        let a = Arc::new(SessionShared::new(PlayerId(1)));
        let b = Arc::new(SessionShared::new(PlayerId(2)));

        queue.offer(result_for(&a, 1));
        assert_eq!(queue.offer(result_for(&b, 1)), OfferOutcome::EvictedOldest);

        assert!(!a.is_in_flight());
        assert!(a.is_dirty());
        assert!(a.has_buffers());
        assert_eq!(queue.poll().unwrap().snapshot.player, PlayerId(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_releases_sessions() {
        let queue = CompletedResultQueue::new(4);
        let a = Arc::new(SessionShared::new(PlayerId(1)));
        queue.offer(result_for(&a, 1));
        queue.clear();
        assert!(!a.is_in_flight());
        assert!(a.has_buffers());
    }
}
