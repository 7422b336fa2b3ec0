//! # View Computation Coordinator
//!
//! Bounded worker pool that turns a player snapshot into a distance-sorted
//! list of nearby tracked blocks.
//!
//! ## Design
//!
//! ```text
//! driver thread                  worker threads
//! ─────────────                  ──────────────
//! schedule()
//!   try_begin (CAS)
//!   capture snapshot
//!   checkout buffers
//!   try_send ──── jobs ────────▶ collect_range
//!                 (bounded)      sort by eye distance
//!                                offer ──▶ CompletedResultQueue
//! poll_result() ◀────────────────────────────────┘
//! ```
//!
//! The driver never blocks: a full job channel rejects the job, restores
//! the buffers and dirties the session so the next tick retries. Workers
//! catch panics per job; a panicking computation releases its session
//! instead of killing the thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cavecloak_index::{SpatialBlockIndex, TrackedBlock};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::ViewResult;
use crate::host::{PlayerId, PlayerState};
use crate::result_queue::{CompletedResultQueue, ViewComputationResult, COMPLETED_RESULT_QUEUE_CAPACITY};
use crate::snapshot::PlayerSnapshot;

/// Upper bound on worker threads.
pub const MAX_WORKER_THREADS: usize = 4;

/// Capacity of the job channel.
pub const JOB_QUEUE_CAPACITY: usize = 256;

/// Worker count for this machine: one core is left to the host.
#[must_use]
pub fn default_worker_count() -> usize {
    let available = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    MAX_WORKER_THREADS.min(available.saturating_sub(1).max(1))
}

// ============================================================================
// SHARED SESSION STATE
// ============================================================================

/// Reusable vectors a computation writes into.
#[derive(Debug, Default)]
pub struct ComputationBuffers {
    /// Tracked blocks in range.
    pub blocks: Vec<TrackedBlock>,
    /// Squared eye distance per block.
    pub distances_squared: Vec<f64>,
}

impl ComputationBuffers {
    fn clear(&mut self) {
        self.blocks.clear();
        self.distances_squared.clear();
    }
}

/// Part of a player session visible to worker threads.
///
/// ```text
/// in_flight: IDLE ──try_begin──▶ SCHEDULED ──finish──▶ IDLE
/// ```
#[derive(Debug)]
pub struct SessionShared {
    player: PlayerId,
    in_flight: AtomicBool,
    dirty: AtomicBool,
    buffers: Mutex<Option<ComputationBuffers>>,
}

impl SessionShared {
    /// Fresh idle session with empty buffers.
    #[must_use]
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            in_flight: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            buffers: Mutex::new(Some(ComputationBuffers::default())),
        }
    }

    /// Owning player.
    #[inline]
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Moves IDLE -> SCHEDULED. Returns false if already scheduled.
    #[must_use]
    pub fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves back to IDLE.
    pub fn finish(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// True while a computation is scheduled or its result is unprocessed.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Forces the next scheduling check to pass.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether a recomputation was forced.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Whether the buffers are home.
    #[must_use]
    pub fn has_buffers(&self) -> bool {
        self.buffers.lock().is_some()
    }

    /// Lends the buffers to a computation.
    ///
    /// # Panics
    ///
    /// Panics if the buffers are already checked out. Callers hold the
    /// in-flight flag, so a second checkout is a scheduling bug.
    pub fn checkout_buffers(&self) -> ComputationBuffers {
        let Some(mut buffers) = self.buffers.lock().take() else {
            panic!("computation buffers of {:?} already checked out", self.player);
        };
        buffers.clear();
        buffers
    }

    /// Returns lent buffers. Ignored when a set is already home.
    pub fn restore_buffers(&self, mut buffers: ComputationBuffers) {
        buffers.clear();
        let mut slot = self.buffers.lock();
        if slot.is_none() {
            *slot = Some(buffers);
        }
    }
}

// ============================================================================
// WORKER POOL
// ============================================================================

/// One unit of worker work.
struct ViewJob {
    session: Arc<SessionShared>,
    snapshot: PlayerSnapshot,
    buffers: ComputationBuffers,
}

/// Worker pool plus result queue.
pub struct ViewComputationCoordinator {
    index: Arc<SpatialBlockIndex>,
    results: Arc<CompletedResultQueue>,
    jobs: Option<Sender<ViewJob>>,
    workers: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl ViewComputationCoordinator {
    /// Creates a stopped coordinator over `index`.
    #[must_use]
    pub fn new(index: Arc<SpatialBlockIndex>) -> Self {
        Self::with_queue_capacity(index, COMPLETED_RESULT_QUEUE_CAPACITY)
    }

    /// Creates a stopped coordinator with a custom result queue capacity.
    #[must_use]
    pub fn with_queue_capacity(index: Arc<SpatialBlockIndex>, capacity: usize) -> Self {
        Self {
            index,
            results: Arc::new(CompletedResultQueue::new(capacity)),
            jobs: None,
            workers: Vec::new(),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts `threads` workers (at least one). No-op when running.
    ///
    /// # Errors
    ///
    /// [`crate::ViewError::Io`] when the OS refuses to spawn a thread; any
    /// workers already started are stopped again.
    pub fn start(&mut self, threads: usize) -> ViewResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let threads = threads.max(1);
        let (sender, receiver) = bounded::<ViewJob>(JOB_QUEUE_CAPACITY);
        self.stopping.store(false, Ordering::SeqCst);

        for n in 0..threads {
            let receiver = receiver.clone();
            let index = Arc::clone(&self.index);
            let results = Arc::clone(&self.results);
            let stopping = Arc::clone(&self.stopping);
            let spawned = thread::Builder::new()
                .name(format!("cavecloak-view-{}", n + 1))
                .spawn(move || worker_loop(&receiver, &index, &results, &stopping));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    drop(sender);
                    self.join_workers();
                    return Err(err.into());
                }
            }
        }

        self.jobs = Some(sender);
        info!("View computation pool started with {threads} workers");
        Ok(())
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.is_some()
    }

    /// Submits a computation for `player` unless one is already in flight.
    /// Returns true when a job was submitted.
    pub fn schedule(&self, player: &PlayerState, session: &Arc<SessionShared>, chunk_radius: i32, tick: u64) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if !session.try_begin() {
            return false;
        }
        let snapshot = PlayerSnapshot::capture(player, chunk_radius, tick);
        let job = ViewJob {
            session: Arc::clone(session),
            snapshot,
            buffers: session.checkout_buffers(),
        };
        match jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => {
                warn!("Failed to submit view computation for {:?}, job queue rejected it", job.snapshot.player);
                job.session.restore_buffers(job.buffers);
                job.session.mark_dirty();
                job.session.finish();
                false
            }
        }
    }

    /// Takes the next completed result.
    pub fn poll_result(&self) -> Option<ViewComputationResult> {
        self.results.poll()
    }

    /// The result queue.
    #[must_use]
    pub fn results(&self) -> &CompletedResultQueue {
        &self.results
    }

    /// Stops the workers and discards queued results.
    pub fn shutdown(&mut self) {
        if self.jobs.is_none() && self.workers.is_empty() {
            return;
        }
        self.stopping.store(true, Ordering::SeqCst);
        self.jobs = None;
        self.join_workers();
        self.results.clear();
        info!("View computation pool stopped");
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("View worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for ViewComputationCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    receiver: &Receiver<ViewJob>,
    index: &SpatialBlockIndex,
    results: &CompletedResultQueue,
    stopping: &AtomicBool,
) {
    for job in receiver {
        let ViewJob { session, snapshot, mut buffers } = job;
        if stopping.load(Ordering::Relaxed) {
            session.restore_buffers(buffers);
            session.finish();
            continue;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| compute(index, &snapshot, &mut buffers)));
        match outcome {
            Ok(()) => {
                results.offer(ViewComputationResult::new(session, snapshot, buffers));
            }
            Err(_) => {
                error!("Failed to compute view update for player {:?}", snapshot.player);
                session.restore_buffers(buffers);
                session.mark_dirty();
                session.finish();
            }
        }
    }
}

/// Fills `buffers` with the blocks around the snapshot, nearest first.
pub(crate) fn compute(index: &SpatialBlockIndex, snapshot: &PlayerSnapshot, buffers: &mut ComputationBuffers) {
    buffers.clear();
    index.collect_range(
        &snapshot.world,
        snapshot.chunk_x,
        snapshot.chunk_z,
        snapshot.chunk_radius,
        &mut buffers.blocks,
    );
    buffers
        .blocks
        .sort_by(|a, b| snapshot.distance_squared(&a.key).total_cmp(&snapshot.distance_squared(&b.key)));
    buffers
        .distances_squared
        .extend(buffers.blocks.iter().map(|block| snapshot.distance_squared(&block.key)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EntityId;
    use cavecloak_index::{BlockAppearance, BlockKey, WorldName};
    use cgmath::{Point3, Vector3};
    use std::time::{Duration, Instant};

    fn player_at(x: f64, y: f64, z: f64) -> PlayerState {
        PlayerState {
            id: PlayerId(1),
            entity: EntityId(1),
            world: WorldName::new("world"),
            feet: Point3::new(x, y - 1.62, z),
            eye: Point3::new(x, y, z),
            direction: Vector3::new(1.0, 0.0, 0.0),
        }
    }

    fn wait_for_result(coordinator: &ViewComputationCoordinator) -> ViewComputationResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = coordinator.poll_result() {
                return result;
            }
            assert!(Instant::now() < deadline, "no result within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_checkout_twice_panics() {
        let session = SessionShared::new(PlayerId(1));
        let _first = session.checkout_buffers();
        let second = std::panic::catch_unwind(AssertUnwindSafe(|| session.checkout_buffers()));
        assert!(second.is_err());
    }

    #[test]
    fn test_restore_keeps_existing_buffers() {
        let session = SessionShared::new(PlayerId(1));
        let lent = session.checkout_buffers();
        session.restore_buffers(lent);
        session.restore_buffers(ComputationBuffers::default());
        assert!(session.has_buffers());
    }

    #[test]
    fn test_compute_sorts_by_distance() {
        let index = SpatialBlockIndex::in_memory();
        let world = WorldName::new("world");
        let stone = BlockAppearance::from_material("stone");
        for x in [30, 2, 15, -7] {
            index.track(&BlockKey::at(&world, x, 64, 0), &stone);
        }
        let snapshot = PlayerSnapshot::capture(&player_at(0.5, 64.5, 0.5), 3, 1);
        let mut buffers = ComputationBuffers::default();
        compute(&index, &snapshot, &mut buffers);

        let xs: Vec<i32> = buffers.blocks.iter().map(|b| b.key.pos.x).collect();
        assert_eq!(xs, vec![2, -7, 15, 30]);
        assert!(buffers.distances_squared.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(buffers.distances_squared[0], 4.0);
    }

    #[test]
    fn test_schedule_produces_one_result_per_flight() {
        let index = Arc::new(SpatialBlockIndex::in_memory());
        let world = WorldName::new("world");
        index.track(&BlockKey::at(&world, 3, 64, 3), &BlockAppearance::from_material("stone"));

        let mut coordinator = ViewComputationCoordinator::new(Arc::clone(&index));
        let session = Arc::new(SessionShared::new(PlayerId(1)));
        let player = player_at(0.5, 64.5, 0.5);

        assert!(!coordinator.schedule(&player, &session, 3, 1), "stopped pool accepts nothing");
        coordinator.start(2).unwrap();
        assert!(coordinator.schedule(&player, &session, 3, 1));
        assert!(!coordinator.schedule(&player, &session, 3, 2), "second schedule while in flight");

        let result = wait_for_result(&coordinator);
        assert_eq!(result.len(), 1);
        assert_eq!(result.snapshot.scheduled_tick, 1);
        assert!(session.is_in_flight());

        session.finish();
        result.recycle();
        assert!(session.has_buffers());
        assert!(coordinator.schedule(&player, &session, 3, 3));

        coordinator.shutdown();
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_full_result_queue_evicts_instead_of_replacing() {
        let index = Arc::new(SpatialBlockIndex::in_memory());
        let mut coordinator = ViewComputationCoordinator::with_queue_capacity(index, 1);
        coordinator.start(2).unwrap();
        let first = Arc::new(SessionShared::new(PlayerId(1)));
        let second = Arc::new(SessionShared::new(PlayerId(2)));
        let player = player_at(0.5, 64.5, 0.5);

        assert!(coordinator.schedule(&player, &first, 3, 1));
        assert!(coordinator.schedule(&player, &second, 3, 1));

        // Both results land in a one-slot queue; one of them is pushed out.
        let deadline = Instant::now() + Duration::from_secs(5);
        while first.is_in_flight() && second.is_in_flight() {
            assert!(Instant::now() < deadline, "no eviction within 5s");
            thread::sleep(Duration::from_millis(1));
        }
        let (evicted, queued) = if first.is_in_flight() { (&second, &first) } else { (&first, &second) };
        assert!(evicted.is_dirty());
        assert!(evicted.has_buffers());

        // A queued session is still in flight, so it cannot produce a second result.
        assert!(!coordinator.schedule(&player, queued, 3, 2));
        assert_eq!(coordinator.results().len(), 1);

        let result = coordinator.poll_result().unwrap();
        assert!(Arc::ptr_eq(&result.session, queued));
        result.release();
        assert!(!queued.is_in_flight());

        coordinator.shutdown();
    }

    #[test]
    fn test_default_worker_count_is_bounded() {
        let n = default_worker_count();
        assert!((1..=MAX_WORKER_THREADS).contains(&n));
    }
}
