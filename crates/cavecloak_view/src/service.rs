//! # Player View Service
//!
//! Orchestrator owned by the host's main thread. It holds every session,
//! schedules computations at a fixed interval, drains completed results
//! and applies interaction reveals.
//!
//! ## Tick
//!
//! ```text
//! on_server_tick ── every check_interval_ticks ──▶ tick
//!   1. advance the service tick
//!   2. expire interaction reveals
//!   3. drain up to 16 completed results
//!        stale (> 40 ticks)          -> dirty, discard
//!        session replaced / gone     -> discard
//!        player offline / moved on   -> discard
//!        otherwise                   -> process
//!   4. schedule every online player whose view changed
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use cavecloak_index::{BlockAppearance, BlockKey, SpatialBlockIndex, WorldName};
use cgmath::MetricSpace;
use tracing::{debug, info, warn};

use crate::config::ViewConfig;
use crate::coordinator::{default_worker_count, ViewComputationCoordinator};
use crate::error::ViewResult;
use crate::host::{BlockTransmitter, EntityVisibility, HostServer, PlayerId, PlayerState};
use crate::interaction::InteractionRevealTracker;
use crate::output::ViewOutput;
use crate::pending::PendingChunkTracker;
use crate::processor::PlayerViewProcessor;
use crate::session::PlayerViewSession;
use crate::visibility::block_center;

/// Results older than this many service ticks are discarded.
pub const STALE_RESULT_TOLERANCE_TICKS: u64 = 40;

/// Results processed per service tick at most.
pub const MAX_RESULTS_PER_TICK: usize = 16;

/// Per-player masking for one host.
pub struct PlayerViewService<H: HostServer> {
    server: Arc<H>,
    config: Arc<ViewConfig>,
    index: Arc<SpatialBlockIndex>,
    coordinator: ViewComputationCoordinator,
    processor: PlayerViewProcessor,
    sessions: HashMap<PlayerId, PlayerViewSession>,
    interactions: InteractionRevealTracker,
    pending: PendingChunkTracker,
    blocks: BlockTransmitter,
    entities: EntityVisibility,
    current_tick: u64,
    server_ticks: u64,
}

impl<H: HostServer> PlayerViewService<H> {
    /// Creates a stopped service and negotiates host capabilities.
    pub fn new(server: Arc<H>, config: Arc<ViewConfig>, index: Arc<SpatialBlockIndex>) -> Self {
        let capabilities = server.capabilities();
        let blocks = BlockTransmitter::negotiate(&capabilities);
        let entities = EntityVisibility::negotiate(&capabilities);
        match blocks {
            BlockTransmitter::Modern => {}
            BlockTransmitter::Legacy => info!("Host only supports material block changes, disguises lose block state"),
            BlockTransmitter::Unsupported => {
                warn!("Host supports no block change transmission, masking is disabled");
            }
        }
        if config.entity_masking && entities == EntityVisibility::Unsupported {
            warn!("Host supports no entity visibility control, entity masking is disabled");
        }

        Self {
            coordinator: ViewComputationCoordinator::new(Arc::clone(&index)),
            processor: PlayerViewProcessor::new(Arc::clone(&config), Arc::clone(&index)),
            pending: PendingChunkTracker::new(Arc::clone(&config)),
            interactions: InteractionRevealTracker::new(),
            sessions: HashMap::new(),
            server,
            config,
            index,
            blocks,
            entities,
            current_tick: 0,
            server_ticks: 0,
        }
    }

    /// Starts the worker pool with the default worker count.
    ///
    /// # Errors
    ///
    /// [`crate::ViewError::Io`] when a worker thread cannot be spawned.
    pub fn start(&mut self) -> ViewResult<()> {
        self.start_with_workers(default_worker_count())
    }

    /// Starts the worker pool with `workers` threads.
    ///
    /// # Errors
    ///
    /// [`crate::ViewError::Io`] when a worker thread cannot be spawned.
    pub fn start_with_workers(&mut self, workers: usize) -> ViewResult<()> {
        self.coordinator.start(workers)?;
        self.server_ticks = 0;
        Ok(())
    }

    /// Reverts every online player's view, forgets all state and stops the
    /// worker pool.
    pub fn shutdown(&mut self) {
        for state in self.server.online_players() {
            if let Some(mut session) = self.sessions.remove(&state.id) {
                let mut out = ViewOutput::new(&*self.server, state.id, self.blocks, &mut self.entities);
                session.clear(&mut out);
            }
        }
        self.sessions.clear();
        self.interactions.clear();
        self.pending.clear_all();
        self.coordinator.shutdown();
    }

    // ========================================================================
    // DRIVER
    // ========================================================================

    /// Host tick hook. Runs [`Self::tick`] every `check_interval_ticks`
    /// calls and returns whether it did.
    pub fn on_server_tick(&mut self) -> bool {
        self.server_ticks += 1;
        if self.server_ticks % u64::from(self.config.check_interval_ticks) != 0 {
            return false;
        }
        self.tick();
        true
    }

    /// One service tick.
    pub fn tick(&mut self) {
        self.current_tick += 1;
        let tick = self.current_tick;
        self.interactions.cleanup_expired(tick);
        self.drain_completed_results();

        for state in self.server.online_players() {
            if self.config.is_world_excluded(state.world.as_str()) {
                continue;
            }
            let session = self.sessions.entry(state.id).or_insert_with(|| PlayerViewSession::new(state.id));
            if !session.shared().is_in_flight() && session.should_schedule(&state, tick) {
                self.coordinator.schedule(&state, session.shared(), self.config.chunk_radius, tick);
            }
        }
    }

    fn drain_completed_results(&mut self) {
        let tick = self.current_tick;
        let entity_masking = self.entity_masking_enabled();
        for _ in 0..MAX_RESULTS_PER_TICK {
            let Some(result) = self.coordinator.poll_result() else {
                break;
            };
            let player = result.snapshot.player;

            let age = tick.saturating_sub(result.snapshot.scheduled_tick);
            if age > STALE_RESULT_TOLERANCE_TICKS {
                result.session.mark_dirty();
                result.release();
                debug!("Discarded stale computation result for {player:?} (age={age} ticks)");
                continue;
            }

            let Some(session) = self.sessions.get_mut(&player) else {
                result.release();
                continue;
            };
            if !Arc::ptr_eq(session.shared(), &result.session) {
                result.release();
                continue;
            }
            let Some(state) = self.server.player(player) else {
                result.release();
                continue;
            };
            if state.world != result.snapshot.world || self.config.is_world_excluded(state.world.as_str()) {
                result.release();
                continue;
            }

            let mut out = ViewOutput::new(&*self.server, player, self.blocks, &mut self.entities);
            self.processor.process_result(
                &mut out,
                &state,
                session,
                &result,
                tick,
                &mut self.interactions,
                &mut self.pending,
                entity_masking,
            );
            result.release();
        }
    }

    // ========================================================================
    // PLAYER LIFECYCLE
    // ========================================================================

    /// Creates a session for a joining player.
    pub fn initialize_player(&mut self, player: PlayerId) {
        self.sessions.entry(player).or_insert_with(|| PlayerViewSession::new(player));
    }

    /// Reverts and drops a leaving player's session.
    pub fn remove_player(&mut self, player: PlayerId) {
        if let Some(mut session) = self.sessions.remove(&player) {
            let mut out = ViewOutput::new(&*self.server, player, self.blocks, &mut self.entities);
            session.clear(&mut out);
        }
        self.pending.clear_for(player);
    }

    /// Reverts a player's view but keeps the session.
    pub fn reset_player(&mut self, player: PlayerId) {
        if let Some(session) = self.sessions.get_mut(&player) {
            let mut out = ViewOutput::new(&*self.server, player, self.blocks, &mut self.entities);
            session.clear(&mut out);
        }
        self.pending.clear_for(player);
    }

    /// A player moved to another world.
    pub fn handle_world_change(&mut self, player: PlayerId) {
        self.reset_player(player);
        self.initialize_player(player);
    }

    // ========================================================================
    // BLOCK EVENTS
    // ========================================================================

    /// Reveals a freshly excavated block to `source` and to every player in
    /// the same world within `interaction_reveal_radius`, and keeps it
    /// revealed for `interaction_reveal_duration_ticks`.
    pub fn register_excavated_block(&mut self, source: PlayerId, key: &BlockKey, appearance: &BlockAppearance) {
        if !self.config.should_track(key.world.as_str(), appearance) {
            return;
        }
        let mut recipients = vec![source];
        let radius = self.config.interaction_reveal_radius;
        if radius > 0.0 {
            let radius_squared = radius * radius;
            let center = block_center(key.pos);
            recipients.extend(
                self.server
                    .online_players()
                    .into_iter()
                    .filter(|state| state.id != source && state.world == key.world)
                    .filter(|state| state.feet.distance2(center) <= radius_squared)
                    .map(|state| state.id),
            );
        }

        let tick = self.current_tick;
        for recipient in recipients {
            let session = self.sessions.entry(recipient).or_insert_with(|| PlayerViewSession::new(recipient));
            let out = ViewOutput::new(&*self.server, recipient, self.blocks, &mut self.entities);
            session.apply_reveal(&out, key, tick);
            session.mark_passive_reveal(key, tick);
            session.mark_dirty();
        }
        self.interactions.record(key, self.config.interaction_reveal_duration_ticks, tick);
    }

    /// Reverts `key` for every online player and forces recomputation.
    pub fn invalidate_block(&mut self, key: &BlockKey) {
        for state in self.server.online_players() {
            if let Some(session) = self.sessions.get_mut(&state.id) {
                let out = ViewOutput::new(&*self.server, state.id, self.blocks, &mut self.entities);
                session.revert(&out, key);
                session.mark_dirty();
            }
        }
        self.interactions.remove(key);
    }

    /// A chunk finished loading: mask its tracked blocks for everyone in
    /// the world and immediately recompute players that waited for it.
    pub fn handle_chunk_load(&mut self, world: &WorldName, chunk_x: i32, chunk_z: i32) {
        if self.config.is_world_excluded(world.as_str()) {
            return;
        }
        let tick = self.current_tick;
        let mut blocks = Vec::new();
        self.index.collect_range(world, chunk_x, chunk_z, 0, &mut blocks);
        let online = self.server.online_players();

        if !blocks.is_empty() {
            for state in online.iter().filter(|state| state.world == *world) {
                let Some(session) = self.sessions.get_mut(&state.id) else {
                    continue;
                };
                let out = ViewOutput::new(&*self.server, state.id, self.blocks, &mut self.entities);
                self.processor.apply_initial_mask(&out, state, session, &blocks, tick);
            }
        }

        for waiter in self.pending.drain(world, chunk_x, chunk_z) {
            let Some(session) = self.sessions.get(&waiter) else {
                continue;
            };
            let Some(state) = online.iter().find(|state| state.id == waiter) else {
                continue;
            };
            if state.world != *world {
                continue;
            }
            session.mark_dirty();
            self.coordinator.schedule(state, session.shared(), self.config.chunk_radius, tick);
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Whether entity masking is configured and the host supports it.
    #[must_use]
    pub fn entity_masking_enabled(&self) -> bool {
        self.config.entity_masking && self.entities != EntityVisibility::Unsupported
    }

    /// Service ticks elapsed.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Session of a player.
    #[must_use]
    pub fn session(&self, player: PlayerId) -> Option<&PlayerViewSession> {
        self.sessions.get(&player)
    }

    /// Number of sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the worker pool runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    /// Players waiting for chunk loads.
    #[must_use]
    pub const fn pending_chunks(&self) -> &PendingChunkTracker {
        &self.pending
    }

    /// Active interaction reveals.
    #[must_use]
    pub const fn interactions(&self) -> &InteractionRevealTracker {
        &self.interactions
    }

    /// The host.
    #[must_use]
    pub fn server(&self) -> &H {
        &self.server
    }

    /// The tracking store.
    #[must_use]
    pub fn index(&self) -> &Arc<SpatialBlockIndex> {
        &self.index
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Live state of a player, if online.
    #[must_use]
    pub fn player_state(&self, player: PlayerId) -> Option<PlayerState> {
        self.server.player(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockServer, MockWorld, Transmission};
    use cavecloak_index::BlockPos;
    use cgmath::{Point3, Vector3};

    fn service() -> PlayerViewService<MockServer> {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        server.place_player(PlayerId(1), "world", Point3::new(0.5, 40.0, 0.5), Vector3::new(1.0, 0.0, 0.0));
        server.place_player(PlayerId(2), "world", Point3::new(3.5, 40.0, 0.5), Vector3::new(1.0, 0.0, 0.0));
        server.place_player(PlayerId(3), "world", Point3::new(60.5, 40.0, 0.5), Vector3::new(1.0, 0.0, 0.0));
        PlayerViewService::new(
            Arc::new(server),
            Arc::new(ViewConfig::default()),
            Arc::new(SpatialBlockIndex::in_memory()),
        )
    }

    fn stone() -> BlockAppearance {
        BlockAppearance::from_material("stone")
    }

    #[test]
    fn test_on_server_tick_respects_interval() {
        let mut service = service();
        let interval = service.config().check_interval_ticks;
        for _ in 1..interval {
            assert!(!service.on_server_tick());
        }
        assert!(service.on_server_tick());
        assert_eq!(service.current_tick(), 1);
    }

    #[test]
    fn test_excavation_reveals_to_nearby_players_only() {
        let mut service = service();
        let key = BlockKey::at(&WorldName::new("world"), 1, 40, 0);
        service.server().mock_world("world").unwrap().set_block(key.pos, BlockAppearance::air());

        service.register_excavated_block(PlayerId(1), &key, &stone());

        assert!(service.session(PlayerId(1)).unwrap().is_revealed(&key));
        assert!(service.session(PlayerId(2)).unwrap().is_revealed(&key));
        assert!(service.session(PlayerId(3)).is_none());
        assert!(service.session(PlayerId(1)).unwrap().shared().is_dirty());
        assert_eq!(service.interactions().len(), 1);
    }

    #[test]
    fn test_untrackable_excavation_is_ignored() {
        let mut service = service();
        let key = BlockKey::at(&WorldName::new("world"), 1, 40, 0);
        service.register_excavated_block(PlayerId(1), &key, &BlockAppearance::from_material("dirt"));
        assert_eq!(service.session_count(), 0);
        assert!(service.interactions().is_empty());
    }

    #[test]
    fn test_invalidate_reverts_for_everyone() {
        let mut service = service();
        let key = BlockKey::at(&WorldName::new("world"), 1, 40, 0);
        service.register_excavated_block(PlayerId(1), &key, &stone());
        service.server().take_transmissions();

        service.invalidate_block(&key);
        assert!(service.session(PlayerId(1)).unwrap().display_state(&key).is_none());
        assert!(service.interactions().is_empty());
        let sent = service.server().take_transmissions();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|t| matches!(t, Transmission::Block { pos, .. } if *pos == BlockPos::new(1, 40, 0))));
    }

    #[test]
    fn test_chunk_load_masks_tracked_blocks() {
        let mut service = service();
        service.initialize_player(PlayerId(1));
        let world = WorldName::new("world");
        let key = BlockKey::at(&world, 5, 30, 5);
        service.index().track(&key, &BlockAppearance::from_material("stone"));
        service.server().mock_world("world").unwrap().set_block(key.pos, BlockAppearance::air());

        service.handle_chunk_load(&world, 0, 0);
        assert!(service.session(PlayerId(1)).unwrap().is_masked(&key));
        assert_eq!(service.server().last_block_sent(PlayerId(1), key.pos), Some(stone()));
    }

    #[test]
    fn test_remove_player_drops_session() {
        let mut service = service();
        let key = BlockKey::at(&WorldName::new("world"), 1, 40, 0);
        service.register_excavated_block(PlayerId(1), &key, &stone());
        service.remove_player(PlayerId(1));
        assert!(service.session(PlayerId(1)).is_none());

        service.handle_world_change(PlayerId(2));
        assert_eq!(service.session(PlayerId(2)).unwrap().override_count(), 0);
    }
}
