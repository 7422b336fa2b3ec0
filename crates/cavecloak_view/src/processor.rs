//! # View Processor
//!
//! Applies one completed computation to a viewer: decides per tracked
//! block whether the viewer sees the real block or a disguise, and sends
//! the difference.
//!
//! ## Pass
//!
//! ```text
//! update view state
//! for each tracked block, nearest first:
//!   other world / beyond activation radius      -> skip
//!   chunk unloaded                              -> wait for chunk load
//!   over budget and not a priority block        -> skip
//!   real block equals recorded original         -> untrack (restored)
//!   exposed to the sky                          -> reveal
//!   otherwise                                   -> reveal or mask
//! interior flood fill around the live feet location
//! revert every override not touched this pass
//! entity masking
//! ```
//!
//! The budget is `max_blocks_per_player` ordinary decisions plus an extra
//! allowance (at least 4096) reserved for blocks inside the priority
//! radius.

use std::sync::Arc;

use cavecloak_index::{BlockAppearance, BlockPos, SpatialBlockIndex, TrackedBlock};
use tracing::{debug, trace};

use crate::config::ViewConfig;
use crate::entity_mask::EntityMaskController;
use crate::host::{Environment, HostServer, HostWorld, PlayerState};
use crate::interaction::InteractionRevealTracker;
use crate::interior::reveal_interior;
use crate::mask_palette::MaskPaletteResolver;
use crate::neighbor::{NeighborRevealer, ViewPoint};
use crate::output::ViewOutput;
use crate::pending::PendingChunkTracker;
use crate::propagate::propagate_mask;
use crate::result_queue::ViewComputationResult;
use crate::session::PlayerViewSession;
use crate::visibility::{RevealReason, Verdict, VisibilityEvaluator};

/// Minimum extra allowance for priority blocks beyond the budget.
pub const MIN_PRIORITY_ALLOWANCE: usize = 4096;

/// Counters of one processed pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Blocks that went through the reveal decision.
    pub decided: usize,
    /// Blocks untracked because they were restored to their original.
    pub restored: usize,
    /// Blocks skipped because their chunk was not loaded.
    pub unloaded: usize,
}

/// Stateless pass logic; all per-viewer state lives in the session.
pub struct PlayerViewProcessor {
    config: Arc<ViewConfig>,
    index: Arc<SpatialBlockIndex>,
    evaluator: VisibilityEvaluator,
    neighbors: NeighborRevealer,
    entities: EntityMaskController,
    activation_squared: f64,
    priority_squared: f64,
}

impl PlayerViewProcessor {
    /// Creates a processor over `index`.
    #[must_use]
    pub fn new(config: Arc<ViewConfig>, index: Arc<SpatialBlockIndex>) -> Self {
        let activation_squared = config.mask_activation_radius * config.mask_activation_radius;
        let priority_radius = config.max_reveal_distance * 1.5 + 4.0;
        Self {
            evaluator: VisibilityEvaluator::from_config(&config),
            neighbors: NeighborRevealer::from_config(&config),
            entities: EntityMaskController::from_config(&config),
            activation_squared,
            priority_squared: activation_squared.min(priority_radius * priority_radius),
            config,
            index,
        }
    }

    /// Squared radius inside which blocks bypass the budget.
    #[must_use]
    pub const fn priority_squared(&self) -> f64 {
        self.priority_squared
    }

    /// Applies `result` to `session`.
    ///
    /// `player` is the live state; the reveal decisions use the snapshot
    /// inside the result, the interior fill uses the live feet location.
    #[allow(clippy::too_many_arguments)]
    pub fn process_result<H: HostServer>(
        &self,
        out: &mut ViewOutput<'_, H>,
        player: &PlayerState,
        session: &mut PlayerViewSession,
        result: &ViewComputationResult,
        tick: u64,
        interactions: &mut InteractionRevealTracker,
        pending: &mut PendingChunkTracker,
        entity_masking: bool,
    ) -> PassSummary {
        let mut summary = PassSummary::default();
        if result.is_empty() {
            return summary;
        }
        let snapshot = &result.snapshot;
        let server = out.server();
        let Some(world) = server.world(&snapshot.world) else {
            return summary;
        };

        session.update_view_state(snapshot, tick);
        let mut scratch = std::mem::take(&mut session.scratch);
        scratch.active_keys.clear();

        let view = ViewPoint::new(snapshot.eye, snapshot.direction);
        let budget = self.config.max_blocks_per_player;
        let mut extra_allowance = (budget * 2).max(MIN_PRIORITY_ALLOWANCE);
        let mut processed = 0usize;

        for (tracked, &distance_squared) in result.blocks().iter().zip(result.distances_squared()) {
            if processed >= budget && extra_allowance == 0 {
                break;
            }
            let key = &tracked.key;
            if key.world != snapshot.world || distance_squared > self.activation_squared {
                continue;
            }

            let (chunk_x, chunk_z) = (key.pos.chunk_x(), key.pos.chunk_z());
            if !world.is_chunk_loaded(chunk_x, chunk_z) {
                pending.register(snapshot.player, &key.world, chunk_x, chunk_z);
                summary.unloaded += 1;
                continue;
            }
            pending.unregister(snapshot.player, &key.world, chunk_x, chunk_z);

            let priority = distance_squared <= self.priority_squared;
            if processed >= budget && !priority {
                continue;
            }

            let current = world.block_at(key.pos);
            if current == tracked.original {
                self.index.untrack(key);
                summary.restored += 1;
                continue;
            }

            if is_surface_exposed(world, key.pos) {
                session.apply_reveal(out, key, tick);
                session.mark_passive_reveal(key, tick);
                continue;
            }

            scratch.active_keys.insert(key.clone());
            let interaction_active = interactions.is_active(key, tick);
            let already_revealed = session.is_revealed(key);
            match self.evaluator.decide(
                world,
                snapshot.eye,
                snapshot.direction,
                key.pos,
                distance_squared,
                interaction_active,
                already_revealed,
            ) {
                Verdict::Reveal(reason) => {
                    session.apply_reveal(out, key, tick);
                    session.mark_passive_reveal(key, tick);
                    if matches!(reason, RevealReason::PointBlank | RevealReason::InSight) {
                        self.neighbors.reveal_layers(
                            world,
                            out,
                            session,
                            &mut scratch.active_keys,
                            key,
                            view,
                            self.evaluator.max_reveal_squared(),
                            tick,
                        );
                    }
                }
                Verdict::Mask => {
                    let mask = MaskPaletteResolver::resolve_from_neighbors(world, key.pos, &self.config);
                    session.apply_mask(out, key, &mask, tick);
                    propagate_mask(world, out, session, &mut scratch.active_keys, &self.config, key, tick);
                }
            }
            summary.decided += 1;

            if processed < budget {
                processed += 1;
            } else {
                extra_allowance -= 1;
            }
        }

        reveal_interior(
            world,
            out,
            session,
            &mut scratch,
            &snapshot.world,
            player.feet,
            self.config.interior_reveal_radius,
            tick,
        );
        session.cleanup(out, &scratch.active_keys, |key| self.index.contains(key), tick);
        scratch.active_keys.clear();

        if entity_masking {
            self.entities.update(world, out, session, &mut scratch.valid_entities, &self.config, player.entity, view);
        }
        session.scratch = scratch;

        if summary.restored > 0 {
            debug!("Untracked {} restored blocks during view pass for {:?}", summary.restored, snapshot.player);
        }
        trace!(
            "View pass for {:?}: decided={} unloaded={} overrides={}",
            snapshot.player,
            summary.decided,
            summary.unloaded,
            session.override_count()
        );
        summary
    }

    /// Masks freshly loaded tracked blocks for a viewer in their world.
    pub fn apply_initial_mask<H: HostServer>(
        &self,
        out: &ViewOutput<'_, H>,
        player: &PlayerState,
        session: &mut PlayerViewSession,
        blocks: &[TrackedBlock],
        tick: u64,
    ) {
        let Some(world) = out.server().world(&player.world) else {
            return;
        };
        for tracked in blocks.iter().filter(|tracked| tracked.key.world == player.world) {
            let mask: BlockAppearance = MaskPaletteResolver::resolve_from_neighbors(world, tracked.key.pos, &self.config);
            session.apply_mask(out, &tracked.key, &mask, tick);
        }
    }
}

/// Whether a block sits at or above the surface of an overworld-type
/// dimension, where hiding it serves no purpose.
#[must_use]
pub fn is_surface_exposed<W: HostWorld + ?Sized>(world: &W, pos: BlockPos) -> bool {
    if world.environment() != Environment::Normal {
        return false;
    }
    if world.sky_light_at(pos) >= 15 {
        return true;
    }
    pos.y >= world.highest_block_y(pos.x, pos.z) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockWorld;
    use cavecloak_index::BlockAppearance;

    #[test]
    fn test_surface_exposure() {
        let world = MockWorld::new("world").with_surface(64);
        assert!(is_surface_exposed(&world, BlockPos::new(0, 63, 0)));
        assert!(is_surface_exposed(&world, BlockPos::new(0, 62, 0)));
        assert!(!is_surface_exposed(&world, BlockPos::new(0, 61, 0)));

        let nether = MockWorld::new("nether").with_surface(64).with_environment(Environment::Nether);
        assert!(!is_surface_exposed(&nether, BlockPos::new(0, 63, 0)));
    }

    #[test]
    fn test_open_shaft_is_exposed() {
        let world = MockWorld::new("world").with_surface(64);
        world.fill_box(BlockPos::new(0, 30, 0), BlockPos::new(0, 63, 0), &BlockAppearance::air());
        assert!(is_surface_exposed(&world, BlockPos::new(0, 30, 0)));
    }

    #[test]
    fn test_priority_radius_is_capped_by_activation() {
        let config = ViewConfig::from_toml_str("mask_activation_radius = 20.0\nmax_reveal_distance = 32.0").unwrap();
        let processor = PlayerViewProcessor::new(Arc::new(config), Arc::new(SpatialBlockIndex::in_memory()));
        assert!((processor.priority_squared() - 400.0).abs() < 1e-9);

        let config = ViewConfig::from_toml_str("mask_activation_radius = 200.0\nmax_reveal_distance = 8.0").unwrap();
        let processor = PlayerViewProcessor::new(Arc::new(config), Arc::new(SpatialBlockIndex::in_memory()));
        assert!((processor.priority_squared() - 256.0).abs() < 1e-9);
    }
}
