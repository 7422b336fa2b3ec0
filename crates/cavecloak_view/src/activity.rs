//! # Block Activity
//!
//! Translates host block events into tracking-store updates and view
//! service notifications. The host calls these after the event is final
//! (not cancelled).
//!
//! | Event | Store | Viewers |
//! |---|---|---|
//! | break, trackable | track broken block | excavation reveal |
//! | break, not trackable | untrack | invalidate |
//! | place over tracked, original restored | untrack | invalidate |
//! | place over tracked, otherwise | - | excavation reveal |
//! | place, trackable | track neighbor disguise | excavation reveal |
//! | place, not trackable | untrack | invalidate |
//! | explosion | per block as break, no reveal | invalidate untracked |
//! | piston move | untrack moved blocks | invalidate |
//! | world unload | purge world | - |
//! | chunk load | - | initial mask, if chunk has tracked blocks |

use std::sync::Arc;

use cavecloak_index::{BlockAppearance, BlockKey, WorldName};
use tracing::debug;

use crate::host::{HostServer, PlayerId};
use crate::mask_palette::MaskPaletteResolver;
use crate::service::PlayerViewService;

/// Event entry points bound to one service.
pub struct BlockActivityHandler<'a, H: HostServer> {
    service: &'a mut PlayerViewService<H>,
}

impl<H: HostServer> PlayerViewService<H> {
    /// Event handler for this service.
    pub fn activity(&mut self) -> BlockActivityHandler<'_, H> {
        BlockActivityHandler { service: self }
    }
}

impl<H: HostServer> BlockActivityHandler<'_, H> {
    /// `player` broke the block at `key`, which looked like `broken`.
    pub fn on_block_break(&mut self, player: PlayerId, key: &BlockKey, broken: &BlockAppearance) {
        let index = Arc::clone(self.service.index());
        if self.service.config().is_world_excluded(key.world.as_str()) {
            index.untrack(key);
            return;
        }
        if self.service.config().should_track(key.world.as_str(), broken) {
            index.track(key, broken);
            self.service.register_excavated_block(player, key, broken);
        } else {
            index.untrack(key);
            self.service.invalidate_block(key);
        }
    }

    /// `player` placed `placed` at `key`.
    pub fn on_block_place(&mut self, player: PlayerId, key: &BlockKey, placed: &BlockAppearance) {
        let index = Arc::clone(self.service.index());
        if self.service.config().is_world_excluded(key.world.as_str()) {
            index.untrack(key);
            return;
        }

        if let Some(existing) = index.lookup(key) {
            if existing.original == *placed {
                index.untrack(key);
                self.service.invalidate_block(key);
            } else {
                self.service.register_excavated_block(player, key, placed);
            }
            return;
        }

        if !self.service.config().should_track(key.world.as_str(), placed) {
            index.untrack(key);
            self.service.invalidate_block(key);
            return;
        }

        let disguise = self
            .service
            .server()
            .world(&key.world)
            .map(|world| MaskPaletteResolver::resolve_from_neighbors(world, key.pos, self.service.config()));
        if let Some(disguise) = disguise {
            index.track(key, &disguise);
        }
        self.service.register_excavated_block(player, key, placed);
    }

    /// Blocks destroyed by an explosion, with their appearance before it.
    pub fn on_explode(&mut self, blocks: &[(BlockKey, BlockAppearance)]) {
        let index = Arc::clone(self.service.index());
        for (key, appearance) in blocks {
            if self.service.config().should_track(key.world.as_str(), appearance) {
                index.track(key, appearance);
            } else {
                index.untrack(key);
                self.service.invalidate_block(key);
            }
        }
    }

    /// Blocks moved by a piston (extend or retract).
    pub fn on_piston_move(&mut self, moved: &[BlockKey]) {
        let index = Arc::clone(self.service.index());
        for key in moved {
            index.untrack(key);
            self.service.invalidate_block(key);
        }
    }

    /// A world was unloaded.
    pub fn on_world_unload(&mut self, world: &WorldName) {
        let removed = self.service.index().purge_world(world);
        debug!("World {world} unloaded, {removed} tracked blocks dropped");
    }

    /// A chunk finished loading.
    pub fn on_chunk_load(&mut self, world: &WorldName, chunk_x: i32, chunk_z: i32) {
        if self.service.config().is_world_excluded(world.as_str()) {
            return;
        }
        if !self.service.index().has_tracked_blocks(world, chunk_x, chunk_z) {
            return;
        }
        self.service.handle_chunk_load(world, chunk_x, chunk_z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::host::{MockServer, MockWorld};
    use cavecloak_index::SpatialBlockIndex;
    use cgmath::{Point3, Vector3};

    const MINER: PlayerId = PlayerId(1);

    fn service(config: &str) -> PlayerViewService<MockServer> {
        let server = MockServer::new()
            .with_world(MockWorld::new("world").with_surface(100))
            .with_world(MockWorld::new("lobby"));
        server.place_player(MINER, "world", Point3::new(0.5, 40.0, 0.5), Vector3::new(1.0, 0.0, 0.0));
        PlayerViewService::new(
            Arc::new(server),
            Arc::new(ViewConfig::from_toml_str(config).unwrap()),
            Arc::new(SpatialBlockIndex::in_memory()),
        )
    }

    fn key(world: &str, x: i32, y: i32, z: i32) -> BlockKey {
        BlockKey::at(&WorldName::new(world), x, y, z)
    }

    #[test]
    fn test_break_tracks_and_reveals() {
        let mut service = service("");
        let target = key("world", 2, 40, 0);
        service.activity().on_block_break(MINER, &target, &BlockAppearance::from_material("stone"));

        let tracked = service.index().lookup(&target).unwrap();
        assert_eq!(tracked.original, BlockAppearance::from_material("stone"));
        assert!(service.session(MINER).unwrap().is_revealed(&target));
        assert_eq!(service.interactions().len(), 1);
    }

    #[test]
    fn test_break_of_untrackable_block_untracks() {
        let mut service = service("");
        let target = key("world", 2, 40, 0);
        service.index().track(&target, &BlockAppearance::from_material("stone"));
        service.activity().on_block_break(MINER, &target, &BlockAppearance::from_material("dirt"));
        assert!(!service.index().contains(&target));
    }

    #[test]
    fn test_excluded_world_is_untracked() {
        let mut service = service("excluded_worlds = [\"lobby\"]");
        let target = key("lobby", 2, 40, 0);
        service.index().track(&target, &BlockAppearance::from_material("stone"));
        service.activity().on_block_break(MINER, &target, &BlockAppearance::from_material("stone"));
        assert!(!service.index().contains(&target));
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn test_placing_original_back_untracks() {
        let mut service = service("");
        let target = key("world", 2, 40, 0);
        let stone = BlockAppearance::from_material("stone");
        service.activity().on_block_break(MINER, &target, &stone);
        service.activity().on_block_place(MINER, &target, &stone);

        assert!(!service.index().contains(&target));
        assert!(service.session(MINER).unwrap().display_state(&target).is_none());
        assert!(service.interactions().is_empty());
    }

    #[test]
    fn test_new_placement_tracks_neighbor_disguise() {
        let mut service = service("");
        let target = key("world", 2, 40, 0);
        service.activity().on_block_place(MINER, &target, &BlockAppearance::from_material("stone"));
        let tracked = service.index().lookup(&target).unwrap();
        assert_eq!(tracked.original, BlockAppearance::from_material("stone"));
    }

    #[test]
    fn test_explosion_and_piston() {
        let mut service = service("");
        let stone = key("world", 3, 40, 0);
        let dirt = key("world", 4, 40, 0);
        service.index().track(&dirt, &BlockAppearance::from_material("stone"));
        service.activity().on_explode(&[
            (stone.clone(), BlockAppearance::from_material("stone")),
            (dirt.clone(), BlockAppearance::from_material("dirt")),
        ]);
        assert!(service.index().contains(&stone));
        assert!(!service.index().contains(&dirt));

        service.activity().on_piston_move(&[stone.clone()]);
        assert!(!service.index().contains(&stone));
    }

    #[test]
    fn test_world_unload_purges() {
        let mut service = service("");
        service.index().track(&key("world", 3, 40, 0), &BlockAppearance::from_material("stone"));
        service.index().track(&key("lobby", 3, 40, 0), &BlockAppearance::from_material("stone"));
        service.activity().on_world_unload(&WorldName::new("world"));
        assert_eq!(service.index().tracked_count(), 1);
    }

    #[test]
    fn test_chunk_load_without_tracked_blocks_is_ignored() {
        let mut service = service("");
        service.initialize_player(MINER);
        service.activity().on_chunk_load(&WorldName::new("world"), 0, 0);
        assert_eq!(service.server().transmission_count(), 0);
    }
}
