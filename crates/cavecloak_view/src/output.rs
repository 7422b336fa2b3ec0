//! # View Output
//!
//! Everything one viewer's pass sends goes through a [`ViewOutput`]: block
//! overrides through the negotiated [`BlockTransmitter`], entity
//! visibility through the negotiated [`EntityVisibility`].

use cavecloak_index::{BlockAppearance, BlockKey, BlockPos};

use crate::host::{
    BlockTransmitter, EntityId, EntityInfo, EntityVisibility, HostServer, HostWorld, PlayerId,
};

/// Client channel to one viewer.
pub struct ViewOutput<'a, H: HostServer> {
    server: &'a H,
    viewer: PlayerId,
    blocks: BlockTransmitter,
    entities: &'a mut EntityVisibility,
}

impl<'a, H: HostServer> ViewOutput<'a, H> {
    /// Output to `viewer` using the negotiated strategies.
    pub fn new(server: &'a H, viewer: PlayerId, blocks: BlockTransmitter, entities: &'a mut EntityVisibility) -> Self {
        Self { server, viewer, blocks, entities }
    }

    /// Receiving player.
    #[inline]
    #[must_use]
    pub const fn viewer(&self) -> PlayerId {
        self.viewer
    }

    /// The host.
    #[inline]
    #[must_use]
    pub const fn server(&self) -> &'a H {
        self.server
    }

    /// Sends one block override. Returns true when it was delivered.
    pub fn send_block(&self, pos: BlockPos, appearance: &BlockAppearance) -> bool {
        self.blocks.send(self.server, self.viewer, pos, appearance)
    }

    /// Current server-side appearance of a block in any loaded world.
    #[must_use]
    pub fn true_block(&self, key: &BlockKey) -> Option<BlockAppearance> {
        self.server.world(&key.world).map(|world| world.block_at(key.pos))
    }

    /// Hides an entity. Returns false when the host cannot hide it.
    pub fn hide_entity(&mut self, entity: &EntityInfo) -> bool {
        if self.entities.per_entity() {
            match self.server.hide_entity(self.viewer, entity.id) {
                Ok(()) => return true,
                Err(err) => self.entities.observe_failure(err),
            }
        }
        match entity.player {
            Some(target) if self.entities.players() => self.server.hide_player(self.viewer, target).is_ok(),
            _ => false,
        }
    }

    /// Shows a previously hidden entity.
    pub fn show_entity(&mut self, entity: &EntityInfo) {
        if self.entities.per_entity() {
            match self.server.show_entity(self.viewer, entity.id) {
                Ok(()) => return,
                Err(err) => self.entities.observe_failure(err),
            }
        }
        if let Some(target) = entity.player {
            if self.entities.players() {
                // Nothing left to fall back to when this fails.
                let _ = self.server.show_player(self.viewer, target);
            }
        }
    }

    /// Host line-of-sight test from the viewer to an entity.
    #[must_use]
    pub fn line_of_sight_to(&self, entity: EntityId) -> bool {
        self.server.has_line_of_sight_to(self.viewer, entity)
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntityInfo> {
        self.server.entity(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCapabilities, MockServer, MockWorld, Transmission};
    use cgmath::Point3;

    fn armor_stand() -> EntityInfo {
        EntityInfo {
            id: EntityId(50),
            kind: "armor_stand".into(),
            position: Point3::new(0.0, 64.0, 0.0),
            height: 2.0,
            player: None,
        }
    }

    #[test]
    fn test_true_block_reads_the_key_world() {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(64));
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, PlayerId(1), BlockTransmitter::Modern, &mut visibility);
        let world = cavecloak_index::WorldName::new("world");
        assert_eq!(out.true_block(&BlockKey::at(&world, 0, 10, 0)), Some(BlockAppearance::from_material("stone")));
        let missing = cavecloak_index::WorldName::new("missing");
        assert_eq!(out.true_block(&BlockKey::at(&missing, 0, 10, 0)), None);
    }

    #[test]
    fn test_legacy_transmitter_sends_material_only() {
        let caps = HostCapabilities { modern_block_change: false, ..HostCapabilities::default() };
        let server = MockServer::new().with_capabilities(caps);
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, PlayerId(1), BlockTransmitter::negotiate(&caps), &mut visibility);
        let ore = BlockAppearance::parse("redstone_ore[lit=true]").unwrap();
        assert!(out.send_block(BlockPos::new(1, 2, 3), &ore));
        assert_eq!(
            server.take_transmissions(),
            vec![Transmission::LegacyBlock { viewer: PlayerId(1), pos: BlockPos::new(1, 2, 3), material: "redstone_ore".into() }]
        );
    }

    #[test]
    fn test_broken_per_entity_visibility_downgrades() {
        let server = MockServer::new().with_broken_entity_visibility();
        let mut visibility = EntityVisibility::negotiate(&server.capabilities());
        {
            let mut out = ViewOutput::new(&server, PlayerId(1), BlockTransmitter::Modern, &mut visibility);
            assert!(!out.hide_entity(&armor_stand()));
        }
        assert_eq!(visibility, EntityVisibility::PlayerOnly);

        let mut out = ViewOutput::new(&server, PlayerId(1), BlockTransmitter::Modern, &mut visibility);
        let player_body = EntityInfo { player: Some(PlayerId(2)), ..armor_stand() };
        assert!(out.hide_entity(&player_body));
        assert_eq!(server.take_transmissions(), vec![Transmission::HidePlayer(PlayerId(1), PlayerId(2))]);
    }
}
