//! # Entity Masking
//!
//! Decorative entities (armor stands, item frames, storage minecarts)
//! betray hidden bases just like blocks do. Each pass hides every maskable
//! entity the viewer could not plausibly see and shows the rest.

use std::collections::HashSet;

use cgmath::{InnerSpace, Point3};

use crate::config::ViewConfig;
use crate::host::{EntityId, HostServer, HostWorld};
use crate::neighbor::ViewPoint;
use crate::output::ViewOutput;
use crate::session::PlayerViewSession;
use crate::visibility::within_fov;

/// Hides and shows maskable entities around a viewer.
#[derive(Clone, Copy, Debug)]
pub struct EntityMaskController {
    min_reveal_squared: f64,
    max_reveal_squared: f64,
    search_radius: f64,
    fov_cos: f64,
}

impl EntityMaskController {
    /// Thresholds from the configuration.
    #[must_use]
    pub fn from_config(config: &ViewConfig) -> Self {
        Self {
            min_reveal_squared: config.min_reveal_distance * config.min_reveal_distance,
            max_reveal_squared: config.max_reveal_distance * config.max_reveal_distance,
            search_radius: config.max_reveal_distance * 2.0 + 16.0,
            fov_cos: config.fov_half_angle_cos(),
        }
    }

    /// Radius of the entity search around the eye.
    #[must_use]
    pub const fn search_radius(&self) -> f64 {
        self.search_radius
    }

    /// Updates entity visibility for one viewer.
    #[allow(clippy::too_many_arguments)]
    pub fn update<H: HostServer, W: HostWorld + ?Sized>(
        &self,
        world: &W,
        out: &mut ViewOutput<'_, H>,
        session: &mut PlayerViewSession,
        valid: &mut HashSet<EntityId>,
        config: &ViewConfig,
        own_entity: EntityId,
        view: ViewPoint,
    ) {
        valid.clear();
        for entity in world.nearby_entities(view.eye, self.search_radius) {
            if entity.id == own_entity || !config.is_maskable_entity(&entity.kind) {
                continue;
            }
            valid.insert(entity.id);

            let target = Point3::new(entity.position.x, entity.position.y + entity.height * 0.5, entity.position.z);
            let delta = target - view.eye;
            let distance_squared = delta.magnitude2();
            let reveal = if distance_squared <= self.min_reveal_squared {
                true
            } else if distance_squared <= self.max_reveal_squared {
                within_fov(view.direction, delta, distance_squared, self.fov_cos) && out.line_of_sight_to(entity.id)
            } else {
                false
            };

            if reveal {
                session.show_entity(out, &entity);
            } else {
                session.hide_entity(out, &entity);
            }
        }
        session.cleanup_entities(out, valid);
        valid.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BlockTransmitter, EntityInfo, EntityVisibility, MockServer, MockWorld, PlayerId, Transmission};
    use cavecloak_index::{BlockAppearance, BlockPos};
    use cgmath::Vector3;

    const VIEWER: PlayerId = PlayerId(1);

    fn frame(id: u64, x: f64, z: f64) -> EntityInfo {
        EntityInfo {
            id: EntityId(id),
            kind: "item_frame".into(),
            position: Point3::new(x, 40.0, z),
            height: 0.5,
            player: None,
        }
    }

    fn hall_server() -> MockServer {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        server.mock_world("world").unwrap().fill_box(
            BlockPos::new(-20, 40, -20),
            BlockPos::new(20, 42, 20),
            &BlockAppearance::air(),
        );
        server.place_player(VIEWER, "world", Point3::new(0.5, 40.0, 0.5), Vector3::new(0.0, 0.0, 1.0));
        server
    }

    #[test]
    fn test_hides_behind_and_shows_ahead() {
        let server = hall_server();
        let world = server.mock_world("world").unwrap();
        world.spawn_entity(frame(10, 0.5, 10.5));
        world.spawn_entity(frame(11, 0.5, -10.5));
        world.spawn_entity(frame(12, 1.0, 1.0));

        let config = ViewConfig::default();
        let controller = EntityMaskController::from_config(&config);
        let mut visibility = EntityVisibility::PerEntity;
        let mut out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut valid = HashSet::new();
        let view = ViewPoint::new(Point3::new(0.5, 41.62, 0.5), Vector3::new(0.0, 0.0, 1.0));

        controller.update(world, &mut out, &mut session, &mut valid, &config, EntityId(1), view);

        assert!(!session.is_entity_hidden(EntityId(10)));
        assert!(session.is_entity_hidden(EntityId(11)));
        assert!(!session.is_entity_hidden(EntityId(12)));
        assert_eq!(server.take_transmissions(), vec![Transmission::HideEntity(VIEWER, EntityId(11))]);
    }

    #[test]
    fn test_despawned_entity_is_shown_again() {
        let server = hall_server();
        let world = server.mock_world("world").unwrap();
        world.spawn_entity(frame(11, 0.5, -10.5));
        let config = ViewConfig::default();
        let controller = EntityMaskController::from_config(&config);
        let mut visibility = EntityVisibility::PerEntity;
        let mut out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut valid = HashSet::new();
        let view = ViewPoint::new(Point3::new(0.5, 41.62, 0.5), Vector3::new(0.0, 0.0, 1.0));

        controller.update(world, &mut out, &mut session, &mut valid, &config, EntityId(1), view);
        assert!(session.is_entity_hidden(EntityId(11)));

        // Moved out of the search radius.
        world.despawn_entity(EntityId(11));
        world.spawn_entity(frame(11, 0.5, -500.0));
        controller.update(world, &mut out, &mut session, &mut valid, &config, EntityId(1), view);
        assert!(!session.is_entity_hidden(EntityId(11)));
    }

    #[test]
    fn test_non_maskable_kinds_are_ignored() {
        let server = hall_server();
        let world = server.mock_world("world").unwrap();
        world.spawn_entity(EntityInfo { kind: "zombie".into(), ..frame(11, 0.5, -10.5) });
        let config = ViewConfig::default();
        let controller = EntityMaskController::from_config(&config);
        let mut visibility = EntityVisibility::PerEntity;
        let mut out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut valid = HashSet::new();
        let view = ViewPoint::new(Point3::new(0.5, 41.62, 0.5), Vector3::new(0.0, 0.0, 1.0));

        controller.update(world, &mut out, &mut session, &mut valid, &config, EntityId(1), view);
        assert!(!session.is_entity_hidden(EntityId(11)));
        assert_eq!(server.transmission_count(), 0);
    }
}
