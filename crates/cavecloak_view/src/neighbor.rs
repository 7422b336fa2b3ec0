//! # Neighbor Reveal
//!
//! When a tracked block is revealed, the blocks around it (cave walls,
//! the far side of a one-block pillar) are revealed too, so the opening
//! does not look like a hole in a solid wall.
//!
//! ## Walk
//!
//! ```text
//!  for each of the 6 axis directions:
//!    depth 1..=2 along the direction
//!      stop at world bounds or unloaded chunks
//!      stop after the first solid block
//!      reveal the block (cone test at full FOV)
//!      reveal its 4 lateral neighbors (widened cone)
//!      and its 4 diagonal neighbors   (widest cone)
//! ```
//!
//! Lateral and diagonal neighbors are only visited at depth 1 or through a
//! traversable block.

use std::collections::HashSet;

use cavecloak_index::{BlockKey, BlockPos, WorldName};
use cgmath::{InnerSpace, Point3, Vector3};

use crate::config::ViewConfig;
use crate::host::{HostServer, HostWorld};
use crate::output::ViewOutput;
use crate::session::PlayerViewSession;
use crate::visibility::{block_center, within_fov};

/// Layers revealed beyond the origin along each direction.
pub const ADDITIONAL_REVEAL_LAYERS: i32 = 2;

/// The six axis directions, in walk order.
pub const REVEAL_DIRECTIONS: [(i32, i32, i32); 6] =
    [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];

const LATERAL_X: [(i32, i32, i32); 4] = [(0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];
const LATERAL_Y: [(i32, i32, i32); 4] = [(1, 0, 0), (-1, 0, 0), (0, 0, 1), (0, 0, -1)];
const LATERAL_Z: [(i32, i32, i32); 4] = [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0)];
const DIAGONAL_X: [(i32, i32, i32); 4] = [(0, 1, 1), (0, 1, -1), (0, -1, 1), (0, -1, -1)];
const DIAGONAL_Y: [(i32, i32, i32); 4] = [(1, 0, 1), (1, 0, -1), (-1, 0, 1), (-1, 0, -1)];
const DIAGONAL_Z: [(i32, i32, i32); 4] = [(1, 1, 0), (1, -1, 0), (-1, 1, 0), (-1, -1, 0)];

const fn lateral_offsets(direction: (i32, i32, i32)) -> &'static [(i32, i32, i32); 4] {
    if direction.0 != 0 {
        &LATERAL_X
    } else if direction.1 != 0 {
        &LATERAL_Y
    } else {
        &LATERAL_Z
    }
}

const fn diagonal_offsets(direction: (i32, i32, i32)) -> &'static [(i32, i32, i32); 4] {
    if direction.0 != 0 {
        &DIAGONAL_X
    } else if direction.1 != 0 {
        &DIAGONAL_Y
    } else {
        &DIAGONAL_Z
    }
}

/// Eye and look direction of one pass.
#[derive(Clone, Copy, Debug)]
pub struct ViewPoint {
    /// Eye location.
    pub eye: Point3<f64>,
    /// Unit look direction.
    pub direction: Vector3<f64>,
}

impl ViewPoint {
    /// Normalizes `direction`, falling back to +z for a zero vector.
    #[must_use]
    pub fn new(eye: Point3<f64>, direction: Vector3<f64>) -> Self {
        let direction = if direction.magnitude2() > 0.0 {
            direction.normalize()
        } else {
            Vector3::new(0.0, 0.0, 1.0)
        };
        Self { eye, direction }
    }
}

/// Reveals the surroundings of a revealed block.
#[derive(Clone, Copy, Debug)]
pub struct NeighborRevealer {
    min_dot: f64,
    lateral_min_dot: f64,
    diagonal_min_dot: f64,
}

impl NeighborRevealer {
    /// Cone thresholds derived from the configured FOV.
    #[must_use]
    pub fn from_config(config: &ViewConfig) -> Self {
        let min_dot = config.fov_half_angle_cos();
        Self {
            min_dot,
            lateral_min_dot: (min_dot - 0.25).max(-0.10),
            diagonal_min_dot: (min_dot - 0.40).max(-0.30),
        }
    }

    /// Cone cosine for lateral neighbors.
    #[must_use]
    pub const fn lateral_min_dot(&self) -> f64 {
        self.lateral_min_dot
    }

    /// Cone cosine for diagonal neighbors.
    #[must_use]
    pub const fn diagonal_min_dot(&self) -> f64 {
        self.diagonal_min_dot
    }

    /// Walks the layers around `origin` and reveals what the viewer could
    /// plausibly see.
    #[allow(clippy::too_many_arguments)]
    pub fn reveal_layers<H: HostServer, W: HostWorld + ?Sized>(
        &self,
        world: &W,
        out: &ViewOutput<'_, H>,
        session: &mut PlayerViewSession,
        active: &mut HashSet<BlockKey>,
        origin: &BlockKey,
        view: ViewPoint,
        max_distance_squared: f64,
        tick: u64,
    ) {
        let min_y = world.min_height();
        let max_y = world.max_height() - 1;
        let base = origin.pos;

        for direction in REVEAL_DIRECTIONS {
            let mut blocked = false;
            for depth in 1..=ADDITIONAL_REVEAL_LAYERS {
                let target = base.offset(direction.0 * depth, direction.1 * depth, direction.2 * depth);
                if target.y < min_y || target.y > max_y {
                    break;
                }
                if !world.is_chunk_loaded(target.chunk_x(), target.chunk_z()) {
                    break;
                }
                let traversable = world.block_at(target).is_interior_traversable();
                if !traversable && blocked {
                    break;
                }

                let revealed = self.reveal_block(
                    world, out, session, active, &origin.world, target, view, self.min_dot, max_distance_squared, tick,
                );
                if !revealed {
                    break;
                }

                if depth == 1 || traversable {
                    let offsets = lateral_offsets(direction).iter().map(|o| (o, self.lateral_min_dot));
                    let diagonals = diagonal_offsets(direction).iter().map(|o| (o, self.diagonal_min_dot));
                    for (&(dx, dy, dz), min_dot) in offsets.chain(diagonals) {
                        let neighbor = target.offset(dx, dy, dz);
                        if neighbor.y < min_y || neighbor.y > max_y {
                            continue;
                        }
                        if !world.is_chunk_loaded(neighbor.chunk_x(), neighbor.chunk_z()) {
                            continue;
                        }
                        self.reveal_block(
                            world, out, session, active, &origin.world, neighbor, view, min_dot, max_distance_squared, tick,
                        );
                    }
                }

                if !traversable {
                    blocked = true;
                }
            }
        }
    }

    /// Reveals one block when it lies in range and inside the cone.
    /// Returns whether it qualified, including when it was already active
    /// this pass.
    #[allow(clippy::too_many_arguments)]
    pub fn reveal_block<H: HostServer, W: HostWorld + ?Sized>(
        &self,
        world: &W,
        out: &ViewOutput<'_, H>,
        session: &mut PlayerViewSession,
        active: &mut HashSet<BlockKey>,
        world_name: &WorldName,
        pos: BlockPos,
        view: ViewPoint,
        min_dot: f64,
        max_distance_squared: f64,
        tick: u64,
    ) -> bool {
        if pos.y < world.min_height() || pos.y > world.max_height() - 1 {
            return false;
        }
        let delta = block_center(pos) - view.eye;
        let distance_squared = delta.magnitude2();
        if distance_squared > max_distance_squared {
            return false;
        }
        if !within_fov(view.direction, delta, distance_squared, min_dot) {
            return false;
        }

        let key = BlockKey::new(world_name.clone(), pos);
        let newly_active = active.insert(key.clone());
        if !newly_active && !session.is_masked(&key) {
            return true;
        }
        session.apply_reveal(out, &key, tick);
        session.mark_passive_reveal(&key, tick);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BlockTransmitter, EntityVisibility, MockServer, MockWorld, PlayerId};
    use cavecloak_index::BlockAppearance;

    const VIEWER: PlayerId = PlayerId(1);

    fn setup() -> (MockServer, WorldName) {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        (server, WorldName::new("world"))
    }

    #[test]
    fn test_thresholds_are_widened_and_clamped() {
        let revealer = NeighborRevealer::from_config(&ViewConfig::default());
        let cos = ViewConfig::default().fov_half_angle_cos();
        assert!((revealer.lateral_min_dot() - (cos - 0.25).max(-0.10)).abs() < 1e-12);
        assert!((revealer.diagonal_min_dot() - (cos - 0.40).max(-0.30)).abs() < 1e-12);
        assert!(revealer.diagonal_min_dot() <= revealer.lateral_min_dot());
    }

    #[test]
    fn test_zero_direction_falls_back_to_positive_z() {
        let view = ViewPoint::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(view.direction, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_reveals_walls_around_opening() {
        let (server, world_name) = setup();
        let world = server.mock_world("world").unwrap();
        // Tunnel along x at y=40, viewer inside looking down the tunnel.
        world.fill_box(BlockPos::new(0, 40, 0), BlockPos::new(10, 41, 0), &BlockAppearance::air());
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut active = HashSet::new();
        let revealer = NeighborRevealer::from_config(&ViewConfig::default());

        let origin = BlockKey::at(&world_name, 6, 40, 0);
        let view = ViewPoint::new(Point3::new(0.5, 41.1, 0.5), Vector3::new(1.0, 0.0, 0.0));
        revealer.reveal_layers(world, &out, &mut session, &mut active, &origin, view, 24.0 * 24.0, 1);

        // Further along the tunnel and the floor beneath it.
        assert!(session.is_revealed(&BlockKey::at(&world_name, 7, 40, 0)));
        assert!(session.is_revealed(&BlockKey::at(&world_name, 8, 40, 0)));
        assert!(session.is_revealed(&BlockKey::at(&world_name, 6, 39, 0)));
        // Behind the viewer is outside every cone.
        assert!(!active.contains(&BlockKey::at(&world_name, -1, 40, 0)));
    }

    #[test]
    fn test_walk_stops_after_first_solid_block() {
        let (server, world_name) = setup();
        let world = server.mock_world("world").unwrap();
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut active = HashSet::new();
        let revealer = NeighborRevealer::from_config(&ViewConfig::default());
        world.set_block(BlockPos::new(5, 40, 0), BlockAppearance::air());

        let origin = BlockKey::at(&world_name, 5, 40, 0);
        let view = ViewPoint::new(Point3::new(0.5, 40.5, 0.5), Vector3::new(1.0, 0.0, 0.0));
        revealer.reveal_layers(world, &out, &mut session, &mut active, &origin, view, 24.0 * 24.0, 1);

        // (6,40,0) is stone and revealed, (7,40,0) lies behind it.
        assert!(session.is_revealed(&BlockKey::at(&world_name, 6, 40, 0)));
        assert!(!active.contains(&BlockKey::at(&world_name, 7, 40, 0)));
    }

    #[test]
    fn test_unloaded_chunk_stops_walk() {
        let (server, world_name) = setup();
        let world = server.mock_world("world").unwrap();
        world.set_chunk_loaded(1, 0, false);
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut active = HashSet::new();
        let revealer = NeighborRevealer::from_config(&ViewConfig::default());

        let origin = BlockKey::at(&world_name, 15, 40, 0);
        let view = ViewPoint::new(Point3::new(8.5, 40.5, 0.5), Vector3::new(1.0, 0.0, 0.0));
        revealer.reveal_layers(world, &out, &mut session, &mut active, &origin, view, 24.0 * 24.0, 1);
        assert!(!active.contains(&BlockKey::at(&world_name, 16, 40, 0)));
    }
}
