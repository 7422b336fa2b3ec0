//! # Interior Reveal
//!
//! Flood fill through the air (and water) the player stands in. Every
//! reached cell is revealed together with up to two layers of its walls,
//! so the cave a player is inside always renders, whatever the view cone
//! says.
//!
//! The fill is seeded from the feet block and the block above it and is
//! bounded by a sphere of `interior_reveal_radius + 1.5` around the live
//! feet location.

use std::collections::HashSet;

use cavecloak_core::{pack_block_pos, unpack_block_pos};
use cavecloak_index::{BlockKey, BlockPos, WorldName};
use cgmath::{MetricSpace, Point3};

use crate::host::{floor_block, HostServer, HostWorld};
use crate::output::ViewOutput;
use crate::session::{PassScratch, PlayerViewSession};
use crate::visibility::block_center;

/// Padding added to the configured radius.
pub const INTERIOR_REVEAL_PADDING: f64 = 1.5;

/// Up, down, north, south, east, west.
pub const NEIGHBOR_FACES: [(i32, i32, i32); 6] = [(0, 1, 0), (0, -1, 0), (0, 0, -1), (0, 0, 1), (1, 0, 0), (-1, 0, 0)];

/// Runs the interior flood fill around `origin` (the feet location).
#[allow(clippy::too_many_arguments)]
pub(crate) fn reveal_interior<H: HostServer, W: HostWorld + ?Sized>(
    world: &W,
    out: &ViewOutput<'_, H>,
    session: &mut PlayerViewSession,
    scratch: &mut PassScratch,
    world_name: &WorldName,
    origin: Point3<f64>,
    radius: f64,
    tick: u64,
) {
    if radius <= 0.0 {
        return;
    }
    let PassScratch { active_keys, interior_queue: queue, interior_visited: visited, .. } = scratch;
    queue.clear();
    visited.clear();

    let seed = floor_block(origin);
    for pos in [seed, seed.offset(0, 1, 0)] {
        if world.block_at(pos).is_interior_traversable() && visited.insert(pack_block_pos(pos.x, pos.y, pos.z)) {
            queue.push_back(pack_block_pos(pos.x, pos.y, pos.z));
        }
    }

    let limit = radius + INTERIOR_REVEAL_PADDING;
    let limit_squared = limit * limit;

    while let Some(packed) = queue.pop_front() {
        let (x, y, z) = unpack_block_pos(packed);
        let pos = BlockPos::new(x, y, z);
        if block_center(pos).distance2(origin) > limit_squared {
            continue;
        }
        if !world.block_at(pos).is_interior_traversable() {
            continue;
        }

        let key = BlockKey::new(world_name.clone(), pos);
        if !active_keys.insert(key.clone()) && !session.is_masked(&key) {
            continue;
        }
        session.apply_reveal(out, &key, tick);
        session.mark_passive_reveal(&key, tick);
        reveal_boundary(world, out, session, active_keys, world_name, pos, tick);

        for (dx, dy, dz) in NEIGHBOR_FACES {
            let next = pos.offset(dx, dy, dz);
            if !world.block_at(next).is_interior_traversable() {
                continue;
            }
            let packed = pack_block_pos(next.x, next.y, next.z);
            if visited.insert(packed) {
                queue.push_back(packed);
            }
        }
    }
    visited.clear();
}

/// Reveals the six faces of `cell`; a solid face also reveals the block
/// behind it.
fn reveal_boundary<H: HostServer, W: HostWorld + ?Sized>(
    world: &W,
    out: &ViewOutput<'_, H>,
    session: &mut PlayerViewSession,
    active_keys: &mut HashSet<BlockKey>,
    world_name: &WorldName,
    cell: BlockPos,
    tick: u64,
) {
    for (dx, dy, dz) in NEIGHBOR_FACES {
        let boundary = cell.offset(dx, dy, dz);
        reveal_layer(out, session, active_keys, world_name, boundary, tick);
        if world.block_at(boundary).is_interior_traversable() {
            continue;
        }
        reveal_layer(out, session, active_keys, world_name, boundary.offset(dx, dy, dz), tick);
    }
}

fn reveal_layer<H: HostServer>(
    out: &ViewOutput<'_, H>,
    session: &mut PlayerViewSession,
    active_keys: &mut HashSet<BlockKey>,
    world_name: &WorldName,
    pos: BlockPos,
    tick: u64,
) {
    let key = BlockKey::new(world_name.clone(), pos);
    if !active_keys.insert(key.clone()) && !session.is_masked(&key) {
        return;
    }
    session.apply_reveal(out, &key, tick);
    session.mark_passive_reveal(&key, tick);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BlockTransmitter, EntityVisibility, MockServer, MockWorld, PlayerId};
    use cavecloak_index::BlockAppearance;

    const VIEWER: PlayerId = PlayerId(1);

    fn cave_server() -> MockServer {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        // 5x3x5 room at y 40..=42 around (0, _, 0).
        server.mock_world("world").unwrap().fill_box(
            BlockPos::new(-2, 40, -2),
            BlockPos::new(2, 42, 2),
            &BlockAppearance::air(),
        );
        server
    }

    #[test]
    fn test_fills_room_and_walls() {
        let server = cave_server();
        let world = server.mock_world("world").unwrap();
        let name = WorldName::new("world");
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut scratch = PassScratch::default();

        reveal_interior(world, &out, &mut session, &mut scratch, &name, Point3::new(0.5, 40.0, 0.5), 8.0, 1);

        assert!(session.is_revealed(&BlockKey::at(&name, 2, 42, 2)));
        // First and second wall layer.
        assert!(session.is_revealed(&BlockKey::at(&name, 3, 40, 0)));
        assert!(session.is_revealed(&BlockKey::at(&name, 4, 40, 0)));
        assert!(!scratch.active_keys.contains(&BlockKey::at(&name, 5, 40, 0)));
        assert!(scratch.interior_visited.is_empty());
    }

    #[test]
    fn test_radius_bounds_fill() {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        let world = server.mock_world("world").unwrap();
        world.fill_box(BlockPos::new(0, 40, 0), BlockPos::new(30, 41, 0), &BlockAppearance::air());
        let name = WorldName::new("world");
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut scratch = PassScratch::default();

        reveal_interior(world, &out, &mut session, &mut scratch, &name, Point3::new(0.5, 40.0, 0.5), 4.0, 1);

        assert!(session.is_revealed(&BlockKey::at(&name, 5, 40, 0)));
        assert!(!scratch.active_keys.contains(&BlockKey::at(&name, 8, 41, 0)));
    }

    #[test]
    fn test_solid_feet_reveal_nothing() {
        let server = MockServer::new().with_world(MockWorld::new("world").with_surface(100));
        let world = server.mock_world("world").unwrap();
        let name = WorldName::new("world");
        let mut visibility = EntityVisibility::PerEntity;
        let out = ViewOutput::new(&server, VIEWER, BlockTransmitter::Modern, &mut visibility);
        let mut session = PlayerViewSession::new(VIEWER);
        let mut scratch = PassScratch::default();

        reveal_interior(world, &out, &mut session, &mut scratch, &name, Point3::new(0.5, 40.0, 0.5), 8.0, 1);
        assert_eq!(session.override_count(), 0);
        assert_eq!(server.transmission_count(), 0);
    }
}
