//! # Player Snapshot
//!
//! Immutable copy of what a worker needs to know about a player. Captured
//! on the driver thread when a computation is scheduled; the player may
//! have moved by the time the result comes back.

use cavecloak_index::{BlockKey, WorldName};
use cgmath::{InnerSpace, Point3, Vector3};

use crate::host::{PlayerId, PlayerState};

/// Player state frozen at scheduling time.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSnapshot {
    /// Player id.
    pub player: PlayerId,
    /// World at scheduling time.
    pub world: WorldName,
    /// Chunk x of the feet location.
    pub chunk_x: i32,
    /// Chunk z of the feet location.
    pub chunk_z: i32,
    /// Query radius in chunks.
    pub chunk_radius: i32,
    /// Eye location.
    pub eye: Point3<f64>,
    /// Normalized look direction, or zero when the host reported none.
    pub direction: Vector3<f64>,
    /// Service tick at scheduling time.
    pub scheduled_tick: u64,
}

impl PlayerSnapshot {
    /// Captures a snapshot of `state`.
    #[must_use]
    pub fn capture(state: &PlayerState, chunk_radius: i32, tick: u64) -> Self {
        let direction = if state.direction.magnitude2() > 0.0 {
            state.direction.normalize()
        } else {
            state.direction
        };
        let (chunk_x, chunk_z) = state.feet_chunk();
        Self {
            player: state.id,
            world: state.world.clone(),
            chunk_x,
            chunk_z,
            chunk_radius,
            eye: state.eye,
            direction,
            scheduled_tick: tick,
        }
    }

    /// Squared distance from the eye to the center of a block.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, key: &BlockKey) -> f64 {
        let [x, y, z] = key.pos.center();
        let dx = x - self.eye.x;
        let dy = y - self.eye.y;
        let dz = z - self.eye.z;
        dx * dx + dy * dy + dz * dz
    }
}
