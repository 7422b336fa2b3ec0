//! # Host Traits
//!
//! Everything the pipeline needs from the game server it runs inside.
//!
//! ## Architecture
//!
//! The pipeline never owns world state. It reads blocks and players through
//! these traits and pushes per-player overrides back through
//! [`ClientTransport`]:
//!
//! ```text
//! pipeline defines:       host implements:
//! ┌──────────────────┐    ┌──────────────────┐
//! │ trait HostServer │ ←─ │ impl HostServer  │
//! │ trait HostWorld  │ ←─ │ impl HostWorld   │
//! └──────────────────┘    └──────────────────┘
//! ```
//!
//! All calls happen on the driver thread. Worker threads only see the
//! tracking store and immutable snapshots.

use cavecloak_index::{BlockAppearance, BlockPos, WorldName};
use cgmath::{Point3, Vector3};

use crate::error::TransmitError;

/// Stable player identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

/// Stable entity identifier. Players are entities too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Dimension type of a world. Decides the fallback disguise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Overworld-like dimension.
    #[default]
    Normal,
    /// Nether-like dimension.
    Nether,
    /// End-like dimension.
    TheEnd,
    /// Anything the host defines itself.
    Custom,
}

/// How a ray query treats fluids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FluidCollision {
    /// Fluids never stop the ray.
    Never,
    /// Only source blocks stop the ray.
    SourceOnly,
    /// Every fluid block stops the ray.
    Always,
}

/// Live view of one online player.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Player id.
    pub id: PlayerId,
    /// Entity id of the player's body.
    pub entity: EntityId,
    /// World the player is in.
    pub world: WorldName,
    /// Feet location.
    pub feet: Point3<f64>,
    /// Eye location.
    pub eye: Point3<f64>,
    /// Look direction (unit length when the host reports one).
    pub direction: Vector3<f64>,
}

impl PlayerState {
    /// Block x/z of the feet location shifted to chunk coordinates.
    #[must_use]
    pub fn feet_chunk(&self) -> (i32, i32) {
        (self.feet_block().chunk_x(), self.feet_block().chunk_z())
    }

    /// Block containing the feet location.
    #[must_use]
    pub fn feet_block(&self) -> BlockPos {
        floor_block(self.feet)
    }

    /// Block containing the eye location.
    #[must_use]
    pub fn eye_block(&self) -> BlockPos {
        floor_block(self.eye)
    }
}

/// Block containing a continuous location.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn floor_block(location: Point3<f64>) -> BlockPos {
    BlockPos::new(
        location.x.floor() as i32,
        location.y.floor() as i32,
        location.z.floor() as i32,
    )
}

/// Entity near a player, as reported by [`HostWorld::nearby_entities`].
#[derive(Clone, Debug, PartialEq)]
pub struct EntityInfo {
    /// Entity id.
    pub id: EntityId,
    /// Lowercase entity type name (`armor_stand`, `item_frame`, ...).
    pub kind: String,
    /// Base location.
    pub position: Point3<f64>,
    /// Bounding box height.
    pub height: f64,
    /// Set when the entity is a player.
    pub player: Option<PlayerId>,
}

/// Optional host features, probed once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Full block-state change packets.
    pub modern_block_change: bool,
    /// Material-only block change packets.
    pub legacy_block_change: bool,
    /// Hiding arbitrary entities from one viewer.
    pub per_entity_visibility: bool,
    /// Hiding players from one viewer.
    pub player_visibility: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            modern_block_change: true,
            legacy_block_change: true,
            per_entity_visibility: true,
            player_visibility: true,
        }
    }
}

// ============================================================================
// WORLD ACCESS
// ============================================================================

/// Read access to one loaded world.
pub trait HostWorld {
    /// World name.
    fn name(&self) -> &WorldName;

    /// Dimension type.
    fn environment(&self) -> Environment;

    /// World seed. Zero means "no seed available".
    fn seed(&self) -> i64;

    /// Lowest buildable y (inclusive).
    fn min_height(&self) -> i32;

    /// Highest buildable y (exclusive).
    fn max_height(&self) -> i32;

    /// Whether the chunk column is loaded.
    fn is_chunk_loaded(&self, chunk_x: i32, chunk_z: i32) -> bool;

    /// Current appearance of a block.
    fn block_at(&self, pos: BlockPos) -> BlockAppearance;

    /// Sky light level (0..=15) at a block.
    fn sky_light_at(&self, pos: BlockPos) -> u8;

    /// Y of the highest non-air block in the column.
    fn highest_block_y(&self, x: i32, z: i32) -> i32;

    /// First solid block hit by a ray from `origin` along `direction`
    /// within `max_distance`, or `None`.
    fn ray_trace_blocks(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
        fluids: FluidCollision,
    ) -> Option<BlockPos>;

    /// Entities whose location lies within the axis-aligned box of
    /// half-extent `radius` around `center`.
    fn nearby_entities(&self, center: Point3<f64>, radius: f64) -> Vec<EntityInfo>;
}

// ============================================================================
// CLIENT OUTPUT
// ============================================================================

/// Per-viewer client overrides.
pub trait ClientTransport {
    /// Sends a full block-state override to one viewer.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when the host lacks the packet.
    fn send_block_change(
        &self,
        viewer: PlayerId,
        pos: BlockPos,
        appearance: &BlockAppearance,
    ) -> Result<(), TransmitError>;

    /// Sends a material-only block override (data value zero).
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when the host lacks the packet.
    fn send_legacy_block_change(&self, viewer: PlayerId, pos: BlockPos, material: &str) -> Result<(), TransmitError>;

    /// Hides an entity from one viewer.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when per-entity visibility is missing.
    fn hide_entity(&self, viewer: PlayerId, entity: EntityId) -> Result<(), TransmitError>;

    /// Shows a previously hidden entity to one viewer.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when per-entity visibility is missing.
    fn show_entity(&self, viewer: PlayerId, entity: EntityId) -> Result<(), TransmitError>;

    /// Hides a whole player from one viewer.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when the host lacks the call.
    fn hide_player(&self, viewer: PlayerId, target: PlayerId) -> Result<(), TransmitError>;

    /// Shows a hidden player to one viewer.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Unsupported`] when the host lacks the call.
    fn show_player(&self, viewer: PlayerId, target: PlayerId) -> Result<(), TransmitError>;

    /// Host line-of-sight test between a viewer and an entity.
    fn has_line_of_sight_to(&self, viewer: PlayerId, entity: EntityId) -> bool;
}

// ============================================================================
// SERVER ACCESS
// ============================================================================

/// The game server: worlds, players and the client channel.
pub trait HostServer: ClientTransport {
    /// Concrete world type.
    type World: HostWorld;

    /// Looks up a loaded world by name.
    fn world(&self, name: &WorldName) -> Option<&Self::World>;

    /// Snapshot of every online player.
    fn online_players(&self) -> Vec<PlayerState>;

    /// One online player.
    fn player(&self, id: PlayerId) -> Option<PlayerState>;

    /// Looks up any entity by id, in any world.
    fn entity(&self, id: EntityId) -> Option<EntityInfo>;

    /// Optional features of this host.
    fn capabilities(&self) -> HostCapabilities;
}
