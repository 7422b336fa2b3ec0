//! # Mock Host
//!
//! In-memory [`HostServer`] and [`HostWorld`] for tests and the
//! simulation binary.
//!
//! ## World Model
//!
//! ```text
//! y >= surface_y   air (sky light 15)
//! y <  surface_y   fill block
//! overrides        any single block, e.g. a dug tunnel
//! ```
//!
//! Every chunk is loaded unless explicitly unloaded. Ray queries walk the
//! voxel grid (Amanatides & Woo) and stop at the first block that is not
//! air-like; fluids are skipped under [`FluidCollision::Never`].

use std::collections::{HashMap, HashSet};

use cavecloak_index::{BlockAppearance, BlockPos, WorldName};
use cgmath::{InnerSpace, Point3, Vector3};
use parking_lot::{Mutex, RwLock};

use super::traits::{
    floor_block, ClientTransport, EntityId, EntityInfo, Environment, FluidCollision, HostCapabilities, HostServer,
    HostWorld, PlayerId, PlayerState,
};
use crate::error::TransmitError;

// ============================================================================
// MOCK WORLD
// ============================================================================

/// Procedural world: solid below a flat surface, with per-block overrides.
pub struct MockWorld {
    name: WorldName,
    environment: Environment,
    seed: i64,
    min_height: i32,
    max_height: i32,
    surface_y: i32,
    fill: BlockAppearance,
    overrides: RwLock<HashMap<BlockPos, BlockAppearance>>,
    unloaded: RwLock<HashSet<(i32, i32)>>,
    entities: RwLock<Vec<EntityInfo>>,
}

impl MockWorld {
    /// Overworld of stone with its surface at y = 100.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: WorldName::new(name),
            environment: Environment::Normal,
            seed: 0,
            min_height: -64,
            max_height: 320,
            surface_y: 100,
            fill: BlockAppearance::from_material("stone"),
            overrides: RwLock::new(HashMap::new()),
            unloaded: RwLock::new(HashSet::new()),
            entities: RwLock::new(Vec::new()),
        }
    }

    /// Sets the dimension type.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the world seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the first air layer.
    #[must_use]
    pub const fn with_surface(mut self, surface_y: i32) -> Self {
        self.surface_y = surface_y;
        self
    }

    /// Sets the block below the surface.
    #[must_use]
    pub fn with_fill(mut self, fill: BlockAppearance) -> Self {
        self.fill = fill;
        self
    }

    /// Replaces one block.
    pub fn set_block(&self, pos: BlockPos, appearance: BlockAppearance) {
        self.overrides.write().insert(pos, appearance);
    }

    /// Fills an inclusive box with one appearance.
    pub fn fill_box(&self, from: BlockPos, to: BlockPos, appearance: &BlockAppearance) {
        let mut overrides = self.overrides.write();
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            for y in from.y.min(to.y)..=from.y.max(to.y) {
                for z in from.z.min(to.z)..=from.z.max(to.z) {
                    overrides.insert(BlockPos::new(x, y, z), appearance.clone());
                }
            }
        }
    }

    /// Marks a chunk as loaded or unloaded.
    pub fn set_chunk_loaded(&self, chunk_x: i32, chunk_z: i32, loaded: bool) {
        let mut unloaded = self.unloaded.write();
        if loaded {
            unloaded.remove(&(chunk_x, chunk_z));
        } else {
            unloaded.insert((chunk_x, chunk_z));
        }
    }

    /// Adds an entity.
    pub fn spawn_entity(&self, entity: EntityInfo) {
        self.entities.write().push(entity);
    }

    /// Removes an entity.
    pub fn despawn_entity(&self, id: EntityId) {
        self.entities.write().retain(|entity| entity.id != id);
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntityInfo> {
        self.entities.read().iter().find(|entity| entity.id == id).cloned()
    }

    fn blocks_ray(&self, pos: BlockPos, fluids: FluidCollision) -> bool {
        let block = self.block_at(pos);
        if block.is_air_like() {
            return false;
        }
        !(block.is_fluid() && fluids == FluidCollision::Never)
    }
}

impl HostWorld for MockWorld {
    fn name(&self) -> &WorldName {
        &self.name
    }

    fn environment(&self) -> Environment {
        self.environment
    }

    fn seed(&self) -> i64 {
        self.seed
    }

    fn min_height(&self) -> i32 {
        self.min_height
    }

    fn max_height(&self) -> i32 {
        self.max_height
    }

    fn is_chunk_loaded(&self, chunk_x: i32, chunk_z: i32) -> bool {
        !self.unloaded.read().contains(&(chunk_x, chunk_z))
    }

    fn block_at(&self, pos: BlockPos) -> BlockAppearance {
        if let Some(block) = self.overrides.read().get(&pos) {
            return block.clone();
        }
        if pos.y < self.surface_y && pos.y >= self.min_height {
            self.fill.clone()
        } else {
            BlockAppearance::air()
        }
    }

    fn sky_light_at(&self, pos: BlockPos) -> u8 {
        if pos.y > self.highest_block_y(pos.x, pos.z) {
            15
        } else {
            0
        }
    }

    fn highest_block_y(&self, x: i32, z: i32) -> i32 {
        let overrides = self.overrides.read();
        let mut highest = overrides
            .iter()
            .filter(|(pos, block)| pos.x == x && pos.z == z && !block.is_air_like())
            .map(|(pos, _)| pos.y)
            .max()
            .unwrap_or(self.min_height);
        let mut y = self.surface_y.min(self.max_height) - 1;
        while y > highest {
            let pos = BlockPos::new(x, y, z);
            let solid = overrides.get(&pos).map_or(true, |block| !block.is_air_like());
            if solid {
                highest = y;
                break;
            }
            y -= 1;
        }
        highest
    }

    #[allow(clippy::cast_possible_truncation)]
    fn ray_trace_blocks(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
        fluids: FluidCollision,
    ) -> Option<BlockPos> {
        if direction.magnitude2() < 1.0e-12 {
            return None;
        }
        let dir = direction.normalize();
        let mut cell = floor_block(origin);
        let origin = [origin.x, origin.y, origin.z];
        let dir = [dir.x, dir.y, dir.z];

        let mut step = [0i32; 3];
        let mut t_max = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        let start = [cell.x, cell.y, cell.z];
        for axis in 0..3 {
            if dir[axis] > 0.0 {
                step[axis] = 1;
                t_max[axis] = (f64::from(start[axis]) + 1.0 - origin[axis]) / dir[axis];
                t_delta[axis] = 1.0 / dir[axis];
            } else if dir[axis] < 0.0 {
                step[axis] = -1;
                t_max[axis] = (origin[axis] - f64::from(start[axis])) / -dir[axis];
                t_delta[axis] = -1.0 / dir[axis];
            }
        }

        loop {
            if self.blocks_ray(cell, fluids) {
                return Some(cell);
            }
            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };
            if t_max[axis] > max_distance {
                return None;
            }
            match axis {
                0 => cell.x += step[0],
                1 => cell.y += step[1],
                _ => cell.z += step[2],
            }
            t_max[axis] += t_delta[axis];
        }
    }

    fn nearby_entities(&self, center: Point3<f64>, radius: f64) -> Vec<EntityInfo> {
        self.entities
            .read()
            .iter()
            .filter(|entity| {
                (entity.position.x - center.x).abs() <= radius
                    && (entity.position.y - center.y).abs() <= radius
                    && (entity.position.z - center.z).abs() <= radius
            })
            .cloned()
            .collect()
    }
}

// ============================================================================
// MOCK SERVER
// ============================================================================

/// One call made through [`ClientTransport`].
#[derive(Clone, Debug, PartialEq)]
pub enum Transmission {
    /// Full block override.
    Block {
        /// Receiving player.
        viewer: PlayerId,
        /// Block position.
        pos: BlockPos,
        /// Appearance sent.
        appearance: BlockAppearance,
    },
    /// Material-only block override.
    LegacyBlock {
        /// Receiving player.
        viewer: PlayerId,
        /// Block position.
        pos: BlockPos,
        /// Material sent.
        material: String,
    },
    /// Entity hidden.
    HideEntity(PlayerId, EntityId),
    /// Entity shown.
    ShowEntity(PlayerId, EntityId),
    /// Player hidden.
    HidePlayer(PlayerId, PlayerId),
    /// Player shown.
    ShowPlayer(PlayerId, PlayerId),
}

/// In-memory server recording everything sent to clients.
pub struct MockServer {
    worlds: HashMap<WorldName, MockWorld>,
    players: RwLock<HashMap<PlayerId, PlayerState>>,
    capabilities: HostCapabilities,
    per_entity_fails: bool,
    sent: Mutex<Vec<Transmission>>,
}

impl MockServer {
    /// Creates a server with every capability and no worlds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worlds: HashMap::new(),
            players: RwLock::new(HashMap::new()),
            capabilities: HostCapabilities::default(),
            per_entity_fails: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Adds a world.
    #[must_use]
    pub fn with_world(mut self, world: MockWorld) -> Self {
        self.worlds.insert(world.name().clone(), world);
        self
    }

    /// Overrides the reported capabilities.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Makes per-entity visibility calls fail as unsupported at runtime
    /// while still advertising them.
    #[must_use]
    pub const fn with_broken_entity_visibility(mut self) -> Self {
        self.per_entity_fails = true;
        self
    }

    /// Typed world access.
    #[must_use]
    pub fn mock_world(&self, name: &str) -> Option<&MockWorld> {
        self.worlds.get(&WorldName::new(name))
    }

    /// Adds or moves a player. The eye sits 1.62 above the feet.
    pub fn place_player(&self, id: PlayerId, world: &str, feet: Point3<f64>, direction: Vector3<f64>) {
        let state = PlayerState {
            id,
            entity: EntityId(id.0),
            world: WorldName::new(world),
            feet,
            eye: Point3::new(feet.x, feet.y + 1.62, feet.z),
            direction,
        };
        self.players.write().insert(id, state);
    }

    /// Points an online player's eye at a location.
    pub fn look_at(&self, id: PlayerId, target: Point3<f64>) {
        if let Some(state) = self.players.write().get_mut(&id) {
            let delta = target - state.eye;
            if delta.magnitude2() > 0.0 {
                state.direction = delta.normalize();
            }
        }
    }

    /// Takes a player offline.
    pub fn remove_player(&self, id: PlayerId) {
        self.players.write().remove(&id);
    }

    /// Drains the transmission log.
    pub fn take_transmissions(&self) -> Vec<Transmission> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Last appearance sent to `viewer` at `pos`, if any.
    #[must_use]
    pub fn last_block_sent(&self, viewer: PlayerId, pos: BlockPos) -> Option<BlockAppearance> {
        self.sent.lock().iter().rev().find_map(|t| match t {
            Transmission::Block { viewer: v, pos: p, appearance } if *v == viewer && *p == pos => {
                Some(appearance.clone())
            }
            Transmission::LegacyBlock { viewer: v, pos: p, material } if *v == viewer && *p == pos => {
                Some(BlockAppearance::from_material(material))
            }
            _ => None,
        })
    }

    /// Number of recorded transmissions.
    #[must_use]
    pub fn transmission_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn record(&self, transmission: Transmission) {
        self.sent.lock().push(transmission);
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTransport for MockServer {
    fn send_block_change(
        &self,
        viewer: PlayerId,
        pos: BlockPos,
        appearance: &BlockAppearance,
    ) -> Result<(), TransmitError> {
        if !self.capabilities.modern_block_change {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::Block { viewer, pos, appearance: appearance.clone() });
        Ok(())
    }

    fn send_legacy_block_change(&self, viewer: PlayerId, pos: BlockPos, material: &str) -> Result<(), TransmitError> {
        if !self.capabilities.legacy_block_change {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::LegacyBlock { viewer, pos, material: material.to_string() });
        Ok(())
    }

    fn hide_entity(&self, viewer: PlayerId, entity: EntityId) -> Result<(), TransmitError> {
        if self.per_entity_fails || !self.capabilities.per_entity_visibility {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::HideEntity(viewer, entity));
        Ok(())
    }

    fn show_entity(&self, viewer: PlayerId, entity: EntityId) -> Result<(), TransmitError> {
        if self.per_entity_fails || !self.capabilities.per_entity_visibility {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::ShowEntity(viewer, entity));
        Ok(())
    }

    fn hide_player(&self, viewer: PlayerId, target: PlayerId) -> Result<(), TransmitError> {
        if !self.capabilities.player_visibility {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::HidePlayer(viewer, target));
        Ok(())
    }

    fn show_player(&self, viewer: PlayerId, target: PlayerId) -> Result<(), TransmitError> {
        if !self.capabilities.player_visibility {
            return Err(TransmitError::Unsupported);
        }
        self.record(Transmission::ShowPlayer(viewer, target));
        Ok(())
    }

    fn has_line_of_sight_to(&self, viewer: PlayerId, entity: EntityId) -> bool {
        let Some(state) = self.players.read().get(&viewer).cloned() else {
            return false;
        };
        let Some(world) = self.worlds.get(&state.world) else {
            return false;
        };
        let Some(target) = world.entity(entity) else {
            return false;
        };
        let center = Point3::new(target.position.x, target.position.y + target.height * 0.5, target.position.z);
        let delta = center - state.eye;
        let distance = delta.magnitude();
        if distance < 1.0e-6 {
            return true;
        }
        let hit = world.ray_trace_blocks(state.eye, delta, distance, FluidCollision::Never);
        hit.map_or(true, |pos| pos == floor_block(center))
    }
}

impl HostServer for MockServer {
    type World = MockWorld;

    fn world(&self, name: &WorldName) -> Option<&MockWorld> {
        self.worlds.get(name)
    }

    fn online_players(&self) -> Vec<PlayerState> {
        let mut players: Vec<_> = self.players.read().values().cloned().collect();
        players.sort_by_key(|state| state.id);
        players
    }

    fn player(&self, id: PlayerId) -> Option<PlayerState> {
        self.players.read().get(&id).cloned()
    }

    fn entity(&self, id: EntityId) -> Option<EntityInfo> {
        self.worlds.values().find_map(|world| world.entity(id))
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }
}
