//! # Block and Chunk Keys
//!
//! World-qualified coordinates. Chunks are 16x16 columns; a block maps to
//! its chunk by arithmetic shift, so negative coordinates floor correctly.
//!
//! ## Local Index
//!
//! Inside a chunk store a block is addressed by one `i32`:
//!
//! ```text
//! bits 31..8  (y + 8192)
//! bits  7..4  local z (0..15)
//! bits  3..0  local x (0..15)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Chunk width/depth in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Offset added to y so that negative heights pack into the local index.
pub const BLOCK_INDEX_Y_OFFSET: i32 = 8192;

/// Mask extracting a local x/z coordinate.
pub const LOCAL_COORD_MASK: i32 = 0xF;

static INTERNED_WORLDS: Lazy<Mutex<HashSet<Arc<str>>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Interned world name. Clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldName(Arc<str>);

impl WorldName {
    /// Returns the interned name for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut table = INTERNED_WORLDS.lock();
        if let Some(existing) = table.get(name) {
            return Self(Arc::clone(existing));
        }
        let interned: Arc<str> = Arc::from(name);
        table.insert(Arc::clone(&interned));
        Self(interned)
    }

    /// The name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorldName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for WorldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WorldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// Block coordinate within a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate (height).
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a block position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the position shifted by the given deltas.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Chunk X containing this block.
    #[inline]
    #[must_use]
    pub const fn chunk_x(self) -> i32 {
        self.x >> 4
    }

    /// Chunk Z containing this block.
    #[inline]
    #[must_use]
    pub const fn chunk_z(self) -> i32 {
        self.z >> 4
    }

    /// Center of the block in world space.
    #[inline]
    #[must_use]
    pub fn center(self) -> [f64; 3] {
        [
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        ]
    }

    /// Packed index of this block inside its chunk store.
    #[inline]
    #[must_use]
    pub const fn local_index(self) -> i32 {
        ((self.y + BLOCK_INDEX_Y_OFFSET) << 8)
            | ((self.z & LOCAL_COORD_MASK) << 4)
            | (self.x & LOCAL_COORD_MASK)
    }

    /// Rebuilds a world position from a chunk and a local index.
    #[inline]
    #[must_use]
    pub const fn from_local_index(chunk_x: i32, chunk_z: i32, index: i32) -> Self {
        let local_x = index & LOCAL_COORD_MASK;
        let local_z = (index >> 4) & LOCAL_COORD_MASK;
        let y = (index >> 8) - BLOCK_INDEX_Y_OFFSET;
        Self::new(chunk_x * CHUNK_SIZE + local_x, y, chunk_z * CHUNK_SIZE + local_z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A block in a specific world.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// World the block lives in.
    pub world: WorldName,
    /// Block coordinate.
    pub pos: BlockPos,
}

impl BlockKey {
    /// Creates a key from a world and a position.
    #[inline]
    #[must_use]
    pub const fn new(world: WorldName, pos: BlockPos) -> Self {
        Self { world, pos }
    }

    /// Convenience constructor from raw coordinates.
    #[must_use]
    pub fn at(world: &WorldName, x: i32, y: i32, z: i32) -> Self {
        Self::new(world.clone(), BlockPos::new(x, y, z))
    }

    /// The chunk this block belongs to.
    #[inline]
    #[must_use]
    pub fn chunk_key(&self) -> ChunkKey {
        ChunkKey::new(self.world.clone(), self.pos.chunk_x(), self.pos.chunk_z())
    }

    /// Key of the block shifted by the given deltas in the same world.
    #[inline]
    #[must_use]
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.world.clone(), self.pos.offset(dx, dy, dz))
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.world, self.pos)
    }
}

/// A 16x16 chunk column in a specific world.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// World the chunk lives in.
    pub world: WorldName,
    /// X coordinate (in chunks, not blocks).
    pub x: i32,
    /// Z coordinate (in chunks, not blocks).
    pub z: i32,
}

impl ChunkKey {
    /// Creates a chunk key.
    #[inline]
    #[must_use]
    pub const fn new(world: WorldName, x: i32, z: i32) -> Self {
        Self { world, x, z }
    }

    /// Chunk containing the given block column.
    #[must_use]
    pub fn containing(world: &WorldName, block_x: i32, block_z: i32) -> Self {
        Self::new(world.clone(), block_x >> 4, block_z >> 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_names_are_interned() {
        let a = WorldName::new("world_nether");
        let b = WorldName::from("world_nether");
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_ne!(a, WorldName::new("world"));
    }

    #[test]
    fn test_chunk_of_negative_coordinates_floors() {
        let world = WorldName::new("world");
        assert_eq!(BlockKey::at(&world, -1, 64, -16).chunk_key(), ChunkKey::new(world.clone(), -1, -1));
        assert_eq!(BlockKey::at(&world, -17, 0, 15).chunk_key(), ChunkKey::new(world.clone(), -2, 0));
        assert_eq!(BlockKey::at(&world, 16, 0, 31).chunk_key(), ChunkKey::new(world, 1, 1));
    }

    #[test]
    fn test_local_index_recovers_position() {
        for pos in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(-1, -64, -1),
            BlockPos::new(31, 319, -33),
            BlockPos::new(-4097, -2048, 4096),
        ] {
            let index = pos.local_index();
            assert_eq!(BlockPos::from_local_index(pos.chunk_x(), pos.chunk_z(), index), pos);
        }
    }
}
