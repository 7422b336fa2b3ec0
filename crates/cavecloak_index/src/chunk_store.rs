//! # Chunk Block Store
//!
//! Per-chunk map from local index to palette id, backed by the
//! open-addressing [`IntIntMap`]. A store exists in the index only while it
//! holds at least one block.

use cavecloak_core::IntIntMap;

use crate::key::{BlockKey, BlockPos, ChunkKey};
use crate::palette::AppearancePalette;
use crate::TrackedBlock;

/// Tracked blocks of one chunk.
#[derive(Clone, Debug, Default)]
pub struct ChunkBlockStore {
    blocks: IntIntMap,
}

impl ChunkBlockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the palette id at `local_index`. Returns true if the slot was empty.
    #[allow(clippy::cast_possible_wrap)]
    pub fn upsert(&mut self, local_index: i32, palette_id: u32) -> bool {
        self.blocks.insert(local_index, palette_id as i32).is_none()
    }

    /// Clears `local_index`. Returns true if something was removed.
    pub fn remove(&mut self, local_index: i32) -> bool {
        self.blocks.remove(local_index).is_some()
    }

    /// Palette id stored at `local_index`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn get(&self, local_index: i32) -> Option<u32> {
        self.blocks.get(local_index).map(|id| id as u32)
    }

    /// Number of blocks in the chunk.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when the chunk tracks nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Visits every `(local_index, palette_id)` pair.
    #[allow(clippy::cast_sign_loss)]
    pub fn for_each(&self, mut visit: impl FnMut(i32, u32)) {
        for (index, id) in self.blocks.iter() {
            visit(index, id as u32);
        }
    }

    /// Decodes every entry back to a tracked block and appends it to `out`.
    ///
    /// Entries whose id is missing from the palette are skipped.
    pub fn collect(&self, chunk: &ChunkKey, palette: &AppearancePalette, out: &mut Vec<TrackedBlock>) {
        out.reserve(self.len());
        self.for_each(|index, id| {
            if let Some(original) = palette.get(id) {
                let pos = BlockPos::from_local_index(chunk.x, chunk.z, index);
                out.push(TrackedBlock {
                    key: BlockKey::new(chunk.world.clone(), pos),
                    original: original.clone(),
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::BlockAppearance;
    use crate::key::WorldName;

    #[test]
    fn test_upsert_reports_first_insert_only() {
        let mut store = ChunkBlockStore::new();
        let index = BlockPos::new(3, 12, 7).local_index();
        assert!(store.upsert(index, 4));
        assert!(!store.upsert(index, 5));
        assert_eq!(store.get(index), Some(5));
        assert!(store.remove(index));
        assert!(!store.remove(index));
        assert!(store.is_empty());
    }

    #[test]
    fn test_collect_decodes_world_positions() {
        let world = WorldName::new("world");
        let chunk = ChunkKey::new(world.clone(), -2, 3);
        let mut palette = AppearancePalette::new();
        let ore = BlockAppearance::from_material("iron_ore");
        let id = palette.get_or_create_id(&ore);

        let pos = BlockPos::new(-29, -40, 50);
        let mut store = ChunkBlockStore::new();
        store.upsert(pos.local_index(), id);
        store.upsert(BlockPos::new(-32, 0, 48).local_index(), 99);

        let mut out = Vec::new();
        store.collect(&chunk, &palette, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, BlockKey::new(world, pos));
        assert_eq!(out[0].original, ore);
    }
}
