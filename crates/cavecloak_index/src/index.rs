//! # Spatial Block Index
//!
//! World-scale registry of tracked blocks, partitioned by chunk.
//!
//! ## Design
//!
//! ```text
//!                 RwLock<IndexState>
//!   ┌──────────────────────────────────────────────┐
//!   │ chunks: ChunkKey -> ChunkBlockStore          │
//!   │            local index -> palette id         │
//!   │ palette: palette id <-> BlockAppearance      │
//!   │ tracked: total block count                   │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! Mutations (track/untrack/purge/load) take the write lock; range queries,
//! lookups and `save()` take the read lock, so worker threads query while
//! the driver thread keeps tracking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::appearance::BlockAppearance;
use crate::chunk_store::ChunkBlockStore;
use crate::error::IndexResult;
use crate::key::{BlockKey, BlockPos, ChunkKey, WorldName};
use crate::palette::AppearancePalette;
use crate::persistence::{self, LoadReport};

/// File name of the binary store.
pub const BINARY_FILE_NAME: &str = "tracked-blocks.dat";

/// File name of the legacy text store.
pub const LEGACY_FILE_NAME: &str = "tracked-blocks.toml";

/// Lowest y the store can hold; the binary format stores y as `i16`.
pub const MIN_TRACKED_Y: i32 = i16::MIN as i32;

/// Highest y the store can hold.
pub const MAX_TRACKED_Y: i32 = i16::MAX as i32;

/// A tracked block and the appearance it had when it was tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedBlock {
    /// Where the block is.
    pub key: BlockKey,
    /// Appearance the block had before it was excavated.
    pub original: BlockAppearance,
}

/// Where the index persists itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageLocation {
    /// Binary store path.
    pub binary: PathBuf,
    /// Legacy text store path, read only when no binary store exists.
    pub legacy: PathBuf,
}

impl StorageLocation {
    /// Standard file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            binary: dir.join(BINARY_FILE_NAME),
            legacy: dir.join(LEGACY_FILE_NAME),
        }
    }
}

/// Lock-protected contents of the index.
#[derive(Debug, Default)]
pub(crate) struct IndexState {
    pub(crate) chunks: HashMap<ChunkKey, ChunkBlockStore>,
    pub(crate) palette: AppearancePalette,
    pub(crate) tracked: usize,
}

impl IndexState {
    pub(crate) fn track(&mut self, key: &BlockKey, appearance: &BlockAppearance) -> bool {
        if appearance.is_air_like() {
            return false;
        }
        if !is_trackable_y(key.pos.y) {
            tracing::warn!("Refusing to track {} in {}: y outside {}..={}", key.pos, key.world, MIN_TRACKED_Y, MAX_TRACKED_Y);
            return false;
        }
        let id = self.palette.get_or_create_id(appearance);
        self.insert_id(key.chunk_key(), key.pos, id)
    }

    pub(crate) fn insert_id(&mut self, chunk: ChunkKey, pos: BlockPos, palette_id: u32) -> bool {
        if !is_trackable_y(pos.y) {
            return false;
        }
        let inserted = self
            .chunks
            .entry(chunk)
            .or_default()
            .upsert(pos.local_index(), palette_id);
        if inserted {
            self.tracked += 1;
        }
        inserted
    }

    pub(crate) fn untrack(&mut self, key: &BlockKey) -> bool {
        let chunk = key.chunk_key();
        let Some(store) = self.chunks.get_mut(&chunk) else {
            return false;
        };
        if !store.remove(key.pos.local_index()) {
            return false;
        }
        self.tracked -= 1;
        if store.is_empty() {
            self.chunks.remove(&chunk);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.chunks.clear();
        self.palette.clear();
        self.tracked = 0;
    }
}

/// Whether `y` fits the persistent format.
#[inline]
#[must_use]
pub const fn is_trackable_y(y: i32) -> bool {
    y >= MIN_TRACKED_Y && y <= MAX_TRACKED_Y
}

/// Thread-safe registry of tracked blocks.
#[derive(Debug, Default)]
pub struct SpatialBlockIndex {
    state: RwLock<IndexState>,
    storage: Option<StorageLocation>,
}

impl SpatialBlockIndex {
    /// Creates an index that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates an empty index persisted at `storage`. Call [`Self::load`] to
    /// read existing data.
    #[must_use]
    pub fn with_storage(storage: StorageLocation) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            storage: Some(storage),
        }
    }

    /// Persistence location, if any.
    #[must_use]
    pub fn storage(&self) -> Option<&StorageLocation> {
        self.storage.as_ref()
    }

    /// Tracks `key` with its original appearance.
    ///
    /// Air-like appearances and y outside [`MIN_TRACKED_Y`]..=[`MAX_TRACKED_Y`]
    /// are ignored. Tracking an already tracked key replaces its appearance.
    /// Returns true only when the key was not tracked before.
    pub fn track(&self, key: &BlockKey, appearance: &BlockAppearance) -> bool {
        self.state.write().track(key, appearance)
    }

    /// Stops tracking `key`. Returns true if it was tracked.
    pub fn untrack(&self, key: &BlockKey) -> bool {
        self.state.write().untrack(key)
    }

    /// Original appearance of a tracked block.
    #[must_use]
    pub fn lookup(&self, key: &BlockKey) -> Option<TrackedBlock> {
        let state = self.state.read();
        let store = state.chunks.get(&key.chunk_key())?;
        let id = store.get(key.pos.local_index())?;
        let original = state.palette.get(id)?.clone();
        Some(TrackedBlock {
            key: key.clone(),
            original,
        })
    }

    /// Returns true if `key` is tracked.
    #[must_use]
    pub fn contains(&self, key: &BlockKey) -> bool {
        let state = self.state.read();
        state
            .chunks
            .get(&key.chunk_key())
            .is_some_and(|store| store.get(key.pos.local_index()).is_some())
    }

    /// Every tracked block in the inclusive square of chunks centered on
    /// `(chunk_x, chunk_z)`.
    #[must_use]
    pub fn range_query(&self, world: &WorldName, chunk_x: i32, chunk_z: i32, radius: i32) -> Vec<TrackedBlock> {
        let mut out = Vec::new();
        self.collect_range(world, chunk_x, chunk_z, radius, &mut out);
        out
    }

    /// Like [`Self::range_query`] but appends into a reusable buffer.
    pub fn collect_range(
        &self,
        world: &WorldName,
        chunk_x: i32,
        chunk_z: i32,
        radius: i32,
        out: &mut Vec<TrackedBlock>,
    ) {
        if radius < 0 {
            return;
        }
        let state = self.state.read();
        if state.chunks.is_empty() {
            return;
        }
        for cx in chunk_x - radius..=chunk_x + radius {
            for cz in chunk_z - radius..=chunk_z + radius {
                let chunk = ChunkKey::new(world.clone(), cx, cz);
                if let Some(store) = state.chunks.get(&chunk) {
                    store.collect(&chunk, &state.palette, out);
                }
            }
        }
    }

    /// True when the chunk holds at least one tracked block.
    #[must_use]
    pub fn has_tracked_blocks(&self, world: &WorldName, chunk_x: i32, chunk_z: i32) -> bool {
        self.state
            .read()
            .chunks
            .contains_key(&ChunkKey::new(world.clone(), chunk_x, chunk_z))
    }

    /// Drops every tracked block of `world`. Returns how many were removed.
    pub fn purge_world(&self, world: &WorldName) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;
        state.chunks.retain(|chunk, store| {
            if chunk.world == *world {
                removed += store.len();
                false
            } else {
                true
            }
        });
        state.tracked -= removed;
        if removed > 0 {
            tracing::info!("Purged {} tracked blocks of world {}", removed, world);
        }
        removed
    }

    /// Total tracked blocks.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.state.read().tracked
    }

    /// Number of chunks holding tracked blocks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.state.read().chunks.len()
    }

    /// Number of distinct appearances seen since the last load.
    #[must_use]
    pub fn palette_len(&self) -> usize {
        self.state.read().palette.len()
    }

    /// Replaces the contents of the index with what is on disk.
    ///
    /// Reads the binary store if present, otherwise migrates the legacy
    /// text store (writing the binary store right away and leaving the
    /// text file in place). Corrupt data is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file cannot be read at all.
    pub fn load(&self) -> IndexResult<LoadReport> {
        let Some(storage) = &self.storage else {
            return Ok(LoadReport::default());
        };

        let mut state = self.state.write();
        state.clear();

        if storage.binary.exists() {
            let report = persistence::read_binary(&storage.binary, &mut state)?;
            tracing::info!(
                "Loaded {} tracked blocks in {} chunks from {} ({} skipped)",
                report.blocks,
                report.chunks,
                storage.binary.display(),
                report.skipped
            );
            return Ok(report);
        }

        if storage.legacy.exists() {
            let report = persistence::read_legacy(&storage.legacy, &mut state)?;
            match persistence::write_binary(&storage.binary, &state) {
                Ok(()) => tracing::info!(
                    "Migrated {} tracked blocks from {} to {}",
                    report.blocks,
                    storage.legacy.display(),
                    storage.binary.display()
                ),
                Err(err) => tracing::error!(
                    "Failed to write migrated store {}: {}",
                    storage.binary.display(),
                    err
                ),
            }
            return Ok(report);
        }

        Ok(LoadReport::default())
    }

    /// Writes the index to the binary store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> IndexResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let state = self.state.read();
        persistence::write_binary(&storage.binary, &state)?;
        tracing::debug!(
            "Saved {} tracked blocks in {} chunks",
            state.tracked,
            state.chunks.len()
        );
        Ok(())
    }
}
