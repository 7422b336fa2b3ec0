//! # Pending Chunks
//!
//! Tracked blocks in unloaded chunks cannot be checked. The players whose
//! pass skipped such a chunk wait here until it loads, at which point they
//! are recomputed immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cavecloak_index::{ChunkKey, WorldName};

use crate::config::ViewConfig;
use crate::host::PlayerId;

/// Chunk -> players waiting for it.
pub struct PendingChunkTracker {
    config: Arc<ViewConfig>,
    pending: HashMap<ChunkKey, HashSet<PlayerId>>,
}

impl PendingChunkTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(config: Arc<ViewConfig>) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Records that `player` waits for a chunk. Excluded worlds are ignored.
    pub fn register(&mut self, player: PlayerId, world: &WorldName, chunk_x: i32, chunk_z: i32) {
        if self.config.is_world_excluded(world.as_str()) {
            return;
        }
        self.pending
            .entry(ChunkKey::new(world.clone(), chunk_x, chunk_z))
            .or_default()
            .insert(player);
    }

    /// Drops one wait.
    pub fn unregister(&mut self, player: PlayerId, world: &WorldName, chunk_x: i32, chunk_z: i32) {
        if self.pending.is_empty() {
            return;
        }
        let key = ChunkKey::new(world.clone(), chunk_x, chunk_z);
        if let Some(waiters) = self.pending.get_mut(&key) {
            waiters.remove(&player);
            if waiters.is_empty() {
                self.pending.remove(&key);
            }
        }
    }

    /// Removes and returns everyone waiting for a chunk.
    pub fn drain(&mut self, world: &WorldName, chunk_x: i32, chunk_z: i32) -> HashSet<PlayerId> {
        self.pending
            .remove(&ChunkKey::new(world.clone(), chunk_x, chunk_z))
            .unwrap_or_default()
    }

    /// Forgets every wait of one player.
    pub fn clear_for(&mut self, player: PlayerId) {
        self.pending.retain(|_, waiters| {
            waiters.remove(&player);
            !waiters.is_empty()
        });
    }

    /// Forgets everything.
    pub fn clear_all(&mut self) {
        self.pending.clear();
    }

    /// Number of chunks with at least one waiter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nobody waits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PendingChunkTracker {
        let config = ViewConfig::from_toml_str("excluded_worlds = [\"Lobby\"]").unwrap();
        PendingChunkTracker::new(Arc::new(config))
    }

    #[test]
    fn test_register_and_drain() {
        let mut pending = tracker();
        let world = WorldName::new("world");
        pending.register(PlayerId(1), &world, 2, -3);
        pending.register(PlayerId(2), &world, 2, -3);
        pending.register(PlayerId(1), &world, 0, 0);

        let waiters = pending.drain(&world, 2, -3);
        assert_eq!(waiters.len(), 2);
        assert!(pending.drain(&world, 2, -3).is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_unregister_removes_empty_entries() {
        let mut pending = tracker();
        let world = WorldName::new("world");
        pending.register(PlayerId(1), &world, 0, 0);
        pending.unregister(PlayerId(1), &world, 0, 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_excluded_world_is_ignored() {
        let mut pending = tracker();
        pending.register(PlayerId(1), &WorldName::new("lobby"), 0, 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_clear_for_player() {
        let mut pending = tracker();
        let world = WorldName::new("world");
        pending.register(PlayerId(1), &world, 0, 0);
        pending.register(PlayerId(2), &world, 0, 0);
        pending.register(PlayerId(1), &world, 1, 0);
        pending.clear_for(PlayerId(1));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.drain(&world, 0, 0), [PlayerId(2)].into_iter().collect());
        pending.register(PlayerId(3), &world, 4, 4);
        pending.clear_all();
        assert!(pending.is_empty());
    }
}
