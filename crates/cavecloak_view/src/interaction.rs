//! # Interaction Reveals
//!
//! A freshly excavated block is revealed to the digger and to nearby
//! players, and stays revealed for a configured number of service ticks
//! regardless of line of sight. This table holds those expiries; the
//! per-player reveal itself is done by the service.

use std::collections::HashMap;

use cavecloak_index::BlockKey;

/// Block -> last tick its interaction reveal is active (inclusive).
#[derive(Debug, Default)]
pub struct InteractionRevealTracker {
    expiry: HashMap<BlockKey, u64>,
}

impl InteractionRevealTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `key` revealed until `tick + duration`. A later expiry already
    /// on record wins. A zero duration records nothing.
    pub fn record(&mut self, key: &BlockKey, duration: u64, tick: u64) {
        if duration == 0 {
            return;
        }
        let expire = tick + duration;
        self.expiry
            .entry(key.clone())
            .and_modify(|current| *current = (*current).max(expire))
            .or_insert(expire);
    }

    /// Whether the reveal of `key` is active at `tick`. An expired entry is
    /// removed.
    pub fn is_active(&mut self, key: &BlockKey, tick: u64) -> bool {
        match self.expiry.get(key) {
            Some(&expire) if expire >= tick => true,
            Some(_) => {
                self.expiry.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drops every entry that expired before `tick`.
    pub fn cleanup_expired(&mut self, tick: u64) {
        if !self.expiry.is_empty() {
            self.expiry.retain(|_, expire| *expire >= tick);
        }
    }

    /// Forgets one block.
    pub fn remove(&mut self, key: &BlockKey) {
        self.expiry.remove(key);
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.expiry.clear();
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expiry.len()
    }

    /// True when nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expiry.is_empty()
    }
}
