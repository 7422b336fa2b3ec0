//! # Appearance Palette
//!
//! Global, growth-only mapping between appearances and dense `u32` ids.
//! Chunk stores hold ids instead of descriptors, so ten thousand tracked
//! stone blocks cost one descriptor string.
//!
//! Ids are assigned sequentially and never reused while the index lives.
//! Only a full reload resets the palette, together with every store that
//! references it.

use std::collections::HashMap;

use crate::appearance::BlockAppearance;

/// Appearance interning table.
#[derive(Debug, Default)]
pub struct AppearancePalette {
    by_appearance: HashMap<BlockAppearance, u32>,
    by_id: Vec<BlockAppearance>,
}

impl AppearancePalette {
    /// Creates an empty palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `appearance`, assigning the next id on first sight.
    pub fn get_or_create_id(&mut self, appearance: &BlockAppearance) -> u32 {
        if let Some(&id) = self.by_appearance.get(appearance) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = self.by_id.len() as u32;
        self.by_id.push(appearance.clone());
        self.by_appearance.insert(appearance.clone(), id);
        id
    }

    /// Looks up an id without assigning one.
    #[must_use]
    pub fn id_of(&self, appearance: &BlockAppearance) -> Option<u32> {
        self.by_appearance.get(appearance).copied()
    }

    /// Appearance for `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&BlockAppearance> {
        self.by_id.get(id as usize)
    }

    /// Canonical descriptor string for `id`.
    #[must_use]
    pub fn get_serialized(&self, id: u32) -> Option<&str> {
        self.get(id).map(BlockAppearance::as_str)
    }

    /// Number of distinct appearances seen.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when nothing has been interned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Forgets every id. Only valid while no store references the palette.
    pub(crate) fn clear(&mut self) {
        self.by_appearance.clear();
        self.by_id.clear();
    }
}
