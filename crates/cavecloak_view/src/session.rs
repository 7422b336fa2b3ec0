//! # Player View Session
//!
//! Everything the service remembers about one viewer: what each override
//! block currently shows, which blocks are passively revealed, which
//! entities are hidden, and the view state of the last processed pass.
//!
//! ## Display States
//!
//! ```text
//!            apply_mask (sent)                 apply_reveal (sent)
//!   absent ─────────────────▶ Masked ◀──────────────────────▶ Revealed
//!     ▲                         │                                │
//!     └──── revert / cleanup ───┴────────────────────────────────┘
//! ```
//!
//! A block already in the requested state is only re-sent once the resend
//! interval has elapsed, so a steady view costs no packets.
//!
//! Sessions are owned by the driver thread. The part workers touch lives in
//! [`SessionShared`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cavecloak_core::{LongArrayQueue, LongHashSet};
use cavecloak_index::{BlockAppearance, BlockKey, WorldName};
use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};

use crate::coordinator::SessionShared;
use crate::host::{EntityId, EntityInfo, HostServer, PlayerId, PlayerState};
use crate::output::ViewOutput;
use crate::snapshot::PlayerSnapshot;

/// Minimum ticks between two sends of the same state.
pub const RESEND_INTERVAL_TICKS: u64 = 5;

/// Squared eye movement that triggers a recomputation.
pub const MIN_MOVEMENT_DELTA_SQUARED: f64 = 0.16;

/// Cosine of a 3 degree rotation.
pub const MIN_ROTATION_DOT: f64 = 0.998_629_534_754_573_8;

/// A session idle this long is recomputed anyway.
pub const MAX_IDLE_TICKS: u64 = 40;

/// Lifetime of a passive reveal.
pub const PASSIVE_REVEAL_DURATION_TICKS: u64 = 30;

/// What the viewer currently sees at an override position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    /// A disguise was sent.
    Masked,
    /// The real block was sent.
    Revealed,
}

#[derive(Clone, Copy, Debug)]
struct BlockDisplay {
    state: DisplayState,
    last_sent: u64,
}

impl BlockDisplay {
    const fn needs_refresh(self, tick: u64) -> bool {
        tick < self.last_sent || tick - self.last_sent >= RESEND_INTERVAL_TICKS
    }
}

#[derive(Clone, Debug)]
struct ViewState {
    world: WorldName,
    eye: Point3<f64>,
    direction: Vector3<f64>,
    chunk: (i32, i32),
    tick: u64,
}

/// Per-pass working sets, reused across passes.
#[derive(Default)]
pub(crate) struct PassScratch {
    pub(crate) active_keys: HashSet<BlockKey>,
    pub(crate) interior_queue: LongArrayQueue,
    pub(crate) interior_visited: LongHashSet,
    pub(crate) valid_entities: HashSet<EntityId>,
}

impl PassScratch {
    pub(crate) fn clear(&mut self) {
        self.active_keys.clear();
        self.interior_queue.clear();
        self.interior_visited.clear();
        self.valid_entities.clear();
    }
}

/// Per-viewer masking state.
pub struct PlayerViewSession {
    shared: Arc<SessionShared>,
    blocks: HashMap<BlockKey, BlockDisplay>,
    passive_reveals: HashMap<BlockKey, u64>,
    hidden_entities: HashSet<EntityId>,
    last_view: Option<ViewState>,
    stale: Vec<BlockKey>,
    pub(crate) scratch: PassScratch,
}

impl PlayerViewSession {
    /// Creates an empty session for `player`.
    #[must_use]
    pub fn new(player: PlayerId) -> Self {
        Self {
            shared: Arc::new(SessionShared::new(player)),
            blocks: HashMap::new(),
            passive_reveals: HashMap::new(),
            hidden_entities: HashSet::new(),
            last_view: None,
            stale: Vec::new(),
            scratch: PassScratch::default(),
        }
    }

    /// Owning player.
    #[inline]
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.shared.player()
    }

    /// State shared with worker threads.
    #[inline]
    #[must_use]
    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// What the viewer currently sees at `key`.
    #[must_use]
    pub fn display_state(&self, key: &BlockKey) -> Option<DisplayState> {
        self.blocks.get(key).map(|display| display.state)
    }

    /// Whether the viewer is shown the real block at `key`.
    #[must_use]
    pub fn is_revealed(&self, key: &BlockKey) -> bool {
        self.display_state(key) == Some(DisplayState::Revealed)
    }

    /// Whether the viewer is shown a disguise at `key`.
    #[must_use]
    pub fn is_masked(&self, key: &BlockKey) -> bool {
        self.display_state(key) == Some(DisplayState::Masked)
    }

    /// Number of positions with an override.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.blocks.len()
    }

    // ========================================================================
    // BLOCK OVERRIDES
    // ========================================================================

    /// Shows `mask` at `key`.
    pub fn apply_mask<H: HostServer>(&mut self, out: &ViewOutput<'_, H>, key: &BlockKey, mask: &BlockAppearance, tick: u64) {
        if let Some(current) = self.blocks.get(key) {
            if current.state == DisplayState::Masked && !current.needs_refresh(tick) {
                return;
            }
        }
        self.passive_reveals.remove(key);
        if out.send_block(key.pos, mask) {
            self.blocks.insert(key.clone(), BlockDisplay { state: DisplayState::Masked, last_sent: tick });
        }
    }

    /// Shows the real block at `key`.
    pub fn apply_reveal<H: HostServer>(&mut self, out: &ViewOutput<'_, H>, key: &BlockKey, tick: u64) {
        if let Some(current) = self.blocks.get(key) {
            if current.state == DisplayState::Revealed && !current.needs_refresh(tick) {
                return;
            }
        }
        self.passive_reveals.remove(key);
        let Some(actual) = out.true_block(key) else {
            self.blocks.remove(key);
            return;
        };
        if out.send_block(key.pos, &actual) {
            self.blocks.insert(key.clone(), BlockDisplay { state: DisplayState::Revealed, last_sent: tick });
        } else {
            self.blocks.remove(key);
        }
    }

    /// Keeps `key` out of cleanup for [`PASSIVE_REVEAL_DURATION_TICKS`].
    pub fn mark_passive_reveal(&mut self, key: &BlockKey, tick: u64) {
        self.passive_reveals.insert(key.clone(), tick + PASSIVE_REVEAL_DURATION_TICKS);
    }

    /// Whether `key` is passively revealed at `tick`. Expired entries are
    /// dropped on the way.
    pub fn is_passive_reveal_active(&mut self, key: &BlockKey, tick: u64) -> bool {
        match self.passive_reveals.get(key) {
            Some(&expiry) if expiry >= tick => true,
            Some(_) => {
                self.passive_reveals.remove(key);
                false
            }
            None => false,
        }
    }

    /// Reverts every override that is neither in `valid`, passively
    /// revealed, nor a mask `keep_masked` wants to keep.
    pub fn cleanup<H, F>(&mut self, out: &ViewOutput<'_, H>, valid: &HashSet<BlockKey>, keep_masked: F, tick: u64)
    where
        H: HostServer,
        F: Fn(&BlockKey) -> bool,
    {
        self.passive_reveals.retain(|_, expiry| *expiry >= tick);

        let mut stale = std::mem::take(&mut self.stale);
        stale.clear();
        for (key, display) in &self.blocks {
            if valid.contains(key) || self.passive_reveals.contains_key(key) {
                continue;
            }
            if display.state == DisplayState::Masked && keep_masked(key) {
                continue;
            }
            stale.push(key.clone());
        }
        for key in stale.drain(..) {
            self.revert(out, &key);
        }
        self.stale = stale;
    }

    /// Drops the override at `key` and sends the real block.
    pub fn revert<H: HostServer>(&mut self, out: &ViewOutput<'_, H>, key: &BlockKey) {
        if self.blocks.remove(key).is_none() {
            return;
        }
        self.passive_reveals.remove(key);
        if let Some(actual) = out.true_block(key) {
            out.send_block(key.pos, &actual);
        }
    }

    /// Reverts every override, shows every hidden entity and forgets the
    /// last view state.
    pub fn clear<H: HostServer>(&mut self, out: &mut ViewOutput<'_, H>) {
        let keys: Vec<BlockKey> = self.blocks.keys().cloned().collect();
        for key in &keys {
            self.revert(out, key);
        }
        self.blocks.clear();
        self.passive_reveals.clear();
        for id in std::mem::take(&mut self.hidden_entities) {
            if let Some(entity) = out.entity(id) {
                out.show_entity(&entity);
            }
        }
        self.last_view = None;
        self.shared.clear_dirty();
        self.scratch.clear();
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Whether `entity` is hidden from the viewer.
    #[must_use]
    pub fn is_entity_hidden(&self, entity: EntityId) -> bool {
        self.hidden_entities.contains(&entity)
    }

    /// Hides `entity` unless already hidden. An entity the host cannot hide
    /// is not remembered.
    pub fn hide_entity<H: HostServer>(&mut self, out: &mut ViewOutput<'_, H>, entity: &EntityInfo) {
        if !self.hidden_entities.insert(entity.id) {
            return;
        }
        if !out.hide_entity(entity) {
            self.hidden_entities.remove(&entity.id);
        }
    }

    /// Shows `entity` if it was hidden.
    pub fn show_entity<H: HostServer>(&mut self, out: &mut ViewOutput<'_, H>, entity: &EntityInfo) {
        if self.hidden_entities.remove(&entity.id) {
            out.show_entity(entity);
        }
    }

    /// Shows and forgets every hidden entity not in `valid`.
    pub fn cleanup_entities<H: HostServer>(&mut self, out: &mut ViewOutput<'_, H>, valid: &HashSet<EntityId>) {
        let gone: Vec<EntityId> = self.hidden_entities.iter().copied().filter(|id| !valid.contains(id)).collect();
        for id in gone {
            self.hidden_entities.remove(&id);
            if let Some(entity) = out.entity(id) {
                out.show_entity(&entity);
            }
        }
    }

    // ========================================================================
    // SCHEDULING
    // ========================================================================

    /// Forces the next tick to schedule a computation.
    pub fn mark_dirty(&self) {
        self.shared.mark_dirty();
    }

    /// Whether the player moved or turned enough since the last processed
    /// pass to warrant a new one.
    #[must_use]
    pub fn should_schedule(&self, player: &PlayerState, tick: u64) -> bool {
        if self.shared.is_dirty() {
            return true;
        }
        let Some(last) = &self.last_view else {
            return true;
        };
        if tick.saturating_sub(last.tick) >= MAX_IDLE_TICKS {
            return true;
        }
        if player.world != last.world || player.feet_chunk() != last.chunk {
            return true;
        }
        if player.eye.distance2(last.eye) >= MIN_MOVEMENT_DELTA_SQUARED {
            return true;
        }
        let direction = if player.direction.magnitude2() > 0.0 {
            player.direction.normalize()
        } else {
            player.direction
        };
        direction.dot(last.direction) < MIN_ROTATION_DOT
    }

    /// Records the view a processed pass was computed for.
    pub fn update_view_state(&mut self, snapshot: &PlayerSnapshot, tick: u64) {
        self.last_view = Some(ViewState {
            world: snapshot.world.clone(),
            eye: snapshot.eye,
            direction: snapshot.direction,
            chunk: (snapshot.chunk_x, snapshot.chunk_z),
            tick,
        });
        self.shared.clear_dirty();
    }
}
