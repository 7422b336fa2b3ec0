//! # Mask Propagation
//!
//! A masked block whose neighbors are air would still leave a visible
//! pocket. Masking fills each air-like face neighbor with a disguise of
//! its own, unless the viewer already sees that neighbor for real.

use std::collections::HashSet;

use cavecloak_index::BlockKey;

use crate::config::ViewConfig;
use crate::host::{HostServer, HostWorld};
use crate::interior::NEIGHBOR_FACES;
use crate::mask_palette::MaskPaletteResolver;
use crate::output::ViewOutput;
use crate::session::PlayerViewSession;

/// Masks the air-like face neighbors of `origin`.
///
/// Neighbors that are revealed or already active this pass are left alone.
#[allow(clippy::too_many_arguments)]
pub fn propagate_mask<H: HostServer, W: HostWorld + ?Sized>(
    world: &W,
    out: &ViewOutput<'_, H>,
    session: &mut PlayerViewSession,
    active: &mut HashSet<BlockKey>,
    config: &ViewConfig,
    origin: &BlockKey,
    tick: u64,
) {
    for (dx, dy, dz) in NEIGHBOR_FACES {
        let pos = origin.pos.offset(dx, dy, dz);
        if !world.block_at(pos).is_air_like() {
            continue;
        }
        let key = BlockKey::new(origin.world.clone(), pos);
        if session.is_revealed(&key) {
            continue;
        }
        if !active.insert(key.clone()) {
            continue;
        }
        let mask = MaskPaletteResolver::resolve_from_neighbors(world, pos, config);
        session.apply_mask(out, &key, &mask, tick);
    }
}
