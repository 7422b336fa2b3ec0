//! # Mask Palette Resolution
//!
//! Picks the disguise a client sees in place of a hidden block.
//!
//! ## Order
//!
//! ```text
//! 1. custom mode     weighted pick for (world, x, y, z)
//! 2. neighbor mode   first maskable neighbor in +X -X +Y -Y +Z -Z order
//! 3. fallback        custom pick at (0, y, 0), else dimension default
//! ```
//!
//! A disguise always exists, so callers never have to fall back further.

use cavecloak_index::{BlockAppearance, BlockPos};

use crate::config::ViewConfig;
use crate::host::{Environment, HostWorld};

/// Neighbor probe order.
pub const NEIGHBOR_SCAN_ORDER: [(i32, i32, i32); 6] =
    [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];

/// Stateless disguise resolver.
pub struct MaskPaletteResolver;

impl MaskPaletteResolver {
    /// Disguise for the block at `pos`.
    #[must_use]
    pub fn resolve_from_neighbors<W: HostWorld + ?Sized>(world: &W, pos: BlockPos, config: &ViewConfig) -> BlockAppearance {
        if let Some(custom) = config.select_custom_mask(world, pos.x, pos.y, pos.z) {
            return custom;
        }

        if !config.is_custom_masking() {
            for (dx, dy, dz) in NEIGHBOR_SCAN_ORDER {
                let neighbor = world.block_at(pos.offset(dx, dy, dz));
                if !neighbor.is_air() && config.is_maskable(neighbor.material()) {
                    return neighbor;
                }
            }
        }

        Self::fallback(world, pos.y, config)
    }

    /// Disguise used when no neighbor qualifies.
    #[must_use]
    pub fn fallback<W: HostWorld + ?Sized>(world: &W, y: i32, config: &ViewConfig) -> BlockAppearance {
        if let Some(custom) = config.select_custom_mask(world, 0, y, 0) {
            return custom;
        }
        let material = match world.environment() {
            Environment::Nether => "netherrack",
            Environment::TheEnd => "end_stone",
            Environment::Normal | Environment::Custom => {
                if y < 0 {
                    "deepslate"
                } else {
                    "stone"
                }
            }
        };
        BlockAppearance::from_material(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockWorld;

    #[test]
    fn test_copies_maskable_neighbor() {
        let config = ViewConfig::from_toml_str("maskable_materials = [\"stone\", \"deepslate\"]").unwrap();
        let world = MockWorld::new("world").with_surface(64);
        let pos = BlockPos::new(0, 10, 0);
        world.set_block(pos.offset(1, 0, 0), BlockAppearance::air());
        world.set_block(pos.offset(-1, 0, 0), BlockAppearance::from_material("dirt"));
        world.set_block(pos.offset(0, 1, 0), BlockAppearance::from_material("deepslate"));

        let mask = MaskPaletteResolver::resolve_from_neighbors(&world, pos, &config);
        assert_eq!(mask.material(), "deepslate");
    }

    #[test]
    fn test_environment_fallbacks() {
        let config = ViewConfig::default();
        let air = BlockAppearance::air();

        let overworld = MockWorld::new("world").with_fill(air.clone());
        assert_eq!(MaskPaletteResolver::resolve_from_neighbors(&overworld, BlockPos::new(0, 10, 0), &config).material(), "stone");
        assert_eq!(MaskPaletteResolver::resolve_from_neighbors(&overworld, BlockPos::new(0, -1, 0), &config).material(), "deepslate");

        let nether = MockWorld::new("nether").with_fill(air.clone()).with_environment(Environment::Nether);
        assert_eq!(MaskPaletteResolver::resolve_from_neighbors(&nether, BlockPos::new(0, 10, 0), &config).material(), "netherrack");

        let end = MockWorld::new("end").with_fill(air).with_environment(Environment::TheEnd);
        assert_eq!(MaskPaletteResolver::resolve_from_neighbors(&end, BlockPos::new(0, 10, 0), &config).material(), "end_stone");
    }

    #[test]
    fn test_custom_mode_skips_neighbors() {
        let config = ViewConfig::from_toml_str("masking_mode = \"custom\"\n[custom_mask_mappings]\nworld = \"tuff\"").unwrap();
        let world = MockWorld::new("world").with_surface(64);
        let mask = MaskPaletteResolver::resolve_from_neighbors(&world, BlockPos::new(3, 3, 3), &config);
        assert_eq!(mask.material(), "tuff");

        let other = MockWorld::new("other").with_surface(64);
        let mask = MaskPaletteResolver::resolve_from_neighbors(&other, BlockPos::new(3, 3, 3), &config);
        assert_eq!(mask.material(), "stone");
    }
}
