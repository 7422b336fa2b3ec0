//! # View Configuration
//!
//! Loaded once at startup from TOML. Every key is optional; missing keys
//! take the defaults below and out-of-range values are clamped, so a
//! partial file never fails to load.
//!
//! ## Example
//!
//! ```toml
//! max_reveal_distance = 24.0
//! reveal_fov_angle_degrees = 90.0
//! masking_mode = "custom"
//! excluded_worlds = ["lobby"]
//!
//! [custom_mask_mappings]
//! default = "stone"
//! world_nether = ["netherrack", "blackstone"]
//!
//! [custom_mask_mappings.world]
//! stone = 3
//! andesite = 1
//! ```
//!
//! ## Custom Masks
//!
//! A mapping value is a single descriptor, a list (weight 1 each) or a
//! table of descriptor -> weight. The disguise for a coordinate is a
//! weighted pick driven by [`custom_mask_hash`], so the same block always
//! gets the same disguise.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use cavecloak_core::mix64;
use cavecloak_index::BlockAppearance;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ViewError, ViewResult};
use crate::host::HostWorld;

/// Which disguise strategy masked blocks use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskingMode {
    /// Copy a maskable neighbor, else the dimension default.
    #[default]
    Neighbor,
    /// Weighted per-world palette.
    Custom,
}

// ============================================================================
// RAW FILE FORMAT
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawViewConfig {
    check_interval_ticks: i64,
    max_reveal_distance: f64,
    min_reveal_distance: f64,
    reveal_fov_angle_degrees: f64,
    chunk_radius: i64,
    max_blocks_per_player: i64,
    interaction_reveal_radius: f64,
    interaction_reveal_duration_ticks: i64,
    interior_reveal_radius: f64,
    mask_activation_radius: f64,
    masking_mode: MaskingMode,
    entity_masking: bool,
    excluded_worlds: Vec<String>,
    maskable_materials: Vec<String>,
    maskable_entities: Vec<String>,
    custom_mask_mappings: toml::Table,
}

impl Default for RawViewConfig {
    fn default() -> Self {
        Self {
            check_interval_ticks: 10,
            max_reveal_distance: 32.0,
            min_reveal_distance: 1.8,
            reveal_fov_angle_degrees: 80.0,
            chunk_radius: 3,
            max_blocks_per_player: 1024,
            interaction_reveal_radius: 6.0,
            interaction_reveal_duration_ticks: 200,
            interior_reveal_radius: 8.0,
            mask_activation_radius: 16.0,
            masking_mode: MaskingMode::Neighbor,
            entity_masking: true,
            excluded_worlds: Vec::new(),
            maskable_materials: Vec::new(),
            maskable_entities: Vec::new(),
            custom_mask_mappings: toml::Table::new(),
        }
    }
}

const DEFAULT_MASKABLE_MATERIALS: &[&str] = &["stone"];

const DEFAULT_MASKABLE_ENTITIES: &[&str] = &[
    "armor_stand",
    "item_frame",
    "glow_item_frame",
    "painting",
    "chest_minecart",
    "hopper_minecart",
];

// ============================================================================
// WEIGHTED MASK
// ============================================================================

/// Weighted disguise table for one world.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedMask {
    entries: Vec<BlockAppearance>,
    cumulative: Vec<u32>,
    total: u32,
}

impl WeightedMask {
    /// Builds a table from `(appearance, weight)` pairs. Duplicate
    /// appearances add up; non-positive weights are dropped. Returns `None`
    /// when nothing usable remains.
    #[must_use]
    pub fn from_weights(weights: &[(BlockAppearance, u32)]) -> Option<Self> {
        let mut merged: Vec<(BlockAppearance, u32)> = Vec::with_capacity(weights.len());
        for (appearance, weight) in weights {
            if *weight == 0 {
                continue;
            }
            match merged.iter_mut().find(|(existing, _)| existing == appearance) {
                Some((_, total)) => *total = total.saturating_add(*weight),
                None => merged.push((appearance.clone(), *weight)),
            }
        }
        if merged.is_empty() {
            return None;
        }

        let mut entries = Vec::with_capacity(merged.len());
        let mut cumulative = Vec::with_capacity(merged.len());
        let mut total = 0u32;
        for (appearance, weight) in merged {
            total = total.saturating_add(weight);
            entries.push(appearance);
            cumulative.push(total);
        }
        Some(Self { entries, cumulative, total })
    }

    /// Picks the entry for a hash value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn select(&self, hash: u64) -> &BlockAppearance {
        let value = (hash as i64).rem_euclid(i64::from(self.total)) as u32;
        let slot = self.cumulative.iter().position(|&bound| value < bound).unwrap_or(self.entries.len() - 1);
        &self.entries[slot]
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; empty tables are never built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    #[must_use]
    pub const fn total_weight(&self) -> u32 {
        self.total
    }
}

/// Coordinate hash driving the custom disguise pick.
///
/// Worlds without a seed (seed 0) are keyed by a hash of their name
/// instead, so two seedless worlds still disguise differently.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn custom_mask_hash(world_seed: i64, world_name: &str, x: i32, y: i32, z: i32) -> u64 {
    let seed_source = if world_seed == 0 { hash_world_name(world_name) } else { world_seed as u64 };
    let seed = 0x9E37_79B9_7F4A_7C15u64 ^ mix64(seed_source);
    let combined = seed
        ^ (i64::from(x) as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ (i64::from(y) as u64).wrapping_mul(0x1656_67B1_9E37_79F9)
        ^ (i64::from(z) as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    mix64(combined)
}

fn hash_world_name(name: &str) -> u64 {
    let mut hash: u64 = 1_125_899_906_842_597;
    for unit in name.encode_utf16() {
        hash ^= u64::from(unit);
        hash = hash.wrapping_mul(1_315_423_911);
    }
    mix64(hash)
}

// ============================================================================
// VIEW CONFIG
// ============================================================================

/// Sanitized configuration shared by every part of the pipeline.
#[derive(Clone, Debug)]
pub struct ViewConfig {
    /// Server ticks between view service ticks (>= 1).
    pub check_interval_ticks: u32,
    /// Farthest distance at which a block can be revealed by sight.
    pub max_reveal_distance: f64,
    /// Blocks closer than this are always revealed.
    pub min_reveal_distance: f64,
    /// Full field-of-view angle in degrees (10..=180).
    pub reveal_fov_angle_degrees: f64,
    /// Chunk radius of each range query (>= 1).
    pub chunk_radius: i32,
    /// Blocks handled per pass before only priority blocks continue.
    pub max_blocks_per_player: usize,
    /// Players within this distance of an excavation see it revealed.
    pub interaction_reveal_radius: f64,
    /// How long an excavation stays revealed, in service ticks.
    pub interaction_reveal_duration_ticks: u64,
    /// Flood-fill radius around the player's feet.
    pub interior_reveal_radius: f64,
    /// Tracked blocks farther than this are ignored.
    pub mask_activation_radius: f64,
    /// Disguise strategy.
    pub masking_mode: MaskingMode,
    /// Hide maskable entities as well as blocks.
    pub entity_masking: bool,
    excluded_worlds: HashSet<String>,
    maskable_materials: HashSet<String>,
    maskable_entities: HashSet<String>,
    default_mask: Option<WeightedMask>,
    world_masks: HashMap<String, WeightedMask>,
    fov_half_angle_cos: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self::from_raw(RawViewConfig::default())
    }
}

impl ViewConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ViewError::Parse`] when the document is not valid TOML or a key has
    /// the wrong type; [`ViewError::InvalidConfig`] for non-finite numbers.
    pub fn from_toml_str(text: &str) -> ViewResult<Self> {
        let raw: RawViewConfig = toml::from_str(text)?;
        for (key, value) in [
            ("max_reveal_distance", raw.max_reveal_distance),
            ("min_reveal_distance", raw.min_reveal_distance),
            ("reveal_fov_angle_degrees", raw.reveal_fov_angle_degrees),
            ("interaction_reveal_radius", raw.interaction_reveal_radius),
            ("interior_reveal_radius", raw.interior_reveal_radius),
            ("mask_activation_radius", raw.mask_activation_radius),
        ] {
            if !value.is_finite() {
                return Err(ViewError::InvalidConfig { key, reason: format!("{value} is not a finite number") });
            }
        }
        Ok(Self::from_raw(raw))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`ViewError::Io`] when the file cannot be read, otherwise as
    /// [`ViewConfig::from_toml_str`].
    pub fn load(path: &Path) -> ViewResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_raw(raw: RawViewConfig) -> Self {
        let fov = raw.reveal_fov_angle_degrees.clamp(10.0, 180.0);
        let mut config = Self {
            check_interval_ticks: raw.check_interval_ticks.clamp(1, i64::from(u32::MAX)) as u32,
            max_reveal_distance: raw.max_reveal_distance.max(1.0),
            min_reveal_distance: raw.min_reveal_distance.max(0.0),
            reveal_fov_angle_degrees: fov,
            chunk_radius: raw.chunk_radius.clamp(1, 64) as i32,
            max_blocks_per_player: raw.max_blocks_per_player.max(1) as usize,
            interaction_reveal_radius: raw.interaction_reveal_radius.max(0.0),
            interaction_reveal_duration_ticks: raw.interaction_reveal_duration_ticks.max(0) as u64,
            interior_reveal_radius: raw.interior_reveal_radius.max(0.0),
            mask_activation_radius: raw.mask_activation_radius.max(1.0),
            masking_mode: raw.masking_mode,
            entity_masking: raw.entity_masking,
            excluded_worlds: raw.excluded_worlds.iter().map(|w| w.to_lowercase()).collect(),
            maskable_materials: load_materials(&raw.maskable_materials),
            maskable_entities: load_entities(&raw.maskable_entities),
            default_mask: None,
            world_masks: HashMap::new(),
            fov_half_angle_cos: (fov / 2.0).to_radians().cos(),
        };

        for (world, value) in &raw.custom_mask_mappings {
            let context = format!("custom_mask_mappings.{world}");
            let Some(mask) = parse_weighted_mask(value, &context) else {
                continue;
            };
            if world.eq_ignore_ascii_case("default") {
                config.default_mask = Some(mask);
            } else {
                config.world_masks.insert(world.to_lowercase(), mask);
            }
        }
        config
    }

    /// Cosine of half the field-of-view angle.
    #[inline]
    #[must_use]
    pub const fn fov_half_angle_cos(&self) -> f64 {
        self.fov_half_angle_cos
    }

    /// Case-insensitive exclusion test.
    #[must_use]
    pub fn is_world_excluded(&self, world: &str) -> bool {
        !self.excluded_worlds.is_empty() && self.excluded_worlds.contains(&world.to_lowercase())
    }

    /// Whether a material can serve as (or be hidden behind) a disguise.
    #[must_use]
    pub fn is_maskable(&self, material: &str) -> bool {
        self.maskable_materials.contains(material)
    }

    /// Whether an entity type is hidden by entity masking.
    #[must_use]
    pub fn is_maskable_entity(&self, kind: &str) -> bool {
        self.maskable_entities.contains(kind)
    }

    /// True when custom palettes are in effect.
    #[inline]
    #[must_use]
    pub fn is_custom_masking(&self) -> bool {
        self.masking_mode == MaskingMode::Custom
    }

    /// Palette for a world, falling back to the `default` entry.
    #[must_use]
    pub fn custom_mask_palette(&self, world: &str) -> Option<&WeightedMask> {
        self.world_masks.get(&world.to_lowercase()).or(self.default_mask.as_ref())
    }

    /// Whether a block of this appearance in this world should be tracked
    /// when it is excavated.
    #[must_use]
    pub fn should_track(&self, world: &str, appearance: &BlockAppearance) -> bool {
        if self.is_world_excluded(world) {
            return false;
        }
        if self.is_custom_masking() {
            if appearance.is_air() || appearance.is_bedrock() {
                return false;
            }
            return self.custom_mask_palette(world).is_some();
        }
        self.is_maskable(appearance.material())
    }

    /// Custom disguise for a coordinate, or `None` outside custom mode or
    /// without a palette for the world.
    #[must_use]
    pub fn select_custom_mask<W: HostWorld + ?Sized>(&self, world: &W, x: i32, y: i32, z: i32) -> Option<BlockAppearance> {
        if !self.is_custom_masking() {
            return None;
        }
        let name = world.name().as_str();
        let palette = self.custom_mask_palette(name)?;
        Some(palette.select(custom_mask_hash(world.seed(), name, x, y, z)).clone())
    }
}

fn load_materials(raw: &[String]) -> HashSet<String> {
    let mut result = HashSet::new();
    let source: Vec<&str> = if raw.is_empty() {
        DEFAULT_MASKABLE_MATERIALS.to_vec()
    } else {
        raw.iter().map(String::as_str).collect()
    };
    for entry in source {
        match BlockAppearance::parse(entry) {
            Ok(appearance) => {
                result.insert(appearance.material().to_string());
            }
            Err(err) => warn!("Unknown maskable material in config: {entry} ({err})"),
        }
    }
    result
}

fn load_entities(raw: &[String]) -> HashSet<String> {
    if raw.is_empty() {
        return DEFAULT_MASKABLE_ENTITIES.iter().map(ToString::to_string).collect();
    }
    let mut result = HashSet::new();
    for entry in raw {
        let kind = entry.trim().to_lowercase();
        if kind.is_empty() || !kind.bytes().all(|b| b.is_ascii_lowercase() || b == b'_') {
            warn!("Unknown maskable entity in config: {entry}");
            continue;
        }
        result.insert(kind);
    }
    result
}

fn parse_mask_block(raw: &str, context: &str) -> Option<BlockAppearance> {
    match BlockAppearance::parse(raw) {
        Ok(appearance) if appearance.is_air() => Some(BlockAppearance::air()),
        Ok(appearance) => Some(appearance),
        Err(err) => {
            warn!("Invalid block data in config ({context}): {raw} ({err})");
            None
        }
    }
}

fn extract_weight(value: &toml::Value) -> Option<u32> {
    let weight = match value {
        toml::Value::Integer(n) => *n,
        toml::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u32::try_from(weight).ok().filter(|w| *w > 0)
}

fn parse_weighted_mask(value: &toml::Value, context: &str) -> Option<WeightedMask> {
    let mut weights = Vec::new();
    match value {
        toml::Value::String(raw) => {
            if let Some(block) = parse_mask_block(raw, context) {
                weights.push((block, 1));
            }
        }
        toml::Value::Array(list) => {
            for entry in list {
                let raw = match entry {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if let Some(block) = parse_mask_block(&raw, context) {
                    weights.push((block, 1));
                }
            }
        }
        toml::Value::Table(table) => {
            for (descriptor, raw_weight) in table {
                let Some(weight) = extract_weight(raw_weight) else {
                    warn!("Invalid weight for {context}.{descriptor}: {raw_weight}");
                    continue;
                };
                if let Some(block) = parse_mask_block(descriptor, &format!("{context}.{descriptor}")) {
                    weights.push((block, weight));
                }
            }
        }
        other => warn!("Unsupported custom mask entry at {context}: {other}"),
    }
    let mask = WeightedMask::from_weights(&weights);
    if mask.is_none() {
        warn!("No valid block data entries for {context}");
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockWorld;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.check_interval_ticks, 10);
        assert_eq!(config.chunk_radius, 3);
        assert_eq!(config.max_blocks_per_player, 1024);
        assert!(config.is_maskable("stone"));
        assert!(!config.is_maskable("dirt"));
        assert!(config.is_maskable_entity("armor_stand"));
        assert!((config.fov_half_angle_cos() - 40f64.to_radians().cos()).abs() < 1e-12);
    }

    #[test]
    fn test_values_are_clamped() {
        let config = ViewConfig::from_toml_str(
            "reveal_fov_angle_degrees = 400.0\nmax_reveal_distance = -3.0\nchunk_radius = 0\ncheck_interval_ticks = -5",
        )
        .unwrap();
        assert_eq!(config.reveal_fov_angle_degrees, 180.0);
        assert_eq!(config.max_reveal_distance, 1.0);
        assert_eq!(config.chunk_radius, 1);
        assert_eq!(config.check_interval_ticks, 1);
    }

    #[test]
    fn test_wrong_type_is_a_parse_error() {
        let err = ViewConfig::from_toml_str("chunk_radius = \"three\"").unwrap_err();
        assert!(matches!(err, ViewError::Parse(_)));
    }

    #[test]
    fn test_nan_is_rejected() {
        let err = ViewConfig::from_toml_str("max_reveal_distance = nan").unwrap_err();
        assert!(matches!(err, ViewError::InvalidConfig { key: "max_reveal_distance", .. }));
    }

    #[test]
    fn test_excluded_worlds_ignore_case() {
        let config = ViewConfig::from_toml_str("excluded_worlds = [\"Lobby\"]").unwrap();
        assert!(config.is_world_excluded("lobby"));
        assert!(config.is_world_excluded("LOBBY"));
        assert!(!config.is_world_excluded("world"));
    }

    #[test]
    fn test_invalid_materials_are_skipped() {
        let config = ViewConfig::from_toml_str("maskable_materials = [\"Deepslate\", \"not valid!\"]").unwrap();
        assert!(config.is_maskable("deepslate"));
        assert!(!config.is_maskable("stone"));
    }

    #[test]
    fn test_custom_mappings_all_shapes() {
        let config = ViewConfig::from_toml_str(
            r#"
masking_mode = "custom"

[custom_mask_mappings]
default = "stone"
world_nether = ["netherrack", "blackstone", "netherrack"]
broken = 7

[custom_mask_mappings.world]
stone = 3
andesite = "1"
granite = 0
"#,
        )
        .unwrap();

        assert!(config.is_custom_masking());
        let overworld = config.custom_mask_palette("World").unwrap();
        assert_eq!(overworld.len(), 2);
        assert_eq!(overworld.total_weight(), 4);

        let nether = config.custom_mask_palette("world_nether").unwrap();
        assert_eq!(nether.len(), 2);
        assert_eq!(nether.total_weight(), 3);

        let fallback = config.custom_mask_palette("mining").unwrap();
        assert_eq!(fallback.len(), 1);
        assert!(config.custom_mask_palette("broken").unwrap().len() == 1);
    }

    #[test]
    fn test_should_track_by_mode() {
        let neighbor = ViewConfig::default();
        assert!(neighbor.should_track("world", &BlockAppearance::from_material("stone")));
        assert!(!neighbor.should_track("world", &BlockAppearance::from_material("dirt")));

        let custom = ViewConfig::from_toml_str("masking_mode = \"custom\"\n[custom_mask_mappings]\nworld = \"stone\"")
            .unwrap();
        assert!(custom.should_track("world", &BlockAppearance::from_material("dirt")));
        assert!(!custom.should_track("world", &BlockAppearance::from_material("bedrock")));
        assert!(!custom.should_track("other", &BlockAppearance::from_material("dirt")));

        let excluded = ViewConfig::from_toml_str("excluded_worlds = [\"world\"]").unwrap();
        assert!(!excluded.should_track("world", &BlockAppearance::from_material("stone")));
    }

    #[test]
    fn test_custom_mask_is_deterministic() {
        let config = ViewConfig::from_toml_str(
            "masking_mode = \"custom\"\n[custom_mask_mappings.default]\nstone = 1\nandesite = 1\ngranite = 1\ndiorite = 1",
        )
        .unwrap();
        let world = MockWorld::new("world").with_seed(42);

        let first = config.select_custom_mask(&world, 10, -20, 30).unwrap();
        for _ in 0..5 {
            assert_eq!(config.select_custom_mask(&world, 10, -20, 30).unwrap(), first);
        }

        let mut seen = HashSet::new();
        for x in 0..64 {
            seen.insert(config.select_custom_mask(&world, x, 0, 0).unwrap());
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_seedless_worlds_hash_by_name() {
        assert_ne!(custom_mask_hash(0, "alpha", 1, 2, 3), custom_mask_hash(0, "beta", 1, 2, 3));
        assert_eq!(custom_mask_hash(0, "alpha", 1, 2, 3), custom_mask_hash(0, "alpha", 1, 2, 3));
        assert_ne!(custom_mask_hash(7, "alpha", 1, 2, 3), custom_mask_hash(0, "alpha", 1, 2, 3));
    }

    #[test]
    fn test_weighted_select_respects_bounds() {
        let mask = WeightedMask::from_weights(&[
            (BlockAppearance::from_material("stone"), 1),
            (BlockAppearance::from_material("andesite"), 3),
        ])
        .unwrap();
        assert_eq!(mask.select(0).material(), "stone");
        assert_eq!(mask.select(1).material(), "andesite");
        assert_eq!(mask.select(3).material(), "andesite");
        assert_eq!(mask.select(4).material(), "stone");
        assert!(WeightedMask::from_weights(&[(BlockAppearance::from_material("stone"), 0)]).is_none());
    }
}
