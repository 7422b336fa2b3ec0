//! # Block Appearance
//!
//! A parsed block-state descriptor: `namespace:material[key=value,...]`.
//!
//! ## Canonical Form
//!
//! - Namespace defaults to `minecraft`
//! - Namespace, material and properties are lowercased
//! - Properties are sorted by key
//!
//! Two appearances are equal iff their canonical strings are equal, so a
//! descriptor read from disk compares equal to the same state read live.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{IndexError, IndexResult};

/// Namespace assumed when a descriptor omits one.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Materials that are plain air.
const AIR_MATERIALS: [&str; 3] = ["air", "cave_air", "void_air"];

/// Non-solid materials treated as open space.
const AIR_LIKE_EXTRA: [&str; 2] = ["light", "structure_void"];

/// Fluids the interior flood fill may walk through.
const INTERIOR_FLUIDS: [&str; 2] = ["water", "bubble_column"];

/// Immutable block-state descriptor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlockAppearance {
    descriptor: Arc<str>,
    material_start: usize,
    material_end: usize,
}

impl BlockAppearance {
    /// Parses and canonicalizes a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidDescriptor`] for empty names, illegal
    /// characters, unterminated or malformed property lists.
    pub fn parse(input: &str) -> IndexResult<Self> {
        let trimmed = input.trim();
        let invalid = |reason| IndexError::InvalidDescriptor {
            descriptor: input.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("empty descriptor"));
        }

        let (head, properties) = match trimmed.find('[') {
            Some(open) => {
                let tail = &trimmed[open + 1..];
                let inner = tail
                    .strip_suffix(']')
                    .ok_or_else(|| invalid("unterminated property list"))?;
                (&trimmed[..open], Some(inner))
            }
            None => (trimmed, None),
        };

        let (namespace, material) = match head.split_once(':') {
            Some((ns, name)) => (ns, name),
            None => (DEFAULT_NAMESPACE, head),
        };
        let namespace = namespace.to_ascii_lowercase();
        let material = material.to_ascii_lowercase();
        if !is_identifier(&namespace) {
            return Err(invalid("invalid namespace"));
        }
        if !is_identifier(&material) {
            return Err(invalid("invalid material name"));
        }

        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(inner) = properties {
            if !inner.trim().is_empty() {
                for entry in inner.split(',') {
                    let (key, value) = entry
                        .split_once('=')
                        .ok_or_else(|| invalid("property without '='"))?;
                    let key = key.trim().to_ascii_lowercase();
                    let value = value.trim().to_ascii_lowercase();
                    if !is_identifier(&key) || !is_identifier(&value) {
                        return Err(invalid("invalid property"));
                    }
                    if pairs.iter().any(|(existing, _)| *existing == key) {
                        return Err(invalid("duplicate property"));
                    }
                    pairs.push((key, value));
                }
            }
        }
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut descriptor = String::with_capacity(trimmed.len() + DEFAULT_NAMESPACE.len() + 1);
        descriptor.push_str(&namespace);
        descriptor.push(':');
        let material_start = descriptor.len();
        descriptor.push_str(&material);
        let material_end = descriptor.len();
        if !pairs.is_empty() {
            descriptor.push('[');
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    descriptor.push(',');
                }
                descriptor.push_str(key);
                descriptor.push('=');
                descriptor.push_str(value);
            }
            descriptor.push(']');
        }

        Ok(Self {
            descriptor: Arc::from(descriptor),
            material_start,
            material_end,
        })
    }

    /// Appearance of a property-less block in the default namespace.
    ///
    /// The name is lowercased but not otherwise validated; use it for
    /// known material constants.
    #[must_use]
    pub fn from_material(material: &str) -> Self {
        let material = material.to_ascii_lowercase();
        let descriptor = format!("{DEFAULT_NAMESPACE}:{material}");
        Self {
            material_start: DEFAULT_NAMESPACE.len() + 1,
            material_end: descriptor.len(),
            descriptor: Arc::from(descriptor),
        }
    }

    /// Plain air.
    #[must_use]
    pub fn air() -> Self {
        Self::from_material("air")
    }

    /// Canonical descriptor string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.descriptor
    }

    /// Material name without namespace or properties.
    #[inline]
    #[must_use]
    pub fn material(&self) -> &str {
        &self.descriptor[self.material_start..self.material_end]
    }

    /// Namespace part of the descriptor.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.descriptor[..self.material_start - 1]
    }

    /// True when the descriptor carries block-state properties.
    #[must_use]
    pub fn has_properties(&self) -> bool {
        self.material_end < self.descriptor.len()
    }

    /// Air, cave air or void air.
    #[must_use]
    pub fn is_air(&self) -> bool {
        AIR_MATERIALS.contains(&self.material())
    }

    /// Any air plus light and structure void.
    #[must_use]
    pub fn is_air_like(&self) -> bool {
        let material = self.material();
        AIR_MATERIALS.contains(&material) || AIR_LIKE_EXTRA.contains(&material)
    }

    /// Cells a player inside a cavity can move or see through.
    #[must_use]
    pub fn is_interior_traversable(&self) -> bool {
        self.is_air_like() || INTERIOR_FLUIDS.contains(&self.material())
    }

    /// True for liquids (water, lava, bubble columns).
    #[must_use]
    pub fn is_fluid(&self) -> bool {
        matches!(self.material(), "water" | "lava" | "bubble_column")
    }

    /// True for bedrock.
    #[must_use]
    pub fn is_bedrock(&self) -> bool {
        self.material() == "bedrock"
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'/'))
}

impl FromStr for BlockAppearance {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BlockAppearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

impl fmt::Debug for BlockAppearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAppearance({})", self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalizes() {
        let a = BlockAppearance::parse("Minecraft:Oak_Stairs[half=bottom,facing=east]").unwrap();
        let b = BlockAppearance::parse("oak_stairs[facing=east, half=bottom]").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "minecraft:oak_stairs[facing=east,half=bottom]");
        assert_eq!(a.material(), "oak_stairs");
        assert_eq!(a.namespace(), "minecraft");
        assert!(a.has_properties());
    }

    #[test]
    fn test_from_material_matches_parse() {
        assert_eq!(BlockAppearance::from_material("STONE"), BlockAppearance::parse("stone").unwrap());
        assert!(!BlockAppearance::from_material("stone").has_properties());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "   ", "stone[", "stone[facing]", "bad name", ":stone", "stone[a=1,a=2]"] {
            assert!(BlockAppearance::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_classification() {
        let cave_air = BlockAppearance::from_material("cave_air");
        let light = BlockAppearance::parse("light[level=15]").unwrap();
        let water = BlockAppearance::parse("water[level=0]").unwrap();
        let stone = BlockAppearance::from_material("stone");

        assert!(cave_air.is_air() && cave_air.is_air_like() && cave_air.is_interior_traversable());
        assert!(!light.is_air() && light.is_air_like());
        assert!(!water.is_air_like() && water.is_interior_traversable() && water.is_fluid());
        assert!(!stone.is_air_like() && !stone.is_interior_traversable());
        assert!(BlockAppearance::from_material("bedrock").is_bedrock());
    }
}
