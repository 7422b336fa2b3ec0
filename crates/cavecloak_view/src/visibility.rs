//! # Visibility Tests
//!
//! Cone and ray checks shared by every reveal path.
//!
//! ```text
//!            view_dir
//!               ▲
//!        \      │      /
//!         \  θ  │  θ  /      within_fov:  dot(view_dir, d̂) >= cos θ
//!          \    │    /
//!           \   │   /
//!              eye
//! ```

use cavecloak_index::BlockPos;
use cgmath::{InnerSpace, Point3, Vector3};

use crate::config::ViewConfig;
use crate::host::{FluidCollision, HostWorld};

/// Below this squared length a delta counts as zero.
pub const EPSILON: f64 = 1.0e-6;

/// Center of a block as a point.
#[inline]
#[must_use]
pub fn block_center(pos: BlockPos) -> Point3<f64> {
    Point3::from(pos.center())
}

/// Whether `delta` lies inside the view cone of `view_dir`.
///
/// A zero-length delta is always inside.
#[inline]
#[must_use]
pub fn within_fov(view_dir: Vector3<f64>, delta: Vector3<f64>, length_squared: f64, min_dot: f64) -> bool {
    if length_squared < EPSILON {
        return true;
    }
    view_dir.dot(delta) / length_squared.sqrt() >= min_dot
}

/// Whether the first solid block on the ray from `eye` towards `target`
/// is `target` itself (or nothing at all). Fluids never block.
#[must_use]
pub fn has_line_of_sight<W: HostWorld + ?Sized>(world: &W, eye: Point3<f64>, target: BlockPos, delta: Vector3<f64>) -> bool {
    let length_squared = delta.magnitude2();
    if length_squared < EPSILON {
        return true;
    }
    let distance = length_squared.sqrt();
    match world.ray_trace_blocks(eye, delta / distance, distance, FluidCollision::Never) {
        None => true,
        Some(hit) => hit == target,
    }
}

// ============================================================================
// REVEAL DECISION
// ============================================================================

/// Why a block was revealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealReason {
    /// A recent excavation nearby.
    Interaction,
    /// The viewer already sees the real block.
    AlreadyRevealed,
    /// Closer than the minimum reveal distance.
    PointBlank,
    /// In range, in the view cone and unobstructed.
    InSight,
}

/// Outcome of [`VisibilityEvaluator::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Send the real block.
    Reveal(RevealReason),
    /// Send a disguise.
    Mask,
}

/// Per-candidate reveal decision with precomputed thresholds.
#[derive(Clone, Copy, Debug)]
pub struct VisibilityEvaluator {
    min_reveal_squared: f64,
    max_reveal_squared: f64,
    fov_cos: f64,
}

impl VisibilityEvaluator {
    /// Thresholds from the configuration.
    #[must_use]
    pub fn from_config(config: &ViewConfig) -> Self {
        Self {
            min_reveal_squared: config.min_reveal_distance * config.min_reveal_distance,
            max_reveal_squared: config.max_reveal_distance * config.max_reveal_distance,
            fov_cos: config.fov_half_angle_cos(),
        }
    }

    /// Squared maximum reveal distance.
    #[inline]
    #[must_use]
    pub const fn max_reveal_squared(&self) -> f64 {
        self.max_reveal_squared
    }

    /// Configured cone cosine.
    #[inline]
    #[must_use]
    pub const fn fov_cos(&self) -> f64 {
        self.fov_cos
    }

    /// Decides what the viewer at `eye` should see at `target`.
    ///
    /// Order: interaction, already revealed, point blank, then distance,
    /// cone and ray. The ray query only runs when everything cheaper passed.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn decide<W: HostWorld + ?Sized>(
        &self,
        world: &W,
        eye: Point3<f64>,
        view_dir: Vector3<f64>,
        target: BlockPos,
        distance_squared: f64,
        interaction_active: bool,
        already_revealed: bool,
    ) -> Verdict {
        if interaction_active {
            return Verdict::Reveal(RevealReason::Interaction);
        }
        if already_revealed {
            return Verdict::Reveal(RevealReason::AlreadyRevealed);
        }
        if distance_squared <= self.min_reveal_squared {
            return Verdict::Reveal(RevealReason::PointBlank);
        }
        if distance_squared <= self.max_reveal_squared {
            let delta = block_center(target) - eye;
            if within_fov(view_dir, delta, distance_squared, self.fov_cos)
                && has_line_of_sight(world, eye, target, delta)
            {
                return Verdict::Reveal(RevealReason::InSight);
            }
        }
        Verdict::Mask
    }
}
