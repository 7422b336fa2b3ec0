//! # Capability Negotiation
//!
//! Hosts differ in which client calls they support. The service picks one
//! strategy per concern at startup and keeps it; only entity visibility
//! may degrade later, once, when the host reports the call missing.

use cavecloak_index::{BlockAppearance, BlockPos};
use tracing::{info, warn};

use super::traits::{ClientTransport, HostCapabilities, PlayerId};
use crate::error::TransmitError;

/// How block overrides reach the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTransmitter {
    /// Full block state.
    Modern,
    /// Material only, data value zero.
    Legacy,
    /// No block override call; every send fails.
    Unsupported,
}

impl BlockTransmitter {
    /// Picks the richest call the host offers.
    #[must_use]
    pub fn negotiate(capabilities: &HostCapabilities) -> Self {
        if capabilities.modern_block_change {
            Self::Modern
        } else if capabilities.legacy_block_change {
            info!("Host lacks full block-state changes, using material-only changes");
            Self::Legacy
        } else {
            warn!("Host offers no block change call, masking is disabled");
            Self::Unsupported
        }
    }

    /// Sends one override. Returns `true` when the host accepted it.
    pub fn send<T: ClientTransport + ?Sized>(
        self,
        transport: &T,
        viewer: PlayerId,
        pos: BlockPos,
        appearance: &BlockAppearance,
    ) -> bool {
        let outcome = match self {
            Self::Modern => transport.send_block_change(viewer, pos, appearance),
            Self::Legacy => transport.send_legacy_block_change(viewer, pos, appearance.material()),
            Self::Unsupported => return false,
        };
        match outcome {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to send block change at {pos} to {viewer:?}: {err}");
                false
            }
        }
    }
}

/// How entities are hidden from a viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityVisibility {
    /// Any entity can be hidden.
    PerEntity,
    /// Only players can be hidden.
    PlayerOnly,
    /// Nothing can be hidden.
    Unsupported,
}

impl EntityVisibility {
    /// Picks the most capable visibility call the host offers.
    #[must_use]
    pub fn negotiate(capabilities: &HostCapabilities) -> Self {
        if capabilities.per_entity_visibility {
            Self::PerEntity
        } else if capabilities.player_visibility {
            info!("Host lacks per-entity visibility, only players can be hidden");
            Self::PlayerOnly
        } else {
            Self::Unsupported
        }
    }

    /// Records a runtime failure of a per-entity call.
    ///
    /// Only [`TransmitError::Unsupported`] degrades; a rejected call leaves
    /// the strategy alone.
    pub fn observe_failure(&mut self, err: TransmitError) {
        if *self == Self::PerEntity && err == TransmitError::Unsupported {
            warn!("Per-entity visibility failed at runtime, falling back to player-only");
            *self = Self::PlayerOnly;
        }
    }

    /// Whether per-entity calls should be attempted.
    #[inline]
    #[must_use]
    pub const fn per_entity(self) -> bool {
        matches!(self, Self::PerEntity)
    }

    /// Whether whole-player calls are available.
    #[inline]
    #[must_use]
    pub const fn players(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}
