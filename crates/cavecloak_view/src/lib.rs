//! # CaveCloak View
//!
//! Per-player masking of excavated blocks. Every viewer sees the real
//! block only when it is plausibly visible to them; everywhere else the
//! client is told the block is solid rock.
//!
//! ## Architecture
//!
//! ```text
//!  HOST MAIN THREAD                         WORKER POOL
//!  ────────────────                         ───────────
//!  on_server_tick
//!    └─ tick ─┬─ schedule(snapshot) ──────▶ range query over the index
//!             │                             sort by eye distance
//!             └─ drain ◀─── bounded queue ◀─ publish result
//!                  │
//!                  ▼
//!            processor: FOV + LOS decisions, neighbor layers,
//!            interior flood fill, mask propagation, diff, send
//! ```
//!
//! Workers only read the tracking store; every world read and every client
//! write happens on the driver thread.
//!
//! ## Host Integration
//!
//! The host implements [`host::HostServer`] and [`host::HostWorld`], calls
//! [`PlayerViewService::on_server_tick`] once per game tick and forwards
//! block events through [`PlayerViewService::activity`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod activity;
pub mod config;
pub mod coordinator;
pub mod entity_mask;
pub mod error;
pub mod host;
pub mod interaction;
pub mod interior;
pub mod mask_palette;
pub mod neighbor;
pub mod output;
pub mod pending;
pub mod processor;
pub mod propagate;
pub mod result_queue;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod tick;
pub mod visibility;

pub use activity::BlockActivityHandler;
pub use config::{MaskingMode, ViewConfig, WeightedMask};
pub use coordinator::{SessionShared, ViewComputationCoordinator};
pub use error::{TransmitError, ViewError, ViewResult};
pub use interaction::InteractionRevealTracker;
pub use mask_palette::MaskPaletteResolver;
pub use pending::PendingChunkTracker;
pub use processor::{PassSummary, PlayerViewProcessor};
pub use result_queue::{CompletedResultQueue, ViewComputationResult};
pub use service::PlayerViewService;
pub use session::{DisplayState, PlayerViewSession};
pub use snapshot::PlayerSnapshot;
pub use tick::{ServerTickClock, SERVER_TICKS_PER_SECOND};
pub use visibility::VisibilityEvaluator;
