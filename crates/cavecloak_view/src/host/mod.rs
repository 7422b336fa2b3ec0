//! # Host Integration
//!
//! Seams between the pipeline and the game server.
//!
//! - `traits`: what the host implements
//! - `capability`: startup negotiation of optional client calls
//! - `mock`: in-memory host for tests and simulation

pub mod capability;
pub mod mock;
pub mod traits;

pub use capability::{BlockTransmitter, EntityVisibility};
pub use mock::{MockServer, MockWorld, Transmission};
pub use traits::{
    floor_block, ClientTransport, EntityId, EntityInfo, Environment, FluidCollision, HostCapabilities, HostServer,
    HostWorld, PlayerId, PlayerState,
};
