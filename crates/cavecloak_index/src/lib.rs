//! # CaveCloak Index
//!
//! World-scale store of tracked ("sensitive") blocks: the positions players
//! excavated, each with the appearance it had before.
//!
//! ## Design Principles
//!
//! 1. **Chunked**: blocks are grouped per 16x16 chunk column, so a view pass
//!    reads only the chunks around a player
//! 2. **Palette-compressed**: a block costs one `i32 -> i32` map slot
//! 3. **Concurrent**: one `RwLock`; worker threads query while the driver
//!    thread tracks
//! 4. **Durable**: versioned binary store, legacy text store migrated on
//!    first load
//!
//! ## Core Components
//!
//! - `SpatialBlockIndex`: track/untrack/range query/persistence
//! - `ChunkBlockStore`: local index -> palette id
//! - `AppearancePalette`: appearance <-> id
//! - `BlockAppearance`: parsed block-state descriptor
//!
//! ## Example
//!
//! ```rust
//! use cavecloak_index::{BlockAppearance, BlockKey, SpatialBlockIndex, WorldName};
//!
//! let index = SpatialBlockIndex::in_memory();
//! let world = WorldName::new("world");
//! index.track(&BlockKey::at(&world, 5, 12, 5), &BlockAppearance::from_material("stone"));
//!
//! assert_eq!(index.range_query(&world, 0, 0, 1).len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod appearance;
pub mod chunk_store;
pub mod error;
pub mod index;
pub mod key;
pub mod palette;
pub mod persistence;

pub use appearance::BlockAppearance;
pub use chunk_store::ChunkBlockStore;
pub use error::{IndexError, IndexResult};
pub use index::{
    is_trackable_y, SpatialBlockIndex, StorageLocation, TrackedBlock, BINARY_FILE_NAME, LEGACY_FILE_NAME, MAX_TRACKED_Y,
    MIN_TRACKED_Y,
};
pub use key::{BlockKey, BlockPos, ChunkKey, WorldName, CHUNK_SIZE};
pub use palette::AppearancePalette;
pub use persistence::{LoadReport, LoadSource, STORE_MAGIC, STORE_VERSION};
