//! # CaveCloak Core
//!
//! Primitive collections for the block tracking and visibility hot paths:
//! - Millions of tracked blocks stored without per-entry boxing
//! - Flood fills that reuse the same queue and visited set every pass
//! - No tombstones, no rehash storms on delete-heavy workloads
//!
//! ## Architecture Rules
//!
//! 1. **Primitive keys only** - keys and values are plain integers in flat arrays
//! 2. **Reserved sentinels** - `i32::MIN` / `i64::MIN` mark empty slots
//! 3. **Reuse, don't reallocate** - `clear()` keeps capacity
//!
//! ## Example
//!
//! ```rust
//! use cavecloak_core::IntIntMap;
//!
//! let mut map = IntIntMap::new();
//! map.insert(42, 7);
//! assert_eq!(map.get(42), Some(7));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collections;

pub use collections::{
    mix64, pack_block_pos, unpack_block_pos, IntIntMap, LongArrayQueue, LongHashSet,
};
