//! # Primitive Collections
//!
//! Integer-keyed containers that store plain values in flat arrays.

mod int_map;
mod long_queue;
mod long_set;

pub use int_map::{IntIntMap, EMPTY_KEY};
pub use long_queue::LongArrayQueue;
pub use long_set::{mix64, LongHashSet};

const PACKED_XZ_MASK: i64 = 0x3FF_FFFF;
const PACKED_Y_MASK: i64 = 0xFFF;

/// Packs a block position into one `i64`.
///
/// Layout: 26 bits x, 26 bits z, 12 bits y, all two's complement.
#[inline]
#[must_use]
pub const fn pack_block_pos(x: i32, y: i32, z: i32) -> i64 {
    ((x as i64 & PACKED_XZ_MASK) << 38) | ((z as i64 & PACKED_XZ_MASK) << 12) | (y as i64 & PACKED_Y_MASK)
}

/// Reverses [`pack_block_pos`], sign-extending each field.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn unpack_block_pos(packed: i64) -> (i32, i32, i32) {
    let x = (packed >> 38) as i32;
    let z = ((packed << 26) >> 38) as i32;
    let y = ((packed << 52) >> 52) as i32;
    (x, y, z)
}
