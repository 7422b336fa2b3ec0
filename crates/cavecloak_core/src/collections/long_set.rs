//! # Long Hash Set
//!
//! Insert-only open-addressing set of `i64`, cleared and reused between
//! flood-fill passes.

/// Reserved value marking an empty slot.
const EMPTY: i64 = i64::MIN;

/// Fraction of slots that may be occupied before the table doubles.
const LOAD_FACTOR: f64 = 0.7;

/// Default table size.
const DEFAULT_CAPACITY: usize = 32;

/// Murmur3 64-bit finalizer.
#[inline]
#[must_use]
pub const fn mix64(mut value: u64) -> u64 {
    value ^= value >> 33;
    value = value.wrapping_mul(0xff51_afd7_ed55_8ccd);
    value ^= value >> 33;
    value = value.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    value ^= value >> 33;
    value
}

/// Open-addressing set of `i64` values.
///
/// `i64::MIN` cannot be stored.
#[derive(Clone, Debug)]
pub struct LongHashSet {
    slots: Vec<i64>,
    len: usize,
    mask: usize,
    resize_at: usize,
}

impl Default for LongHashSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LongHashSet {
    /// Creates an empty set with the default table size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_table_size(DEFAULT_CAPACITY)
    }

    fn with_table_size(size: usize) -> Self {
        let size = size.max(2).next_power_of_two();
        Self {
            slots: vec![EMPTY; size],
            len: 0,
            mask: size - 1,
            resize_at: threshold(size),
        }
    }

    /// Number of stored values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the set is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn ideal_slot(&self, value: i64) -> usize {
        mix64(value as u64) as usize & self.mask
    }

    /// Adds `value`. Returns true if it was not already present.
    ///
    /// # Panics
    ///
    /// Panics if `value` is `i64::MIN`.
    pub fn insert(&mut self, value: i64) -> bool {
        assert_ne!(value, EMPTY, "i64::MIN is reserved as the empty value");

        let mut slot = self.ideal_slot(value);
        loop {
            let current = self.slots[slot];
            if current == EMPTY {
                break;
            }
            if current == value {
                return false;
            }
            slot = (slot + 1) & self.mask;
        }

        self.slots[slot] = value;
        self.len += 1;
        if self.len > self.resize_at {
            self.grow();
        }
        true
    }

    /// Returns true if `value` is present.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        if value == EMPTY {
            return false;
        }
        let mut slot = self.ideal_slot(value);
        loop {
            let current = self.slots[slot];
            if current == EMPTY {
                return false;
            }
            if current == value {
                return true;
            }
            slot = (slot + 1) & self.mask;
        }
    }

    /// Removes every value, keeping the allocated table.
    pub fn clear(&mut self) {
        if self.len == 0 {
            return;
        }
        self.slots.fill(EMPTY);
        self.len = 0;
    }

    fn grow(&mut self) {
        let new_size = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; new_size]);
        self.mask = new_size - 1;
        self.resize_at = threshold(new_size);
        for value in old.into_iter().filter(|v| *v != EMPTY) {
            let mut slot = self.ideal_slot(value);
            while self.slots[slot] != EMPTY {
                slot = (slot + 1) & self.mask;
            }
            self.slots[slot] = value;
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn threshold(size: usize) -> usize {
    ((size as f64 * LOAD_FACTOR) as usize).min(size - 1)
}
