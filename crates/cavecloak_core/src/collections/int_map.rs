//! # Int → Int Map
//!
//! Open-addressing hash map over two parallel `i32` arrays.
//!
//! ## Design
//!
//! - Capacity is always a power of two, probing is linear
//! - Load factor 0.6, doubling on overflow
//! - Deletion uses backward shifting, so there are never tombstones and
//!   lookups stay short even after heavy churn
//!
//! ```text
//! keys:   [ MIN | 17 | 33 | MIN | 4 | ... ]
//! values: [  -  |  0 |  3 |  -  | 1 | ... ]
//! ```

/// Reserved key marking an empty slot.
pub const EMPTY_KEY: i32 = i32::MIN;

/// Fraction of slots that may be occupied before the table doubles.
const LOAD_FACTOR: f64 = 0.6;

/// Smallest table the map will allocate.
const MIN_CAPACITY: usize = 4;

/// Fibonacci-hash mixing of a 32-bit key.
#[inline]
fn mix(key: i32) -> u32 {
    #[allow(clippy::cast_sign_loss)]
    let h = (key as u32).wrapping_mul(0x9E37_79B9);
    h ^ (h >> 16)
}

/// Open-addressing `i32 -> i32` map.
///
/// `i32::MIN` cannot be used as a key.
#[derive(Clone, Debug)]
pub struct IntIntMap {
    keys: Vec<i32>,
    values: Vec<i32>,
    len: usize,
    mask: usize,
    resize_at: usize,
}

impl Default for IntIntMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IntIntMap {
    /// Creates an empty map with a small initial table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(8)
    }

    /// Creates a map able to hold `expected` entries without growing.
    #[must_use]
    pub fn with_capacity(expected: usize) -> Self {
        let capacity = table_size_for(expected);
        Self {
            keys: vec![EMPTY_KEY; capacity],
            values: vec![0; capacity],
            len: 0,
            mask: capacity - 1,
            resize_at: resize_threshold(capacity),
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the map holds no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current table size (always a power of two).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    fn ideal_slot(&self, key: i32) -> usize {
        mix(key) as usize & self.mask
    }

    /// Returns the value stored for `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: i32) -> Option<i32> {
        if key == EMPTY_KEY {
            return None;
        }
        let mut slot = self.ideal_slot(key);
        loop {
            let current = self.keys[slot];
            if current == EMPTY_KEY {
                return None;
            }
            if current == key {
                return Some(self.values[slot]);
            }
            slot = (slot + 1) & self.mask;
        }
    }

    /// Returns true if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: i32) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces `key`, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if `key` is the reserved empty key (`i32::MIN`).
    pub fn insert(&mut self, key: i32, value: i32) -> Option<i32> {
        assert_ne!(key, EMPTY_KEY, "i32::MIN is reserved as the empty key");

        let mut slot = self.ideal_slot(key);
        loop {
            let current = self.keys[slot];
            if current == EMPTY_KEY {
                break;
            }
            if current == key {
                let previous = self.values[slot];
                self.values[slot] = value;
                return Some(previous);
            }
            slot = (slot + 1) & self.mask;
        }

        self.keys[slot] = key;
        self.values[slot] = value;
        self.len += 1;
        if self.len > self.resize_at {
            self.rehash(self.keys.len() * 2);
        }
        None
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: i32) -> Option<i32> {
        if key == EMPTY_KEY {
            return None;
        }
        let mut slot = self.ideal_slot(key);
        loop {
            let current = self.keys[slot];
            if current == EMPTY_KEY {
                return None;
            }
            if current == key {
                let previous = self.values[slot];
                self.shift_keys(slot);
                self.len -= 1;
                return Some(previous);
            }
            slot = (slot + 1) & self.mask;
        }
    }

    /// Removes every entry, keeping the allocated table.
    pub fn clear(&mut self) {
        if self.len == 0 {
            return;
        }
        self.keys.fill(EMPTY_KEY);
        self.len = 0;
    }

    /// Iterates over `(key, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter(|(key, _)| **key != EMPTY_KEY)
            .map(|(key, value)| (*key, *value))
    }

    /// Closes the gap at `pos` by pulling later members of the probe
    /// run back into it.
    fn shift_keys(&mut self, mut pos: usize) {
        loop {
            let last = pos;
            pos = (pos + 1) & self.mask;
            loop {
                let key = self.keys[pos];
                if key == EMPTY_KEY {
                    self.keys[last] = EMPTY_KEY;
                    return;
                }
                let ideal = self.ideal_slot(key);
                let movable = if last <= pos {
                    last >= ideal || ideal > pos
                } else {
                    last >= ideal && ideal > pos
                };
                if movable {
                    break;
                }
                pos = (pos + 1) & self.mask;
            }
            self.keys[last] = self.keys[pos];
            self.values[last] = self.values[pos];
        }
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_keys = std::mem::replace(&mut self.keys, vec![EMPTY_KEY; new_capacity]);
        let old_values = std::mem::replace(&mut self.values, vec![0; new_capacity]);
        self.mask = new_capacity - 1;
        self.resize_at = resize_threshold(new_capacity);

        for (key, value) in old_keys.into_iter().zip(old_values) {
            if key == EMPTY_KEY {
                continue;
            }
            let mut slot = self.ideal_slot(key);
            while self.keys[slot] != EMPTY_KEY {
                slot = (slot + 1) & self.mask;
            }
            self.keys[slot] = key;
            self.values[slot] = value;
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn table_size_for(expected: usize) -> usize {
    let needed = (expected as f64 / LOAD_FACTOR).ceil() as usize + 1;
    needed.max(MIN_CAPACITY).next_power_of_two()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn resize_threshold(capacity: usize) -> usize {
    ((capacity as f64 * LOAD_FACTOR) as usize).min(capacity - 1)
}
