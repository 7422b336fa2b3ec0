//! # Long Ring Queue
//!
//! FIFO of `i64` over a power-of-two circular buffer.

/// Default buffer size.
const DEFAULT_CAPACITY: usize = 32;

/// Growable circular FIFO of `i64` values.
#[derive(Clone, Debug)]
pub struct LongArrayQueue {
    buffer: Vec<i64>,
    head: usize,
    len: usize,
}

impl Default for LongArrayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LongArrayQueue {
    /// Creates an empty queue with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: vec![0; DEFAULT_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    /// Number of queued values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true when nothing is queued.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a value at the tail.
    pub fn push_back(&mut self, value: i64) {
        if self.len == self.buffer.len() {
            self.grow();
        }
        let mask = self.buffer.len() - 1;
        let tail = (self.head + self.len) & mask;
        self.buffer[tail] = value;
        self.len += 1;
    }

    /// Removes the value at the head.
    pub fn pop_front(&mut self) -> Option<i64> {
        if self.len == 0 {
            return None;
        }
        let value = self.buffer[self.head];
        self.head = (self.head + 1) & (self.buffer.len() - 1);
        self.len -= 1;
        Some(value)
    }

    /// Drops all queued values, keeping the buffer.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn grow(&mut self) {
        let old_size = self.buffer.len();
        let mut grown = Vec::with_capacity(old_size * 2);
        grown.extend_from_slice(&self.buffer[self.head..]);
        grown.extend_from_slice(&self.buffer[..self.head]);
        grown.resize(old_size * 2, 0);
        self.buffer = grown;
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_across_growth() {
        let mut queue = LongArrayQueue::new();
        for value in 0..20 {
            queue.push_back(value);
        }
        for expected in 0..10 {
            assert_eq!(queue.pop_front(), Some(expected));
        }
        // wrap the head, then force growth while wrapped
        for value in 20..100 {
            queue.push_back(value);
        }
        for expected in 10..100 {
            assert_eq!(queue.pop_front(), Some(expected));
        }
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_resets() {
        let mut queue = LongArrayQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.pop_front(), None);
        queue.push_back(3);
        assert_eq!(queue.pop_front(), Some(3));
    }
}
