//! Fixed-capacity ring buffer backing every chart.
//!
//! The backing vector grows up to `capacity` and is then reused in place:
//! `head` points at the oldest element and `len` counts live elements, so
//! logical index `i` lives at `(head + i) % capacity`.

use std::fmt;
use std::ops::Range;

use crate::error::MarketError;

#[derive(Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, MarketError> {
        if capacity == 0 {
            return Err(MarketError::ZeroCapacity);
        }
        Ok(Self {
            slots: Vec::new(),
            capacity,
            head: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Appends to the logical end, evicting the oldest element when full.
    pub fn push(&mut self, item: T) {
        let idx = (self.head + self.len) % self.capacity;

        if idx < self.slots.len() {
            self.slots[idx] = item;
        } else {
            self.slots.push(item);
        }

        if self.len < self.capacity {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Removes `n` elements from the logical end.
    pub fn pop(&mut self, n: usize) -> Result<(), MarketError> {
        if n > self.len {
            return Err(MarketError::NotEnoughItemsToPop {
                requested: n,
                available: self.len,
            });
        }
        self.len -= n;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Element access where negative indices count from the newest (`-1`).
    pub fn get(&self, index: isize) -> Option<&T> {
        let len = self.len as isize;
        if index < -len || index >= len {
            return None;
        }
        let logical = if index < 0 { index + len } else { index } as usize;
        Some(&self.slots[self.translate(logical)])
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&T> {
        self.get(-1)
    }

    /// Live elements as at most two contiguous runs, oldest first.
    pub fn as_slices(&self) -> (&[T], &[T]) {
        let end = self.head + self.len;
        if end <= self.slots.len() {
            (&self.slots[self.head..end], &[])
        } else {
            // Wrapped: only possible once the backing vector reached capacity.
            (&self.slots[self.head..], &self.slots[..end - self.capacity])
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (a, b) = self.as_slices();
        a.iter().chain(b.iter())
    }

    /// Logical sub-range, clamped to the live length.
    pub fn range(&self, range: Range<usize>) -> impl Iterator<Item = &T> + '_ {
        let start = range.start.min(self.len);
        let end = range.end.clamp(start, self.len);
        self.iter().skip(start).take(end - start)
    }

    /// Index of the first element satisfying `pred`, oldest first.
    pub fn position<P>(&self, pred: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().position(pred)
    }

    fn translate(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.push(item);
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Copies the tail starting at logical `start`.
    pub fn tail_from(&self, start: usize) -> Vec<T> {
        self.range(start..self.len).cloned().collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
