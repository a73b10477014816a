//! Fixed-capacity ring buffer
//!
//! Backs the per-link LTSSM history and the device event journal. Storage is
//! allocated once; pushing into a full buffer evicts the oldest element.

use crate::error::StateError;

/// Bounded FIFO with head index and element count
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` elements
    pub fn new(capacity: usize) -> Result<Self, StateError> {
        if capacity == 0 {
            return Err(StateError::ZeroCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `value`, returning the evicted oldest element when full
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        let evicted = self.slots[tail].replace(value);
        if self.len == capacity {
            self.head = (self.head + 1) % capacity;
        } else {
            self.len += 1;
        }
        evicted
    }

    /// Most recently pushed element
    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let index = (self.head + self.len - 1) % self.capacity();
        self.slots[index].as_ref()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |offset| self.slots[(self.head + offset) % capacity].as_ref())
    }

    /// Remove every element, keeping the capacity
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            RingBuffer::<u8>::new(0).unwrap_err(),
            StateError::ZeroCapacity
        );
    }

    #[test]
    fn test_push_until_full() {
        let mut ring = RingBuffer::new(3).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![1, 2, 3]);
        assert_eq!(ring.last(), Some(&3));
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mut ring = RingBuffer::new(3).unwrap();
        for value in 1..=5 {
            ring.push(value);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![3, 4, 5]);

        assert_eq!(ring.push(6), Some(3));
        assert_eq!(ring.to_vec(), vec![4, 5, 6]);
        assert_eq!(ring.last(), Some(&6));
    }

    #[test]
    fn test_capacity_one() {
        let mut ring = RingBuffer::new(1).unwrap();
        ring.push('a');
        assert_eq!(ring.push('b'), Some('a'));
        assert_eq!(ring.to_vec(), vec!['b']);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(2).unwrap();
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.last(), None);
        ring.push(4);
        assert_eq!(ring.to_vec(), vec![4]);
    }
}
