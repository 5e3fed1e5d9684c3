/// Fixed-capacity rolling window buffers feeding the chart projections
use std::collections::VecDeque;

/// Append-only circular buffer with a hard capacity bound. `push` is
/// O(1) and evicts the oldest sample when full; `snapshot` hands out an
/// ordered oldest-to-newest copy so consumers never observe the buffer
/// mutating mid-read.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Ordered oldest-to-newest copy of the current window
    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_insertion_order() {
        let mut buf = RollingBuffer::new(4);
        for i in 0..3 {
            buf.push(i);
        }
        assert_eq!(buf.snapshot(), vec![0, 1, 2]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        // N + k pushes leave exactly the last N values in order
        let n = 5;
        let k = 7;
        let mut buf = RollingBuffer::new(n);
        for i in 0..(n + k) {
            buf.push(i);
        }
        assert_eq!(buf.len(), n);
        assert_eq!(buf.snapshot(), vec![7, 8, 9, 10, 11]);
    }

    #[test]
    fn capacity_never_exceeded() {
        let mut buf = RollingBuffer::new(2);
        for i in 0..100 {
            buf.push(i);
            assert!(buf.len() <= 2);
        }
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut buf = RollingBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.snapshot(), vec!["b"]);
    }
}
