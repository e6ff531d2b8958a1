use std::collections::vec_deque::Iter;
use std::collections::VecDeque;

/// Fixed-capacity FIFO window. Pushing into a full buffer evicts the oldest value.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    window: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        RingBuffer {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, returning the evicted one if the buffer was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.window.len() == self.capacity {
            self.window.pop_front()
        } else {
            None
        };
        self.window.push_back(value);
        evicted
    }

    /// Oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        self.window.iter()
    }

    /// The newest `n` values, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.window.len().saturating_sub(n);
        self.window.iter().skip(skip)
    }

    pub fn latest(&self) -> Option<&T> {
        self.window.back()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

impl RingBuffer<f64> {
    /// Arithmetic mean of the window, zero when empty.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.window.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buf = RingBuffer::new(3);
        for i in 0..10 {
            buf.push(i);
            assert!(buf.len() <= 3);
        }
        assert!(buf.is_full());
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut buf = RingBuffer::new(2);
        assert_eq!(buf.push('a'), None);
        assert_eq!(buf.push('b'), None);
        assert_eq!(buf.push('c'), Some('a'));
        assert_eq!(buf.latest(), Some(&'c'));
    }

    #[test]
    fn test_last_n_shorter_than_window() {
        let mut buf = RingBuffer::new(50);
        for i in 0..30 {
            buf.push(i);
        }
        let tail: Vec<_> = buf.last_n(20).copied().collect();
        assert_eq!(tail.len(), 20);
        assert_eq!(tail[0], 10);
        assert_eq!(tail[19], 29);

        let all: Vec<_> = buf.last_n(100).copied().collect();
        assert_eq!(all.len(), 30);
    }

    #[test]
    fn test_mean() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.mean(), 0.0);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            buf.push(v);
        }
        // [2, 3, 4, 5]
        assert!((buf.mean() - 3.5).abs() < 1e-12);
    }
}
