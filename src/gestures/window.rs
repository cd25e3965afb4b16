//! Fixed-capacity sample windows; the oldest sample is evicted on overflow.

use std::collections::VecDeque;

pub const HISTORY_CAPACITY: usize = 10;
pub const SCROLL_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySample {
    pub x: f32,
    pub y: f32,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    pub avg_y: f32,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

pub type HistoryWindow = BoundedWindow<HistorySample>;
pub type ScrollWindow = BoundedWindow<ScrollSample>;

impl<T: Copy> BoundedWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn oldest(&self) -> Option<T> {
        self.samples.front().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_on_overflow() {
        let mut w = BoundedWindow::new(3);
        for i in 0..5 {
            w.push(i);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.oldest(), Some(2));
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let mut w = HistoryWindow::new(HISTORY_CAPACITY);
        for i in 0..50 {
            w.push(HistorySample {
                x: 0.0,
                y: 0.0,
                timestamp: i as f64,
            });
            assert!(w.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(w.oldest().map(|s| s.timestamp), Some(40.0));
    }

    #[test]
    fn clear_empties() {
        let mut w = ScrollWindow::new(SCROLL_CAPACITY);
        w.push(ScrollSample {
            avg_y: 0.5,
            timestamp: 0.0,
        });
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.oldest(), None);
    }
}
