//! Fixed-capacity sliding window of recent samples.
//!
//! Samples are kept in arrival order. Once the window is full the oldest
//! sample is evicted on every push.

use crate::collector::types::SensorSample;
use std::collections::VecDeque;

/// FIFO buffer holding at most `capacity` samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<SensorSample>,
    capacity: usize,
}

impl SampleWindow {
    /// Create an empty window. `capacity` must be non-zero; callers validate it.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: SensorSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The last `n` samples (or all of them if fewer are held), oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &SensorSample> + Clone {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
