// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Bounded sample queue between the acquisition and detection threads

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Sample;

/// Default number of samples held before the oldest is evicted
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Lock-free FIFO of samples.
///
/// `push` never blocks: once full, the oldest sample is dropped to make room.
/// Detection only needs recent history, so losing old samples under
/// backpressure is accepted and counted in `dropped()`.
pub struct SampleBuffer {
    queue: ArrayQueue<Sample>,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl SampleBuffer {
    /// Create a buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, sample: Sample) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(sample).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pop_oldest(&self) -> Option<Sample> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Total samples ever pushed
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Samples evicted by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn sample(i: i64) -> Sample {
        Sample::new(Utc::now() + Duration::milliseconds(i), vec![], vec![i as f64])
    }

    #[test]
    fn test_fifo_order() {
        let buffer = SampleBuffer::new(4);
        for i in 0..3 {
            buffer.push(sample(i));
        }
        for i in 0..3 {
            assert_eq!(buffer.pop_oldest().unwrap().displacement[0], i as f64);
        }
        assert!(buffer.pop_oldest().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = SampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(sample(i));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.pushed(), 5);
        assert_eq!(buffer.pop_oldest().unwrap().displacement[0], 2.0);
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let buffer = SampleBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(sample(1));
        buffer.push(sample(2));
        assert_eq!(buffer.pop_oldest().unwrap().displacement[0], 2.0);
    }

    #[test]
    fn test_concurrent_producer_consumer_preserves_order() {
        let buffer = Arc::new(SampleBuffer::new(10_000));
        let producer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..5_000 {
                    buffer.push(sample(i));
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 5_000 {
            match buffer.pop_oldest() {
                Some(s) => seen.push(s.displacement[0] as i64),
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
