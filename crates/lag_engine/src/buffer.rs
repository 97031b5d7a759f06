//! Fixed-length sliding window of lateral acceleration samples.
//!
//! Backed by a single `HeapRb` arena. The window is pre-filled with zero
//! samples so its length never changes; every update overwrites the oldest
//! entry in O(1).

use std::fmt;

use ringbuf::{traits::*, HeapRb};

/// One derived sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// Sample time (seconds)
    pub time: f64,
    /// Commanded lateral acceleration (κ·v²)
    pub desired: f64,
    /// Observed lateral acceleration (ψ̇·v)
    pub actual: f64,
    /// Sample passed every gate
    pub okay: bool,
}

/// Snapshot of the window as parallel arrays, most recent last
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleWindow {
    pub times: Vec<f64>,
    pub desired: Vec<f64>,
    pub actual: Vec<f64>,
    pub okay: Vec<bool>,
}

impl SampleWindow {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Sliding sample window
pub struct SampleBuffer {
    ring: HeapRb<Sample>,
    capacity: usize,
    num_okay: usize,
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("capacity", &self.capacity)
            .field("num_okay", &self.num_okay)
            .finish()
    }
}

impl SampleBuffer {
    /// Create a window of `capacity` zero samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut ring = HeapRb::new(capacity);
        for _ in 0..capacity {
            ring.push_overwrite(Sample::default());
        }
        Self {
            ring,
            capacity,
            num_okay: 0,
        }
    }

    /// Append a sample, evicting the oldest
    #[inline]
    pub fn update(&mut self, time: f64, desired: f64, actual: f64, okay: bool) {
        let evicted = self.ring.push_overwrite(Sample {
            time,
            desired,
            actual,
            okay,
        });
        if evicted.is_some_and(|sample| sample.okay) {
            self.num_okay -= 1;
        }
        if okay {
            self.num_okay += 1;
        }
    }

    /// Copy the window out as parallel arrays
    pub fn get(&self) -> SampleWindow {
        let mut window = SampleWindow {
            times: Vec::with_capacity(self.capacity),
            desired: Vec::with_capacity(self.capacity),
            actual: Vec::with_capacity(self.capacity),
            okay: Vec::with_capacity(self.capacity),
        };
        for sample in self.ring.iter() {
            window.times.push(sample.time);
            window.desired.push(sample.desired);
            window.actual.push(sample.actual);
            window.okay.push(sample.okay);
        }
        window
    }

    /// Samples held (always the capacity)
    #[inline]
    pub fn num_points(&self) -> usize {
        self.ring.occupied_len()
    }

    /// Samples flagged okay
    #[inline]
    pub fn num_okay(&self) -> usize {
        self.num_okay
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.ring.iter().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefilled_window() {
        let buffer = SampleBuffer::new(4);
        assert_eq!(buffer.num_points(), 4);
        assert_eq!(buffer.num_okay(), 0);

        let window = buffer.get();
        assert_eq!(window.times, vec![0.0; 4]);
        assert_eq!(window.okay, vec![false; 4]);
    }

    #[test]
    fn test_retains_last_capacity_in_order() {
        let capacity = 5;
        let mut buffer = SampleBuffer::new(capacity);
        for i in 0..capacity + 3 {
            let t = i as f64;
            buffer.update(t, t * 2.0, t * 3.0, i % 2 == 0);
        }

        let window = buffer.get();
        assert_eq!(window.len(), capacity);
        assert_eq!(window.times, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(window.desired, vec![6.0, 8.0, 10.0, 12.0, 14.0]);
        assert_eq!(window.actual, vec![9.0, 12.0, 15.0, 18.0, 21.0]);
        assert_eq!(window.okay, vec![false, true, false, true, false]);
        assert_eq!(buffer.latest().map(|s| s.time), Some(7.0));
    }

    #[test]
    fn test_num_okay_tracks_evictions() {
        let mut buffer = SampleBuffer::new(3);
        buffer.update(1.0, 0.0, 0.0, true);
        buffer.update(2.0, 0.0, 0.0, true);
        buffer.update(3.0, 0.0, 0.0, true);
        assert_eq!(buffer.num_okay(), 3);

        buffer.update(4.0, 0.0, 0.0, false);
        assert_eq!(buffer.num_okay(), 2);
        buffer.update(5.0, 0.0, 0.0, false);
        buffer.update(6.0, 0.0, 0.0, false);
        assert_eq!(buffer.num_okay(), 0);
        assert!(buffer.num_okay() <= buffer.num_points());
    }
}
