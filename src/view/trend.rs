//! Trend buffer
//!
//! The in-memory sequence of samples shown on screen. When the run has a
//! point limit the buffer is capped at that limit, and a full buffer refuses
//! further samples instead of evicting old ones: reaching the limit ends the
//! run, it does not turn the buffer into a sliding window.

use crate::types::{Sample, SummaryStats};

/// Ordered, optionally capped sequence of samples
#[derive(Debug, Clone, Default)]
pub struct TrendBuffer {
    samples: Vec<Sample>,
    capacity: Option<usize>,
}

impl TrendBuffer {
    /// Create a buffer, `None` means unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.unwrap_or(0).min(100_000)),
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Change the cap; samples beyond a smaller cap are dropped from the end
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
        if let Some(cap) = capacity {
            self.samples.truncate(cap);
        }
    }

    /// Append a sample, returns false if the buffer is full
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// Append samples in order until the buffer is full
    ///
    /// Returns how many samples were dropped.
    pub fn extend<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut dropped = 0;
        for sample in samples {
            if !self.push(sample) {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.samples.len() >= cap)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// First and last sample time
    pub fn extent(&self) -> Option<(f64, f64)> {
        Some((self.samples.first()?.elapsed, self.samples.last()?.elapsed))
    }

    /// Statistics over every retained reading
    pub fn stats(&self) -> Option<SummaryStats> {
        SummaryStats::from_values(self.samples.iter().map(|s| s.value))
    }

    /// Plot points (time, value)
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.samples.iter().map(Sample::as_point).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_buffer_refuses() {
        let mut trend = TrendBuffer::new(Some(3));
        for i in 0..3 {
            assert!(trend.push(Sample::new(i as f64, 1.0)));
        }
        assert!(trend.is_full());
        assert!(!trend.push(Sample::new(3.0, 1.0)));
        assert_eq!(trend.len(), 3);
        // Oldest sample is kept
        assert_eq!(trend.samples()[0].elapsed, 0.0);
    }

    #[test]
    fn test_extend_drops_newest() {
        let mut trend = TrendBuffer::new(Some(2));
        let dropped = trend.extend((0..5).map(|i| Sample::new(i as f64, i as f64)));
        assert_eq!(dropped, 3);
        assert_eq!(trend.extent(), Some((0.0, 1.0)));
    }

    #[test]
    fn test_unbounded() {
        let mut trend = TrendBuffer::new(None);
        assert_eq!(trend.extend((0..10_000).map(|i| Sample::new(i as f64, 0.0))), 0);
        assert!(!trend.is_full());
    }

    #[test]
    fn test_stats_and_clear() {
        let mut trend = TrendBuffer::new(None);
        trend.extend([1.0, 2.0, 3.0].map(|v| Sample::new(v, v)));
        let stats = trend.stats().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 2.0);

        trend.clear();
        assert!(trend.is_empty());
        assert!(trend.stats().is_none());
        assert_eq!(trend.extent(), None);
    }

    #[test]
    fn test_shrinking_capacity_truncates() {
        let mut trend = TrendBuffer::new(None);
        trend.extend((0..5).map(|i| Sample::new(i as f64, 0.0)));
        trend.set_capacity(Some(2));
        assert_eq!(trend.len(), 2);
        assert!(trend.is_full());
    }
}
