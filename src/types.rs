//! Core data types for meterlog
//!
//! This module contains the data structures shared between the sampler,
//! the render loop and the finalizer.
//!
//! # Main Types
//!
//! - [`Sample`] - One `(elapsed, value)` measurement pair
//! - [`DurableRow`] - A sample as stored in the durable append buffer
//! - [`SummaryStats`] - count/mean/std/min/max over a set of readings
//! - [`RunState`] - The acquisition run state machine
//!
//! # Failed Readings
//!
//! A failed device read is recorded as NaN. Statistics and view bounds only
//! consider finite values, so a single dropout does not poison the mean or
//! collapse the plot range.

use serde::{Deserialize, Serialize};

/// A single measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the run started
    pub elapsed: f64,
    /// Reading in the unit of the active function, NaN on a failed read
    pub value: f64,
}

impl Sample {
    pub fn new(elapsed: f64, value: f64) -> Self {
        Self { elapsed, value }
    }

    /// Returns true if this sample holds a real reading
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }

    /// Convert to a plot point
    #[inline]
    pub fn as_point(&self) -> [f64; 2] {
        [self.elapsed, self.value]
    }
}

/// One line of the durable append buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRow {
    /// 1-based, strictly increasing row number
    pub index: u64,
    /// Seconds since the run started, rounded to 4 decimals
    pub elapsed: f64,
    /// Reading rounded to 9 decimals
    pub value: f64,
    /// Local wall clock time as `HH:MM:SS.mmm`
    pub wallclock: String,
}

impl DurableRow {
    pub fn sample(&self) -> Sample {
        Sample::new(self.elapsed, self.value)
    }
}

/// Summary statistics over a set of readings
///
/// The standard deviation is the population deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// Compute statistics over the finite values of `values`
    ///
    /// Returns `None` when there is no finite value.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let count = finite.len();
        let mean = finite.iter().sum::<f64>() / count as f64;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = finite.iter().copied().fold(f64::MAX, f64::min);
        let max = finite.iter().copied().fold(f64::MIN, f64::max);

        Some(Self {
            count,
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }

    /// Difference between the largest and smallest reading
    #[inline]
    pub fn peak_peak(&self) -> f64 {
        self.max - self.min
    }
}

/// State of the acquisition run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No sampler is active
    #[default]
    Idle,
    /// The sampler is producing samples
    Running,
    /// The run flag is cleared and the sampler has not exited yet
    Stopping,
}

impl RunState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RunState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request
    User,
    /// The configured maximum number of points was captured
    LimitReached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = SummaryStats::from_values([1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!((stats.std - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.peak_peak(), 4.0);
    }

    #[test]
    fn test_stats_skip_nan() {
        let stats = SummaryStats::from_values([1.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_empty() {
        assert!(SummaryStats::from_values(Vec::<f64>::new()).is_none());
        assert!(SummaryStats::from_values([f64::NAN]).is_none());
    }

    #[test]
    fn test_constant_series() {
        let stats = SummaryStats::from_values([0.1; 7]).unwrap();
        assert!(stats.std < 1e-12);
        assert_eq!(stats.peak_peak(), 0.0);
    }

    #[test]
    fn test_sample_validity() {
        assert!(Sample::new(0.0, 1.5).is_valid());
        assert!(!Sample::new(0.5, f64::NAN).is_valid());
        assert_eq!(Sample::new(2.0, 3.0).as_point(), [2.0, 3.0]);
    }
}
