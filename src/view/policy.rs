//! View policy
//!
//! Computes the visible plot range from the trend buffer. Exactly one of
//! three modes is active:
//!
//! - **Autoscale**: the full time extent, value range of all samples plus margin
//! - **Scroll**: the last `window_seconds` of data, value range of that window plus margin
//! - **Manual**: bounds frozen when the mode was entered, or set by the user
//!
//! The value margin is 5 % of the value range, or 5 % of the largest
//! magnitude when all values are equal, and never less than [`MIN_MARGIN`].
//! NaN readings are ignored.

use super::trend::TrendBuffer;
use crate::error::{MeterLogError, Result};
use crate::types::Sample;
use serde::{Deserialize, Serialize};

/// Value margin as a fraction of the value range
pub const MARGIN_FRACTION: f64 = 0.05;

/// Smallest value margin
pub const MIN_MARGIN: f64 = 1e-9;

/// Active view mode
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Autoscale,
    Scroll { window_seconds: f64 },
    Manual,
}

impl ViewMode {
    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Autoscale => "Autoscale",
            ViewMode::Scroll { .. } => "Scroll",
            ViewMode::Manual => "Manual",
        }
    }
}

/// Visible plot range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewBounds {
    pub t_min: f64,
    pub t_max: f64,
    pub v_min: f64,
    pub v_max: f64,
}

impl Default for ViewBounds {
    fn default() -> Self {
        Self {
            t_min: 0.0,
            t_max: 1.0,
            v_min: -1.0,
            v_max: 1.0,
        }
    }
}

impl ViewBounds {
    pub fn new(t_min: f64, t_max: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            t_min,
            t_max,
            v_min,
            v_max,
        }
    }

    pub fn contains(&self, sample: &Sample) -> bool {
        (self.t_min..=self.t_max).contains(&sample.elapsed)
            && (self.v_min..=self.v_max).contains(&sample.value)
    }

    pub fn is_valid(&self) -> bool {
        [self.t_min, self.t_max, self.v_min, self.v_max]
            .iter()
            .all(|v| v.is_finite())
            && self.t_min <= self.t_max
            && self.v_min < self.v_max
    }
}

/// Value range with margin over the finite values, `(-1, 1)` if there are none
fn value_bounds<'a, I>(samples: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a Sample>,
{
    let (min, max) = samples
        .into_iter()
        .filter(|s| s.is_valid())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.value), hi.max(s.value))
        });

    if min > max {
        return (-1.0, 1.0);
    }

    let range = max - min;
    let margin = if range > 0.0 {
        range * MARGIN_FRACTION
    } else {
        max.abs() * MARGIN_FRACTION
    };
    let margin = margin.max(MIN_MARGIN);
    (min - margin, max + margin)
}

/// Time range, widened to one second when it has no width
fn time_bounds(t_min: f64, t_max: f64) -> (f64, f64) {
    if t_max > t_min {
        (t_min, t_max)
    } else {
        (t_min, t_min + 1.0)
    }
}

/// Bounds over the whole trend
pub fn autoscale_bounds(samples: &[Sample]) -> ViewBounds {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return ViewBounds::default();
    };
    let (t_min, t_max) = time_bounds(first.elapsed, last.elapsed);
    let (v_min, v_max) = value_bounds(samples);
    ViewBounds::new(t_min, t_max, v_min, v_max)
}

/// Bounds over the last `window_seconds` of the trend
pub fn scroll_bounds(samples: &[Sample], window_seconds: f64) -> ViewBounds {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return ViewBounds::default();
    };
    let t_max = last.elapsed;
    let t_min = first.elapsed.max(t_max - window_seconds);

    // Samples are time ordered, so the window is a suffix
    let start = samples.partition_point(|s| s.elapsed < t_min);
    let (v_min, v_max) = value_bounds(&samples[start..]);

    let (t_min, t_max) = time_bounds(t_min, t_max);
    ViewBounds::new(t_min, t_max, v_min, v_max)
}

/// Tracks the active mode and the resulting bounds
#[derive(Debug, Clone, Default)]
pub struct ViewPolicy {
    mode: ViewMode,
    bounds: ViewBounds,
}

impl ViewPolicy {
    pub fn new(mode: ViewMode) -> Self {
        Self {
            mode,
            bounds: ViewBounds::default(),
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn bounds(&self) -> ViewBounds {
        self.bounds
    }

    /// Switch mode and recompute the bounds with the new mode's rule
    pub fn set_mode(&mut self, mode: ViewMode, trend: &TrendBuffer) -> Result<()> {
        if let ViewMode::Scroll { window_seconds } = mode {
            if !(window_seconds.is_finite() && window_seconds > 0.0) {
                return Err(MeterLogError::Configuration(format!(
                    "scroll window must be positive, got {}",
                    window_seconds
                )));
            }
        }

        tracing::debug!("View mode {} -> {}", self.mode.label(), mode.label());
        self.mode = mode;
        self.freeze_or_update(trend);
        Ok(())
    }

    /// Recompute the bounds for a new tick; manual bounds stay as they are
    pub fn update(&mut self, trend: &TrendBuffer) {
        match self.mode {
            ViewMode::Autoscale => self.bounds = autoscale_bounds(trend.samples()),
            ViewMode::Scroll { window_seconds } => {
                self.bounds = scroll_bounds(trend.samples(), window_seconds)
            }
            ViewMode::Manual => {}
        }
    }

    /// Recompute after the data was cleared or a new run started
    ///
    /// In manual mode the bounds are frozen again from the current data.
    pub fn reset(&mut self, trend: &TrendBuffer) {
        self.freeze_or_update(trend);
    }

    /// Manual bounds chosen by the user (pan or zoom)
    pub fn set_manual_bounds(&mut self, bounds: ViewBounds) -> Result<()> {
        if !bounds.is_valid() {
            return Err(MeterLogError::Configuration(format!(
                "invalid view bounds {:?}",
                bounds
            )));
        }
        self.mode = ViewMode::Manual;
        self.bounds = bounds;
        Ok(())
    }

    fn freeze_or_update(&mut self, trend: &TrendBuffer) {
        match self.mode {
            ViewMode::Manual => self.bounds = autoscale_bounds(trend.samples()),
            _ => self.update(trend),
        }
    }
}
