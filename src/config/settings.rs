//! Acquisition, view, report and output settings
//!
//! These are the values the acquisition core consumes. They are validated
//! when a run starts and stay immutable for the duration of that run.
//!
//! # Main Types
//!
//! - [`AcquisitionConfig`] - Sampling interval, point limit and persistence
//! - [`ReportOptions`] - What the final report contains
//! - [`ViewConfig`] - Scroll window and statistics overlay
//! - [`OutputConfig`] - Where buffers and reports are written and how they are named
//! - [`DeviceConfig`] - Instrument resource and measurement setup

use crate::device::{DeviceParams, MeasurementFunction, Resolution};
use crate::error::{MeterLogError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest accepted sampling interval
pub const MIN_INTERVAL_MS: u64 = 50;

/// Default sampling interval
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// Default point limit
pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Default scroll window in seconds
pub const DEFAULT_SCROLL_WINDOW_SECONDS: f64 = 10.0;

/// Default file name prefix for buffers and reports
pub const DEFAULT_FILE_PREFIX: &str = "measurement";

/// Settings for one acquisition run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Target time between two samples
    pub interval_ms: u64,
    /// Number of samples after which the run stops (0 = unbounded)
    pub max_points: usize,
    /// Whether samples are written to the durable buffer
    pub persist: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            max_points: DEFAULT_MAX_POINTS,
            persist: true,
        }
    }
}

impl AcquisitionConfig {
    pub fn new(interval_ms: u64, max_points: usize) -> Self {
        Self {
            interval_ms,
            max_points,
            ..Self::default()
        }
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Check the configuration before any thread starts
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(MeterLogError::Configuration(format!(
                "interval of {} ms is below the minimum of {} ms",
                self.interval_ms, MIN_INTERVAL_MS
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The point limit, if the run is bounded
    pub fn limit(&self) -> Option<usize> {
        (self.max_points > 0).then_some(self.max_points)
    }
}

/// Contents of the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOptions {
    pub include_stats: bool,
    pub include_chart: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_stats: true,
            include_chart: true,
        }
    }
}

/// Live view settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Width of the visible window in scroll mode
    pub scroll_window_seconds: f64,
    /// Whether to compute statistics on every tick
    pub show_statistics: bool,
    /// Start in autoscale mode (otherwise manual)
    pub autoscale: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            scroll_window_seconds: DEFAULT_SCROLL_WINDOW_SECONDS,
            show_statistics: true,
            autoscale: true,
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.scroll_window_seconds.is_finite() && self.scroll_window_seconds > 0.0) {
            return Err(MeterLogError::Configuration(format!(
                "scroll window must be a positive number of seconds, got {}",
                self.scroll_window_seconds
            )));
        }
        Ok(())
    }
}

/// How the suffix of generated file names is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileSuffix {
    /// `YYYYMMDD_HHMMSS`
    #[default]
    Timestamp,
    /// Zero-padded 4-digit counter
    Counter,
}

/// Output location and naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for durable buffers and reports
    pub directory: PathBuf,
    pub prefix: String,
    pub suffix: FileSuffix,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: dirs_next::document_dir().unwrap_or_else(|| PathBuf::from(".")),
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            suffix: FileSuffix::Timestamp,
        }
    }
}

impl OutputConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: FileSuffix) -> Self {
        self.suffix = suffix;
        self
    }
}

/// Instrument selection and measurement setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// `SIMULATION` or a `host:port` SCPI socket address
    pub resource: String,
    pub function: MeasurementFunction,
    /// One of [`MeasurementFunction::ranges`]
    pub range: String,
    pub resolution: Resolution,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            resource: crate::device::SIMULATION_RESOURCE.to_string(),
            function: MeasurementFunction::default(),
            range: "AUTO".to_string(),
            resolution: Resolution::default(),
        }
    }
}

impl DeviceConfig {
    pub fn params(&self) -> DeviceParams {
        DeviceParams {
            function: self.function,
            range: self.range.clone(),
            resolution: self.resolution,
        }
    }
}
