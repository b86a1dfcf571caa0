//! # meterlog: Bench Multimeter Logger
//!
//! Reads a bench multimeter on a fixed interval, shows the readings as a live
//! trend and records every run so that a crash loses nothing that was read.
//! The architecture separates a sampling thread from the UI thread:
//!
//! ## Architecture
//!
//! - **Acquisition**: a [`Sampler`](acquisition::Sampler) thread owns the
//!   instrument for a run and appends every reading to a
//!   [`DurableBuffer`](storage::DurableBuffer) before queueing it
//! - **Render loop**: drains the queue on the UI thread at a fixed cadence,
//!   maintains the trend buffer, view bounds and statistics
//! - **Finalizer**: turns the buffer of a stopped run into a report on a
//!   background thread and deletes the buffer only once the report is written
//! - **Frontend**: eframe/egui with egui_plot
//! - **Communication**: crossbeam channels and atomic flags
//!
//! ## Configuration
//!
//! The last used configuration is stored in the platform-appropriate data
//! directory under `dev.hxyulin.meterlog`, see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use meterlog::{config::AppConfig, device::open_device, session::Session};
//!
//! let config = AppConfig::load_or_default();
//! let device = open_device(&config.device.resource);
//! let mut session = Session::new(config, device)?;
//! session.start()?;
//! ```

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod finalize;
pub mod frontend;
pub mod render;
pub mod report;
pub mod session;
pub mod storage;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use acquisition::{RunController, RunEvent, SampleQueue};
pub use config::AppConfig;
pub use device::{Device, DeviceParams, MeasurementFunction};
pub use error::{DeviceError, MeterLogError, Result};
pub use render::{RenderFrame, RenderLoop, Renderer};
pub use session::Session;
pub use types::{DurableRow, RunState, Sample, StopReason, SummaryStats};
