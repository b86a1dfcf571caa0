//! Acquisition core
//!
//! This module implements the producer side of meterlog:
//!
//! - [`Sampler`] - background thread reading the device on a fixed cadence
//! - [`SampleQueue`] - ordered hand-off from the sampler to the render loop
//! - [`RunController`] - the `Idle -> Running -> Stopping -> Idle` state machine
//!
//! # Data Flow
//!
//! ```text
//! Device -> Sampler -> DurableBuffer (synchronous append)
//!                   -> SampleQueue   -> RenderLoop
//!
//! on exit: DurableBuffer -> Finalizer -> report file, buffer deleted
//! ```
//!
//! # Threading Model
//!
//! The sampler runs on its own thread and owns the device for the whole run.
//! It talks to the controller only through channels and an atomic run flag,
//! which is checked at the top of every loop iteration. The controller and
//! the render loop run on the UI thread and never block on the device or on
//! files. Finalization runs on a short-lived thread per stopped run.
//!
//! # Example
//!
//! ```ignore
//! use meterlog::acquisition::{RunController, SampleQueue};
//!
//! let queue = SampleQueue::new();
//! let mut controller = RunController::new(device, queue.sender(), &output, options, writer);
//! controller.start(AcquisitionConfig::new(100, 5), &DeviceParams::default())?;
//! loop {
//!     for event in controller.poll() { /* ... */ }
//!     let samples = queue.drain();
//! }
//! ```

pub mod controller;
pub mod queue;
pub mod sampler;

pub use controller::{RunController, RunEvent};
pub use queue::{SampleQueue, SampleSender};
pub use sampler::{RunContext, Sampler, SamplerEvent, SamplerHandle};
