//! Live view state
//!
//! - [`TrendBuffer`] - samples retained for the plot and the statistics overlay
//! - [`ViewPolicy`] - visible bounds under [`ViewMode::Autoscale`],
//!   [`ViewMode::Scroll`] or [`ViewMode::Manual`]
//!
//! Both are owned by the render loop; no other thread touches them.

pub mod policy;
pub mod trend;

pub use policy::{autoscale_bounds, scroll_bounds, ViewBounds, ViewMode, ViewPolicy};
pub use trend::TrendBuffer;
