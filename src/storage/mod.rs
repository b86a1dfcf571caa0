//! Crash-resilient storage for acquisition runs
//!
//! - [`DurableBuffer`] - flush-on-write sample log, one per run
//! - [`FileNamer`] - `<prefix>_<suffix>.<ext>` naming for buffers and reports
//! - [`find_orphaned_buffers`] - buffers left by crashed or failed runs

pub mod durable;
pub mod naming;

pub use durable::{read_rows, AppendStatus, DurableBuffer, BUFFER_EXTENSION, BUFFER_HEADER};
pub use naming::{find_orphaned_buffers, FileNamer};
