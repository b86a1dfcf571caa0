//! Error handling for meterlog
//!
//! This module defines the crate error type and a Result alias. The
//! variants follow how each failure is treated by the acquisition core:
//!
//! - [`MeterLogError::Configuration`] blocks the operation outright
//! - [`MeterLogError::Measurement`] is absorbed by the sampler (recorded as NaN)
//! - [`MeterLogError::DurableWrite`] degrades the run to non-persistent mode
//! - [`MeterLogError::Finalization`] aborts one finalize attempt and keeps the buffer

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a [`Device`](crate::device::Device)
///
/// This is a closed set: the sampler substitutes NaN for every kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The instrument did not return a usable reading
    #[error("read failure: {0}")]
    ReadFailure(String),

    /// The instrument or the requested setting is not supported
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No instrument is connected
    #[error("device not connected")]
    NotConnected,
}

/// Main error type for meterlog operations
#[derive(Error, Debug)]
pub enum MeterLogError {
    /// Invalid acquisition or application configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single measurement failed
    #[error("Measurement error: {0}")]
    Measurement(#[from] DeviceError),

    /// The durable buffer could not be opened or written
    #[error("Durable write error on {path:?}: {source}")]
    DurableWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Converting the durable buffer into a report failed
    #[error("Finalization error: {0}")]
    Finalization(String),

    /// The operation is not allowed while a run is active
    #[error("A run is active")]
    RunActive,

    /// A previous run is still being finalized
    #[error("Finalization of the previous run is still in progress")]
    FinalizationInProgress,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MeterLogError>,
    },
}

impl MeterLogError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MeterLogError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error must block the operation that produced it
    pub fn is_fatal(&self) -> bool {
        match self {
            MeterLogError::Measurement(_) | MeterLogError::DurableWrite { .. } => false,
            MeterLogError::WithContext { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

impl From<serde_json::Error> for MeterLogError {
    fn from(err: serde_json::Error) -> Self {
        MeterLogError::Serialization(err.to_string())
    }
}

/// Result type alias for meterlog operations
pub type Result<T> = std::result::Result<T, MeterLogError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeterLogError::Configuration("interval below 50 ms".to_string());
        assert_eq!(err.to_string(), "Configuration error: interval below 50 ms");
    }

    #[test]
    fn test_error_with_context() {
        let err = MeterLogError::Finalization("bad row".to_string());
        let with_ctx = err.with_context("Failed to finalize run");
        assert!(with_ctx.to_string().contains("Failed to finalize run"));
        assert!(with_ctx.is_fatal());
    }

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        let err = MeterLogError::from(DeviceError::ReadFailure("timeout".into()));
        assert!(!err.is_fatal());

        let err = MeterLogError::DurableWrite {
            path: PathBuf::from("run.csv"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("disk full"));
    }
}
