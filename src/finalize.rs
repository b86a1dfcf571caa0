//! Finalizer
//!
//! Turns the durable buffer of a stopped run into a report. The buffer, not
//! the trend shown on screen, is the source: the trend may have been cleared
//! or capped, the buffer holds every row the sampler wrote.
//!
//! The buffer file is deleted only after the report has been written. On any
//! failure it stays on disk so the run can be finalized again later, either
//! through [`RunController::retry_finalization`] or by the orphan recovery
//! at startup.
//!
//! [`RunController::retry_finalization`]: crate::acquisition::RunController::retry_finalization

use crate::config::ReportOptions;
use crate::error::{MeterLogError, Result, ResultExt};
use crate::report::{build_report, ReportMetadata, ReportWriter};
use crate::storage::{read_rows, DurableBuffer};
use crate::types::DurableRow;
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Immutable snapshot of one run's rows plus what to do with them
#[derive(Debug, Clone)]
pub struct FinalizationJob {
    buffer_path: PathBuf,
    rows: Vec<DurableRow>,
    options: ReportOptions,
    metadata: ReportMetadata,
}

impl FinalizationJob {
    /// Close the buffer and snapshot every row it holds
    pub fn capture(
        buffer: &DurableBuffer,
        options: ReportOptions,
        metadata: ReportMetadata,
    ) -> Result<Self> {
        buffer.close()?;
        let rows = buffer.read_rows()?;
        Ok(Self {
            buffer_path: buffer.path().to_path_buf(),
            rows,
            options,
            metadata,
        })
    }

    /// Snapshot a buffer file that is no longer open
    pub fn from_path(
        buffer_path: impl Into<PathBuf>,
        options: ReportOptions,
        metadata: ReportMetadata,
    ) -> Result<Self> {
        let buffer_path = buffer_path.into();
        let rows = read_rows(&buffer_path)?;
        Ok(Self {
            buffer_path,
            rows,
            options,
            metadata,
        })
    }

    pub fn buffer_path(&self) -> &Path {
        &self.buffer_path
    }

    pub fn rows(&self) -> &[DurableRow] {
        &self.rows
    }

    /// Build and write the report, then delete the buffer
    ///
    /// Returns the number of rows in the report.
    pub fn run(&self, writer: &dyn ReportWriter, report_path: &Path) -> Result<usize> {
        let workbook = build_report(&self.rows, &self.options, &self.metadata);
        writer
            .write(&workbook, report_path)
            .with_context(|| format!("Failed to finalize {:?}", self.buffer_path))?;

        // Report is on disk, failing to delete the buffer is not an error
        if let Err(e) = std::fs::remove_file(&self.buffer_path) {
            tracing::warn!(
                "Report written but buffer {:?} could not be removed: {}",
                self.buffer_path,
                e
            );
        }

        tracing::info!(
            "Finalized {} rows from {:?} into {:?}",
            self.rows.len(),
            self.buffer_path,
            report_path
        );
        Ok(self.rows.len())
    }
}

/// Where a finalizer takes its rows from
#[derive(Debug, Clone)]
pub enum FinalizeSource {
    /// The buffer of the run that just stopped
    Buffer(Arc<DurableBuffer>),
    /// A buffer file left by an earlier failure or crash
    Path(PathBuf),
}

impl FinalizeSource {
    pub fn path(&self) -> &Path {
        match self {
            FinalizeSource::Buffer(buffer) => buffer.path(),
            FinalizeSource::Path(path) => path,
        }
    }
}

/// Terminal state of one finalization
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Completed {
        buffer: PathBuf,
        report: PathBuf,
        rows: usize,
    },
    /// The buffer is preserved and can be finalized again
    Failed {
        buffer: PathBuf,
        metadata: ReportMetadata,
        error: String,
    },
}

/// Finalize a buffer synchronously
pub fn finalize_path(
    buffer_path: &Path,
    options: ReportOptions,
    metadata: ReportMetadata,
    writer: &dyn ReportWriter,
    report_path: &Path,
) -> Result<usize> {
    FinalizationJob::from_path(buffer_path, options, metadata)?.run(writer, report_path)
}

/// One-shot background worker for a stopped run
pub struct Finalizer {
    pub source: FinalizeSource,
    pub options: ReportOptions,
    pub metadata: ReportMetadata,
    pub writer: Arc<dyn ReportWriter>,
    pub report_path: PathBuf,
}

impl Finalizer {
    /// Run on a background thread
    ///
    /// `in_flight` counts finalizers that have not reached a terminal state.
    /// It is incremented here and decremented once the outcome has been sent.
    pub fn spawn(
        self,
        outcomes: Sender<FinalizeOutcome>,
        in_flight: Arc<AtomicUsize>,
    ) -> std::io::Result<JoinHandle<()>> {
        in_flight.fetch_add(1, Ordering::SeqCst);

        let spawned = std::thread::Builder::new()
            .name("meterlog-finalizer".to_string())
            .spawn({
                let in_flight = in_flight.clone();
                move || {
                    let outcome = self.run();
                    let _ = outcomes.send(outcome);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            });

        if spawned.is_err() {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        spawned
    }

    /// Run on the current thread
    pub fn run(self) -> FinalizeOutcome {
        let buffer = self.source.path().to_path_buf();
        tracing::info!("Finalizing {:?}", buffer);

        let result = self
            .capture()
            .and_then(|job| job.run(self.writer.as_ref(), &self.report_path));

        match result {
            Ok(rows) => FinalizeOutcome::Completed {
                buffer,
                report: self.report_path,
                rows,
            },
            Err(e) => {
                tracing::error!("Finalization of {:?} failed, buffer kept: {}", buffer, e);
                FinalizeOutcome::Failed {
                    buffer,
                    metadata: self.metadata,
                    error: e.to_string(),
                }
            }
        }
    }

    fn capture(&self) -> Result<FinalizationJob> {
        let job = match &self.source {
            FinalizeSource::Buffer(buffer) => {
                FinalizationJob::capture(buffer, self.options, self.metadata.clone())
            }
            FinalizeSource::Path(path) => {
                FinalizationJob::from_path(path.clone(), self.options, self.metadata.clone())
            }
        };
        job.map_err(|e| match e {
            e @ MeterLogError::Finalization(_) => e,
            other => MeterLogError::Finalization(other.to_string()),
        })
    }
}
