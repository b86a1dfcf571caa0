//! Run state machine
//!
//! `Idle -> Running -> Stopping -> Idle`, with finalization tracked as a
//! separate in-flight count that can outlive the run. The controller is
//! driven from the UI thread: [`RunController::poll`] consumes sampler and
//! finalizer messages and never blocks on device or file I/O.

use super::queue::SampleSender;
use super::sampler::{RunContext, Sampler, SamplerEvent, SamplerHandle};
use crate::config::{AcquisitionConfig, OutputConfig, ReportOptions};
use crate::device::{Device, DeviceParams};
use crate::error::{MeterLogError, Result};
use crate::finalize::{FinalizeOutcome, FinalizeSource, Finalizer};
use crate::report::{ReportMetadata, ReportWriter};
use crate::storage::{DurableBuffer, FileNamer};
use crate::types::{RunState, StopReason};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Notifications for the front end
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        stem: String,
        /// `None` when the run is not persisted
        buffer: Option<PathBuf>,
    },
    /// Persistence failed for the current run; reported once per run
    PersistenceDegraded(String),
    Stopped {
        reason: StopReason,
        samples: usize,
    },
    FinalizationStarted {
        buffer: PathBuf,
    },
    Finalized {
        buffer: PathBuf,
        report: PathBuf,
        rows: usize,
    },
    /// The buffer was kept and can be passed to [`RunController::retry_finalization`]
    FinalizationFailed {
        buffer: PathBuf,
        error: String,
    },
}

struct ActiveRun {
    handle: SamplerHandle,
    buffer: Option<Arc<DurableBuffer>>,
    metadata: ReportMetadata,
    reason: StopReason,
}

/// Owns the device between runs and sequences sampler and finalizer
pub struct RunController {
    state: RunState,
    /// `None` while the sampler holds the device
    device: Option<Box<dyn Device>>,
    queue: SampleSender,
    sampler_tx: Sender<SamplerEvent>,
    sampler_rx: Receiver<SamplerEvent>,
    outcome_tx: Sender<FinalizeOutcome>,
    outcome_rx: Receiver<FinalizeOutcome>,
    /// Finalizers that have not reached a terminal state
    finalizing: Arc<AtomicUsize>,
    active: Option<ActiveRun>,
    namer: FileNamer,
    writer: Arc<dyn ReportWriter>,
    report_options: ReportOptions,
    /// Buffers whose finalization failed, with the metadata of their run
    failed: HashMap<PathBuf, ReportMetadata>,
    pending: Vec<RunEvent>,
}

impl RunController {
    pub fn new(
        device: Box<dyn Device>,
        queue: SampleSender,
        output: &OutputConfig,
        report_options: ReportOptions,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        let (sampler_tx, sampler_rx) = unbounded();
        let (outcome_tx, outcome_rx) = unbounded();

        Self {
            state: RunState::Idle,
            device: Some(device),
            queue,
            sampler_tx,
            sampler_rx,
            outcome_tx,
            outcome_rx,
            finalizing: Arc::new(AtomicUsize::new(0)),
            active: None,
            namer: FileNamer::new(output),
            writer,
            report_options,
            failed: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether any finalizer has not reached a terminal state yet
    pub fn is_finalizing(&self) -> bool {
        self.finalizing.load(Ordering::SeqCst) > 0
    }

    /// The idle device, `None` while a run holds it
    pub fn device(&self) -> Option<&dyn Device> {
        self.device.as_deref()
    }

    /// Swap the instrument, only while idle
    pub fn replace_device(&mut self, device: Box<dyn Device>) -> Result<Option<Box<dyn Device>>> {
        if !self.state.is_idle() {
            return Err(MeterLogError::RunActive);
        }
        Ok(self.device.replace(device))
    }

    /// Report options used by the next finalization
    pub fn set_report_options(&mut self, options: ReportOptions) {
        self.report_options = options;
    }

    pub fn set_output(&mut self, output: &OutputConfig) -> Result<()> {
        if !self.state.is_idle() {
            return Err(MeterLogError::RunActive);
        }
        self.namer = FileNamer::new(output);
        Ok(())
    }

    pub fn output_directory(&self) -> &Path {
        self.namer.directory()
    }

    /// Check whether [`start`](Self::start) would accept `config` right now
    pub fn check_start(&self, config: &AcquisitionConfig) -> Result<()> {
        if !self.state.is_idle() {
            return Err(MeterLogError::RunActive);
        }
        if self.is_finalizing() {
            tracing::warn!("Start rejected, previous run is still being finalized");
            return Err(MeterLogError::FinalizationInProgress);
        }
        config.validate()
    }

    /// Start a run
    ///
    /// Rejected while a run is active, while the previous run is still being
    /// finalized, or when `config` is invalid. Nothing is started on error.
    pub fn start(&mut self, config: AcquisitionConfig, setup: &DeviceParams) -> Result<()> {
        self.check_start(&config)?;

        let mut device = self.device.take().ok_or_else(|| {
            MeterLogError::Configuration("no instrument available".to_string())
        })?;
        if let Err(e) = device.configure(setup) {
            self.device = Some(device);
            return Err(e.into());
        }

        let now = chrono::Local::now();
        let stem = self.namer.next_stem(now);
        let (buffer, degraded) = match config.persist.then(|| self.open_buffer(&stem)) {
            Some(Ok(buffer)) => (Some(buffer), None),
            Some(Err(e)) => {
                tracing::warn!("Running without persistence: {}", e);
                (None, Some(e.to_string()))
            }
            None => (None, None),
        };

        let metadata = ReportMetadata::for_run(&device.identity(), setup, config.interval_ms, now);

        let ctx = RunContext {
            config,
            queue: self.queue.clone(),
            buffer: buffer.clone(),
            running: Arc::new(AtomicBool::new(true)),
            events: self.sampler_tx.clone(),
        };
        let handle = Sampler::spawn(ctx, device)?;

        tracing::info!(
            "Run {} started: {} every {} ms",
            stem,
            setup.function,
            config.interval_ms
        );
        self.pending.push(RunEvent::Started {
            stem,
            buffer: buffer.as_ref().map(|b| b.path().to_path_buf()),
        });
        if let Some(message) = degraded {
            self.pending.push(RunEvent::PersistenceDegraded(message));
        }
        self.active = Some(ActiveRun {
            handle,
            buffer,
            metadata,
            reason: StopReason::User,
        });
        self.state = RunState::Running;
        Ok(())
    }

    fn open_buffer(&self, stem: &str) -> Result<Arc<DurableBuffer>> {
        let directory = self.namer.directory();
        std::fs::create_dir_all(directory).map_err(|source| MeterLogError::DurableWrite {
            path: directory.to_path_buf(),
            source,
        })?;
        Ok(Arc::new(DurableBuffer::open(self.namer.buffer_path(stem))?))
    }

    /// Request the sampler to exit at its next loop boundary
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            tracing::debug!("Stop ignored in state {}", self.state);
            return;
        }
        if let Some(run) = &self.active {
            run.handle.stop();
        }
        self.state = RunState::Stopping;
        tracing::info!("Stop requested");
    }

    /// Process sampler and finalizer messages
    pub fn poll(&mut self) -> Vec<RunEvent> {
        let mut events = std::mem::take(&mut self.pending);

        // Checked before draining so every message of a finished thread is seen
        let sampler_finished = self
            .active
            .as_ref()
            .is_some_and(|run| run.handle.is_finished());

        let sampler_events: Vec<SamplerEvent> = self.sampler_rx.try_iter().collect();
        for event in sampler_events {
            match event {
                SamplerEvent::PersistenceDegraded(message) => {
                    events.push(RunEvent::PersistenceDegraded(message));
                }
                SamplerEvent::LimitReached { samples } => {
                    tracing::info!("Run reached its limit of {} samples", samples);
                    if let Some(run) = self.active.as_mut() {
                        run.reason = StopReason::LimitReached;
                    }
                    self.state = RunState::Stopping;
                }
                SamplerEvent::Exited { samples } => self.on_sampler_exit(samples, &mut events),
            }
        }

        if sampler_finished && self.active.is_some() {
            let samples = self
                .active
                .as_ref()
                .and_then(|run| run.buffer.as_ref())
                .map_or(0, |b| b.rows_written() as usize);
            self.on_sampler_exit(samples, &mut events);
        }

        let outcomes: Vec<FinalizeOutcome> = self.outcome_rx.try_iter().collect();
        for outcome in outcomes {
            match outcome {
                FinalizeOutcome::Completed {
                    buffer,
                    report,
                    rows,
                } => {
                    self.failed.remove(&buffer);
                    events.push(RunEvent::Finalized {
                        buffer,
                        report,
                        rows,
                    });
                }
                FinalizeOutcome::Failed {
                    buffer,
                    metadata,
                    error,
                } => {
                    self.failed.insert(buffer.clone(), metadata);
                    events.push(RunEvent::FinalizationFailed { buffer, error });
                }
            }
        }

        events
    }

    fn on_sampler_exit(&mut self, samples: usize, events: &mut Vec<RunEvent>) {
        let Some(run) = self.active.take() else {
            return;
        };

        self.device = run.handle.join();
        self.state = RunState::Idle;
        tracing::info!("Run stopped ({:?}) after {} samples", run.reason, samples);
        events.push(RunEvent::Stopped {
            reason: run.reason,
            samples,
        });

        if let Some(buffer) = run.buffer {
            let report_path = self.report_path_for(buffer.path());
            self.spawn_finalizer(FinalizeSource::Buffer(buffer), run.metadata, report_path, events);
        }
    }

    fn report_path_for(&self, buffer: &Path) -> PathBuf {
        buffer.with_extension(self.writer.extension())
    }

    fn spawn_finalizer(
        &mut self,
        source: FinalizeSource,
        metadata: ReportMetadata,
        report_path: PathBuf,
        events: &mut Vec<RunEvent>,
    ) {
        let buffer = source.path().to_path_buf();
        let finalizer = Finalizer {
            source,
            options: self.report_options,
            metadata: metadata.clone(),
            writer: self.writer.clone(),
            report_path,
        };

        match finalizer.spawn(self.outcome_tx.clone(), self.finalizing.clone()) {
            Ok(_) => events.push(RunEvent::FinalizationStarted { buffer }),
            Err(e) => {
                tracing::error!("Failed to start finalizer for {:?}: {}", buffer, e);
                self.failed.insert(buffer.clone(), metadata);
                events.push(RunEvent::FinalizationFailed {
                    buffer,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Finalize a preserved buffer again
    ///
    /// Works for buffers whose finalization failed in this session and for
    /// orphaned buffers found on disk.
    pub fn retry_finalization(&mut self, buffer: &Path) -> Result<()> {
        if self.is_finalizing() {
            return Err(MeterLogError::FinalizationInProgress);
        }
        let in_use = self
            .active
            .as_ref()
            .and_then(|run| run.buffer.as_ref())
            .is_some_and(|b| b.path() == buffer);
        if in_use {
            return Err(MeterLogError::RunActive);
        }

        let metadata = self
            .failed
            .remove(buffer)
            .unwrap_or_else(|| ReportMetadata::recovered(buffer));
        let report_path = self.report_path_for(buffer);
        tracing::info!("Retrying finalization of {:?}", buffer);
        let mut events = Vec::new();
        self.spawn_finalizer(
            FinalizeSource::Path(buffer.to_path_buf()),
            metadata,
            report_path,
            &mut events,
        );
        self.pending.extend(events);
        Ok(())
    }

    /// Buffers whose finalization failed in this session
    pub fn failed_buffers(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.failed.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Poll until the run is idle and no finalizer is active, or until `timeout`
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<RunEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        loop {
            events.extend(self.poll());
            if self.state.is_idle() && !self.is_finalizing() {
                // The outcome is sent before the count drops
                events.extend(self.poll());
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!("Timed out waiting for the run to settle");
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        events
    }

    /// Stop any run and wait for it and its finalization to finish
    pub fn shutdown(&mut self, timeout: Duration) -> Vec<RunEvent> {
        self.stop();
        self.wait_idle(timeout)
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.handle.stop();
            if let Some(mut device) = run.handle.join() {
                device.disconnect();
            }
        } else if let Some(device) = self.device.as_mut() {
            device.disconnect();
        }
    }
}
