//! Measurement session
//!
//! Glues the producer side ([`RunController`]) to the consumer side
//! ([`RenderLoop`]) around one shared [`SampleQueue`], and owns the
//! configuration both were built from. A frontend drives a session by
//! calling [`Session::tick`] from its event loop.

use crate::acquisition::{RunController, RunEvent, SampleQueue};
use crate::config::{AppConfig, ReportOptions};
use crate::device::Device;
use crate::error::{MeterLogError, Result};
use crate::render::{RenderLoop, Renderer};
use crate::report::{JsonWorkbookWriter, ReportMetadata, ReportWriter};
use crate::storage::find_orphaned_buffers;
use crate::types::RunState;
use crate::view::{ViewBounds, ViewMode};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Session {
    config: AppConfig,
    controller: RunController,
    render: RenderLoop,
    writer: Arc<dyn ReportWriter>,
    /// Metadata of the most recent run, used for manual saves
    metadata: Option<ReportMetadata>,
    /// Buffers waiting to be finalized, one at a time
    recovery: VecDeque<PathBuf>,
}

impl Session {
    /// Create a session writing JSON workbooks
    pub fn new(config: AppConfig, device: Box<dyn Device>) -> Result<Self> {
        Self::with_writer(config, device, Arc::new(JsonWorkbookWriter::new()))
    }

    pub fn with_writer(
        config: AppConfig,
        device: Box<dyn Device>,
        writer: Arc<dyn ReportWriter>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = SampleQueue::new();
        let controller = RunController::new(
            device,
            queue.sender(),
            &config.output,
            config.report,
            Arc::clone(&writer),
        );
        let render = RenderLoop::new(queue, &config.view);

        Ok(Self {
            config,
            controller,
            render,
            writer,
            metadata: None,
            recovery: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.controller.state()
    }

    pub fn is_finalizing(&self) -> bool {
        self.controller.is_finalizing()
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    pub fn render(&self) -> &RenderLoop {
        &self.render
    }

    /// Identity of the instrument, `None` while a run holds it
    pub fn device_identity(&self) -> Option<String> {
        self.controller.device().map(|d| d.identity())
    }

    /// Replace the configuration
    ///
    /// Output and instrument settings can only change while idle.
    pub fn update_config(&mut self, config: AppConfig) -> Result<()> {
        config.validate()?;
        let idle = self.state().is_idle();
        if !idle && (config.output != self.config.output || config.device != self.config.device) {
            return Err(MeterLogError::RunActive);
        }

        if config.output != self.config.output {
            self.controller.set_output(&config.output)?;
        }
        self.controller.set_report_options(config.report);
        self.render.set_show_statistics(config.view.show_statistics);
        if let ViewMode::Scroll { window_seconds } = self.render.policy().mode() {
            if window_seconds != config.view.scroll_window_seconds {
                self.render.set_mode(ViewMode::Scroll {
                    window_seconds: config.view.scroll_window_seconds,
                })?;
            }
        }

        self.config = config;
        Ok(())
    }

    pub fn set_report_options(&mut self, options: ReportOptions) {
        self.config.report = options;
        self.controller.set_report_options(options);
    }

    /// Swap the instrument, only while idle
    pub fn replace_device(&mut self, device: Box<dyn Device>) -> Result<Option<Box<dyn Device>>> {
        self.controller.replace_device(device)
    }

    /// Start a run with the configured acquisition and instrument settings
    pub fn start(&mut self) -> Result<()> {
        let acquisition = self.config.acquisition;
        self.controller.check_start(&acquisition)?;

        let setup = self.config.device.params();
        let identity = self.device_identity().unwrap_or_default();

        // Leftovers of the previous run are taken in before the sampler produces
        self.render.settle();
        self.controller.start(acquisition, &setup)?;
        self.render.begin_run(&acquisition);
        self.metadata = Some(ReportMetadata::for_run(
            &identity,
            &setup,
            acquisition.interval_ms,
            chrono::Local::now(),
        ));
        Ok(())
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    /// Clear the trend, rejected during a run
    pub fn clear(&mut self) -> Result<()> {
        self.render.clear(self.state())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.render.set_mode(mode)
    }

    /// Switch to scroll mode with the configured window
    pub fn scroll_mode(&self) -> ViewMode {
        ViewMode::Scroll {
            window_seconds: self.config.view.scroll_window_seconds,
        }
    }

    pub fn set_manual_bounds(&mut self, bounds: ViewBounds) -> Result<()> {
        self.render.set_manual_bounds(bounds)
    }

    pub fn set_show_statistics(&mut self, show: bool) {
        self.config.view.show_statistics = show;
        self.render.set_show_statistics(show);
    }

    /// Process controller messages and run a render tick
    ///
    /// Controller messages are handled first so the frame reflects the
    /// state after them.
    pub fn tick(&mut self, renderer: &mut dyn Renderer) -> Vec<RunEvent> {
        let events = self.controller.poll();
        self.advance_recovery();
        self.render.tick(self.state(), renderer);
        events
    }

    /// Like [`tick`](Self::tick), but only renders when the cadence is due
    pub fn tick_if_due(&mut self, now: Instant, renderer: &mut dyn Renderer) -> Vec<RunEvent> {
        if self.render.is_due(now) {
            self.tick(renderer)
        } else {
            self.controller.poll()
        }
    }

    /// Save the trend shown on screen, available after a run has stopped
    pub fn save_visible(&self, path: &Path) -> Result<usize> {
        let metadata = self.metadata.clone().unwrap_or_default();
        self.render
            .save_visible(path, self.writer.as_ref(), &self.config.report, &metadata)
    }

    /// Default path for a manual save
    pub fn suggested_save_path(&self) -> PathBuf {
        let stem = format!(
            "{}_{}",
            self.config.output.prefix,
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        self.config
            .output
            .directory
            .join(format!("{}.{}", stem, self.writer.extension()))
    }

    /// Finalize a preserved buffer again
    pub fn retry_finalization(&mut self, buffer: &Path) -> Result<()> {
        self.controller.retry_finalization(buffer)
    }

    /// Buffers whose finalization failed in this session
    pub fn failed_buffers(&self) -> Vec<PathBuf> {
        self.controller.failed_buffers()
    }

    /// Buffers left in the output directory by an earlier, interrupted session
    pub fn orphaned_buffers(&self) -> Vec<PathBuf> {
        find_orphaned_buffers(self.controller.output_directory(), &self.config.output.prefix)
    }

    /// Queue every orphaned buffer for finalization
    ///
    /// Buffers are finalized one at a time from [`tick`](Self::tick).
    /// Returns how many were queued.
    pub fn recover_orphans(&mut self) -> usize {
        let mut queued = 0;
        for path in self.orphaned_buffers() {
            if !self.recovery.contains(&path) {
                self.recovery.push_back(path);
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!("Queued {} orphaned buffers for recovery", queued);
        }
        queued
    }

    pub fn pending_recovery(&self) -> usize {
        self.recovery.len()
    }

    fn advance_recovery(&mut self) {
        if !self.state().is_idle() || self.is_finalizing() {
            return;
        }
        let Some(path) = self.recovery.pop_front() else {
            return;
        };
        if !path.exists() {
            tracing::debug!("Orphaned buffer {:?} is gone, skipping", path);
            return;
        }
        if let Err(e) = self.controller.retry_finalization(&path) {
            tracing::warn!("Could not recover {:?}: {}", path, e);
        }
    }

    /// Stop any run, wait for its finalization and drain what is left
    pub fn shutdown(&mut self, timeout: Duration) -> Vec<RunEvent> {
        self.recovery.clear();
        self.controller.shutdown(timeout)
    }
}
