//! Render loop
//!
//! Runs on the UI thread at a fixed cadence ([`RENDER_TICK`]), independent of
//! the sampling interval. Every tick drains the sample queue without waiting,
//! appends to the trend buffer, recomputes the view bounds and the statistics
//! and hands a [`RenderFrame`] to the [`Renderer`]. Nothing here touches the
//! device or the disk, except the explicit manual save.

use crate::acquisition::SampleQueue;
use crate::config::{AcquisitionConfig, ReportOptions, ViewConfig};
use crate::error::{MeterLogError, Result};
use crate::report::{build_report, ReportMetadata, ReportWriter};
use crate::types::{DurableRow, RunState, Sample, SummaryStats};
use crate::view::{TrendBuffer, ViewBounds, ViewMode, ViewPolicy};
use std::path::Path;
use std::time::{Duration, Instant};

/// Target time between two ticks
pub const RENDER_TICK: Duration = Duration::from_millis(80);

/// Statistics are shown from this many samples on
pub const MIN_STATS_SAMPLES: usize = 2;

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone)]
pub struct RenderFrame<'a> {
    pub samples: &'a [Sample],
    pub bounds: ViewBounds,
    pub mode: ViewMode,
    pub stats: Option<SummaryStats>,
    pub latest: Option<Sample>,
    pub state: RunState,
    pub manual_save_available: bool,
    /// Samples drained from the queue in this tick
    pub received: usize,
}

/// Draws frames; the actual painting is up to the implementation
pub trait Renderer {
    fn redraw(&mut self, frame: &RenderFrame<'_>);
}

/// Consumer side of the sample queue
pub struct RenderLoop {
    queue: SampleQueue,
    trend: TrendBuffer,
    policy: ViewPolicy,
    show_statistics: bool,
    stats: Option<SummaryStats>,
    manual_save_available: bool,
    last_tick: Option<Instant>,
}

impl RenderLoop {
    pub fn new(queue: SampleQueue, view: &ViewConfig) -> Self {
        let mode = if view.autoscale {
            ViewMode::Autoscale
        } else {
            ViewMode::Manual
        };

        Self {
            queue,
            trend: TrendBuffer::new(None),
            policy: ViewPolicy::new(mode),
            show_statistics: view.show_statistics,
            stats: None,
            manual_save_available: false,
            last_tick: None,
        }
    }

    pub fn trend(&self) -> &TrendBuffer {
        &self.trend
    }

    pub fn policy(&self) -> &ViewPolicy {
        &self.policy
    }

    pub fn stats(&self) -> Option<SummaryStats> {
        self.stats
    }

    pub fn manual_save_available(&self) -> bool {
        self.manual_save_available
    }

    /// Whether a tick is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_tick
            .map_or(true, |last| now.duration_since(last) >= RENDER_TICK)
    }

    /// Fold samples still queued from a finished run into its trend
    ///
    /// Must run before the next sampler starts, so that afterwards the queue
    /// only carries samples of the new run.
    pub fn settle(&mut self) -> usize {
        self.absorb(RunState::Idle)
    }

    /// Fresh trend capped at the run's limit
    ///
    /// Leaves the queue alone: once the sampler is running, everything in it
    /// belongs to the new run.
    pub fn begin_run(&mut self, config: &AcquisitionConfig) {
        self.trend.clear();
        self.trend.set_capacity(config.limit());
        self.stats = None;
        self.manual_save_available = false;
        self.policy.reset(&self.trend);
    }

    /// One render tick
    ///
    /// Returns the number of samples taken from the queue.
    pub fn tick(&mut self, state: RunState, renderer: &mut dyn Renderer) -> usize {
        self.last_tick = Some(Instant::now());
        let received = self.absorb(state);
        renderer.redraw(&self.frame(state, received));
        received
    }

    fn absorb(&mut self, state: RunState) -> usize {
        let incoming = self.queue.drain();
        let received = incoming.len();
        let dropped = self.trend.extend(incoming);
        if dropped > 0 {
            tracing::warn!("Trend buffer full, dropped {} samples", dropped);
        }

        self.policy.update(&self.trend);

        self.stats = if self.show_statistics && self.trend.len() >= MIN_STATS_SAMPLES {
            self.trend.stats()
        } else {
            None
        };

        if state.is_idle() && !self.trend.is_empty() {
            self.manual_save_available = true;
        }

        if received > 0 {
            tracing::trace!("Tick: {} new samples, {} in trend", received, self.trend.len());
        }
        received
    }

    /// The frame for the current state without draining the queue
    pub fn frame(&self, state: RunState, received: usize) -> RenderFrame<'_> {
        RenderFrame {
            samples: self.trend.samples(),
            bounds: self.policy.bounds(),
            mode: self.policy.mode(),
            stats: self.stats,
            latest: self.trend.last().copied(),
            state,
            manual_save_available: self.manual_save_available,
            received,
        }
    }

    /// Discard the trend, only while idle
    pub fn clear(&mut self, state: RunState) -> Result<()> {
        if !state.is_idle() {
            tracing::warn!("Clear rejected while the run is {}", state);
            return Err(MeterLogError::RunActive);
        }

        self.queue.drain();
        self.trend.clear();
        self.stats = None;
        self.manual_save_available = false;
        self.policy.reset(&self.trend);
        tracing::info!("Trend cleared");
        Ok(())
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.policy.set_mode(mode, &self.trend)
    }

    pub fn set_manual_bounds(&mut self, bounds: ViewBounds) -> Result<()> {
        self.policy.set_manual_bounds(bounds)
    }

    pub fn set_show_statistics(&mut self, show: bool) {
        self.show_statistics = show;
        if !show {
            self.stats = None;
        }
    }

    /// Write the trend shown on screen as a report
    ///
    /// Wall clock times are reconstructed from the time of the save and the
    /// elapsed time of the last sample.
    pub fn save_visible(
        &self,
        path: &Path,
        writer: &dyn ReportWriter,
        options: &ReportOptions,
        metadata: &ReportMetadata,
    ) -> Result<usize> {
        if !self.manual_save_available {
            return Err(MeterLogError::Configuration(
                "nothing to save until a run has stopped".to_string(),
            ));
        }

        let now = chrono::Local::now();
        let last = self.trend.last().map_or(0.0, |s| s.elapsed);
        let rows: Vec<DurableRow> = self
            .trend
            .samples()
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let behind_ms = ((last - sample.elapsed) * 1000.0) as i64;
                let behind = chrono::Duration::milliseconds(behind_ms);
                DurableRow {
                    index: i as u64 + 1,
                    elapsed: sample.elapsed,
                    value: sample.value,
                    wallclock: (now - behind).format("%H:%M:%S%.3f").to_string(),
                }
            })
            .collect();

        writer.write(&build_report(&rows, options, metadata), path)?;
        tracing::info!("Saved {} visible samples to {:?}", rows.len(), path);
        Ok(rows.len())
    }
}
