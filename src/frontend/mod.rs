//! Frontend module for meterlog
//!
//! The UI is built with egui/eframe and egui_plot. It owns a [`Session`] and
//! drives it from [`eframe::App::update`]: every repaint polls the run
//! controller and, at the render cadence, runs a render tick into a
//! [`PlotSnapshot`]. Panels return [`AppAction`]s which are applied after
//! layout.
//!
//! # Layout
//!
//! ```text
//! +--------------------------------------------+
//! | toolbar: run controls, view mode, stats    |
//! +-----------+--------------------------------+
//! | settings  | live reading                   |
//! |           | statistics                     |
//! |           | trend plot                     |
//! +-----------+--------------------------------+
//! | status bar: instrument, samples, retries   |
//! +--------------------------------------------+
//! ```

pub mod panels;
pub mod plot;
pub mod state;
pub mod status_bar;
pub mod toolbar;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::device::PendingDevice;
use crate::error::MeterLogError;
use crate::render::RENDER_TICK;
use crate::session::Session;
use crate::view::ViewMode;

pub use panels::SettingsPanel;
pub use plot::PlotSnapshot;
pub use state::{AppAction, Severity, StatusLog};

/// How long closing the window waits for the last report
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main application
pub struct MeterApp {
    session: Session,
    snapshot: PlotSnapshot,
    log: StatusLog,
    /// Settings being edited
    draft: AppConfig,
    instrument: String,
    simulated: bool,
    orphaned: usize,
    show_history: bool,
    /// Instrument connection started by the settings panel
    connecting: Option<PendingDevice>,
}

impl MeterApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, session: Session) -> Self {
        let draft = session.config().clone();
        let instrument = session.device_identity().unwrap_or_default();
        let simulated = session
            .controller()
            .device()
            .is_some_and(|d| d.is_simulated());
        let orphaned = session.orphaned_buffers().len();

        let mut log = StatusLog::default();
        if simulated {
            log.warn("No instrument connected, readings are simulated");
        }
        if orphaned > 0 {
            log.warn(format!(
                "Found {} buffers from an interrupted session",
                orphaned
            ));
        }

        Self {
            session,
            snapshot: PlotSnapshot::default(),
            log,
            draft,
            instrument,
            simulated,
            orphaned,
            show_history: false,
            connecting: None,
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Start => {
                if let Some(pending) = &self.connecting {
                    self.log.warn(format!(
                        "Still connecting to {}, start when the instrument is ready",
                        pending.resource()
                    ));
                } else if let Err(e) = self.session.start() {
                    self.report_error("Start failed", &e);
                }
            }
            AppAction::Stop => self.session.stop(),
            AppAction::Clear => {
                if let Err(e) = self.session.clear() {
                    self.report_error("Clear failed", &e);
                }
            }
            AppAction::SaveVisible => self.save_visible(),
            AppAction::SetViewMode(mode) => {
                if let Err(e) = self.session.set_view_mode(mode) {
                    self.report_error("View mode", &e);
                }
            }
            AppAction::SetManualBounds(bounds) => {
                if let Err(e) = self.session.set_manual_bounds(bounds) {
                    tracing::debug!("Ignoring view bounds: {}", e);
                }
            }
            AppAction::ShowStatistics(show) => self.session.set_show_statistics(show),
            AppAction::ApplyConfig(config) => self.apply_config(*config),
            AppAction::RetryFinalization(path) => {
                if let Err(e) = self.session.retry_finalization(&path) {
                    self.report_error("Retry failed", &e);
                }
            }
            AppAction::RecoverOrphans => {
                let queued = self.session.recover_orphans();
                self.log.info(format!("Recovering {} buffers", queued));
                self.orphaned = 0;
            }
        }
    }

    fn apply_config(&mut self, config: AppConfig) {
        let resource_changed = config.device.resource != self.session.config().device.resource;

        if let Err(e) = self.session.update_config(config.clone()) {
            self.report_error("Settings rejected", &e);
            return;
        }

        if resource_changed {
            match PendingDevice::spawn(&config.device.resource) {
                Ok(pending) => {
                    self.instrument = format!("Connecting to {}...", pending.resource());
                    self.connecting = Some(pending);
                }
                Err(e) => {
                    self.report_error("Instrument change failed", &MeterLogError::Io(e));
                }
            }
        }

        if let Err(e) = config.save_default() {
            tracing::warn!("Failed to save configuration: {}", e);
        }
        self.orphaned = self.session.orphaned_buffers().len();
        self.draft = config;
        self.log.info("Settings applied");
    }

    /// Swap in the instrument once its background connection has finished
    fn poll_connection(&mut self) {
        let Some(device) = self.connecting.as_ref().and_then(PendingDevice::try_take) else {
            return;
        };
        self.connecting = None;
        self.simulated = device.is_simulated();
        self.instrument = device.identity();

        match self.session.replace_device(device) {
            Ok(old) => {
                if let Some(mut old) = old {
                    old.disconnect();
                }
                if self.simulated {
                    self.log.warn("Instrument not reachable, readings are simulated");
                } else {
                    self.log.info(format!("Connected to {}", self.instrument));
                }
            }
            Err(e) => self.report_error("Instrument change failed", &e),
        }
    }

    fn save_visible(&mut self) {
        let suggested = self.session.suggested_save_path();
        let directory = suggested
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let file_name = suggested
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(path) = rfd::FileDialog::new()
            .set_title("Save Measurement")
            .set_directory(directory)
            .set_file_name(file_name)
            .add_filter("Workbook", &["json"])
            .save_file()
        else {
            return;
        };

        match self.session.save_visible(&path) {
            Ok(rows) => self
                .log
                .info(format!("Saved {} samples to {}", rows, path.display())),
            Err(e) => self.report_error("Save failed", &e),
        }
    }

    fn report_error(&mut self, what: &str, error: &MeterLogError) {
        self.log.report(what, error);
    }

    fn value_label(&self) -> String {
        self.session.config().device.function.value_label()
    }
}

impl eframe::App for MeterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_connection();
        let events = self
            .session
            .tick_if_due(Instant::now(), &mut self.snapshot);
        for event in &events {
            self.log.record(event);
        }

        let busy = !self.session.state().is_idle()
            || self.session.is_finalizing()
            || self.session.pending_recovery() > 0
            || self.connecting.is_some()
            || self.snapshot.state != self.session.state();
        if busy || !events.is_empty() {
            ctx.request_repaint_after(RENDER_TICK);
        }

        let mut actions = Vec::new();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            let toolbar = toolbar::ToolbarContext {
                state: self.session.state(),
                finalizing: self.session.is_finalizing(),
                connecting: self.connecting.is_some(),
                has_data: !self.session.render().trend().is_empty(),
                manual_save_available: self.session.render().manual_save_available(),
                mode: self.session.render().policy().mode(),
                scroll_window_seconds: self.session.config().view.scroll_window_seconds,
                show_statistics: self.session.config().view.show_statistics,
            };
            actions.extend(toolbar::render_toolbar(ui, &toolbar));
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            let failed = self.session.failed_buffers();
            let status = status_bar::StatusBarContext {
                log: &self.log,
                samples: self.session.render().trend().len(),
                instrument: &self.instrument,
                simulated: self.simulated,
                failed_buffers: &failed,
                orphaned_buffers: self.orphaned,
                finalizing: self.session.is_finalizing(),
            };
            ui.horizontal(|ui| {
                if ui.small_button(if self.show_history { "▼" } else { "▲" }).clicked() {
                    self.show_history = !self.show_history;
                }
                actions.extend(status_bar::render_status_bar(ui, &status));
            });
            if self.show_history {
                ui.separator();
                ui.set_max_height(160.0);
                status_bar::render_history(ui, &self.log);
            }
        });

        egui::SidePanel::left("settings")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                let idle = self.session.state().is_idle();
                if let Some(action) =
                    SettingsPanel::render(ui, &mut self.draft, self.session.config(), idle)
                {
                    actions.push(action);
                }
            });

        let value_label = self.value_label();
        let unit = self.session.config().device.function.unit();
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::render_live_reading(ui, &self.snapshot, unit);
            if self.session.config().view.show_statistics {
                plot::render_stats(ui, self.snapshot.stats.as_ref());
            }
            ui.separator();
            if let Some(bounds) = plot::render_plot(ui, &mut self.snapshot, &value_label) {
                actions.push(AppAction::SetManualBounds(bounds));
            }
        });

        for action in actions {
            self.handle_action(action);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if !self.session.state().is_idle() {
            tracing::info!("Window closed during a run, stopping");
        }
        for event in self.session.shutdown(SHUTDOWN_TIMEOUT) {
            self.log.record(&event);
            if let Some(message) = self.log.latest() {
                tracing::info!("{}", message.text);
            }
        }

        let mut config = self.session.config().clone();
        config.view.autoscale = self.session.render().policy().mode() != ViewMode::Manual;
        if let Err(e) = config.save_default() {
            tracing::warn!("Failed to save configuration on exit: {}", e);
        }
    }
}
