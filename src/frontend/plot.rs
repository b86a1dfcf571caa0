//! Trend plot
//!
//! [`PlotSnapshot`] is the egui side of the render loop: it implements
//! [`Renderer`] by copying what it needs out of each frame, and the UI paints
//! from that copy on the next repaint.

use egui::{Color32, RichText, Ui};
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};

use crate::render::{RenderFrame, Renderer};
use crate::types::{RunState, Sample, SummaryStats};
use crate::view::{ViewBounds, ViewMode};

/// Relative bounds change that counts as a user pan or zoom
const BOUNDS_TOLERANCE: f64 = 1e-6;

/// Latest frame, owned
#[derive(Debug, Clone, Default)]
pub struct PlotSnapshot {
    points: Vec<[f64; 2]>,
    pub bounds: ViewBounds,
    pub mode: ViewMode,
    pub stats: Option<SummaryStats>,
    pub latest: Option<Sample>,
    pub state: RunState,
    pub manual_save_available: bool,
    /// Bounds last pushed into the plot widget in manual mode
    applied: Option<ViewBounds>,
}

impl Renderer for PlotSnapshot {
    fn redraw(&mut self, frame: &RenderFrame<'_>) {
        let known = self.points.len();
        if frame.samples.len() >= known
            && known > 0
            && frame.samples.get(known - 1).map(Sample::as_point) == self.points.last().copied()
        {
            self.points
                .extend(frame.samples[known..].iter().map(Sample::as_point));
        } else {
            self.points = frame.samples.iter().map(Sample::as_point).collect();
        }

        if frame.mode != self.mode || frame.bounds != self.bounds {
            self.applied = None;
        }
        self.bounds = frame.bounds;
        self.mode = frame.mode;
        self.stats = frame.stats;
        self.latest = frame.latest;
        self.state = frame.state;
        self.manual_save_available = frame.manual_save_available;
    }
}

impl PlotSnapshot {
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }
}

fn differs(a: &ViewBounds, b: &ViewBounds) -> bool {
    let width = (a.t_max - a.t_min).abs().max(a.v_max - a.v_min).max(1.0);
    [
        a.t_min - b.t_min,
        a.t_max - b.t_max,
        a.v_min - b.v_min,
        a.v_max - b.v_max,
    ]
    .iter()
    .any(|d| d.abs() > width * BOUNDS_TOLERANCE)
}

/// Paint the trend
///
/// Returns new manual bounds when the user panned or zoomed.
pub fn render_plot(ui: &mut Ui, snapshot: &mut PlotSnapshot, value_label: &str) -> Option<ViewBounds> {
    let manual = snapshot.mode == ViewMode::Manual;
    let bounds = snapshot.bounds;
    let apply = !manual || snapshot.applied.is_none();

    let plot = Plot::new("trend_plot")
        .allow_zoom(manual)
        .allow_drag(manual)
        .allow_scroll(manual)
        .allow_boxed_zoom(manual)
        .show_grid(true)
        .x_axis_label("Time (s)")
        .y_axis_label(value_label.to_string());

    let points = PlotPoints::from(snapshot.points.clone());
    let response = plot.show(ui, |plot_ui| {
        if apply {
            plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                [bounds.t_min, bounds.v_min],
                [bounds.t_max, bounds.v_max],
            ));
        }
        plot_ui.line(
            Line::new(value_label.to_string(), points)
                .color(Color32::from_rgb(100, 200, 255))
                .width(1.5),
        );
    });

    if !manual {
        return None;
    }
    if apply {
        snapshot.applied = Some(bounds);
        return None;
    }

    let shown = response.transform.bounds();
    let [t_min, v_min] = shown.min();
    let [t_max, v_max] = shown.max();
    let shown = ViewBounds::new(t_min, t_max, v_min, v_max);
    if shown.is_valid() && differs(&shown, &bounds) {
        snapshot.applied = Some(shown);
        snapshot.bounds = shown;
        Some(shown)
    } else {
        None
    }
}

/// Big live reading next to the run state
pub fn render_live_reading(ui: &mut Ui, snapshot: &PlotSnapshot, unit: &str) {
    ui.horizontal(|ui| {
        let text = match snapshot.latest {
            Some(sample) if sample.is_valid() => format!("{:.6} {}", sample.value, unit),
            Some(_) => "read error".to_string(),
            None => "---".to_string(),
        };
        ui.label(RichText::new(text).size(28.0).monospace());

        ui.separator();

        let (color, label) = match snapshot.state {
            RunState::Idle => (Color32::GRAY, "Idle"),
            RunState::Running => (Color32::GREEN, "Running"),
            RunState::Stopping => (Color32::YELLOW, "Stopping"),
        };
        ui.colored_label(color, format!("● {}", label));
    });
}

/// One-line statistics overlay
pub fn render_stats(ui: &mut Ui, stats: Option<&SummaryStats>) {
    let Some(stats) = stats else {
        return;
    };
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 12.0;
        ui.label(RichText::new(format!("n {}", stats.count)).small());
        ui.label(RichText::new(format!("mean {:.6}", stats.mean)).small());
        ui.label(RichText::new(format!("std {:.6}", stats.std)).small());
        ui.label(RichText::new(format!("min {:.6}", stats.min)).small());
        ui.label(RichText::new(format!("max {:.6}", stats.max)).small());
        ui.label(RichText::new(format!("p-p {:.6}", stats.peak_peak())).small());
    });
}
