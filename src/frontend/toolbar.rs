//! Toolbar: run controls and view mode

use egui::{Color32, RichText, Ui};

use crate::frontend::state::AppAction;
use crate::types::RunState;
use crate::view::ViewMode;

/// Context needed to render the toolbar.
pub struct ToolbarContext {
    pub state: RunState,
    pub finalizing: bool,
    /// An instrument connection is still being set up
    pub connecting: bool,
    pub has_data: bool,
    pub manual_save_available: bool,
    pub mode: ViewMode,
    /// Window used when switching to scroll mode
    pub scroll_window_seconds: f64,
    pub show_statistics: bool,
}

/// Render the toolbar, returning the actions the user triggered
pub fn render_toolbar(ui: &mut Ui, ctx: &ToolbarContext) -> Vec<AppAction> {
    let mut actions = Vec::new();

    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 4.0;

        // === Run group ===
        let can_start = ctx.state.is_idle() && !ctx.finalizing && !ctx.connecting;
        let waiting_for = if ctx.connecting {
            "Wait for the instrument to connect"
        } else {
            "Wait for the previous report to be written"
        };
        if ui
            .add_enabled(can_start, egui::Button::new("▶ Start"))
            .on_disabled_hover_text(waiting_for)
            .clicked()
        {
            actions.push(AppAction::Start);
        }
        if ui
            .add_enabled(ctx.state.is_running(), egui::Button::new("⏹ Stop"))
            .clicked()
        {
            actions.push(AppAction::Stop);
        }
        if ui
            .add_enabled(ctx.state.is_idle() && ctx.has_data, egui::Button::new("Clear"))
            .clicked()
        {
            actions.push(AppAction::Clear);
        }
        if ui
            .add_enabled(ctx.manual_save_available, egui::Button::new("💾 Save..."))
            .on_hover_text("Save the data on screen")
            .clicked()
        {
            actions.push(AppAction::SaveVisible);
        }

        ui.separator();

        // === View group ===
        let scroll = ViewMode::Scroll {
            window_seconds: ctx.scroll_window_seconds,
        };
        for mode in [ViewMode::Autoscale, scroll, ViewMode::Manual] {
            let selected = std::mem::discriminant(&ctx.mode) == std::mem::discriminant(&mode);
            if ui.selectable_label(selected, mode.label()).clicked() && !selected {
                actions.push(AppAction::SetViewMode(mode));
            }
        }

        ui.separator();

        let mut show = ctx.show_statistics;
        if ui.checkbox(&mut show, "Statistics").changed() {
            actions.push(AppAction::ShowStatistics(show));
        }

        if ctx.finalizing {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.colored_label(Color32::YELLOW, RichText::new("Writing report...").small());
            });
        }
    });

    actions
}
