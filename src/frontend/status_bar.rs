//! Status bar: latest message, sample count and pending buffers

use std::path::PathBuf;

use egui::{Color32, RichText, Ui};

use crate::frontend::state::{AppAction, Severity, StatusLog};

/// Context needed to render the status bar.
pub struct StatusBarContext<'a> {
    pub log: &'a StatusLog,
    pub samples: usize,
    pub instrument: &'a str,
    pub simulated: bool,
    pub failed_buffers: &'a [PathBuf],
    pub orphaned_buffers: usize,
    pub finalizing: bool,
}

fn severity_color(severity: Severity) -> Color32 {
    match severity {
        Severity::Info => Color32::GRAY,
        Severity::Warning => Color32::YELLOW,
        Severity::Error => Color32::LIGHT_RED,
    }
}

/// Render the status bar.
pub fn render_status_bar(ui: &mut Ui, ctx: &StatusBarContext<'_>) -> Vec<AppAction> {
    let mut actions = Vec::new();

    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        let instrument = if ctx.simulated {
            format!("{} (simulated)", ctx.instrument)
        } else {
            ctx.instrument.to_string()
        };
        ui.label(RichText::new(instrument).small());

        ui.separator();

        ui.label(RichText::new(format!("Samples: {}", ctx.samples)).small());

        ui.separator();

        if let Some(message) = ctx.log.latest() {
            ui.colored_label(
                severity_color(message.severity),
                RichText::new(format!("{} {}", message.time.format("%H:%M:%S"), message.text))
                    .small(),
            );
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ctx.orphaned_buffers > 0
                && ui
                    .add_enabled(
                        !ctx.finalizing,
                        egui::Button::new(
                            RichText::new(format!("Recover {} buffers", ctx.orphaned_buffers))
                                .small(),
                        ),
                    )
                    .clicked()
            {
                actions.push(AppAction::RecoverOrphans);
            }

            for buffer in ctx.failed_buffers {
                let name = buffer
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if ui
                    .add_enabled(
                        !ctx.finalizing,
                        egui::Button::new(RichText::new(format!("Retry {}", name)).small()),
                    )
                    .on_hover_text(buffer.display().to_string())
                    .clicked()
                {
                    actions.push(AppAction::RetryFinalization(buffer.clone()));
                }
            }
        });
    });

    actions
}

/// Scrollable message history
pub fn render_history(ui: &mut Ui, log: &StatusLog) {
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for message in log.iter() {
                ui.colored_label(
                    severity_color(message.severity),
                    RichText::new(format!("{} {}", message.time.format("%H:%M:%S"), message.text))
                        .small()
                        .monospace(),
                );
            }
        });
}
