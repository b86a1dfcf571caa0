//! Settings panel
//!
//! Edits a draft of the configuration; nothing takes effect until the user
//! presses Apply. Acquisition, instrument and output settings are locked
//! while a run is active.

use egui::{RichText, Ui};

use crate::config::settings::{FileSuffix, MIN_INTERVAL_MS};
use crate::config::AppConfig;
use crate::device::{MeasurementFunction, Resolution};
use crate::frontend::state::AppAction;

pub struct SettingsPanel;

impl SettingsPanel {
    /// Render the settings panel
    ///
    /// `idle` unlocks the settings that only apply to the next run.
    pub fn render(ui: &mut Ui, draft: &mut AppConfig, current: &AppConfig, idle: bool) -> Option<AppAction> {
        let mut action = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.add_enabled_ui(idle, |ui| {
                ui.heading("Instrument");
                ui.separator();
                render_instrument(ui, draft);

                ui.add_space(16.0);
                ui.heading("Acquisition");
                ui.separator();
                render_acquisition(ui, draft);

                ui.add_space(16.0);
                ui.heading("Output");
                ui.separator();
                render_output(ui, draft);
            });

            ui.add_space(16.0);
            ui.heading("Report and View");
            ui.separator();

            egui::Grid::new("report_settings")
                .num_columns(2)
                .spacing([10.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Statistics block:");
                    ui.checkbox(&mut draft.report.include_stats, "");
                    ui.end_row();

                    ui.label("Chart sheet:");
                    ui.checkbox(&mut draft.report.include_chart, "");
                    ui.end_row();

                    ui.label("Scroll window (s):");
                    ui.add(
                        egui::DragValue::new(&mut draft.view.scroll_window_seconds)
                            .range(0.5..=3600.0)
                            .speed(0.5),
                    );
                    ui.end_row();
                });

            ui.add_space(16.0);
            ui.horizontal(|ui| {
                let changed = draft != current;
                if ui
                    .add_enabled(changed, egui::Button::new("Apply"))
                    .clicked()
                {
                    action = Some(AppAction::ApplyConfig(Box::new(draft.clone())));
                }
                if ui
                    .add_enabled(changed, egui::Button::new("Revert"))
                    .clicked()
                {
                    *draft = current.clone();
                }
            });

            if !idle {
                ui.label(RichText::new("Stop the run to change instrument and output settings.").small());
            }
        });

        action
    }
}

fn render_instrument(ui: &mut Ui, draft: &mut AppConfig) {
    egui::Grid::new("instrument_settings")
        .num_columns(2)
        .spacing([10.0, 8.0])
        .show(ui, |ui| {
            ui.label("Resource:");
            ui.add(
                egui::TextEdit::singleline(&mut draft.device.resource)
                    .desired_width(180.0)
                    .hint_text("SIMULATION or host:port"),
            );
            ui.end_row();

            ui.label("Function:");
            let before = draft.device.function;
            egui::ComboBox::from_id_salt("settings_function")
                .selected_text(draft.device.function.label())
                .show_ui(ui, |ui| {
                    for function in MeasurementFunction::ALL {
                        ui.selectable_value(&mut draft.device.function, function, function.label());
                    }
                });
            if draft.device.function != before {
                draft.device.range = draft.device.function.ranges()[0].to_string();
            }
            ui.end_row();

            ui.label("Range:");
            egui::ComboBox::from_id_salt("settings_range")
                .selected_text(draft.device.range.clone())
                .show_ui(ui, |ui| {
                    for range in draft.device.function.ranges() {
                        ui.selectable_value(&mut draft.device.range, range.to_string(), *range);
                    }
                });
            ui.end_row();

            ui.label("Resolution:");
            ui.add_enabled_ui(draft.device.function.has_nplc(), |ui| {
                egui::ComboBox::from_id_salt("settings_resolution")
                    .selected_text(draft.device.resolution.label())
                    .show_ui(ui, |ui| {
                        for resolution in Resolution::ALL {
                            ui.selectable_value(
                                &mut draft.device.resolution,
                                resolution,
                                resolution.label(),
                            );
                        }
                    });
            });
            ui.end_row();
        });
}

fn render_acquisition(ui: &mut Ui, draft: &mut AppConfig) {
    egui::Grid::new("acquisition_settings")
        .num_columns(2)
        .spacing([10.0, 8.0])
        .show(ui, |ui| {
            ui.label("Interval (ms):");
            ui.add(
                egui::DragValue::new(&mut draft.acquisition.interval_ms)
                    .range(MIN_INTERVAL_MS..=3_600_000)
                    .speed(10),
            );
            ui.end_row();

            ui.label("Max points:");
            ui.add(
                egui::DragValue::new(&mut draft.acquisition.max_points)
                    .range(0..=10_000_000)
                    .speed(100),
            )
            .on_hover_text("0 runs until stopped");
            ui.end_row();

            ui.label("Write buffer:");
            ui.checkbox(&mut draft.acquisition.persist, "");
            ui.end_row();
        });
}

fn render_output(ui: &mut Ui, draft: &mut AppConfig) {
    egui::Grid::new("output_settings")
        .num_columns(2)
        .spacing([10.0, 8.0])
        .show(ui, |ui| {
            ui.label("Directory:");
            ui.horizontal(|ui| {
                ui.label(RichText::new(draft.output.directory.display().to_string()).small());
                if ui.button("...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Output Directory")
                        .set_directory(&draft.output.directory)
                        .pick_folder()
                    {
                        draft.output.directory = path;
                    }
                }
            });
            ui.end_row();

            ui.label("File prefix:");
            ui.text_edit_singleline(&mut draft.output.prefix);
            ui.end_row();

            ui.label("Suffix:");
            ui.horizontal(|ui| {
                ui.radio_value(&mut draft.output.suffix, FileSuffix::Timestamp, "Timestamp");
                ui.radio_value(&mut draft.output.suffix, FileSuffix::Counter, "Counter");
            });
            ui.end_row();
        });
}
