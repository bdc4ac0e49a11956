use std::time::Duration;

use eframe::egui::{self, Color32, Widget};
use squish::{ViewState, status::StatusKind};

use crate::app::{
    encode_job::EtaEstimator,
    format_eta::{EtaStyle, format_eta},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Cancel,
    OpenOutput,
}

/// Progress bar, status line and job controls.
pub struct EncodeJobWidget<'a, 'b> {
    view: &'a ViewState,
    eta: &'a EtaEstimator,
    running: bool,
    action: &'b mut Option<JobAction>,
}

impl<'a, 'b> EncodeJobWidget<'a, 'b> {
    pub fn new(
        view: &'a ViewState,
        eta: &'a EtaEstimator,
        running: bool,
        action: &'b mut Option<JobAction>,
    ) -> Self {
        Self {
            view,
            eta,
            running,
            action,
        }
    }
}

impl Widget for EncodeJobWidget<'_, '_> {
    fn ui(self, ui: &mut egui::Ui) -> egui::Response {
        let view = self.view;
        ui.with_layout(egui::Layout::top_down_justified(egui::Align::Min), |ui| {
            egui::Frame::NONE
                .fill(ui.style().visuals.faint_bg_color)
                .stroke(ui.style().visuals.window_stroke)
                .inner_margin(ui.style().spacing.window_margin)
                .show(ui, |ui| {
                    if let Some(job) = view.job() {
                        ui.horizontal(|ui| {
                            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                                if self.running {
                                    if ui.button("Cancel").clicked() {
                                        *self.action = Some(JobAction::Cancel);
                                    }
                                } else if job.output_size_bytes.is_some()
                                    && ui.button("Open").clicked()
                                {
                                    *self.action = Some(JobAction::OpenOutput);
                                }
                                ui.with_layout(
                                    egui::Layout::left_to_right(egui::Align::Center),
                                    |ui| {
                                        ui.add(
                                            egui::Label::new(
                                                job.output_path.to_string_lossy().into_owned(),
                                            )
                                            .truncate(),
                                        );
                                    },
                                );
                            });
                        });
                        ui.separator();
                    }

                    ui.add(
                        egui::ProgressBar::new((view.progress_percent() / 100.0) as f32)
                            .show_percentage(),
                    );

                    let status = view.status();
                    let color = match status.kind {
                        StatusKind::Info => ui.visuals().text_color(),
                        StatusKind::Working => ui.visuals().strong_text_color(),
                        StatusKind::Success => Color32::from_rgb(0x4C, 0xAF, 0x50),
                        StatusKind::Error => ui.visuals().error_fg_color,
                    };
                    ui.colored_label(color, status.text.as_str());

                    if self.running {
                        let now = ui.ctx().input(|input| input.time);
                        if let Some(remaining) = self.eta.time_remaining(now) {
                            let mut label = String::from("Time remaining: ");
                            if format_eta(&mut label, remaining, EtaStyle::Long).is_ok() {
                                ui.label(label);
                            }
                        }
                        ui.ctx().request_repaint_after(Duration::from_secs(1));
                    }
                });
        })
        .response
    }
}
