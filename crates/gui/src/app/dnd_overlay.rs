//! Dropping a video onto the window.
//!
//! winit can deliver a drop before the pointer position that says where it landed, so drops are parked in egui's
//! temp storage. A parked drop can be claimed on the frame it arrived or the one after, and is discarded after that.

use std::path::PathBuf;

use eframe::egui::{self, DroppedFile};

#[derive(Clone, Default)]
struct ParkedDrop {
    frame_nr: u64,
    files: Vec<DroppedFile>,
}

fn parked_id() -> egui::Id {
    egui::Id::new("squish_parked_drop")
}

pub trait CtxDndExt {
    /// Call once per frame, before any ui asks for [`UiDndExt::dropped_path`].
    fn park_dropped_files(&self);
}

impl CtxDndExt for egui::Context {
    fn park_dropped_files(&self) {
        let fresh = self.input_mut(|input| std::mem::take(&mut input.raw.dropped_files));
        let frame_nr = self.cumulative_pass_nr();
        self.data_mut(|data| {
            if !fresh.is_empty() {
                data.insert_temp(
                    parked_id(),
                    ParkedDrop {
                        frame_nr,
                        files: fresh,
                    },
                );
            } else if data
                .get_temp::<ParkedDrop>(parked_id())
                .is_some_and(|parked| parked.frame_nr + 1 < frame_nr)
            {
                log::debug!("dropped files were never claimed");
                data.remove_temp::<ParkedDrop>(parked_id());
            }
        });
    }
}

pub trait UiDndExt {
    /// Shows `hint` over this ui while files are dragged over the window. Returns the first dropped file that has a
    /// path, if the drop landed here.
    fn dropped_path(&mut self, hint: &str) -> Option<PathBuf>;
}

impl UiDndExt for egui::Ui {
    fn dropped_path(&mut self, hint: &str) -> Option<PathBuf> {
        let area = self.max_rect();
        let (over_area, hovering) = self.ctx().input(|input| {
            (
                input
                    .pointer
                    .latest_pos()
                    .is_some_and(|pos| area.contains(pos)),
                !input.raw.hovered_files.is_empty(),
            )
        });

        if over_area {
            let parked = self
                .ctx()
                .data_mut(|data| data.remove_temp::<ParkedDrop>(parked_id()));
            if let Some(ParkedDrop { files, .. }) = parked {
                if files.len() > 1 {
                    log::info!("{} files dropped, only the first is used", files.len());
                }
                return files.into_iter().find_map(|file| file.path);
            }
        }

        if hovering {
            draw_hint(self, area, hint);
        }
        None
    }
}

fn draw_hint(ui: &egui::Ui, area: egui::Rect, hint: &str) {
    egui::Area::new(ui.auto_id_with("drop_hint"))
        .fixed_pos(area.min)
        .order(egui::Order::Foreground)
        .interactable(false)
        .show(ui.ctx(), |ui| {
            let (rect, _) = ui.allocate_exact_size(area.size(), egui::Sense::hover());
            let visuals = ui.visuals();
            let painter = ui.painter();
            painter.rect(
                rect,
                4.0,
                visuals.extreme_bg_color.gamma_multiply(0.8),
                visuals.widgets.noninteractive.bg_stroke,
                egui::StrokeKind::Inside,
            );
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                hint,
                egui::TextStyle::Heading.resolve(ui.style()),
                visuals.strong_text_color(),
            );
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(events: Vec<egui::Event>, dropped: &[&str]) -> egui::RawInput {
        egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(800.0, 600.0),
            )),
            events,
            dropped_files: dropped
                .iter()
                .map(|path| DroppedFile {
                    path: Some(PathBuf::from(path)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn pointer_at(x: f32, y: f32) -> Vec<egui::Event> {
        vec![egui::Event::PointerMoved(egui::pos2(x, y))]
    }

    fn frame(ctx: &egui::Context, raw: egui::RawInput) -> Option<PathBuf> {
        let mut claimed = None;
        let _ = ctx.run(raw, |ctx| {
            ctx.park_dropped_files();
            egui::CentralPanel::default().show(ctx, |ui| claimed = ui.dropped_path("Drop"));
        });
        claimed
    }

    #[test]
    fn drop_claimed_once_pointer_arrives() {
        let ctx = egui::Context::default();
        assert_eq!(frame(&ctx, input(Vec::new(), &["clip.mp4"])), None);
        assert_eq!(
            frame(&ctx, input(pointer_at(100.0, 100.0), &[])),
            Some(PathBuf::from("clip.mp4"))
        );
        // Claimed drops are not handed out twice.
        assert_eq!(frame(&ctx, input(Vec::new(), &[])), None);
    }

    #[test]
    fn first_of_several_files_wins() {
        let ctx = egui::Context::default();
        assert_eq!(
            frame(&ctx, input(pointer_at(10.0, 10.0), &["a.mkv", "b.mov"])),
            Some(PathBuf::from("a.mkv"))
        );
    }

    #[test]
    fn unclaimed_drop_expires() {
        let ctx = egui::Context::default();
        assert_eq!(frame(&ctx, input(Vec::new(), &["clip.mp4"])), None);
        assert_eq!(frame(&ctx, input(Vec::new(), &[])), None);
        assert_eq!(frame(&ctx, input(pointer_at(100.0, 100.0), &[])), None);
    }
}
