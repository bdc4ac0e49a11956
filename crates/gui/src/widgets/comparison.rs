use eframe::egui::{
    self, Color32, ColorImage, CursorIcon, Rect, Sense, TextureOptions, Widget, pos2, vec2,
};
use squish::{CursorHint, PointerOutcome, ViewState};

/// The last composited frame uploaded to the GPU, tagged with the view revision it was built from.
pub struct CachedFrame {
    revision: u64,
    texture: egui::TextureHandle,
}

/// Shows the original and processed previews split at the divider, and feeds pointer input back into the view.
pub struct ComparisonView<'a, 'b> {
    view: &'a mut ViewState,
    cache: &'a mut Option<CachedFrame>,
    choose_file: &'b mut bool,
}

impl<'a, 'b> ComparisonView<'a, 'b> {
    pub fn new(
        view: &'a mut ViewState,
        cache: &'a mut Option<CachedFrame>,
        choose_file: &'b mut bool,
    ) -> Self {
        Self {
            view,
            cache,
            choose_file,
        }
    }
}

fn refresh_texture(
    ctx: &egui::Context,
    view: &ViewState,
    cache: &mut Option<CachedFrame>,
) -> Option<egui::TextureId> {
    let revision = view.revision();
    if let Some(cached) = cache.as_ref().filter(|cached| cached.revision == revision) {
        return Some(cached.texture.id());
    }

    let frame = view.compose()?;
    let image = ColorImage::from_rgb(
        [frame.width() as usize, frame.height() as usize],
        frame.as_raw(),
    );
    match cache {
        Some(cached) => {
            cached.texture.set(image, TextureOptions::LINEAR);
            cached.revision = revision;
        }
        None => {
            *cache = Some(CachedFrame {
                revision,
                texture: ctx.load_texture("comparison", image, TextureOptions::LINEAR),
            });
        }
    }
    cache.as_ref().map(|cached| cached.texture.id())
}

impl Widget for ComparisonView<'_, '_> {
    fn ui(self, ui: &mut egui::Ui) -> egui::Response {
        let Some((width, height)) = self.view.original().map(|original| original.dimensions())
        else {
            let response = ui.add_sized(
                ui.available_size(),
                egui::Button::new(
                    egui::RichText::new("Drop a video here, or click to choose one").heading(),
                )
                .frame(false),
            );
            *self.choose_file |= response.clicked();
            return response;
        };

        let image_size = vec2(width as f32, height as f32);
        let available = ui.available_size();
        let scale = (available.x / image_size.x)
            .min(available.y / image_size.y)
            .clamp(0.01, 1.0);
        let (rect, response) = ui.allocate_exact_size(image_size * scale, Sense::click_and_drag());
        self.view.set_display_scale(scale);
        let to_image_x = |pos: egui::Pos2| (pos.x - rect.left()) / scale;

        let (pressed, released, pointer) = ui.input(|input| {
            (
                input.pointer.primary_pressed(),
                input.pointer.primary_released(),
                input.pointer.interact_pos(),
            )
        });
        if let Some(pos) = pointer {
            if pressed && response.contains_pointer() {
                if self.view.pointer_down(to_image_x(pos)) == PointerOutcome::ChooseFile {
                    *self.choose_file = true;
                }
            } else if self.view.pointer_move(to_image_x(pos)) == PointerOutcome::Redraw {
                ui.ctx().request_repaint();
            }
        }
        if released {
            self.view.pointer_up();
        }

        if self.view.divider().is_dragging() {
            ui.ctx().set_cursor_icon(CursorIcon::ResizeHorizontal);
        } else if let Some(pos) = response.hover_pos() {
            ui.ctx().set_cursor_icon(match self.view.hover(to_image_x(pos)) {
                CursorHint::Resize => CursorIcon::ResizeHorizontal,
                CursorHint::Pick => CursorIcon::PointingHand,
            });
        }

        if let Some(texture) = refresh_texture(ui.ctx(), self.view, self.cache) {
            ui.painter().image(
                texture,
                rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        response
    }
}
