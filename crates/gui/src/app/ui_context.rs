use eframe::egui;
use squish::ui_context::UIContext;

/// Lets encode workers wake the egui event loop.
#[derive(Clone)]
pub struct EguiCtx(pub egui::Context);

impl UIContext for EguiCtx {
    fn request_repaint(&self) {
        self.0.request_repaint();
    }
}
