/// The interactive surface a background job reports to.
pub trait UIContext: Clone + Send + Sync + 'static {
    fn request_repaint(&self);
}

/// A context that never repaints, for callers that block on the event channel instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl UIContext for Headless {
    fn request_repaint(&self) {}
}
