use image::{Rgb, RgbImage};
use rayon::prelude::*;

/// How close (in screen points, exclusive) a pointer must be to the divider to grab it.
pub const HIT_RADIUS: f32 = 20.0;
/// Half-height and length of the divider's triangular handle.
pub const HANDLE_SIZE: u32 = 10;
pub const HANDLE_COLOR: Rgb<u8> = Rgb([0xFF, 0x3D, 0x00]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    StartedDrag,
    /// The divider moved; recomposite.
    Redraw,
    /// The click landed away from the divider. The caller opens the file picker.
    ChooseFile,
    EndedDrag,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorHint {
    Resize,
    Pick,
}

/// Rounds a pointer x-coordinate into `[0, view_width]`. NaN maps to 0.
pub fn clamp_position(x: f32, view_width: u32) -> u32 {
    if x.is_nan() {
        return 0;
    }
    x.round().clamp(0.0, view_width as f32) as u32
}

/// The draggable boundary between the original (left) and processed (right) previews.
///
/// Every pointer method takes `active`, which is false while there is no processed preview. An inactive divider
/// can't be grabbed and every click becomes [`PointerOutcome::ChooseFile`].
///
/// Positions are in image pixels. The hit radius is kept in image pixels too, derived from [`HIT_RADIUS`] and the
/// scale the image is displayed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividerState {
    position_x: u32,
    view_width: u32,
    dragging: bool,
    hit_radius: f32,
}

impl Default for DividerState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DividerState {
    pub fn new(view_width: u32) -> Self {
        Self {
            position_x: view_width / 2,
            view_width,
            dragging: false,
            hit_radius: HIT_RADIUS,
        }
    }

    /// `scale` is screen points per image pixel. Non-positive or non-finite scales are ignored.
    pub fn set_display_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.hit_radius = HIT_RADIUS / scale;
        }
    }

    pub fn position(&self) -> u32 {
        self.position_x
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn hit(&self, x: f32) -> bool {
        (x - self.position_x as f32).abs() < self.hit_radius
    }

    pub fn pointer_down(&mut self, x: f32, active: bool) -> PointerOutcome {
        if active && self.hit(x) {
            self.dragging = true;
            PointerOutcome::StartedDrag
        } else {
            PointerOutcome::ChooseFile
        }
    }

    pub fn pointer_move(&mut self, x: f32) -> PointerOutcome {
        if !self.dragging || x.is_nan() {
            return PointerOutcome::Ignored;
        }
        self.position_x = clamp_position(x, self.view_width);
        PointerOutcome::Redraw
    }

    pub fn pointer_up(&mut self) -> PointerOutcome {
        if std::mem::take(&mut self.dragging) {
            PointerOutcome::EndedDrag
        } else {
            PointerOutcome::Ignored
        }
    }

    pub fn hover(&self, x: f32, active: bool) -> CursorHint {
        if self.dragging || (active && self.hit(x)) {
            CursorHint::Resize
        } else {
            CursorHint::Pick
        }
    }
}

/// Composites the comparison frame.
///
/// Without a processed preview (or with one whose dimensions don't match the original), this is just the
/// original. Otherwise the processed preview fills the frame, the original covers `[0, divider)` and the handle is
/// drawn at the divider.
pub fn compose(
    original: &RgbImage,
    processed: Option<&RgbImage>,
    divider: &DividerState,
) -> RgbImage {
    let (width, height) = original.dimensions();
    let Some(processed) = processed.filter(|processed| processed.dimensions() == (width, height))
    else {
        return original.clone();
    };
    if width == 0 || height == 0 {
        return original.clone();
    }

    let split = divider.position().min(width) as usize * 3;
    let row_len = width as usize * 3;

    let mut out = processed.clone();
    out.par_chunks_mut(row_len)
        .zip(original.par_chunks(row_len))
        .for_each(|(dst, src)| dst[..split].copy_from_slice(&src[..split]));

    draw_handle(&mut out, divider.position());
    out
}

/// Right-pointing triangle centred vertically on `x`.
fn draw_handle(image: &mut RgbImage, x: u32) {
    let (width, height) = image.dimensions();
    let center = (height / 2) as i64;

    for dy in -(HANDLE_SIZE as i64)..=HANDLE_SIZE as i64 {
        let y = center + dy;
        if y < 0 || y >= height as i64 {
            continue;
        }
        let span = HANDLE_SIZE - dy.unsigned_abs() as u32;
        let last = width.saturating_sub(1);
        for px in x.min(last)..=x.saturating_add(span).min(last) {
            image.put_pixel(px, y as u32, HANDLE_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: Rgb<u8> = Rgb([10, 20, 30]);
    const RIGHT: Rgb<u8> = Rgb([200, 210, 220]);

    fn solid(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(width, height, color)
    }

    #[test]
    fn new_divider_is_centred() {
        assert_eq!(DividerState::new(640).position(), 320);
        assert_eq!(DividerState::new(641).position(), 320);
    }

    #[test]
    fn clamps_pointer_coordinates() {
        assert_eq!(clamp_position(-5.0, 100), 0);
        assert_eq!(clamp_position(150.0, 100), 100);
        assert_eq!(clamp_position(41.6, 100), 42);
        assert_eq!(clamp_position(f32::NAN, 100), 0);
        assert_eq!(clamp_position(f32::INFINITY, 100), 100);
        assert_eq!(clamp_position(f32::NEG_INFINITY, 100), 0);
    }

    #[test]
    fn hit_test_is_strict() {
        let mut divider = DividerState::new(200);
        assert_eq!(divider.pointer_down(120.0, true), PointerOutcome::ChooseFile);
        assert!(!divider.is_dragging());
        assert_eq!(divider.pointer_down(119.9, true), PointerOutcome::StartedDrag);
        assert!(divider.is_dragging());
    }

    #[test]
    fn drag_cycle() {
        let mut divider = DividerState::new(200);
        assert_eq!(divider.pointer_move(50.0), PointerOutcome::Ignored);
        assert_eq!(divider.position(), 100);

        assert_eq!(divider.pointer_down(95.0, true), PointerOutcome::StartedDrag);
        assert_eq!(divider.pointer_move(30.0), PointerOutcome::Redraw);
        assert_eq!(divider.position(), 30);
        assert_eq!(divider.pointer_move(500.0), PointerOutcome::Redraw);
        assert_eq!(divider.position(), 200);
        assert_eq!(divider.pointer_move(f32::NAN), PointerOutcome::Ignored);
        assert_eq!(divider.position(), 200);

        assert_eq!(divider.pointer_up(), PointerOutcome::EndedDrag);
        assert_eq!(divider.pointer_up(), PointerOutcome::Ignored);
        assert_eq!(divider.pointer_move(10.0), PointerOutcome::Ignored);
        assert_eq!(divider.position(), 200);
    }

    #[test]
    fn inactive_divider_only_picks_files() {
        let mut divider = DividerState::new(200);
        assert_eq!(divider.pointer_down(100.0, false), PointerOutcome::ChooseFile);
        assert!(!divider.is_dragging());
        assert_eq!(divider.hover(100.0, false), CursorHint::Pick);
    }

    #[test]
    fn hover_affordance() {
        let mut divider = DividerState::new(200);
        assert_eq!(divider.hover(110.0, true), CursorHint::Resize);
        assert_eq!(divider.hover(180.0, true), CursorHint::Pick);

        divider.pointer_down(100.0, true);
        divider.pointer_move(10.0);
        assert_eq!(divider.hover(180.0, true), CursorHint::Resize);
    }

    #[test]
    fn hit_radius_follows_display_scale() {
        let mut divider = DividerState::new(400);
        // Shown at half size, 20 points on screen cover 40 image pixels.
        divider.set_display_scale(0.5);
        assert_eq!(divider.hover(235.0, true), CursorHint::Resize);
        assert_eq!(divider.hover(240.0, true), CursorHint::Pick);
        assert_eq!(divider.pointer_down(161.0, true), PointerOutcome::StartedDrag);
        divider.pointer_up();

        divider.set_display_scale(2.0);
        assert_eq!(divider.pointer_down(211.0, true), PointerOutcome::ChooseFile);
        assert_eq!(divider.pointer_down(209.0, true), PointerOutcome::StartedDrag);
        divider.pointer_up();

        divider.set_display_scale(0.0);
        divider.set_display_scale(f32::NAN);
        assert_eq!(divider.hover(209.0, true), CursorHint::Resize);
        assert_eq!(divider.hover(211.0, true), CursorHint::Pick);
    }

    #[test]
    fn original_alone_without_processed() {
        let original = solid(64, 32, LEFT);
        let out = compose(&original, None, &DividerState::new(64));
        assert_eq!(out, original);
    }

    #[test]
    fn mismatched_processed_is_not_shown() {
        let original = solid(64, 32, LEFT);
        let processed = solid(32, 32, RIGHT);
        let out = compose(&original, Some(&processed), &DividerState::new(64));
        assert_eq!(out, original);
    }

    #[test]
    fn original_left_processed_right() {
        let original = solid(100, 40, LEFT);
        let processed = solid(100, 40, RIGHT);
        let mut divider = DividerState::new(100);
        divider.pointer_down(50.0, true);
        divider.pointer_move(30.0);

        let out = compose(&original, Some(&processed), &divider);
        assert_eq!(*out.get_pixel(0, 0), LEFT);
        assert_eq!(*out.get_pixel(29, 0), LEFT);
        assert_eq!(*out.get_pixel(30, 0), RIGHT);
        assert_eq!(*out.get_pixel(99, 39), RIGHT);

        // Handle tip and base
        assert_eq!(*out.get_pixel(30, 20), HANDLE_COLOR);
        assert_eq!(*out.get_pixel(40, 20), HANDLE_COLOR);
        assert_eq!(*out.get_pixel(41, 20), RIGHT);
        assert_eq!(*out.get_pixel(30, 10), HANDLE_COLOR);
        assert_eq!(*out.get_pixel(31, 10), RIGHT);
        assert_eq!(*out.get_pixel(30, 9), RIGHT);
    }

    #[test]
    fn divider_at_edges() {
        let original = solid(50, 30, LEFT);
        let processed = solid(50, 30, RIGHT);
        let mut divider = DividerState::new(50);

        divider.pointer_down(25.0, true);
        divider.pointer_move(-10.0);
        let out = compose(&original, Some(&processed), &divider);
        assert_eq!(*out.get_pixel(49, 0), RIGHT);
        assert_eq!(*out.get_pixel(0, 0), RIGHT);
        assert_eq!(*out.get_pixel(0, 15), HANDLE_COLOR);

        divider.pointer_move(1000.0);
        let out = compose(&original, Some(&processed), &divider);
        assert_eq!(*out.get_pixel(0, 0), LEFT);
        assert_eq!(*out.get_pixel(49, 0), LEFT);
        // The handle stays visible on the last column.
        assert_eq!(divider.position(), 50);
        assert_eq!(*out.get_pixel(49, 15), HANDLE_COLOR);
        assert_eq!(*out.get_pixel(48, 15), LEFT);
    }

    #[test]
    fn compositing_is_idempotent() {
        let original = RgbImage::from_fn(80, 45, |x, y| Rgb([x as u8, y as u8, 7]));
        let processed = RgbImage::from_fn(80, 45, |x, y| Rgb([y as u8, x as u8, 99]));
        let divider = DividerState::new(80);
        let first = compose(&original, Some(&processed), &divider);
        let second = compose(&original, Some(&processed), &divider);
        assert_eq!(first, second);
    }

    #[test]
    fn tiny_images_do_not_panic() {
        let original = solid(1, 1, LEFT);
        let processed = solid(1, 1, RIGHT);
        let out = compose(&original, Some(&processed), &DividerState::new(1));
        assert_eq!(out.dimensions(), (1, 1));
    }
}
