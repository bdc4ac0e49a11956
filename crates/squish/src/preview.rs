use std::path::Path;

use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use snafu::{ResultExt, ensure};

use crate::error::{
    FrameSourceError, NoFrameSnafu, PreviewError, UnreadableMediaSnafu, UnsupportedFormatSnafu,
};

/// Container formats accepted for dropping and picking. Compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov"];

/// Longest edge of a preview bitmap.
pub const MAX_PREVIEW_DIMENSION: u32 = 1080;

/// Anything that can hand back the first decodable frame of a media file as RGB.
pub trait FrameSource {
    fn first_frame(&self, path: &Path) -> Result<RgbImage, FrameSourceError>;
}

/// A single decoded, resized bitmap of either the original or the processed media.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPreview {
    image: RgbImage,
}

impl MediaPreview {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Returns a copy scaled to exactly `width`x`height`, or a plain clone if it's already that size.
    pub fn resized_to(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self::new(imageops::resize(
            &self.image,
            width.max(1),
            height.max(1),
            FilterType::Triangle,
        ))
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Fit `width`x`height` into a [`MAX_PREVIEW_DIMENSION`] square, keeping the aspect ratio.
pub fn preview_size(width: u32, height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let max = MAX_PREVIEW_DIMENSION as f64;
    let scale = (max / width as f64).min(max / height as f64);
    let fit = |dim: u32| ((dim as f64 * scale).round() as u32).clamp(1, MAX_PREVIEW_DIMENSION);
    (fit(width), fit(height))
}

pub fn extract_preview<S: FrameSource + ?Sized>(
    source: &S,
    path: &Path,
) -> Result<MediaPreview, PreviewError> {
    ensure!(is_supported(path), UnsupportedFormatSnafu { path });

    let frame = source
        .first_frame(path)
        .context(UnreadableMediaSnafu { path })?;
    if frame.width() == 0 || frame.height() == 0 {
        return NoFrameSnafu.fail().context(UnreadableMediaSnafu { path });
    }

    let (width, height) = preview_size(frame.width(), frame.height());
    log::debug!(
        "preview of {} scaled from {}x{} to {width}x{height}",
        path.display(),
        frame.width(),
        frame.height()
    );
    Ok(MediaPreview::new(imageops::resize(
        &frame,
        width,
        height,
        FilterType::Triangle,
    )))
}
