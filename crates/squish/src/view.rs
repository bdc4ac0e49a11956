use std::fmt;

use image::RgbImage;

use crate::{
    compare::{CursorHint, DividerState, PointerOutcome, compose},
    job::{EncodeJob, JobEvent},
    preview::MediaPreview,
    status::Status,
};

/// Everything the interactive surface displays. Owned by the control thread; worker output reaches it only through
/// [`ViewState::apply`].
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    original: Option<MediaPreview>,
    processed: Option<MediaPreview>,
    divider: DividerState,
    job: Option<EncodeJob>,
    progress_percent: f64,
    status: Status,
    revision: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original(&self) -> Option<&MediaPreview> {
        self.original.as_ref()
    }

    pub fn processed(&self) -> Option<&MediaPreview> {
        self.processed.as_ref()
    }

    pub fn divider(&self) -> &DividerState {
        &self.divider
    }

    pub fn job(&self) -> Option<&EncodeJob> {
        self.job.as_ref()
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Bumped whenever the composited frame would change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn invalidate(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Shows a newly selected source. Any processed preview belongs to the previous source and is dropped.
    pub fn set_source(&mut self, original: MediaPreview, input_size_bytes: u64) {
        self.divider = DividerState::new(original.width());
        self.original = Some(original);
        self.processed = None;
        self.job = None;
        self.progress_percent = 0.0;
        self.status = Status::file_size(input_size_bytes);
        self.invalidate();
    }

    /// Records a job that has just been handed to the worker.
    pub fn begin_job(&mut self, job: &EncodeJob) {
        self.job = Some(job.clone());
        self.progress_percent = 0.0;
        self.status = if self.original.is_some() {
            Status::preparing(job.input_size_bytes)
        } else {
            Status::compressing(job.input_size_bytes)
        };
    }

    pub fn apply(&mut self, event: &JobEvent) {
        if let Some(job) = &mut self.job {
            job.observe(event);
        }

        match event {
            JobEvent::Preview(preview) => {
                let Some(original) = &self.original else {
                    return;
                };
                let (width, height) = original.dimensions();
                self.processed = Some(preview.resized_to(width, height));
                self.invalidate();
            }
            JobEvent::PreviewFailed { .. } => {}
            JobEvent::Started { input_size_bytes } => {
                self.status = Status::compressing(*input_size_bytes);
            }
            JobEvent::Progress { percent, .. } => {
                self.progress_percent = self.progress_percent.max(percent.clamp(0.0, 100.0));
            }
            JobEvent::Completed {
                input_size_bytes,
                output_size_bytes,
                reduction_percent,
            } => {
                self.progress_percent = 100.0;
                self.status =
                    Status::complete(*input_size_bytes, *output_size_bytes, *reduction_percent);
            }
            JobEvent::Failed { reason } => self.status = Status::error(reason),
            JobEvent::Cancelled => self.status = Status::cancelled(),
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn report_error(&mut self, err: impl fmt::Display) {
        self.status = Status::error(err);
    }

    fn divider_active(&self) -> bool {
        self.processed.is_some()
    }

    pub fn pointer_down(&mut self, x: f32) -> PointerOutcome {
        let active = self.divider_active();
        self.divider.pointer_down(x, active)
    }

    pub fn pointer_move(&mut self, x: f32) -> PointerOutcome {
        let outcome = self.divider.pointer_move(x);
        if outcome == PointerOutcome::Redraw {
            self.invalidate();
        }
        outcome
    }

    pub fn pointer_up(&mut self) -> PointerOutcome {
        self.divider.pointer_up()
    }

    pub fn hover(&self, x: f32) -> CursorHint {
        self.divider.hover(x, self.divider_active())
    }

    /// Screen points per image pixel at which the comparison is currently shown.
    pub fn set_display_scale(&mut self, scale: f32) {
        self.divider.set_display_scale(scale);
    }

    /// The frame to display, or `None` before any source has been selected.
    pub fn compose(&self) -> Option<RgbImage> {
        let original = self.original.as_ref()?;
        Some(compose(
            original.image(),
            self.processed.as_ref().map(MediaPreview::image),
            &self.divider,
        ))
    }
}
