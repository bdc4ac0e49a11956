pub mod compare;
pub mod encoder;
pub mod error;
pub mod job;
pub mod preview;
pub mod progress;
pub mod status;
pub mod ui_context;
pub mod view;

pub use compare::{CursorHint, DividerState, PointerOutcome, compose};
pub use encoder::{EncodeSettings, Encoder};
pub use error::{JobError, PreviewError};
pub use job::{EncodeJob, JobEvent, JobHandle, JobRequest, JobSlot, start_job};
pub use preview::{MediaPreview, extract_preview};
pub use view::ViewState;
