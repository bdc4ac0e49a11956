use std::path::PathBuf;

use eframe::egui;
use squish::{EncodeSettings, JobSlot, ViewState};

use crate::widgets::comparison::CachedFrame;

pub mod dnd_overlay;
pub mod encode_job;
pub mod error;
pub mod executor;
pub mod format_eta;
pub mod main;
pub mod ui_context;

pub type AppFn = Box<dyn FnOnce(&mut SquishApp) -> Result<(), error::ApplicationError> + Send>;

pub struct SquishApp {
    pub ctx: egui::Context,
    pub executor: executor::AppExecutor,
    pub settings: EncodeSettings,
    /// Explicit encoder location. Falls back to the usual lookup when unset.
    pub encoder_path: Option<PathBuf>,
    pub view: ViewState,
    pub jobs: JobSlot,
    pub eta: encode_job::EtaEstimator,
    pub frame_cache: Option<CachedFrame>,
    pub loading_preview: bool,
}
