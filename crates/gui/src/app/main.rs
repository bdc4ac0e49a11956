use std::{error::Error, fs, path::PathBuf};

use eframe::egui::{self, vec2};
use futures_lite::Future;
use log::{debug, error, info};
use snafu::ResultExt;
use squish::{
    EncodeSettings, Encoder, JobError, JobEvent, JobRequest, JobSlot, MediaPreview, PreviewError,
    ViewState, extract_preview,
    preview::{SUPPORTED_EXTENSIONS, is_supported},
    status::{Status, StatusKind},
};

use super::{
    AppFn, SquishApp,
    dnd_overlay::{CtxDndExt, UiDndExt},
    encode_job::EtaEstimator,
    error::{
        ApplicationError, LoadPreviewSnafu, LocateEncoderSnafu, OpenOutputSnafu,
        ReadFileSizeSnafu, StartJobSnafu,
    },
    executor::AppExecutor,
    ui_context::EguiCtx,
};
use crate::widgets::{
    comparison::ComparisonView,
    encode_job::{EncodeJobWidget, JobAction},
};

/// Room around the preview for the menu bar and the job panel.
const WINDOW_PADDING: (f32, f32) = (40.0, 150.0);

pub fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_drag_and_drop(true)
            .with_app_id(SquishApp::APP_ID),
        ..Default::default()
    };
    Ok(eframe::run_native(
        SquishApp::APP_ID,
        options,
        Box::new(|cc| Ok(Box::new(SquishApp::new(cc.egui_ctx.clone())))),
    )?)
}

impl SquishApp {
    pub const APP_ID: &'static str = "squish";

    pub fn new(ctx: egui::Context) -> Self {
        Self {
            executor: AppExecutor::new(ctx.clone()),
            ctx,
            settings: EncodeSettings::default(),
            encoder_path: None,
            view: ViewState::new(),
            jobs: JobSlot::default(),
            eta: EtaEstimator::new(),
            frame_cache: None,
            loading_preview: false,
        }
    }

    pub fn spawn(&mut self, future: impl Future<Output = Option<AppFn>> + 'static + Send) {
        self.executor.spawn(future);
    }

    fn tick(&mut self) {
        loop {
            // Callbacks may spawn more futures, so keep going until nothing new finishes.
            let app_fns = self.executor.tick();
            if app_fns.is_empty() {
                break;
            }

            for f in app_fns {
                self.handle_result_with(f);
            }
        }
    }

    pub fn handle_error(&mut self, err: &dyn Error) {
        error!("{err}");
        self.view.report_error(err);
    }

    pub fn handle_result<T, E: Error>(&mut self, result: Result<T, E>) {
        if let Err(err) = result {
            self.handle_error(&err);
        }
    }

    pub fn handle_result_with<T, E: Error, F: FnOnce(&mut Self) -> Result<T, E>>(&mut self, cb: F) {
        let result = cb(self);
        self.handle_result(result);
    }

    fn encoder(&self) -> Result<Encoder, ApplicationError> {
        Encoder::locate(self.encoder_path.as_deref()).context(LocateEncoderSnafu)
    }

    fn open_file_dialog(&mut self) {
        let file_dialog = rfd::AsyncFileDialog::new()
            .add_filter("Video", SUPPORTED_EXTENSIONS)
            .pick_file();
        self.spawn(async move {
            let handle = file_dialog.await;

            Some(Box::new(move |app: &mut SquishApp| match handle {
                Some(handle) => app.load_source(handle.into()),
                None => Ok(()),
            }) as _)
        });
    }

    /// Extracts the preview of `path` off the UI thread, then shows it and starts compressing. Nothing happens to
    /// the current preview while an encode is running.
    pub fn load_source(&mut self, path: PathBuf) -> Result<(), ApplicationError> {
        if self.loading_preview {
            return Err(JobError::Busy).context(StartJobSnafu);
        }
        self.jobs.ensure_idle().context(StartJobSnafu)?;
        if !is_supported(&path) {
            return Err(PreviewError::UnsupportedFormat { path }).context(LoadPreviewSnafu);
        }
        let encoder = self.encoder()?;

        debug!("loading preview of {}", path.display());
        self.loading_preview = true;
        self.view
            .set_status(Status::new(StatusKind::Working, "Loading preview..."));

        self.spawn(async move {
            let loaded = blocking::unblock(move || {
                let preview = extract_preview(&encoder, &path).context(LoadPreviewSnafu)?;
                let size = fs::metadata(&path)
                    .context(ReadFileSizeSnafu { path: &path })?
                    .len();
                Ok::<_, ApplicationError>((path, preview, size))
            })
            .await;

            Some(Box::new(move |app: &mut SquishApp| {
                app.loading_preview = false;
                let (path, preview, size) = loaded?;
                app.show_source(path, preview, size)
            }) as _)
        });

        Ok(())
    }

    fn show_source(
        &mut self,
        path: PathBuf,
        preview: MediaPreview,
        input_size_bytes: u64,
    ) -> Result<(), ApplicationError> {
        let (width, height) = preview.dimensions();
        self.ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(vec2(
            width as f32 + WINDOW_PADDING.0,
            height as f32 + WINDOW_PADDING.1,
        )));
        self.ctx.send_viewport_cmd(egui::ViewportCommand::Title(
            path.file_name()
                .map(|file_name| format!("{} ({})", Self::APP_ID, file_name.to_string_lossy()))
                .unwrap_or_else(|| Self::APP_ID.to_string()),
        ));

        self.view.set_source(preview, input_size_bytes);
        self.start_encode(path)
    }

    fn start_encode(&mut self, input_path: PathBuf) -> Result<(), ApplicationError> {
        let encoder = self.encoder()?;
        let request = JobRequest {
            settings: self.settings.clone(),
            preview_size: self.view.original().map(MediaPreview::dimensions),
            ..JobRequest::new(input_path)
        };

        let job = self
            .jobs
            .start(&encoder, request, EguiCtx(self.ctx.clone()))
            .context(StartJobSnafu)?;
        self.view.begin_job(job);
        self.eta.reset();
        Ok(())
    }

    fn poll_jobs(&mut self) {
        let now = self.ctx.input(|input| input.time);
        for event in self.jobs.poll() {
            match &event {
                JobEvent::Progress { percent, .. } => self.eta.update(percent / 100.0, now),
                JobEvent::PreviewFailed { reason } => debug!("no processed preview: {reason}"),
                JobEvent::Completed {
                    output_size_bytes, ..
                } => info!("encode finished, {output_size_bytes} bytes written"),
                _ => {}
            }
            self.view.apply(&event);
        }
    }

    fn open_output(&mut self) -> Result<(), ApplicationError> {
        let Some(path) = self.view.job().map(|job| job.output_path.clone()) else {
            return Ok(());
        };
        open::that_detached(&path).context(OpenOutputSnafu { path })
    }

    fn show_app(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::left_to_right(egui::Align::Center), |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open").clicked() {
                        self.open_file_dialog();
                        ui.close_menu();
                    }
                    if ui
                        .add_enabled(self.jobs.is_busy(), egui::Button::new("Cancel encode"))
                        .clicked()
                    {
                        self.jobs.cancel();
                        ui.close_menu();
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close_menu();
                    }
                });

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    const VERSION: &str = env!("CARGO_PKG_VERSION");
                    ui.label(format!("{} v{VERSION}", Self::APP_ID));
                });
            });
        });

        let mut action = None;
        egui::TopBottomPanel::bottom("job_panel").show(ctx, |ui| {
            ui.add(EncodeJobWidget::new(
                &self.view,
                &self.eta,
                self.jobs.is_busy(),
                &mut action,
            ));
        });
        match action {
            Some(JobAction::Cancel) => self.jobs.cancel(),
            Some(JobAction::OpenOutput) => {
                let result = self.open_output();
                self.handle_result(result);
            }
            None => {}
        }

        let mut choose_file = false;
        let mut dropped = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            dropped = ui.dropped_path("Drop a video to compress");
            if self.loading_preview {
                ui.vertical_centered(|ui| ui.add(egui::Spinner::new().size(32.0)));
            }
            ui.vertical_centered(|ui| {
                ui.add(ComparisonView::new(
                    &mut self.view,
                    &mut self.frame_cache,
                    &mut choose_file,
                ));
            });
        });

        if let Some(path) = dropped {
            let result = self.load_source(path);
            self.handle_result(result);
        } else if choose_file && !self.loading_preview {
            self.open_file_dialog();
        }
    }
}

impl eframe::App for SquishApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick();
        ctx.park_dropped_files();
        self.poll_jobs();
        self.show_app(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_without_encoder() -> SquishApp {
        let mut app = SquishApp::new(egui::Context::default());
        app.encoder_path = Some(PathBuf::from("/nonexistent/squish/ffmpeg"));
        app
    }

    #[test]
    fn unsupported_file_is_reported_before_encoder_lookup() {
        let mut app = app_without_encoder();
        let err = app.load_source(PathBuf::from("notes.txt")).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::LoadPreview {
                source: PreviewError::UnsupportedFormat { .. }
            }
        ));
        assert!(!app.loading_preview);

        app.handle_result_with(|app| app.load_source(PathBuf::from("notes.txt")));
        assert_eq!(app.view.status().kind, StatusKind::Error);
        assert!(
            app.view
                .status()
                .text
                .starts_with("Error: Unsupported file format"),
            "{}",
            app.view.status().text
        );
    }

    #[test]
    fn supported_file_needs_an_encoder() {
        let mut app = app_without_encoder();
        let err = app.load_source(PathBuf::from("clip.MOV")).unwrap_err();
        assert!(matches!(err, ApplicationError::LocateEncoder { .. }));
        assert!(!app.loading_preview);
    }
}
