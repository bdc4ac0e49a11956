use std::{
    collections::VecDeque,
    fs,
    io::{self, BufReader},
    path::PathBuf,
    process::{Child, Stdio},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread::{self, JoinHandle},
};

use snafu::{ResultExt, ensure};

use crate::{
    encoder::{EncodeSettings, Encoder},
    error::{
        BusySnafu, EncoderMissingSnafu, FileSizeUnavailableSnafu, JobError,
        PreviewEncoderFailedSnafu, PreviewGenerationError, ReadPreviewSnafu,
        RunPreviewEncoderSnafu, SpawnWorkerSnafu, TempFileSnafu,
    },
    preview::{MediaPreview, extract_preview},
    progress::{DiagnosticLine, DiagnosticLines, ProgressTracker, parse_line},
    status::{output_path_for, reduction_percent},
    ui_context::UIContext,
};

/// How many trailing diagnostic lines are kept for failure reports.
const TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub settings: EncodeSettings,
    /// Run the one-frame preview pass before the full encode.
    pub refresh_preview: bool,
    /// Scale the refreshed preview to this size, normally the original preview's.
    pub preview_size: Option<(u32, u32)>,
    /// Where the transient preview file is written.
    pub scratch_dir: PathBuf,
}

impl JobRequest {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        Self {
            output_path: output_path_for(&input_path),
            input_path,
            settings: EncodeSettings::default(),
            refresh_preview: true,
            preview_size: None,
            scratch_dir: PathBuf::from("."),
        }
    }
}

/// Bookkeeping for the one active encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_duration_seconds: Option<f64>,
    pub progress_percent: f64,
    pub input_size_bytes: u64,
    pub output_size_bytes: Option<u64>,
}

impl EncodeJob {
    pub(crate) fn observe(&mut self, event: &JobEvent) {
        match *event {
            JobEvent::Progress {
                percent, duration, ..
            } => {
                self.progress_percent = self.progress_percent.max(percent);
                if duration.is_some() {
                    self.source_duration_seconds = duration;
                }
            }
            JobEvent::Completed {
                output_size_bytes, ..
            } => {
                self.progress_percent = 100.0;
                self.output_size_bytes = Some(output_size_bytes);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A freshly encoded preview frame, already scaled to the requested preview size.
    Preview(MediaPreview),
    /// The preview pass failed. The full encode continues regardless.
    PreviewFailed { reason: String },
    /// The full encode process is running.
    Started { input_size_bytes: u64 },
    /// `duration` is `None` when the encoder reported the source length as unknown.
    Progress {
        percent: f64,
        position: f64,
        duration: Option<f64>,
    },
    Completed {
        input_size_bytes: u64,
        output_size_bytes: u64,
        reduction_percent: f64,
    },
    Failed { reason: String },
    Cancelled,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl Shared {
    fn kill(&self) {
        if let Some(child) = self.child.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            if let Err(err) = child.kill() {
                log::debug!("could not kill encoder: {err}");
            }
        }
    }
}

/// A running (or finished) encode. Dropping an unfinished handle cancels the job.
#[derive(Debug)]
pub struct JobHandle {
    job: EncodeJob,
    events: Receiver<JobEvent>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl JobHandle {
    pub fn job(&self) -> &EncodeJob {
        &self.job
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stops the encoder. The worker removes the partial output and reports [`JobEvent::Cancelled`].
    pub fn cancel(&self) {
        if self.finished {
            return;
        }
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.kill();
    }

    /// Drains every event that has arrived so far without blocking.
    pub fn try_events(&mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while !self.finished {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => Self::worker_vanished(),
            };
            self.observe(&event);
            events.push(event);
        }
        events
    }

    /// Blocks until the next event. Returns `None` once the terminal event has been delivered.
    pub fn recv(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().unwrap_or_else(|_| Self::worker_vanished());
        self.observe(&event);
        Some(event)
    }

    fn worker_vanished() -> JobEvent {
        JobEvent::Failed {
            reason: String::from("The encoder thread stopped unexpectedly"),
        }
    }

    fn observe(&mut self, event: &JobEvent) {
        self.job.observe(event);
        if event.is_terminal() {
            self.finished = true;
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    log::error!("encoder thread panicked");
                }
            }
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts an encode on a background thread. Events arrive on the returned handle; `ctx` is asked to repaint after
/// each one.
pub fn start_job<C: UIContext>(
    encoder: &Encoder,
    request: JobRequest,
    ctx: C,
) -> Result<JobHandle, JobError> {
    ensure!(
        encoder.path().is_file(),
        EncoderMissingSnafu {
            path: encoder.path()
        }
    );
    let input_size_bytes = fs::metadata(&request.input_path)
        .context(FileSizeUnavailableSnafu {
            path: &request.input_path,
        })?
        .len();

    let job = EncodeJob {
        input_path: request.input_path.clone(),
        output_path: request.output_path.clone(),
        source_duration_seconds: None,
        progress_percent: 0.0,
        input_size_bytes,
        output_size_bytes: None,
    };

    let (sender, receiver) = mpsc::channel();
    let shared = Arc::new(Shared::default());
    let worker = Worker {
        encoder: encoder.clone(),
        request,
        input_size_bytes,
        events: sender,
        shared: Arc::clone(&shared),
        ctx,
    };
    let worker = thread::Builder::new()
        .name(String::from("squish-encode"))
        .spawn(move || worker.run())
        .context(SpawnWorkerSnafu)?;

    Ok(JobHandle {
        job,
        events: receiver,
        shared,
        worker: Some(worker),
        finished: false,
    })
}

/// Holds at most one job. A new job is rejected while the current one is still running.
#[derive(Debug, Default)]
pub struct JobSlot {
    current: Option<JobHandle>,
}

impl JobSlot {
    pub fn is_busy(&self) -> bool {
        self.current.as_ref().is_some_and(|job| !job.is_finished())
    }

    pub fn current(&self) -> Option<&JobHandle> {
        self.current.as_ref()
    }

    /// Fails with [`JobError::Busy`] while a job is running.
    pub fn ensure_idle(&self) -> Result<(), JobError> {
        ensure!(!self.is_busy(), BusySnafu);
        Ok(())
    }

    pub fn start<C: UIContext>(
        &mut self,
        encoder: &Encoder,
        request: JobRequest,
        ctx: C,
    ) -> Result<&EncodeJob, JobError> {
        self.ensure_idle()?;
        let handle = start_job(encoder, request, ctx)?;
        Ok(self.current.insert(handle).job())
    }

    pub fn poll(&mut self) -> Vec<JobEvent> {
        self.current
            .as_mut()
            .map(JobHandle::try_events)
            .unwrap_or_default()
    }

    pub fn cancel(&self) {
        if let Some(job) = &self.current {
            job.cancel();
        }
    }
}

struct Worker<C> {
    encoder: Encoder,
    request: JobRequest,
    input_size_bytes: u64,
    events: Sender<JobEvent>,
    shared: Arc<Shared>,
    ctx: C,
}

impl<C: UIContext> Worker<C> {
    fn send(&self, event: JobEvent) {
        // The receiver is gone if the handle was dropped; nothing left to tell.
        let _ = self.events.send(event);
        self.ctx.request_repaint();
    }

    fn cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    fn run(self) {
        if self.request.refresh_preview {
            match self.refresh_preview() {
                Ok(preview) => self.send(JobEvent::Preview(preview)),
                Err(err) => {
                    log::warn!("preview generation failed: {err}");
                    self.send(JobEvent::PreviewFailed {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let event = if self.cancelled() {
            JobEvent::Cancelled
        } else {
            self.encode()
        };
        self.send(event);
    }

    fn refresh_preview(&self) -> Result<MediaPreview, PreviewGenerationError> {
        let request = &self.request;
        let scratch = tempfile::Builder::new()
            .prefix("squish_preview_")
            .suffix(".mp4")
            .tempfile_in(&request.scratch_dir)
            .context(TempFileSnafu)?
            .into_temp_path();

        let status = self
            .encoder
            .command(Encoder::preview_args(
                &request.input_path,
                &scratch,
                &request.settings,
            ))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context(RunPreviewEncoderSnafu)?;
        ensure!(status.success(), PreviewEncoderFailedSnafu { status });

        let preview = extract_preview(&self.encoder, &scratch).context(ReadPreviewSnafu)?;
        if let Err(err) = scratch.close() {
            log::warn!("could not remove temporary preview: {err}");
        }

        Ok(match request.preview_size {
            Some((width, height)) => preview.resized_to(width, height),
            None => preview,
        })
    }

    fn encode(&self) -> JobEvent {
        let request = &self.request;
        let spawned = self
            .encoder
            .command(Encoder::encode_args(
                &request.input_path,
                &request.output_path,
                &request.settings,
            ))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                return JobEvent::Failed {
                    reason: format!("Could not run the encoder: {err}"),
                };
            }
        };
        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            return JobEvent::Failed {
                reason: String::from("Encoder diagnostics are unavailable"),
            };
        };

        *self.shared
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(child);
        if self.cancelled() {
            self.shared.kill();
        }
        self.send(JobEvent::Started {
            input_size_bytes: self.input_size_bytes,
        });

        let mut tracker = ProgressTracker::new();
        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        let mut notable = None;
        for line in DiagnosticLines::new(BufReader::new(stderr)) {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::warn!("stopped reading encoder output: {err}");
                    break;
                }
            };

            let parsed = parse_line(&line);
            match &parsed {
                DiagnosticLine::Failure(text) | DiagnosticLine::Exit(text) => {
                    notable = Some(text.clone())
                }
                DiagnosticLine::Other => log::trace!("ffmpeg: {line}"),
                _ => {}
            }
            if let Some(percent) = tracker.feed(&parsed) {
                self.send(JobEvent::Progress {
                    percent,
                    position: tracker.position().unwrap_or_default(),
                    duration: tracker.duration(),
                });
            }

            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        let child = self
            .shared
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let status = match child.map(|mut child| child.wait()) {
            Some(Ok(status)) => status,
            Some(Err(err)) => {
                return JobEvent::Failed {
                    reason: format!("Could not wait for the encoder: {err}"),
                };
            }
            None => {
                return JobEvent::Failed {
                    reason: String::from("Encoder process went missing"),
                };
            }
        };

        if self.cancelled() {
            self.remove_partial_output();
            return JobEvent::Cancelled;
        }

        if !status.success() {
            log::error!(
                "encoder exited with {status}; last output:\n{}",
                tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
            );
            let summary = notable
                .or_else(|| tail.back().cloned())
                .unwrap_or_else(|| String::from("Encoding failed"));
            return JobEvent::Failed {
                reason: format!("{summary} ({status})"),
            };
        }

        let output_size_bytes = match fs::metadata(&request.output_path).context(
            FileSizeUnavailableSnafu {
                path: &request.output_path,
            },
        ) {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                return JobEvent::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let duration = tracker.duration();
        self.send(JobEvent::Progress {
            percent: 100.0,
            position: duration.or(tracker.position()).unwrap_or_default(),
            duration,
        });

        JobEvent::Completed {
            input_size_bytes: self.input_size_bytes,
            output_size_bytes,
            reduction_percent: reduction_percent(self.input_size_bytes, output_size_bytes),
        }
    }

    fn remove_partial_output(&self) {
        match fs::remove_file(&self.request.output_path) {
            Ok(()) => log::debug!(
                "removed partial output {}",
                self.request.output_path.display()
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!(
                "could not remove partial output {}: {err}",
                self.request.output_path.display()
            ),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{os::unix::fs::PermissionsExt, path::Path};

    use super::*;
    use crate::ui_context::Headless;

    /// Writes a shell script standing in for ffmpeg. `$last` holds the output path.
    fn fake_encoder(dir: &Path, body: &str) -> Encoder {
        let path = dir.join("ffmpeg");
        fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Encoder::at(path)
    }

    fn request(dir: &Path, input_bytes: usize) -> JobRequest {
        let input = dir.join("clip.mov");
        fs::write(&input, vec![0u8; input_bytes]).unwrap();
        JobRequest {
            refresh_preview: false,
            scratch_dir: dir.to_path_buf(),
            ..JobRequest::new(input)
        }
    }

    fn drain(handle: &mut JobHandle) -> Vec<JobEvent> {
        std::iter::from_fn(|| handle.recv()).collect()
    }

    const PROGRESS_SCRIPT: &str = r#"
printf '  Duration: 00:00:04.00, start: 0.000000, bitrate: 100 kb/s\n' >&2
printf 'frame=1 time=00:00:01.00 bitrate=1\r' >&2
printf 'frame=2 time=garbage bitrate=1\r' >&2
printf 'frame=3 time=00:00:00.50 bitrate=1\r' >&2
printf 'frame=4 time=00:00:04.00 bitrate=1\n' >&2
head -c 600 /dev/zero > "$last"
"#;

    #[test]
    fn completed_job_reports_progress_and_reduction() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), PROGRESS_SCRIPT);
        let request = request(dir.path(), 1000);
        let output_path = request.output_path.clone();

        let mut handle = start_job(&encoder, request, Headless).unwrap();
        let events = drain(&mut handle);

        let percents: Vec<f64> = events
            .iter()
            .filter_map(|event| match event {
                JobEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, [25.0, 100.0, 100.0]);
        assert_eq!(
            events.first(),
            Some(&JobEvent::Started {
                input_size_bytes: 1000
            })
        );
        assert_eq!(
            events.last(),
            Some(&JobEvent::Completed {
                input_size_bytes: 1000,
                output_size_bytes: 600,
                reduction_percent: 40.0,
            })
        );

        let job = handle.job();
        assert!(handle.is_finished());
        assert_eq!(job.output_path, output_path);
        assert_eq!(job.output_size_bytes, Some(600));
        assert_eq!(job.source_duration_seconds, Some(4.0));
        assert_eq!(job.progress_percent, 100.0);
    }

    #[test]
    fn unknown_duration_leaves_duration_unset() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"
printf '  Duration: N/A, bitrate: N/A\n' >&2
printf 'frame=1 time=00:00:01.00 bitrate=1\n' >&2
head -c 100 /dev/zero > "$last"
"#,
        );
        let mut handle = start_job(&encoder, request(dir.path(), 1000), Headless).unwrap();
        let events = drain(&mut handle);

        let progress: Vec<(f64, Option<f64>)> = events
            .iter()
            .filter_map(|event| match event {
                JobEvent::Progress {
                    percent, duration, ..
                } => Some((*percent, *duration)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, [(100.0, None)]);
        assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));

        let job = handle.job();
        assert_eq!(job.source_duration_seconds, None);
        assert_eq!(job.progress_percent, 100.0);
    }

    #[test]
    fn failed_encode_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            "printf 'clip.mov: Invalid data found\\nConversion failed!\\n' >&2\nexit 1",
        );
        let mut handle = start_job(&encoder, request(dir.path(), 10), Headless).unwrap();
        let events = drain(&mut handle);

        match events.last() {
            Some(JobEvent::Failed { reason }) => {
                assert!(reason.starts_with("Conversion failed!"), "{reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn preview_failure_does_not_stop_the_encode() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            &format!("case \"$*\" in *-vframes*) exit 1;; esac\n{PROGRESS_SCRIPT}"),
        );
        let request = JobRequest {
            refresh_preview: true,
            ..request(dir.path(), 1000)
        };
        let mut handle = start_job(&encoder, request, Headless).unwrap();
        let events = drain(&mut handle);

        assert!(matches!(events[0], JobEvent::PreviewFailed { .. }));
        assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
        // The scratch file is cleaned up even though the preview pass failed.
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("squish_preview_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_input_has_no_size() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 0");
        let err = start_job(&encoder, JobRequest::new(dir.path().join("gone.mp4")), Headless)
            .unwrap_err();
        assert!(matches!(err, JobError::FileSizeUnavailable { .. }));
    }

    #[test]
    fn missing_encoder_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Encoder::at(dir.path().join("ffmpeg"));
        let err = start_job(&encoder, request(dir.path(), 10), Headless).unwrap_err();
        assert!(matches!(err, JobError::EncoderMissing { .. }));
    }

    #[test]
    fn kill_still_works_after_a_panic_while_locked() {
        let shared = Arc::new(Shared::default());
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        *shared.child.lock().unwrap() = Some(child);

        let holder = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = holder.child.lock().unwrap();
            panic!("worker panicked while holding the child");
        })
        .join();
        assert!(shared.child.is_poisoned());

        shared.kill();
        let mut child = shared
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap();
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn slot_rejects_second_job_and_cancel_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "head -c 10 /dev/zero > \"$last\"\nexec sleep 30");
        let request = request(dir.path(), 10);
        let output_path = request.output_path.clone();

        let mut slot = JobSlot::default();
        slot.start(&encoder, request.clone(), Headless).unwrap();
        assert!(slot.is_busy());
        assert!(matches!(
            slot.start(&encoder, request, Headless),
            Err(JobError::Busy)
        ));

        // Wait for the process to be running before cancelling it.
        let handle = slot.current.as_mut().unwrap();
        assert!(matches!(handle.recv(), Some(JobEvent::Started { .. })));
        slot.cancel();

        let handle = slot.current.as_mut().unwrap();
        let events = drain(handle);
        assert_eq!(events.last(), Some(&JobEvent::Cancelled));
        assert!(!slot.is_busy());
        assert!(!output_path.exists());
    }
}
