use std::{
    fmt::{self, Display, Write as _},
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use clap::{
    Arg, ArgAction,
    builder::{PathBufValueParser, PossibleValuesParser},
    command,
};
use color_eyre::eyre::{Report, Result, WrapErr, bail};
use console::{StyledObject, Term, measure_text_width, style, truncate_str};
use gui::app::{
    encode_job::EtaEstimator,
    format_eta::{EtaStyle, format_clock, format_eta},
};
use squish::{
    EncodeSettings, Encoder, JobEvent, JobRequest, ViewState,
    encoder::ENCODER_ENV_VAR,
    preview::{SUPPORTED_EXTENSIONS, is_supported},
    start_job,
    status::output_path_for,
    ui_context::UIContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverwritePolicy {
    Ask,
    Always,
    Never,
}

pub fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let defaults = EncodeSettings::default();
    let crf_range = i64::from(*EncodeSettings::CRF_RANGE.start())
        ..=i64::from(*EncodeSettings::CRF_RANGE.end());

    let matches = command!()
        .name("squish")
        .about("Compresses a video with ffmpeg, showing progress in the terminal.")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_parser(PathBufValueParser::new())
                .help(format!(
                    "Video to compress ({}).",
                    SUPPORTED_EXTENSIONS.join(", ")
                ))
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(PathBufValueParser::new())
                .help(
                    "Compressed file to write. Defaults to <input>_compressed.mp4 in the same \
                     folder.",
                ),
        )
        .arg(
            Arg::new("overwrite")
                .short('y')
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-overwrite")
                .help("Replace an existing output file without asking."),
        )
        .arg(
            Arg::new("no-overwrite")
                .short('n')
                .long("no-overwrite")
                .action(ArgAction::SetTrue)
                .help("Exit without doing anything if the output file already exists."),
        )
        .arg(
            Arg::new("ffmpeg")
                .long("ffmpeg")
                .value_parser(PathBufValueParser::new())
                .help(format!(
                    "ffmpeg executable to use. Takes precedence over {ENCODER_ENV_VAR}."
                )),
        )
        .arg(
            Arg::new("crf")
                .long("crf")
                .value_parser(clap::value_parser!(u8).range(crf_range))
                .default_value(defaults.crf.to_string())
                .help("Constant rate factor. Lower means better quality and a bigger file."),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .value_parser(PossibleValuesParser::new(
                    EncodeSettings::PRESETS.iter().copied(),
                ))
                .default_value(defaults.preset.clone())
                .help("Encoder speed preset. Slower presets compress better."),
        )
        .arg(
            Arg::new("audio-bitrate")
                .long("audio-bitrate")
                .default_value(defaults.audio_bitrate.clone())
                .help("Bitrate of the re-encoded audio track."),
        )
        .arg(
            Arg::new("no-preview")
                .long("no-preview")
                .action(ArgAction::SetTrue)
                .help("Skip the single-frame preview pass before the full encode."),
        )
        .get_matches();

    let input_path = matches
        .get_one::<PathBuf>("input")
        .expect("input is a required argument");
    let output_path = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| output_path_for(input_path));
    let policy = if matches.get_flag("overwrite") {
        OverwritePolicy::Always
    } else if matches.get_flag("no-overwrite") {
        OverwritePolicy::Never
    } else {
        OverwritePolicy::Ask
    };
    let settings = EncodeSettings {
        crf: *matches.get_one::<u8>("crf").expect("crf has a default"),
        preset: matches
            .get_one::<String>("preset")
            .expect("preset has a default")
            .clone(),
        audio_bitrate: matches
            .get_one::<String>("audio-bitrate")
            .expect("audio bitrate has a default")
            .clone(),
        ..defaults
    };

    let mut term = Term::buffered_stdout();
    writeln!(
        term,
        "{} {}",
        style("squish").bold().cyan(),
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
    )?;
    term.flush()?;

    if !is_supported(input_path) {
        bail!(
            "Unsupported file format: {} (expected one of {})",
            input_path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    if output_path
        .extension()
        .is_none_or(|extension| !extension.eq_ignore_ascii_case("mp4"))
    {
        warning(
            &term,
            format_args!(
                "{} will contain MP4 data regardless of its extension",
                output_path.display()
            ),
        )?;
    }
    if !may_write(&term, &output_path, policy)? {
        term.write_line("Not overwriting existing file. Exiting.")?;
        term.flush()?;
        return Ok(());
    }

    let encoder = Encoder::locate(matches.get_one::<PathBuf>("ffmpeg").map(PathBuf::as_path))
        .wrap_err("Cannot run without ffmpeg")?;

    let (display, renderer) = ProgressDisplay::spawn(term.clone());
    let request = JobRequest {
        output_path: output_path.clone(),
        settings,
        refresh_preview: !matches.get_flag("no-preview"),
        ..JobRequest::new(input_path)
    };
    let mut job = start_job(&encoder, request, display.clone())?;

    let mut view = ViewState::new();
    view.begin_job(job.job());
    display.println(view.status().text.clone());

    let mut outcome = None;
    while let Some(event) = job.recv() {
        view.apply(&event);
        match event {
            JobEvent::Preview(preview) => display.println(format!(
                "Preview frame encoded ({}x{})",
                preview.width(),
                preview.height()
            )),
            JobEvent::PreviewFailed { reason } => display.println(
                style(format!("Skipping preview: {reason}"))
                    .yellow()
                    .to_string(),
            ),
            JobEvent::Started { .. } => display.println(view.status().text.clone()),
            JobEvent::Progress {
                percent,
                position,
                duration,
            } => display.progress(ProgressSnapshot {
                percent,
                position,
                duration,
            }),
            terminal => outcome = Some(terminal),
        }
    }

    display.close();
    renderer
        .join()
        .map_err(|_| Report::msg("Progress display panicked"))??;

    match outcome {
        Some(JobEvent::Completed { .. }) => {
            writeln!(term, "{}", style(view.status()).green())?;
            writeln!(term, "Wrote {}", output_path.display())?;
            term.flush()?;
            Ok(())
        }
        Some(JobEvent::Failed { reason }) => Err(Report::msg(reason)),
        Some(JobEvent::Cancelled) => bail!("Encode was cancelled"),
        _ => bail!("ffmpeg stopped without reporting a result"),
    }
}

fn warning(term: &Term, message: impl Display) -> io::Result<()> {
    term.write_line(&style(format!("Warning: {message}")).yellow().to_string())
}

/// Whether the output may be written, asking on the terminal if it exists and the policy says to.
fn may_write(term: &Term, path: &Path, policy: OverwritePolicy) -> Result<bool> {
    match fs::metadata(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => {
            return Err(err).wrap_err_with(|| format!("Cannot inspect {}", path.display()));
        }
        Ok(metadata) if metadata.is_dir() => bail!("Output path {} is a folder", path.display()),
        Ok(_) => {}
    }

    match policy {
        OverwritePolicy::Always => Ok(true),
        OverwritePolicy::Never => Ok(false),
        OverwritePolicy::Ask if !term.is_term() => Ok(false),
        OverwritePolicy::Ask => loop {
            term.write_str(&format!(
                "{} already exists. Overwrite? [y/N] ",
                path.display()
            ))?;
            term.flush()?;
            match term.read_line()?.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => break Ok(true),
                "" | "n" | "no" => break Ok(false),
                _ => term.write_line("Please answer y or n.")?,
            }
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct ProgressSnapshot {
    percent: f64,
    position: f64,
    duration: Option<f64>,
}

enum DisplayMsg {
    Progress(ProgressSnapshot),
    Print(String),
    Repaint,
    Close,
}

/// Sending half of the terminal display. The renderer thread owns the terminal, so printed lines and the progress
/// bar never interleave.
#[derive(Debug, Clone)]
struct ProgressDisplay {
    sender: Sender<DisplayMsg>,
}

impl ProgressDisplay {
    fn spawn(term: Term) -> (Self, JoinHandle<Result<()>>) {
        let (sender, receiver) = mpsc::channel();
        let renderer = Renderer {
            animate: term.is_term(),
            term,
            eta: EtaEstimator::new(),
            latest: None,
            start_time: Instant::now(),
        };
        let handle = thread::spawn(move || renderer.run(receiver));
        (Self { sender }, handle)
    }

    fn send(&self, msg: DisplayMsg) {
        // Only fails once the renderer has exited
        let _ = self.sender.send(msg);
    }

    fn progress(&self, snapshot: ProgressSnapshot) {
        self.send(DisplayMsg::Progress(snapshot));
    }

    fn println(&self, line: impl Into<String>) {
        self.send(DisplayMsg::Print(line.into()));
    }

    fn close(&self) {
        self.send(DisplayMsg::Close);
    }
}

impl UIContext for ProgressDisplay {
    fn request_repaint(&self) {
        self.send(DisplayMsg::Repaint);
    }
}

struct Renderer {
    term: Term,
    /// Redraw the bar in place. Off when stdout isn't a terminal, where only printed lines go out.
    animate: bool,
    eta: EtaEstimator,
    latest: Option<ProgressSnapshot>,
    start_time: Instant,
}

impl Renderer {
    const FRAME_TIME: Duration = Duration::from_millis(33);

    fn run(mut self, receiver: Receiver<DisplayMsg>) -> Result<()> {
        loop {
            let msg = if self.animate {
                match receiver.recv_timeout(Self::FRAME_TIME) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => DisplayMsg::Repaint,
                    Err(RecvTimeoutError::Disconnected) => DisplayMsg::Close,
                }
            } else {
                receiver.recv().unwrap_or(DisplayMsg::Close)
            };

            match msg {
                DisplayMsg::Progress(snapshot) => {
                    let now = self.start_time.elapsed().as_secs_f64();
                    self.eta.update(snapshot.percent / 100.0, now);
                    self.latest = Some(snapshot);
                }
                DisplayMsg::Print(line) => {
                    if self.animate {
                        self.term.clear_line()?;
                    }
                    self.term.write_line(&line)?;
                }
                DisplayMsg::Repaint => {}
                DisplayMsg::Close => break,
            }

            if self.animate {
                self.redraw()?;
            }
            self.term.flush()?;
        }

        if self.animate {
            self.term.clear_line()?;
            self.term.show_cursor()?;
        }
        self.term.flush()?;
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(progress) = self.latest else {
            return Ok(());
        };
        let now = self.start_time.elapsed().as_secs_f64();
        let label = progress_label(progress, self.eta.time_remaining(now))?;

        let width = usize::from(self.term.size().1);
        let label = truncate_str(&label, width, "…");
        let bar_width = width.saturating_sub(measure_text_width(&label) + 1);

        self.term.clear_line()?;
        self.term.hide_cursor()?;
        if bar_width > 0 {
            write!(self.term, "{} ", bar(bar_width, progress.percent / 100.0))?;
        }
        write!(self.term, "{label}")?;
        Ok(())
    }
}

/// `MM:SS.ss / MM:SS.ss | pct% | eta`. The total reads `--:--` when the source length is unknown.
fn progress_label(progress: ProgressSnapshot, eta: Option<f64>) -> Result<String, fmt::Error> {
    let mut label = String::new();
    format_clock(progress.position, &mut label)?;
    label.push_str(" / ");
    match progress.duration {
        Some(duration) => format_clock(duration, &mut label)?,
        None => label.push_str("--:--"),
    }
    write!(label, " | {:>3.0}% | ", progress.percent)?;
    match eta {
        Some(eta) => format_eta(&mut label, eta, EtaStyle::Short)?,
        None => label.push('?'),
    }
    Ok(label)
}

/// A bar `width` cells wide with eighth-of-a-cell resolution.
fn bar(width: usize, fraction: f64) -> StyledObject<String> {
    const EIGHTHS: [char; 8] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉'];

    let filled = (fraction.clamp(0.0, 1.0) * (width * 8) as f64).round() as usize;
    let (full, partial) = (filled / 8, filled % 8);

    let mut cells = String::with_capacity(width * 3);
    cells.extend(std::iter::repeat_n('█', full));
    if full < width {
        cells.push(EIGHTHS[partial]);
        cells.extend(std::iter::repeat_n(' ', width - full - 1));
    }
    style(cells).on_color256(8)
}
