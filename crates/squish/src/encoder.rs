use std::{
    env,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use image::{ImageFormat, RgbImage};
use snafu::{ResultExt, ensure};

use crate::{
    error::{
        DecodeFrameSnafu, DecoderFailedSnafu, EncoderMissingSnafu, FrameSourceError, JobError,
        NoFrameSnafu, SpawnDecoderSnafu,
    },
    preview::FrameSource,
};

/// Environment variable that overrides where the encoder executable is looked up.
pub const ENCODER_ENV_VAR: &str = "SQUISH_FFMPEG";

/// Fixed quality/preset parameters handed to the encoder for both the preview and the full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl EncodeSettings {
    pub const CRF_RANGE: std::ops::RangeInclusive<u8> = 0..=51;
    pub const PRESETS: &'static [&'static str] = &[
        "ultrafast",
        "superfast",
        "veryfast",
        "faster",
        "fast",
        "medium",
        "slow",
        "slower",
        "veryslow",
    ];
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: String::from("libx264"),
            crf: 23,
            preset: String::from("medium"),
            audio_codec: String::from("aac"),
            audio_bitrate: String::from("128k"),
        }
    }
}

/// Handle to the external ffmpeg executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    path: PathBuf,
}

impl Encoder {
    /// Wraps `path` without checking that it exists.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Where the encoder is expected when it ships next to our own executable.
    pub fn bundled_path() -> Option<PathBuf> {
        let mut path = env::current_exe().ok()?;
        path.pop();
        path.push(format!("ffmpeg{}", env::consts::EXE_SUFFIX));
        Some(path)
    }

    /// Finds the encoder: an explicit path wins, then [`ENCODER_ENV_VAR`], then the bundled location.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, JobError> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(ENCODER_ENV_VAR).map(PathBuf::from))
            .or_else(Self::bundled_path)
            .unwrap_or_else(|| PathBuf::from(format!("ffmpeg{}", env::consts::EXE_SUFFIX)));

        ensure!(candidate.is_file(), EncoderMissingSnafu { path: candidate });
        log::debug!("using encoder at {}", candidate.display());
        Ok(Self::at(candidate))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.path);
        command.args(args).stdin(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        log::debug!("{:?}", command);
        command
    }

    /// Arguments for encoding only the first frame of `input` into `output`.
    pub fn preview_args(input: &Path, output: &Path, settings: &EncodeSettings) -> Vec<OsString> {
        let mut args = vec![OsString::from("-i"), input.into(), "-vframes".into(), "1".into()];
        args.extend(Self::video_args(settings));
        args.extend([OsString::from("-y"), output.into()]);
        args
    }

    /// Arguments for the full transcode of `input` into `output`.
    pub fn encode_args(input: &Path, output: &Path, settings: &EncodeSettings) -> Vec<OsString> {
        let mut args = vec![OsString::from("-i"), input.into()];
        args.extend(Self::video_args(settings));
        args.extend([
            OsString::from("-c:a"),
            OsString::from(&settings.audio_codec),
            "-b:a".into(),
            OsString::from(&settings.audio_bitrate),
            "-y".into(),
            output.into(),
        ]);
        args
    }

    /// Arguments that make the encoder write the first frame of `input` to stdout as a PNG.
    pub fn first_frame_args(input: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("-v"), "error".into(), "-i".into(), input.into()];
        args.extend(
            ["-frames:v", "1", "-f", "image2pipe", "-c:v", "png", "-"].map(OsString::from),
        );
        args
    }

    fn video_args(settings: &EncodeSettings) -> [OsString; 6] {
        [
            "-c:v".into(),
            OsString::from(&settings.video_codec),
            "-crf".into(),
            settings.crf.to_string().into(),
            "-preset".into(),
            OsString::from(&settings.preset),
        ]
    }
}

impl FrameSource for Encoder {
    fn first_frame(&self, path: &Path) -> Result<RgbImage, FrameSourceError> {
        let output = self
            .command(Self::first_frame_args(path))
            .output()
            .context(SpawnDecoderSnafu)?;

        ensure!(
            output.status.success(),
            DecoderFailedSnafu {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
        );
        ensure!(!output.stdout.is_empty(), NoFrameSnafu);

        let frame = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .context(DecodeFrameSnafu)?;
        Ok(frame.into_rgb8())
    }
}
