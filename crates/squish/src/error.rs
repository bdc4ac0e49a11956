use std::{io, path::PathBuf, process::ExitStatus};

use image::ImageError;
use snafu::Snafu;

/// Errors from pulling a single frame out of a media file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameSourceError {
    #[snafu(display("Could not run the decoder: {source}"))]
    SpawnDecoder { source: io::Error },

    #[snafu(display("Decoder exited with {status}: {stderr}"))]
    DecoderFailed { status: ExitStatus, stderr: String },

    #[snafu(display("No decodable video frame"))]
    NoFrame,

    #[snafu(display("Could not decode frame: {source}"))]
    DecodeFrame { source: ImageError },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PreviewError {
    #[snafu(display("Unsupported file format: {}", path.display()))]
    UnsupportedFormat { path: PathBuf },

    #[snafu(display("Cannot read video file {}: {source}", path.display()))]
    UnreadableMedia {
        path: PathBuf,
        source: FrameSourceError,
    },
}

/// Failure of the one-frame preview pass. Never fatal to the job that produced it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PreviewGenerationError {
    #[snafu(display("Could not create temporary preview file: {source}"))]
    TempFile { source: io::Error },

    #[snafu(display("Could not run the encoder for the preview: {source}"))]
    RunPreviewEncoder { source: io::Error },

    #[snafu(display("Preview encode exited with {status}"))]
    PreviewEncoderFailed { status: ExitStatus },

    #[snafu(display("Could not read back the preview: {source}"))]
    ReadPreview { source: PreviewError },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JobError {
    #[snafu(display("ffmpeg not found at {}", path.display()))]
    EncoderMissing { path: PathBuf },

    #[snafu(display("An encode is already running"))]
    Busy,

    #[snafu(display("Cannot get file size of {}: {source}", path.display()))]
    FileSizeUnavailable { path: PathBuf, source: io::Error },

    #[snafu(display("Could not start the encoder thread: {source}"))]
    SpawnWorker { source: io::Error },
}
