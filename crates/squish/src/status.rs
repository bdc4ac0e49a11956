use std::{fmt, path::Path};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Converts a byte count to megabytes, rounded to two decimal places.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// How much smaller the output is than the input, in percent rounded to one decimal place. Negative if the output
/// grew.
pub fn reduction_percent(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes == 0 {
        return 0.0;
    }
    let ratio = 1.0 - output_bytes as f64 / input_bytes as f64;
    (ratio * 100.0 * 10.0).round() / 10.0
}

/// Where the compressed copy of `input` is written: `<dir>/<stem>_compressed.mp4`.
pub fn output_path_for(input: &Path) -> std::path::PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("_compressed.mp4");
    input.with_file_name(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusKind {
    #[default]
    Info,
    Working,
    Success,
    Error,
}

/// The single line of text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub kind: StatusKind,
}

impl Status {
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn waiting() -> Self {
        Self::new(StatusKind::Info, "Waiting for file...")
    }

    pub fn file_size(bytes: u64) -> Self {
        Self::new(
            StatusKind::Info,
            format!("File size: {:.2} MB", bytes_to_mb(bytes)),
        )
    }

    pub fn preparing(bytes: u64) -> Self {
        Self::new(
            StatusKind::Working,
            format!("File size: {:.2} MB, generating preview...", bytes_to_mb(bytes)),
        )
    }

    pub fn compressing(bytes: u64) -> Self {
        Self::new(
            StatusKind::Working,
            format!("File size: {:.2} MB, Compressing...", bytes_to_mb(bytes)),
        )
    }

    pub fn complete(input_bytes: u64, output_bytes: u64, reduction_percent: f64) -> Self {
        Self::new(
            StatusKind::Success,
            format!(
                "Complete: {:.2} MB → {:.2} MB (Reduced {reduction_percent:.1}%)",
                bytes_to_mb(input_bytes),
                bytes_to_mb(output_bytes)
            ),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(StatusKind::Info, "Cancelled, partial output removed")
    }

    pub fn error(err: impl fmt::Display) -> Self {
        Self::new(StatusKind::Error, format!("Error: {err}"))
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::waiting()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
