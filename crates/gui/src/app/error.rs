use std::{io, path::PathBuf};

use snafu::Snafu;
use squish::{JobError, PreviewError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApplicationError {
    #[snafu(display("{source}"))]
    LocateEncoder { source: JobError },

    #[snafu(display("{source}"))]
    LoadPreview { source: PreviewError },

    #[snafu(display("Cannot get file size of {}: {source}", path.display()))]
    ReadFileSize { path: PathBuf, source: io::Error },

    #[snafu(display("{source}"))]
    StartJob { source: JobError },

    #[snafu(display("Could not open {}: {source}", path.display()))]
    OpenOutput { path: PathBuf, source: io::Error },
}
