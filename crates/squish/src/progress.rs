//! Parsing of the encoder's diagnostic stream.
//!
//! ffmpeg reports progress on stderr as unstructured text, and rewrites its status line in place with
//! carriage returns. [`DiagnosticLines`] splits the stream on either line ending, [`parse_line`] tags each line,
//! and [`ProgressTracker`] folds tagged lines into a monotonic percentage.

use std::{
    io::{self, BufRead},
    sync::LazyLock,
};

use regex::Regex;

/// `Duration: HH:MM:SS.ss,` from the input header. `N/A` when the container doesn't say.
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(N/A|\d+:\d{2}:\d{2}(?:\.\d+)?)(?:[,\s]|$)")
        .expect("duration pattern is valid")
});

/// `time=[[HH:]MM:]SS[.ss]` from the status line.
static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=((?:\d+:){0,2}\d+(?:\.\d+)?)(?:\s|$)").expect("time pattern is valid")
});

const UNKNOWN: &str = "N/A";

/// One line of encoder diagnostics, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticLine {
    /// Total length of the source in seconds, or `None` if the encoder doesn't know it.
    Duration(Option<f64>),
    /// How far into the source the encoder has gotten, in seconds.
    Time(f64),
    /// The encoder's terminal failure message.
    Failure(String),
    /// The encoder stopped on a signal.
    Exit(String),
    Other,
}

pub fn parse_line(line: &str) -> DiagnosticLine {
    let line = line.trim();

    if let Some(captures) = DURATION.captures(line) {
        let value = &captures[1];
        if value == UNKNOWN {
            return DiagnosticLine::Duration(None);
        }
        return timestamp_seconds(value)
            .map_or(DiagnosticLine::Other, |seconds| DiagnosticLine::Duration(Some(seconds)));
    }

    if let Some(captures) = TIME.captures(line) {
        return timestamp_seconds(&captures[1]).map_or(DiagnosticLine::Other, DiagnosticLine::Time);
    }

    if line.starts_with("Conversion failed") {
        return DiagnosticLine::Failure(line.to_owned());
    }

    if line.starts_with("Exiting normally, received signal") {
        return DiagnosticLine::Exit(line.to_owned());
    }

    DiagnosticLine::Other
}

/// Seconds in a `:`-separated timestamp that the patterns above have already validated.
fn timestamp_seconds(value: &str) -> Option<f64> {
    value
        .split(':')
        .try_fold(0.0, |total, field| Some(total * 60.0 + field.parse::<f64>().ok()?))
}

/// Folds diagnostic lines into a progress percentage.
///
/// Only the first duration line is honoured. Progress is never reported before the duration is known, and never
/// goes backwards: a timestamp earlier than one already seen is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    duration: Option<f64>,
    saw_duration: bool,
    position: Option<f64>,
    percent: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total source duration in seconds, if known.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Furthest position reached, in seconds.
    pub fn position(&self) -> Option<f64> {
        self.position
    }

    /// Last reported percentage.
    pub fn percent(&self) -> Option<f64> {
        self.percent
    }

    /// Returns the new percentage if `line` moved progress forward (or reported it for the first time).
    pub fn feed(&mut self, line: &DiagnosticLine) -> Option<f64> {
        match *line {
            DiagnosticLine::Duration(duration) => {
                if !self.saw_duration {
                    self.saw_duration = true;
                    self.duration = duration.filter(|d| *d > 0.0);
                }
                None
            }
            DiagnosticLine::Time(elapsed) => {
                let duration = self.duration?;
                if self.position.is_some_and(|position| elapsed < position) {
                    return None;
                }
                self.position = Some(elapsed);

                let percent = (elapsed / duration * 100.0).clamp(0.0, 100.0);
                match self.percent {
                    Some(last) if percent <= last => None,
                    _ => {
                        self.percent = Some(percent);
                        Some(percent)
                    }
                }
            }
            _ => None,
        }
    }
}

/// Splits a byte stream into lines on `\n`, `\r` or both. Empty lines are skipped and invalid UTF-8 is replaced.
pub struct DiagnosticLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> DiagnosticLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

impl<R: BufRead> Iterator for DiagnosticLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(Err(err)),
            };

            if available.is_empty() {
                return (!self.buf.is_empty()).then(|| Ok(self.take_line()));
            }

            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(end) => {
                    self.buf.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    if !self.buf.is_empty() {
                        return Some(Ok(self.take_line()));
                    }
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }
}
