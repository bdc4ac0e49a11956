use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaStyle {
    /// `1h 2m 3s`
    Short,
    /// `1 hour, 2 minutes, 3 seconds`
    Long,
}

impl EtaStyle {
    fn unit(self, value: u64, index: usize) -> &'static str {
        const SHORT: [&str; 3] = ["h", "m", "s"];
        const LONG: [[&str; 2]; 3] = [
            [" hour", " hours"],
            [" minute", " minutes"],
            [" second", " seconds"],
        ];
        match self {
            Self::Short => SHORT[index],
            Self::Long => LONG[index][usize::from(value != 1)],
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Self::Short => " ",
            Self::Long => ", ",
        }
    }
}

/// Writes a rounded-up duration, leaving out leading hour and minute fields that are zero.
pub fn format_eta(mut dest: impl Write, seconds: f64, style: EtaStyle) -> fmt::Result {
    let total = if seconds.is_finite() {
        seconds.max(0.0).ceil() as u64
    } else {
        0
    };
    let fields = [total / 3600, total % 3600 / 60, total % 60];

    let first = fields[..2].iter().position(|field| *field > 0).unwrap_or(2);
    for (index, value) in fields.iter().enumerate().skip(first) {
        if index > first {
            dest.write_str(style.separator())?;
        }
        write!(dest, "{value}{}", style.unit(*value, index))?;
    }
    Ok(())
}

/// Formats seconds as `H:MM:SS.ss`, or `MM:SS.ss` under an hour.
pub fn format_clock(seconds: f64, mut dest: impl Write) -> fmt::Result {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let whole = seconds as u64;
    let (hours, minutes) = (whole / 3600, whole % 3600 / 60);
    let secs = seconds - (whole - whole % 60) as f64;
    if hours > 0 {
        write!(dest, "{hours}:")?;
    }
    write!(dest, "{minutes:02}:{secs:05.2}")
}
