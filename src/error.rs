//! Error kinds surfaced to the caller. Nothing in the crate retries; every
//! variant either aborts the run or, for invalid events under the drop
//! policy, is counted and logged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a raw analysis record was refused at ingestion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidReason {
    /// Onset not finite or negative
    Onset(f64),
    /// Duration not finite or not strictly positive
    Duration(f64),
    /// Pitch outside the keyboard
    Pitch(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid event #{index}: {}", describe(.reason))]
pub struct InvalidEventError {
    /// Position of the offending record in the analysis output
    pub index: u64,
    pub reason: InvalidReason,
}

fn describe(reason: &InvalidReason) -> String {
    match reason {
        InvalidReason::Onset(t) => format!("onset {t} is not a finite, non-negative time"),
        InvalidReason::Duration(d) => format!("duration {d} is not a finite, positive length"),
        InvalidReason::Pitch(p) => format!("pitch {p} is outside 0..={}", crate::types::PITCH_MAX),
    }
}

#[derive(Debug, Error)]
pub enum VizError {
    #[error("cannot read {path:?}: {reason}")]
    InputFile { path: PathBuf, reason: String },

    #[error(transparent)]
    InvalidEvent(#[from] InvalidEventError),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("rendering failed: {0}")]
    Rendering(String),

    #[error("playback failed: {0}")]
    Playback(String),
}

impl VizError {
    pub fn input_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VizError::InputFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<io::Error> for VizError {
    fn from(e: io::Error) -> Self {
        VizError::Rendering(e.to_string())
    }
}
