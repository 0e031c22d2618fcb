use crate::error::{InvalidEventError, InvalidReason};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Number of keys on the virtual keyboard. Valid pitches are `0..PITCH_SPAN`.
pub const PITCH_SPAN: u32 = 110;

/// Highest pitch code accepted at ingestion.
pub const PITCH_MAX: i32 = PITCH_SPAN as i32 - 1;

// ─── Analysis output ────────────────────────────────────────────────────────

/// One record from the transcriber, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    /// Seconds from the start of the file
    pub timestamp: f64,
    /// Seconds
    pub duration: f64,
    /// MIDI note number
    pub pitch: i32,
}

impl RawNote {
    pub fn new(timestamp: f64, duration: f64, pitch: i32) -> Self {
        Self {
            timestamp,
            duration,
            pitch,
        }
    }
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// A detected note. Immutable once built; only `Event::new` can make one,
/// so every Event in the system has a finite onset, a positive duration and
/// a pitch on the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    id: u64,
    onset: f64,
    duration: f64,
    pitch: u8,
}

impl Event {
    pub fn new(id: u64, onset: f64, duration: f64, pitch: i32) -> Result<Self, InvalidEventError> {
        let reason = if !onset.is_finite() || onset < 0.0 {
            Some(InvalidReason::Onset(onset))
        } else if !duration.is_finite() || duration <= 0.0 {
            Some(InvalidReason::Duration(duration))
        } else if !(0..=PITCH_MAX).contains(&pitch) {
            Some(InvalidReason::Pitch(pitch))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidEventError { index: id, reason }),
            None => Ok(Self {
                id,
                onset,
                duration,
                pitch: pitch as u8,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// Natural expiry time: `onset + duration`.
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} onset={:.2} duration={:.2} pitch={}",
            self.id, self.onset, self.duration, self.pitch
        )
    }
}

// ─── Geometry ───────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in virtual screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }
}

/// 8-bit RGB colour. Serializes as a `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale every channel by `fraction` (clamped to [0, 1]), truncating.
    pub fn scaled(&self, fraction: f64) -> Self {
        let k = fraction.clamp(0.0, 1.0);
        let ch = |c: u8| (k * c as f64) as u8;
        Self::new(ch(self.r), ch(self.g), ch(self.b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accepts_keyboard_bounds() {
        assert!(Event::new(0, 0.0, 0.1, 0).is_ok());
        assert!(Event::new(1, 3.5, 2.0, PITCH_MAX).is_ok());
    }

    #[test]
    fn test_event_rejects_bad_fields() {
        let err = Event::new(4, 1.0, 0.0, 60).unwrap_err();
        assert_eq!(err.index, 4);
        assert!(matches!(err.reason, InvalidReason::Duration(_)));

        assert!(matches!(
            Event::new(0, -0.1, 1.0, 60).unwrap_err().reason,
            InvalidReason::Onset(_)
        ));
        assert!(matches!(
            Event::new(0, f64::NAN, 1.0, 60).unwrap_err().reason,
            InvalidReason::Onset(_)
        ));
        assert!(matches!(
            Event::new(0, 1.0, f64::INFINITY, 60).unwrap_err().reason,
            InvalidReason::Duration(_)
        ));
        assert!(matches!(
            Event::new(0, 1.0, 1.0, 110).unwrap_err().reason,
            InvalidReason::Pitch(110)
        ));
        assert!(matches!(
            Event::new(0, 1.0, 1.0, -1).unwrap_err().reason,
            InvalidReason::Pitch(-1)
        ));
    }

    #[test]
    fn test_event_end() {
        let e = Event::new(0, 1.25, 0.5, 60).unwrap();
        assert!((e.end() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_rgb_scaled_truncates_and_clamps() {
        let c = Rgb::new(255, 100, 3);
        assert_eq!(c.scaled(1.0), c);
        assert_eq!(c.scaled(0.5), Rgb::new(127, 50, 1));
        assert_eq!(c.scaled(0.0), Rgb::BLACK);
        assert_eq!(c.scaled(7.0), c, "fractions above 1 must not amplify");
        assert_eq!(c.scaled(-2.0), Rgb::BLACK);
    }

    #[test]
    fn test_rgb_serializes_as_array() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Rgb = serde_json::from_str("[255,0,0]").unwrap();
        assert_eq!(back, Rgb::RED);
    }
}
