use crate::types::{Event, Rect, Rgb, PITCH_SPAN};

/// Where a pitch lands on the virtual screen.
///
/// The keyboard is a single horizontal band at mid-height: pitch `p` sits at
/// `x = width * p / pitch_span`, each key is `width / pitch_span` wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyboardLayout {
    pub width: u32,
    pub height: u32,
    pub pitch_span: u32,
    pub token_height: u32,
}

impl KeyboardLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pitch_span: PITCH_SPAN,
            token_height: 50,
        }
    }

    pub fn key_rect(&self, pitch: u8) -> Rect {
        let span = self.pitch_span.max(1) as u64;
        let x = (self.width as u64 * pitch as u64 / span) as u32;
        let w = (self.width as u64 / span).max(1) as u32;
        Rect::new(x, self.height / 2, w, self.token_height)
    }
}

impl Default for KeyboardLayout {
    fn default() -> Self {
        Self::new(1024, 640)
    }
}

/// On-screen bar for one released event. Fades linearly from full colour at
/// the event's onset to black at its end, then expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualToken {
    pub rect: Rect,
    pub color: Rgb,
    pub expiry_time: f64,
    pub event: Event,
}

impl VisualToken {
    pub fn new(event: Event, layout: &KeyboardLayout, color: Rgb) -> Self {
        Self {
            rect: layout.key_rect(event.pitch()),
            color,
            expiry_time: event.onset() + event.duration(),
            event,
        }
    }

    /// Fraction of full colour at `current_time`, in [0, 1].
    pub fn intensity(&self, current_time: f64) -> f64 {
        let duration = self.event.duration();
        let peak = self.expiry_time - duration;
        (1.0 - (current_time - peak) / duration).clamp(0.0, 1.0)
    }

    pub fn has_expired(&self, current_time: f64) -> bool {
        current_time > self.expiry_time
    }

    /// Base colour dimmed to the current intensity.
    pub fn shaded(&self, current_time: f64) -> Rgb {
        self.color.scaled(self.intensity(current_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(onset: f64, duration: f64, pitch: i32) -> VisualToken {
        let e = Event::new(0, onset, duration, pitch).unwrap();
        VisualToken::new(e, &KeyboardLayout::default(), Rgb::RED)
    }

    #[test]
    fn test_layout_matches_pitch() {
        let layout = KeyboardLayout::default();
        // 1024 * 60 / 110 = 558.5 → 558; 1024 / 110 = 9
        assert_eq!(layout.key_rect(60), Rect::new(558, 320, 9, 50));
        assert_eq!(layout.key_rect(0).x, 0);
        assert!(layout.key_rect(109).right() <= 1024);
    }

    #[test]
    fn test_layout_key_never_zero_width() {
        let layout = KeyboardLayout::new(40, 20);
        assert_eq!(layout.key_rect(10).w, 1);
    }

    #[test]
    fn test_intensity_boundaries() {
        let t = token(2.0, 0.5, 64);
        assert!((t.intensity(2.0) - 1.0).abs() < 1e-9, "full at onset");
        assert!(t.intensity(2.5).abs() < 1e-9, "zero at end");
        assert!((t.intensity(2.25) - 0.5).abs() < 1e-9, "half way");
    }

    #[test]
    fn test_intensity_clamped_outside_lifetime() {
        let t = token(2.0, 0.5, 64);
        assert_eq!(t.intensity(0.0), 1.0);
        assert_eq!(t.intensity(1.99), 1.0);
        assert_eq!(t.intensity(2.6), 0.0);
        assert_eq!(t.intensity(1e6), 0.0);
    }

    #[test]
    fn test_intensity_non_increasing() {
        let t = token(1.0, 0.3, 40);
        let mut prev = f64::INFINITY;
        for i in 0..200 {
            let now = 0.9 + i as f64 * 0.0025;
            let v = t.intensity(now);
            assert!(v <= prev, "intensity rose at t={now}: {v} > {prev}");
            prev = v;
        }
    }

    #[test]
    fn test_expiry_is_strict() {
        let t = token(1.0, 0.5, 60);
        assert!(!t.has_expired(1.5), "not expired exactly at end");
        assert!(t.has_expired(1.5 + 1e-9));
        assert!(!t.has_expired(0.0));
    }

    #[test]
    fn test_shaded_color_tracks_intensity() {
        let t = token(0.0, 1.0, 10);
        assert_eq!(t.shaded(0.0), Rgb::RED);
        assert_eq!(t.shaded(0.5), Rgb::new(127, 0, 0));
        assert_eq!(t.shaded(1.0), Rgb::BLACK);
    }
}
