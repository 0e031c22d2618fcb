use crate::dsp::{compute_rms, goertzel_magnitude, hann, midi_to_hz};
use crate::error::VizError;
use crate::types::RawNote;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

/// Turns a mono signal into a list of notes.
pub trait Transcriber {
    /// `samples` are normalized to roughly [-1, 1]. Returns notes ordered by
    /// timestamp. The whole file is analysed in one call.
    fn transcribe(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<RawNote>, VizError>;
}

/// Tuning for [`GoertzelTranscriber`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Lowest MIDI note scanned
    pub min_pitch: u8,
    /// Highest MIDI note scanned
    pub max_pitch: u8,
    /// Analysis window in samples at the decimated rate
    pub window: usize,
    /// Hop between windows in samples at the decimated rate
    pub hop: usize,
    /// Amplitude above which a pitch starts a note
    pub onset_threshold: f64,
    /// Amplitude below which a sounding pitch ends its note (hysteresis)
    pub release_threshold: f64,
    /// Energy smoothing (0.0 = instant, 0.99 = very smooth)
    pub smoothing: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            min_pitch: 28,
            max_pitch: 103,
            window: 2048, // ~186ms at 11025 Hz, resolves semitones down to ~E2
            hop: 512,
            onset_threshold: 0.02,
            release_threshold: 0.008,
            smoothing: 0.3,
        }
    }
}

/// Highest rate the analysis runs at. Input is block-averaged down to it;
/// the Nyquist limit still covers the top of the keyboard.
const ANALYSIS_RATE_CEILING: u32 = 11025;

/// Frames quieter than this are treated as silence.
const SILENCE_RMS: f32 = 0.003;

/// A pitch only attacks if it is at least this fraction of the loudest
/// pitch in the frame. Suppresses leakage from onsets of louder notes.
const RELATIVE_FLOOR: f64 = 0.25;

/// Per-semitone onset/release detector.
///
/// Every hop, a Hann-windowed frame is scored at the exact frequency of each
/// MIDI note in range with a Goertzel filter. Scores are smoothed per pitch
/// and pass through hysteresis:
///   - energy rises above `onset_threshold` (and is a local peak) → note on
///   - energy falls below `release_threshold` → note off
///
/// The local-peak rule keeps a single tone from lighting up the semitones
/// either side of it through spectral leakage.
pub struct GoertzelTranscriber {
    settings: AnalysisSettings,
}

impl GoertzelTranscriber {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }
}

impl Default for GoertzelTranscriber {
    fn default() -> Self {
        Self::new(AnalysisSettings::default())
    }
}

impl Transcriber for GoertzelTranscriber {
    fn transcribe(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<RawNote>, VizError> {
        let s = &self.settings;
        if samples.is_empty() {
            return Err(VizError::Analysis("no audio samples".into()));
        }
        if sample_rate == 0 {
            return Err(VizError::Analysis("sample rate is zero".into()));
        }
        if s.window == 0 || s.hop == 0 || s.min_pitch > s.max_pitch {
            return Err(VizError::Analysis(format!(
                "bad analysis settings: window={} hop={} pitches {}..={}",
                s.window, s.hop, s.min_pitch, s.max_pitch
            )));
        }

        let factor = (sample_rate / ANALYSIS_RATE_CEILING).max(1) as usize;
        let rate = sample_rate as f64 / factor as f64;
        let mut signal = decimate(samples, factor);
        if signal.len() < s.window {
            signal.resize(s.window, 0.0);
        }

        let pitches: Vec<(u8, f64)> = (s.min_pitch..=s.max_pitch)
            .map(|p| (p, midi_to_hz(p as f64)))
            .filter(|&(_, hz)| hz < rate * 0.45)
            .collect();
        if pitches.is_empty() {
            return Err(VizError::Analysis(format!(
                "no pitch in {}..={} fits under {:.0} Hz",
                s.min_pitch, s.max_pitch, rate / 2.0
            )));
        }

        info!(
            "Analysing {:.2}s at {:.0} Hz ({} pitches, window {}, hop {})",
            samples.len() as f64 / sample_rate as f64,
            rate,
            pitches.len(),
            s.window,
            s.hop
        );

        let window = hann(s.window);
        // Goertzel magnitude of a windowed sine of amplitude A is A * sum(w) / 2
        let gain = 2.0 / window.iter().map(|&w| w as f64).sum::<f64>();
        let hop_secs = s.hop as f64 / rate;

        let mut energy = vec![0.0f64; pitches.len()];
        let mut started: Vec<Option<f64>> = vec![None; pitches.len()];
        let mut notes = Vec::new();
        let mut frame = vec![0.0f32; s.window];

        let n_frames = 1 + (signal.len() - s.window) / s.hop;
        let mut last_time = 0.0;

        for fi in 0..n_frames {
            let start = fi * s.hop;
            let raw = &signal[start..start + s.window];
            let time = (start + s.window / 2) as f64 / rate;
            last_time = time;

            if compute_rms(raw) < SILENCE_RMS {
                for (pi, e) in energy.iter_mut().enumerate() {
                    *e *= 0.5;
                    if let Some(onset) = started[pi].take() {
                        notes.push(close(onset, time, hop_secs, pitches[pi].0));
                    }
                }
                continue;
            }

            for (dst, (&x, &w)) in frame.iter_mut().zip(raw.iter().zip(&window)) {
                *dst = x * w;
            }
            for (pi, &(_, hz)) in pitches.iter().enumerate() {
                let amp = goertzel_magnitude(&frame, hz, rate) * gain;
                energy[pi] = energy[pi] * s.smoothing + amp * (1.0 - s.smoothing);
            }

            let loudest = energy.iter().cloned().fold(0.0, f64::max);
            for pi in 0..pitches.len() {
                let e = energy[pi];
                let sounding = started[pi];
                match sounding {
                    Some(onset) if e < s.release_threshold => {
                        started[pi] = None;
                        notes.push(close(onset, time, hop_secs, pitches[pi].0));
                    }
                    None if e > s.onset_threshold
                        && e >= RELATIVE_FLOOR * loudest
                        && is_local_peak(&energy, pi) =>
                    {
                        trace!("{:.3}s onset pitch {} energy {:.4}", time, pitches[pi].0, e);
                        started[pi] = Some(time);
                    }
                    _ => {}
                }
            }
        }

        // Close anything still sounding at the end of the file
        let end = last_time + hop_secs;
        for (pi, onset) in started.iter().enumerate() {
            if let Some(onset) = *onset {
                notes.push(close(onset, end, hop_secs, pitches[pi].0));
            }
        }

        notes.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.pitch.cmp(&b.pitch))
        });
        debug!("Transcribed {} notes over {} frames", notes.len(), n_frames);
        Ok(notes)
    }
}

fn close(onset: f64, at: f64, min_duration: f64, pitch: u8) -> RawNote {
    RawNote::new(onset, (at - onset).max(min_duration), pitch as i32)
}

fn is_local_peak(energy: &[f64], i: usize) -> bool {
    let left = if i > 0 { energy[i - 1] } else { 0.0 };
    let right = energy.get(i + 1).copied().unwrap_or(0.0);
    energy[i] >= left && energy[i] >= right
}

/// Block-average `factor` consecutive samples into one.
fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(factor)
        .map(|block| block.iter().sum::<f32>() / block.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::{silence, sine_wave};

    const SR: u32 = 44100;

    fn tone(midi: f64, ms: u32) -> Vec<f32> {
        sine_wave(midi_to_hz(midi), 0.5, SR, ms)
    }

    /// Drop blips from onset/offset transients; keep notes that really rang.
    fn sustained(notes: Vec<RawNote>) -> Vec<RawNote> {
        notes.into_iter().filter(|n| n.duration > 0.2).collect()
    }

    #[test]
    fn test_single_tone() {
        let mut signal = silence(SR, 500);
        signal.extend(tone(69.0, 1000));
        signal.extend(silence(SR, 500));

        let notes = sustained(GoertzelTranscriber::default().transcribe(&signal, SR).unwrap());
        assert_eq!(notes.len(), 1, "expected exactly one note, got {:?}", notes);
        let n = notes[0];
        assert_eq!(n.pitch, 69);
        assert!((n.timestamp - 0.5).abs() < 0.2, "onset {:.3}", n.timestamp);
        assert!((n.duration - 1.0).abs() < 0.35, "duration {:.3}", n.duration);
    }

    #[test]
    fn test_two_tones_in_sequence() {
        let mut signal = tone(69.0, 700);
        // hard switch to C5
        signal.extend(tone(72.0, 700));
        signal.extend(silence(SR, 300));

        let notes = sustained(GoertzelTranscriber::default().transcribe(&signal, SR).unwrap());
        let pitches: Vec<i32> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![69, 72], "notes: {:?}", notes);
        assert!(notes[0].timestamp < notes[1].timestamp);
        assert!(notes[1].timestamp > 0.5 && notes[1].timestamp < 0.95);
    }

    #[test]
    fn test_silence_yields_nothing() {
        let notes = GoertzelTranscriber::default()
            .transcribe(&silence(SR, 1000), SR)
            .unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn test_note_open_at_end_is_closed() {
        let signal = tone(60.0, 800);
        let notes = sustained(GoertzelTranscriber::default().transcribe(&signal, SR).unwrap());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 60);
        assert!(notes[0].duration > 0.0);
    }

    #[test]
    fn test_short_input_is_padded() {
        let signal = tone(76.0, 100);
        let notes = GoertzelTranscriber::default().transcribe(&signal, SR).unwrap();
        assert!(notes.iter().all(|n| n.duration > 0.0));
    }

    #[test]
    fn test_rejects_empty_and_bad_rate() {
        let mut t = GoertzelTranscriber::default();
        assert!(matches!(t.transcribe(&[], SR), Err(VizError::Analysis(_))));
        assert!(matches!(t.transcribe(&[0.1; 10], 0), Err(VizError::Analysis(_))));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut t = GoertzelTranscriber::new(AnalysisSettings {
            hop: 0,
            ..AnalysisSettings::default()
        });
        assert!(t.transcribe(&tone(69.0, 100), SR).is_err());
    }

    #[test]
    fn test_decimate_averages_blocks() {
        assert_eq!(decimate(&[1.0, 3.0, 2.0, 4.0, 5.0], 2), vec![2.0, 3.0, 5.0]);
        assert_eq!(decimate(&[1.0, 2.0], 1), vec![1.0, 2.0]);
    }
}
