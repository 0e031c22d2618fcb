//! Runtime settings, read from an optional JSON file.
//!
//! Every field has a default, so the file only needs the keys being changed.
//! A missing file means defaults; a malformed one is reported and ignored.

use crate::ingest::InvalidEventPolicy;
use crate::presentation::LoopSettings;
use crate::token::KeyboardLayout;
use crate::transcriber::AnalysisSettings;
use crate::types::{Rgb, PITCH_SPAN};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Looked up in the working directory.
pub const CONFIG_FILE: &str = "keyviz.json";

const DEFAULT_FPS: f64 = 60.0;

/// Frame rates accepted from the file.
const FPS_RANGE: std::ops::RangeInclusive<f64> = 1.0..=1000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    /// Decode rate in Hz
    pub sample_rate: u32,
    /// Decode channel count
    pub channels: u16,
    /// Decoder used for anything that is not a WAV file
    pub ffmpeg_bin: String,
    /// Target frame rate
    pub fps: f64,
    /// Virtual screen size in pixels
    pub screen_width: u32,
    pub screen_height: u32,
    pub token_height: u32,
    pub token_color: Rgb,
    pub background: Rgb,
    pub invalid_events: InvalidEventPolicy,
    /// Where log records go while the terminal display is open
    pub log_file: String,
    pub analysis: AnalysisSettings,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            ffmpeg_bin: "ffmpeg".into(),
            fps: DEFAULT_FPS,
            screen_width: 1024,
            screen_height: 640,
            token_height: 50,
            token_color: Rgb::RED,
            background: Rgb::BLACK,
            invalid_events: InvalidEventPolicy::Drop,
            log_file: "keyviz.log".into(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl VizConfig {
    /// Load from a JSON file, falling back to defaults when the file is
    /// absent or malformed.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Self>(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                c.checked()
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}; using defaults", path, e);
                Self::default()
            }
        }
    }

    /// Replace values the loop cannot run with.
    fn checked(mut self) -> Self {
        if !FPS_RANGE.contains(&self.fps) {
            warn!(
                "fps {} outside {}..={}; using {}",
                self.fps,
                FPS_RANGE.start(),
                FPS_RANGE.end(),
                DEFAULT_FPS
            );
            self.fps = DEFAULT_FPS;
        }
        self
    }

    /// The keyboard always spans every pitch ingestion accepts.
    pub fn layout(&self) -> KeyboardLayout {
        KeyboardLayout {
            width: self.screen_width,
            height: self.screen_height,
            pitch_span: PITCH_SPAN,
            token_height: self.token_height,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            layout: self.layout(),
            token_color: self.token_color,
            fps: self.fps,
        }
    }
}
