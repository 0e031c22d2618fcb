//! Audio file decoding into interleaved 16-bit PCM.
//!
//! WAV files are read in-process with `hound`. Anything else is handed to an
//! `ffmpeg` subprocess that writes raw `s16le` to stdout, which is parsed
//! with `byteorder`. Either way the caller gets samples at the requested
//! rate and channel count.

use crate::error::VizError;
use byteorder::{LittleEndian, ReadBytesExt};
use hound::{SampleFormat, WavReader};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::{Command, Stdio};

/// Interleaved signed 16-bit samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// First channel as f32, scaled by `i16::MAX` into roughly [-1, 1].
    pub fn analysis_channel(&self) -> Vec<f32> {
        const SCALE: f32 = i16::MAX as f32;
        let ch = self.channels.max(1) as usize;
        self.samples
            .iter()
            .step_by(ch)
            .map(|&s| s as f32 / SCALE)
            .collect()
    }

    /// Linear-interpolated copy at `rate` Hz with `channels` channels.
    /// Downmixing to mono averages; upmixing from mono duplicates.
    pub fn resampled(&self, rate: u32, channels: u16) -> PcmBuffer {
        let in_ch = self.channels.max(1) as usize;
        let out_ch = channels.max(1) as usize;
        let in_frames = self.frames();

        if in_frames == 0 || self.sample_rate == 0 || rate == 0 {
            return PcmBuffer {
                samples: Vec::new(),
                sample_rate: rate,
                channels: out_ch as u16,
            };
        }

        let frame = |i: usize, c: usize| -> f64 {
            let base = i * in_ch;
            if out_ch == 1 && in_ch > 1 {
                let sum: i32 = self.samples[base..base + in_ch].iter().map(|&s| s as i32).sum();
                sum as f64 / in_ch as f64
            } else {
                self.samples[base + c.min(in_ch - 1)] as f64
            }
        };

        let step = self.sample_rate as f64 / rate as f64;
        let out_frames = ((in_frames as f64) / step).ceil() as usize;
        let mut samples = Vec::with_capacity(out_frames * out_ch);
        for j in 0..out_frames {
            let pos = j as f64 * step;
            let i = (pos.floor() as usize).min(in_frames - 1);
            let next = (i + 1).min(in_frames - 1);
            let frac = pos - i as f64;
            for c in 0..out_ch {
                let v = frame(i, c) * (1.0 - frac) + frame(next, c) * frac;
                samples.push(v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            }
        }

        PcmBuffer {
            samples,
            sample_rate: rate,
            channels: out_ch as u16,
        }
    }
}

/// Decode `path` to `sample_rate` Hz, `channels` channels. Fails with
/// `InputFile` for missing, unreadable or undecodable files.
pub fn load_sound(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    ffmpeg_bin: &str,
) -> Result<PcmBuffer, VizError> {
    if !path.is_file() {
        return Err(VizError::input_file(path, "no such file"));
    }

    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let pcm = if is_wav {
        load_wav(path, sample_rate, channels)?
    } else {
        load_with_ffmpeg(path, sample_rate, channels, ffmpeg_bin)?
    };

    if pcm.samples.is_empty() {
        return Err(VizError::input_file(path, "no audio decoded"));
    }
    info!(
        "Loaded {:?}: {:.2}s, {} Hz, {} ch",
        path.file_name().unwrap_or_default(),
        pcm.duration_secs(),
        pcm.sample_rate,
        pcm.channels
    );
    Ok(pcm)
}

fn load_wav(path: &Path, sample_rate: u32, channels: u16) -> Result<PcmBuffer, VizError> {
    let reader = WavReader::open(path).map_err(|e| VizError::input_file(path, e))?;
    let spec = reader.spec();
    debug!(
        "WAV: {} Hz  {} ch  {:?}  {} bit",
        spec.sample_rate, spec.channels, spec.sample_format, spec.bits_per_sample
    );

    let samples = read_wav_samples(reader).map_err(|e| VizError::input_file(path, e))?;
    let native = PcmBuffer {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };

    if native.sample_rate == sample_rate && native.channels == channels {
        Ok(native)
    } else {
        Ok(native.resampled(sample_rate, channels))
    }
}

/// Read every sample as i16, rescaling other bit depths and float data.
fn read_wav_samples<R: Read>(reader: WavReader<R>) -> Result<Vec<i16>, hound::Error> {
    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect(),
        SampleFormat::Int => {
            let bits = spec.bits_per_sample as i32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if bits > 16 {
                            (v >> (bits - 16)) as i16
                        } else {
                            (v << (16 - bits)) as i16
                        }
                    })
                })
                .collect()
        }
    }
}

fn load_with_ffmpeg(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    ffmpeg_bin: &str,
) -> Result<PcmBuffer, VizError> {
    let rate = sample_rate.to_string();
    let ch = channels.to_string();
    debug!("Decoding {:?} with {}", path, ffmpeg_bin);

    let output = Command::new(ffmpeg_bin)
        .arg("-i")
        .arg(path)
        .args(["-f", "s16le", "-acodec", "pcm_s16le", "-ar", rate.as_str(), "-ac", ch.as_str(), "-"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| VizError::input_file(path, format!("cannot run {ffmpeg_bin}: {e}")))?;

    if !output.status.success() {
        return Err(VizError::input_file(
            path,
            format!("{ffmpeg_bin} exited with {}", output.status),
        ));
    }

    Ok(PcmBuffer {
        samples: parse_s16le(&output.stdout),
        sample_rate,
        channels,
    })
}

/// Little-endian i16 samples. A trailing odd byte is ignored.
fn parse_s16le(bytes: &[u8]) -> Vec<i16> {
    let mut samples = vec![0i16; bytes.len() / 2];
    let mut rdr = Cursor::new(bytes);
    // Length is exact, so this cannot run short
    if rdr.read_i16_into::<LittleEndian>(&mut samples).is_err() {
        samples.clear();
    }
    samples
}
