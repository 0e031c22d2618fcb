use crate::decode::PcmBuffer;
use crate::error::VizError;
use crossbeam_channel::Sender;

/// A running audio output. Playback proceeds on its own device-driven
/// timeline; the only thing the loop can do is stop it.
pub trait Playback {
    fn stop(&mut self);
}

/// Playback handle for builds without an audio backend.
pub struct SilentPlayback;

impl Playback for SilentPlayback {
    fn stop(&mut self) {}
}

/// Start playing `pcm` on the default output device. Stream errors raised
/// later on the audio thread are sent on `faults`.
#[cfg(feature = "audio")]
pub fn start(pcm: &PcmBuffer, faults: Sender<String>) -> Result<Box<dyn Playback>, VizError> {
    Ok(Box::new(device::DevicePlayback::start(pcm, faults)?))
}

#[cfg(not(feature = "audio"))]
pub fn start(pcm: &PcmBuffer, _faults: Sender<String>) -> Result<Box<dyn Playback>, VizError> {
    log::warn!(
        "Built without the `audio` feature; {:.1}s of audio will not be played",
        pcm.duration_secs()
    );
    Ok(Box::new(SilentPlayback))
}

#[cfg(feature = "audio")]
mod device {
    use super::Playback;
    use crate::decode::PcmBuffer;
    use crate::error::VizError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream, StreamConfig};
    use crossbeam_channel::Sender;
    use log::{error, info};
    use std::sync::Arc;

    /// Holds the cpal `Stream` alive. Dropping it (or `stop`) ends output.
    pub struct DevicePlayback {
        stream: Option<Stream>,
    }

    impl DevicePlayback {
        pub fn start(pcm: &PcmBuffer, faults: Sender<String>) -> Result<Self, VizError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| VizError::Playback("no default audio output device".into()))?;

            info!(
                "Audio output: {}",
                device.name().unwrap_or_else(|_| "unknown".into())
            );

            let supported = device
                .default_output_config()
                .map_err(|e| VizError::Playback(format!("no supported output config: {e}")))?;
            let format = supported.sample_format();
            let config: StreamConfig = supported.into();
            let rate = config.sample_rate.0;
            let channels = config.channels;

            // Bring the decoded audio to the device's native layout once, up front
            let data = Arc::new(pcm.resampled(rate, channels).samples);
            info!(
                "Playback config: {}Hz  {} ch  {:?}  ({:.2}s)",
                rate,
                channels,
                format,
                data.len() as f64 / (rate as f64 * channels as f64)
            );

            let err_fn = move |e: cpal::StreamError| {
                error!("Audio stream error: {e}");
                let _ = faults.try_send(e.to_string());
            };

            let stream = match format {
                SampleFormat::F32 => {
                    let mut cursor = 0usize;
                    let data = data.clone();
                    device.build_output_stream(
                        &config,
                        move |out: &mut [f32], _| {
                            for s in out.iter_mut() {
                                *s = data.get(cursor).map_or(0.0, |&v| v as f32 / i16::MAX as f32);
                                cursor += 1;
                            }
                        },
                        err_fn,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let mut cursor = 0usize;
                    let data = data.clone();
                    device.build_output_stream(
                        &config,
                        move |out: &mut [i16], _| {
                            for s in out.iter_mut() {
                                *s = data.get(cursor).copied().unwrap_or(0);
                                cursor += 1;
                            }
                        },
                        err_fn,
                        None,
                    )
                }
                fmt => {
                    return Err(VizError::Playback(format!(
                        "unsupported sample format {fmt:?}; use an F32 or I16 device"
                    )))
                }
            }
            .map_err(|e| VizError::Playback(e.to_string()))?;

            stream
                .play()
                .map_err(|e| VizError::Playback(e.to_string()))?;

            Ok(Self {
                stream: Some(stream),
            })
        }
    }

    impl Playback for DevicePlayback {
        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                let _ = stream.pause();
                info!("Audio output stopped");
            }
        }
    }
}
