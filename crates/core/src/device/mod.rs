//! Live microphone input and backing playback through `cpal`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use tracing::{error, info, warn};

use crate::audio::BufferCursor;
use crate::capture::{choose_input_format, FrameProducer, InputFormatRange};
use crate::config::AudioConfig;
use crate::{KaraokeError, Result};

fn device_error(err: impl std::fmt::Display) -> KaraokeError {
    KaraokeError::Device(err.to_string())
}

fn is_supported(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16)
}

/// The system's default input device, opened with the format closest to the
/// configured request.
pub struct InputDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
    requested: bool,
}

impl InputDevice {
    /// Opens the default input at `audio.sample_rate`, preferring
    /// `audio.requested_channels`. Falls back to the device's default format
    /// when no offered format covers the rate.
    pub fn open(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| KaraokeError::Device("no input device available".into()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());

        let (config, requested) = match requested_input_config(&device, audio) {
            Some(config) => (config, true),
            None => {
                let config = device.default_input_config().map_err(device_error)?;
                warn!(
                    device = %name,
                    requested_rate = audio.sample_rate,
                    sample_rate = config.sample_rate().0,
                    "input device cannot run at the requested rate, using its default format"
                );
                (config, false)
            }
        };

        info!(
            device = %name,
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            format = ?config.sample_format(),
            echo_cancellation = audio.echo_cancellation,
            noise_suppression = audio.noise_suppression,
            auto_gain_control = audio.auto_gain_control,
            "opened input device"
        );
        if audio.echo_cancellation || audio.noise_suppression || audio.auto_gain_control {
            warn!("voice processing requested, but the input stream is delivered unprocessed");
        }
        Ok(Self {
            device,
            config,
            name,
            requested,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel count of the opened format.
    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    /// Whether the device runs at the requested rate rather than its default.
    pub fn matches_request(&self) -> bool {
        self.requested
    }

    /// Starts streaming into `producer`. Capture runs until the returned
    /// handle is dropped.
    pub fn start(&self, mut producer: FrameProducer) -> Result<LiveStream> {
        let stream_config: StreamConfig = self.config.config();
        let channels = usize::from(stream_config.channels);
        let on_error = |err: cpal::StreamError| error!(%err, "input stream error");

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    producer.push_interleaved(data, channels);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch = Vec::new();
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|s| f32::from(*s) / 32_768.0));
                        producer.push_interleaved(&scratch, channels);
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(KaraokeError::Device(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(device_error)?;

        stream.play().map_err(device_error)?;
        Ok(LiveStream { stream })
    }
}

/// The offered input format that covers the requested rate, if any.
fn requested_input_config(
    device: &cpal::Device,
    audio: &AudioConfig,
) -> Option<SupportedStreamConfig> {
    let ranges: Vec<SupportedStreamConfigRange> = match device.supported_input_configs() {
        Ok(ranges) => ranges.filter(|r| is_supported(r.sample_format())).collect(),
        Err(err) => {
            warn!(%err, "cannot list input formats");
            return None;
        }
    };
    let offered: Vec<InputFormatRange> = ranges
        .iter()
        .map(|r| InputFormatRange {
            channels: r.channels(),
            min_sample_rate: r.min_sample_rate().0,
            max_sample_rate: r.max_sample_rate().0,
        })
        .collect();
    let index = choose_input_format(&offered, audio.sample_rate, audio.requested_channels)?;
    ranges
        .into_iter()
        .nth(index)
        .map(|range| range.with_sample_rate(SampleRate(audio.sample_rate)))
}

impl std::fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDevice")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .field("matches_request", &self.requested)
            .finish()
    }
}

/// The system's default output device in its default format.
pub struct OutputDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl OutputDevice {
    pub fn default_output() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| KaraokeError::Device("no output device available".into()))?;
        let config = device.default_output_config().map_err(device_error)?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());
        info!(
            device = %name,
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            format = ?config.sample_format(),
            "opened output device"
        );
        Ok(Self {
            device,
            config,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    /// Plays `cursor` from its current position, then silence. Playback runs
    /// until the returned handle is dropped.
    pub fn play(&self, mut cursor: BufferCursor) -> Result<LiveStream> {
        let stream_config: StreamConfig = self.config.config();
        let channels = usize::from(stream_config.channels);
        let on_error = |err: cpal::StreamError| error!(%err, "output stream error");

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    cursor.fill(data, channels);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch = Vec::new();
                self.device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        cursor.fill(&mut scratch, channels);
                        for (out, sample) in data.iter_mut().zip(&scratch) {
                            *out = (sample.clamp(-1.0, 1.0) * 32_767.0) as i16;
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(KaraokeError::Device(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        }
        .map_err(device_error)?;

        stream.play().map_err(device_error)?;
        Ok(LiveStream { stream })
    }
}

impl std::fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDevice")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .finish()
    }
}

/// A running input or output stream.
pub struct LiveStream {
    stream: Stream,
}

impl LiveStream {
    pub fn pause(&self) -> Result<()> {
        self.stream.pause().map_err(device_error)
    }
}
