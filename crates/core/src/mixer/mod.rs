//! Offline, latency-compensated mix of the backing track and a vocal take.
//!
//! The backing track is authoritative: the render has its length, channel
//! count and sample rate, and plays from zero untouched. The vocal is added
//! on top with a linear gain, shifted by the latency offset:
//! - positive offset: the vocal starts `offset` seconds late, from its first
//!   sample;
//! - zero or negative offset: the vocal starts at zero, skipping `|offset|`
//!   seconds into the take.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, info};

use crate::capture::CapturedTake;
use crate::config::MixConfig;
use crate::{AudioBuffer, KaraokeError, Result};

/// Where the vocal lands relative to the render timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VocalPlacement {
    /// Render time (seconds) at which the vocal becomes audible.
    pub start_time: f64,
    /// Seconds skipped at the head of the take.
    pub buffer_offset: f64,
}

impl VocalPlacement {
    pub fn for_offset(latency_offset_seconds: f64) -> Self {
        if latency_offset_seconds > 0.0 {
            Self {
                start_time: latency_offset_seconds,
                buffer_offset: 0.0,
            }
        } else {
            Self {
                start_time: 0.0,
                buffer_offset: -latency_offset_seconds,
            }
        }
    }
}

/// Renders the mix, or returns `None` when there is nothing to mix (no
/// backing track, an empty backing track, or an empty take).
///
/// Source buffers are only read; the result is a new buffer, so the render
/// can be repeated with other settings.
pub fn render_mix(
    backing: Option<&AudioBuffer>,
    take: &CapturedTake,
    config: &MixConfig,
) -> Option<AudioBuffer> {
    let Some(backing) = backing else {
        debug!("mix skipped: no backing track");
        return None;
    };
    if backing.is_empty() || take.is_empty() {
        debug!(
            backing_frames = backing.len(),
            take_samples = take.samples().len(),
            "mix skipped: nothing to mix"
        );
        return None;
    }
    let vocal = take.to_buffer().ok()?;

    let mut out = backing.clone();
    let rate = f64::from(out.sample_rate());
    let vocal_rate = f64::from(vocal.sample_rate());
    let placement = VocalPlacement::for_offset(config.latency_offset_seconds());
    let start_frame = (placement.start_time * rate).round() as usize;
    let skip = (placement.buffer_offset * vocal_rate).round();
    let step = vocal_rate / rate;
    let gain = config.vocal_volume();
    let outputs = out.channel_count();
    let vocal_frames = vocal.len() as f64;

    for channel in 0..outputs {
        let dest = out.channel_mut(channel);
        for (frame, sample) in dest.iter_mut().enumerate().skip(start_frame) {
            let position = skip + (frame - start_frame) as f64 * step;
            if position >= vocal_frames {
                break;
            }
            *sample += gain * vocal.sample_at_position(channel, outputs, position);
        }
    }

    info!(
        frames = out.len(),
        channels = outputs,
        sample_rate = out.sample_rate(),
        offset_ms = config.latency_offset_ms(),
        volume = gain,
        "rendered offline mix"
    );
    Some(out)
}

/// Result of a finished [`MixJob`].
pub type MixOutput = Option<AudioBuffer>;

/// A mix rendering on a worker thread.
///
/// The settings are captured when the job is spawned. Dropping the job
/// abandons it; the worker finishes and its result is discarded.
#[derive(Debug)]
pub struct MixJob {
    result: Receiver<MixOutput>,
    handle: JoinHandle<()>,
}

impl MixJob {
    pub fn spawn(backing: Arc<AudioBuffer>, take: CapturedTake, config: MixConfig) -> Result<Self> {
        let (tx, rx) = bounded(1);
        let handle = std::thread::Builder::new()
            .name("puresing-mix".into())
            .spawn(move || {
                let output = render_mix(Some(&*backing), &take, &config);
                let _ = tx.send(output);
            })?;
        Ok(Self { result: rx, handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Returns the output if the worker is done, without blocking.
    pub fn try_wait(&self) -> Result<Option<MixOutput>> {
        match self.result.try_recv() {
            Ok(output) => Ok(Some(output)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(KaraokeError::msg("mix worker exited without a result"))
            }
        }
    }

    /// Blocks until the worker is done.
    pub fn wait(self) -> Result<MixOutput> {
        self.result
            .recv()
            .map_err(|_| KaraokeError::msg("mix worker exited without a result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureFormat;

    const RATE: u32 = 1_000;

    fn backing(frames: usize, level: f32) -> AudioBuffer {
        AudioBuffer::new(RATE, vec![vec![level; frames], vec![-level; frames]]).unwrap()
    }

    fn impulse_take(frames: usize, at: usize, channels: u16, rate: u32) -> CapturedTake {
        let mut samples = vec![0.0; frames * usize::from(channels)];
        for c in 0..usize::from(channels) {
            samples[at * usize::from(channels) + c] = 1.0;
        }
        CapturedTake::new(
            samples,
            CaptureFormat {
                sample_rate: rate,
                channels,
            },
        )
    }

    fn first_onset(buffer: &AudioBuffer, channel: usize, base: f32) -> Option<usize> {
        buffer
            .channel(channel)
            .iter()
            .position(|s| (s - base).abs() > 1e-6)
    }

    #[test]
    fn zero_offset_keeps_backing_length_and_starts_vocal_at_zero() {
        let backing = backing(500, 0.0);
        let take = impulse_take(800, 0, 1, RATE);
        let mix = render_mix(Some(&backing), &take, &MixConfig::default()).unwrap();

        assert_eq!(mix.len(), backing.len());
        assert_eq!(mix.channel_count(), 2);
        assert_eq!(mix.sample_rate(), RATE);
        assert_eq!(first_onset(&mix, 0, 0.0), Some(0));
        assert_eq!(first_onset(&mix, 1, 0.0), Some(0));
    }

    #[test]
    fn positive_offset_delays_vocal_onset_exactly() {
        let backing = backing(1_000, 0.25);
        let take = impulse_take(300, 0, 2, RATE);
        let config = MixConfig::new(1.0, 200);
        let mix = render_mix(Some(&backing), &take, &config).unwrap();

        assert_eq!(first_onset(&mix, 0, 0.25), Some(200));
        assert_eq!(&mix.channel(0)[..200], &backing.channel(0)[..200]);
        assert!((mix.channel(0)[200] - 1.25).abs() < 1e-6);
        assert_eq!(&mix.channel(1)[201..], &backing.channel(1)[201..]);
    }

    #[test]
    fn negative_offset_skips_into_the_take() {
        let backing = backing(400, 0.0);
        let take = impulse_take(400, 150, 1, RATE);
        let config = MixConfig::new(1.0, -100);
        let mix = render_mix(Some(&backing), &take, &config).unwrap();
        assert_eq!(first_onset(&mix, 0, 0.0), Some(50));
    }

    #[test]
    fn vocal_gain_is_linear_and_sources_are_untouched() {
        let backing = backing(10, 0.0);
        let take = impulse_take(10, 3, 1, RATE);
        let before = take.clone();
        let mix = render_mix(Some(&backing), &take, &MixConfig::new(2.5, 0)).unwrap();
        assert!((mix.channel(1)[3] - 2.5).abs() < 1e-6);
        assert_eq!(take, before);
        assert!(backing.channel(0).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn vocal_beyond_backing_length_is_cut() {
        let backing = backing(100, 0.0);
        let take = impulse_take(1_000, 900, 1, RATE);
        let mix = render_mix(Some(&backing), &take, &MixConfig::default()).unwrap();
        assert_eq!(mix.len(), 100);
        assert_eq!(first_onset(&mix, 0, 0.0), None);
    }

    #[test]
    fn stereo_take_folds_into_mono_backing() {
        let mono = AudioBuffer::new(RATE, vec![vec![0.0; 4]]).unwrap();
        let take = CapturedTake::new(
            vec![1.0, 0.0, 1.0, 0.0],
            CaptureFormat {
                sample_rate: RATE,
                channels: 2,
            },
        );
        let mix = render_mix(Some(&mono), &take, &MixConfig::default()).unwrap();
        assert_eq!(mix.channel(0), &[0.5_f32, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn mismatched_rates_are_resampled() {
        let backing = backing(1_000, 0.0);
        let take = impulse_take(2_000, 1_000, 1, RATE * 2);
        let mix = render_mix(Some(&backing), &take, &MixConfig::default()).unwrap();
        assert_eq!(first_onset(&mix, 0, 0.0), Some(500));
    }

    #[test]
    fn nothing_to_mix_is_not_an_error() {
        let take = impulse_take(10, 0, 1, RATE);
        assert!(render_mix(None, &take, &MixConfig::default()).is_none());

        let empty = CapturedTake::new(Vec::new(), take.format());
        assert!(render_mix(Some(&backing(10, 0.0)), &empty, &MixConfig::default()).is_none());
    }

    #[test]
    fn placement_follows_offset_sign() {
        assert_eq!(
            VocalPlacement::for_offset(0.3),
            VocalPlacement {
                start_time: 0.3,
                buffer_offset: 0.0
            }
        );
        assert_eq!(VocalPlacement::for_offset(-0.2).buffer_offset, 0.2);
        assert_eq!(VocalPlacement::for_offset(0.0).start_time, 0.0);
    }

    #[test]
    fn background_job_delivers_the_same_render() {
        let backing = Arc::new(backing(300, 0.1));
        let take = impulse_take(300, 10, 1, RATE);
        let config = MixConfig::new(0.5, 20);

        let expected = render_mix(Some(&*backing), &take, &config);
        let job = MixJob::spawn(backing.clone(), take, config).unwrap();
        assert_eq!(job.wait().unwrap(), expected);
    }
}
