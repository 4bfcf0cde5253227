//! Seekable dual-source audition of a take against the backing track.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::audio::AudioClock;
use crate::config::MixConfig;
use crate::{AudioBuffer, KaraokeError, Result};

/// Both sources start this far in the future so they begin together.
pub const PREVIEW_LEAD_SECONDS: f64 = 0.1;

/// Time constant of the live vocal gain ramp.
pub const GAIN_SMOOTHING_SECONDS: f64 = 0.05;

/// Start instants and buffer offsets for one preview run, in audio-clock
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewSchedule {
    /// Shared start instant. The backing source starts here at `seek`.
    pub reference_time: f64,
    pub seek: f64,
    pub vocal_start: f64,
    /// Seconds into the take at which the vocal source starts.
    pub vocal_offset: f64,
    /// False when the vocal offset lies past the end of the take; the vocal
    /// source is then never started.
    pub vocal_audible: bool,
}

impl PreviewSchedule {
    /// Applies the latency rule relative to the seek position.
    ///
    /// With a positive offset and a seek position still inside the pre-roll
    /// (`seek < offset`) the vocal is pushed later and starts from its first
    /// sample. Otherwise it starts at the reference instant, `seek - offset`
    /// into the take (`seek + |offset|` for negative offsets).
    pub fn compute(now: f64, seek: f64, latency_offset_seconds: f64, vocal_duration: f64) -> Self {
        let reference_time = now + PREVIEW_LEAD_SECONDS;
        let (vocal_start, vocal_offset) = if latency_offset_seconds > 0.0 {
            if seek < latency_offset_seconds {
                (reference_time + (latency_offset_seconds - seek), 0.0)
            } else {
                (reference_time, seek - latency_offset_seconds)
            }
        } else {
            (reference_time, seek - latency_offset_seconds)
        };
        Self {
            reference_time,
            seek,
            vocal_start,
            vocal_offset,
            vocal_audible: vocal_offset < vocal_duration,
        }
    }
}

/// Exponential approach of a gain towards its target, starting from the
/// value it had when the target changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f32,
    target: f32,
    start_time: f64,
    time_constant: f64,
}

impl GainRamp {
    pub fn constant(value: f32) -> Self {
        Self::with_time_constant(value, GAIN_SMOOTHING_SECONDS)
    }

    /// A ramp resting at `value` that approaches later targets with the
    /// given time constant in seconds.
    pub fn with_time_constant(value: f32, time_constant: f64) -> Self {
        Self {
            from: value,
            target: value,
            start_time: 0.0,
            time_constant: time_constant.max(f64::EPSILON),
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn value_at(&self, time: f64) -> f32 {
        if self.from == self.target || time <= self.start_time {
            return self.from;
        }
        let decay = (-(time - self.start_time) / self.time_constant).exp() as f32;
        self.target + (self.from - self.target) * decay
    }

    pub fn retarget(&mut self, target: f32, now: f64) {
        self.from = self.value_at(now);
        self.target = target;
        self.start_time = now;
    }
}

/// Snapshot reported on every progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewProgress {
    pub current_time: f64,
    pub duration: f64,
    pub playing: bool,
    /// Set on the tick that reached the end and stopped playback.
    pub finished: bool,
}

/// Sources and gain of the preview that is currently playing.
#[derive(Debug)]
struct ActivePreview {
    vocal: Arc<AudioBuffer>,
    backing: Option<Arc<AudioBuffer>>,
    schedule: PreviewSchedule,
    gain: GainRamp,
    config: MixConfig,
}

/// Plays a vocal take and an optional backing track in sync from a seek
/// position. At most one preview runs at a time.
pub struct PreviewEngine {
    clock: Arc<dyn AudioClock>,
    vocal: Option<Arc<AudioBuffer>>,
    backing: Option<Arc<AudioBuffer>>,
    duration: f64,
    position: f64,
    active: Option<ActivePreview>,
}

impl PreviewEngine {
    pub fn new(clock: Arc<dyn AudioClock>) -> Self {
        Self {
            clock,
            vocal: None,
            backing: None,
            duration: 0.0,
            position: 0.0,
            active: None,
        }
    }

    /// Loads new sources, stopping any running preview and rewinding to 0.
    pub fn load(&mut self, vocal: Arc<AudioBuffer>, backing: Option<Arc<AudioBuffer>>) {
        self.stop();
        self.duration = vocal
            .duration()
            .max(backing.as_ref().map_or(0.0, |b| b.duration()));
        self.vocal = Some(vocal);
        self.backing = backing;
        self.position = 0.0;
        debug!(duration = self.duration, "preview loaded");
    }

    pub fn unload(&mut self) {
        self.stop();
        self.vocal = None;
        self.backing = None;
        self.duration = 0.0;
        self.position = 0.0;
    }

    pub fn is_loaded(&self) -> bool {
        self.vocal.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    /// `max(vocal duration, backing duration)`.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Seek position while stopped; the last reported time while playing.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn schedule(&self) -> Option<PreviewSchedule> {
        self.active.as_ref().map(|active| active.schedule)
    }

    /// Vocal gain currently applied, if playing.
    pub fn current_gain(&self) -> Option<f32> {
        let now = self.clock.now();
        self.active.as_ref().map(|active| active.gain.value_at(now))
    }

    /// Moves the scrub position. A running preview restarts from there with
    /// the settings it was started with.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        let target = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.duration)
        };
        let restart = self.active.as_ref().map(|active| active.config);
        self.stop();
        self.position = target;
        if let Some(config) = restart {
            self.play(&config)?;
        }
        Ok(())
    }

    /// Starts playback from the current position. The volume and latency
    /// offset are read now; later changes to `config` do not reach this run.
    pub fn play(&mut self, config: &MixConfig) -> Result<PreviewSchedule> {
        self.stop();
        let Some(vocal) = self.vocal.clone() else {
            return Err(KaraokeError::InvalidInput("no recording loaded for preview"));
        };
        let schedule = PreviewSchedule::compute(
            self.clock.now(),
            self.position,
            config.latency_offset_seconds(),
            vocal.duration(),
        );
        info!(
            seek = schedule.seek,
            vocal_start = schedule.vocal_start,
            vocal_offset = schedule.vocal_offset,
            vocal_audible = schedule.vocal_audible,
            "preview started"
        );
        self.active = Some(ActivePreview {
            vocal,
            backing: self.backing.clone(),
            schedule,
            gain: GainRamp::constant(config.vocal_volume()),
            config: *config,
        });
        Ok(schedule)
    }

    /// Stops if playing, otherwise starts. Returns whether it is now playing.
    pub fn toggle(&mut self, config: &MixConfig) -> Result<bool> {
        if self.stop() {
            return Ok(false);
        }
        self.play(config)?;
        Ok(true)
    }

    /// Halts and releases both sources and the gain. Returns false if nothing
    /// was playing.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(_) => {
                debug!(position = self.position, "preview stopped");
                true
            }
            None => false,
        }
    }

    /// Samples the clock and advances the displayed time, stopping and
    /// rewinding to 0 once it reaches the preview duration.
    pub fn tick(&mut self) -> PreviewProgress {
        let Some(active) = &self.active else {
            return PreviewProgress {
                current_time: self.position,
                duration: self.duration,
                playing: false,
                finished: false,
            };
        };
        let elapsed = self.clock.now() - active.schedule.reference_time;
        let current = active.schedule.seek + elapsed.max(0.0);
        if current >= self.duration {
            self.stop();
            self.position = 0.0;
            return PreviewProgress {
                current_time: self.duration,
                duration: self.duration,
                playing: false,
                finished: true,
            };
        }
        self.position = current;
        PreviewProgress {
            current_time: current,
            duration: self.duration,
            playing: true,
            finished: false,
        }
    }

    /// Changes the live vocal gain with a short ramp rather than a jump.
    pub fn set_vocal_volume(&mut self, volume: f32) {
        let now = self.clock.now();
        if let Some(active) = &mut self.active {
            active.config.set_vocal_volume(volume);
            active.gain.retarget(active.config.vocal_volume(), now);
        }
    }

    /// Mixes both sources into an interleaved block whose first frame plays
    /// at the current clock time. Writes silence when nothing is playing.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) {
        out.fill(0.0);
        let Some(active) = &self.active else {
            return;
        };
        if channels == 0 || sample_rate == 0 {
            return;
        }
        let start = self.clock.now();
        let rate = f64::from(sample_rate);
        let schedule = &active.schedule;

        for (index, frame) in out.chunks_exact_mut(channels).enumerate() {
            let time = start + index as f64 / rate;
            let gain = active.gain.value_at(time);
            for (channel, sample) in frame.iter_mut().enumerate() {
                if let Some(backing) = &active.backing {
                    if time >= schedule.reference_time {
                        let seconds = schedule.seek + (time - schedule.reference_time);
                        *sample += backing.sample_at_position(
                            channel,
                            channels,
                            seconds * f64::from(backing.sample_rate()),
                        );
                    }
                }
                if schedule.vocal_audible && time >= schedule.vocal_start {
                    let seconds = schedule.vocal_offset + (time - schedule.vocal_start);
                    *sample += gain
                        * active.vocal.sample_at_position(
                            channel,
                            channels,
                            seconds * f64::from(active.vocal.sample_rate()),
                        );
                }
            }
        }
    }
}

impl std::fmt::Debug for PreviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewEngine")
            .field("duration", &self.duration)
            .field("position", &self.position)
            .field("playing", &self.active.is_some())
            .finish()
    }
}
