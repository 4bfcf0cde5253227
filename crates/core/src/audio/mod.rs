use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::{KaraokeError, Result};

/// Decoded, planar audio owned by the pipeline: a backing track, a
/// de-interleaved vocal take, or a rendered mix.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Wraps per-channel sample vectors, which must all have the same length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(KaraokeError::InvalidInput("sample rate must be non-zero"));
        }
        let Some(first) = channels.first() else {
            return Err(KaraokeError::InvalidInput(
                "audio buffer needs at least one channel",
            ));
        };
        if channels.iter().any(|channel| channel.len() != first.len()) {
            return Err(KaraokeError::InvalidInput(
                "all channels must have the same length",
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Silent buffer of `frames` samples per channel.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    /// Splits interleaved samples into channels. A trailing partial frame is
    /// dropped.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(KaraokeError::InvalidInput(
                "audio buffer needs at least one channel",
            ));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// L,R,L,R... ordering of every channel.
    pub fn interleaved(&self) -> Vec<f32> {
        let count = self.channel_count();
        let mut out = Vec::with_capacity(self.len() * count);
        for frame in 0..self.len() {
            out.extend(self.channels.iter().map(|channel| channel[frame]));
        }
        out
    }

    /// Sample feeding output channel `channel` of an `outputs`-channel
    /// destination at `frame`, using speaker up/down-mix rules: mono spreads
    /// to every output, anything to mono averages, matching layouts copy, and
    /// outputs with no source channel stay silent.
    pub fn sample_for_output(&self, channel: usize, outputs: usize, frame: usize) -> f32 {
        let count = self.channel_count();
        if count == outputs {
            self.channels[channel][frame]
        } else if count == 1 {
            self.channels[0][frame]
        } else if outputs == 1 {
            self.channels.iter().map(|c| c[frame]).sum::<f32>() / count as f32
        } else if channel < count {
            self.channels[channel][frame]
        } else {
            0.0
        }
    }

    /// Linearly interpolated read at a fractional frame position; positions
    /// outside the buffer read as silence.
    pub fn sample_at_position(&self, channel: usize, outputs: usize, position: f64) -> f32 {
        if position < 0.0 {
            return 0.0;
        }
        let index = position.floor() as usize;
        if index >= self.len() {
            return 0.0;
        }
        let current = self.sample_for_output(channel, outputs, index);
        let frac = (position - index as f64) as f32;
        if frac == 0.0 || index + 1 >= self.len() {
            return current;
        }
        let next = self.sample_for_output(channel, outputs, index + 1);
        current + (next - current) * frac
    }
}

/// Read position for playing a buffer once into fixed-rate output blocks,
/// resampling linearly.
#[derive(Debug, Clone)]
pub struct BufferCursor {
    buffer: Arc<AudioBuffer>,
    position: f64,
    step: f64,
}

impl BufferCursor {
    pub fn new(buffer: Arc<AudioBuffer>, output_rate: u32) -> Self {
        let step = f64::from(buffer.sample_rate()) / f64::from(output_rate.max(1));
        Self {
            buffer,
            position: 0.0,
            step,
        }
    }

    /// Fills an interleaved block and advances; past the end it writes
    /// silence.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        for frame in out.chunks_exact_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self.buffer.sample_at_position(channel, channels, self.position);
            }
            self.position += self.step;
        }
    }

    /// Seconds of the buffer played so far.
    pub fn elapsed(&self) -> f64 {
        self.position / f64::from(self.buffer.sample_rate())
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.buffer.len() as f64
    }
}

/// Monotonic time source of the audio output, in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock based [`AudioClock`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced explicitly by its owner, e.g. by an offline render loop.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// The process-wide audio context: opened once, closed on shutdown.
pub struct AudioContext {
    sample_rate: u32,
    clock: Arc<dyn AudioClock>,
    open: bool,
}

impl AudioContext {
    pub fn open(sample_rate: u32, clock: Arc<dyn AudioClock>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(KaraokeError::InvalidInput("sample rate must be non-zero"));
        }
        tracing::info!(sample_rate, "audio context opened");
        Ok(Self {
            sample_rate,
            clock,
            open: true,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Current audio time; fails once the context has been closed.
    pub fn now(&self) -> Result<f64> {
        if !self.open {
            return Err(KaraokeError::msg("audio context is closed"));
        }
        Ok(self.clock.now())
    }

    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            tracing::info!("audio context closed");
        }
    }
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate)
            .field("open", &self.open)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_and_reinterleaves() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0], 2, 10).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.channel(0), &[1.0, 2.0]);
        assert_eq!(buffer.channel(1), &[-1.0, -2.0]);
        assert_eq!(buffer.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
        assert!((buffer.duration() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn cursor_plays_once_at_the_output_rate() {
        let buffer = AudioBuffer::new(10, vec![vec![0.0, 1.0, 0.0]]).unwrap();
        let mut cursor = BufferCursor::new(Arc::new(buffer), 20);

        let mut block = [9.0; 8];
        cursor.fill(&mut block, 2);
        assert_eq!(block, [0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 0.5, 0.5]);
        assert!((cursor.elapsed() - 0.2).abs() < 1e-9);
        assert!(!cursor.is_finished());

        let mut tail = [9.0; 5];
        cursor.fill(&mut tail, 1);
        assert_eq!(tail, [0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(cursor.is_finished());
    }

    #[test]
    fn rejects_ragged_or_empty_layouts() {
        assert!(AudioBuffer::new(44_100, vec![vec![0.0; 3], vec![0.0; 2]]).is_err());
        assert!(AudioBuffer::new(44_100, Vec::new()).is_err());
        assert!(AudioBuffer::new(0, vec![vec![0.0]]).is_err());
        assert!(AudioBuffer::from_interleaved(&[0.0], 0, 44_100).is_err());
    }

    #[test]
    fn up_and_down_mixes_channels() {
        let mono = AudioBuffer::new(10, vec![vec![0.5]]).unwrap();
        assert_eq!(mono.sample_for_output(1, 2, 0), 0.5);

        let stereo = AudioBuffer::new(10, vec![vec![1.0], vec![0.0]]).unwrap();
        assert_eq!(stereo.sample_for_output(0, 1, 0), 0.5);
        assert_eq!(stereo.sample_for_output(1, 2, 0), 0.0);
        assert_eq!(stereo.sample_for_output(2, 4, 0), 0.0);
    }

    #[test]
    fn interpolates_between_frames() {
        let buffer = AudioBuffer::new(10, vec![vec![0.0, 1.0]]).unwrap();
        assert!((buffer.sample_at_position(0, 1, 0.25) - 0.25).abs() < 1e-6);
        assert_eq!(buffer.sample_at_position(0, 1, 1.0), 1.0);
        assert_eq!(buffer.sample_at_position(0, 1, 2.0), 0.0);
        assert_eq!(buffer.sample_at_position(0, 1, -0.5), 0.0);
    }

    #[test]
    fn manual_clock_and_context_lifecycle() {
        let clock = Arc::new(ManualClock::new(1.0));
        clock.advance(0.5);
        let mut context = AudioContext::open(44_100, clock.clone()).unwrap();
        assert_eq!(context.now().unwrap(), 1.5);

        context.close();
        context.close();
        assert!(!context.is_open());
        assert!(context.now().is_err());
    }
}
