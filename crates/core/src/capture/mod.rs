//! Vocal capture: a real-time producer hands fixed-size PCM frames to a
//! consumer-side session over a bounded channel.
//!
//! The producer side never blocks. Frames travel by value, so no sample
//! memory is shared between the audio callback and the session. Empty frame
//! buffers flow back the other way so the callback rarely has to allocate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, Result};

/// Interleaved samples per frame handed over by the capture callback.
pub const FRAME_SIZE: usize = 4096;

const SPARE_FRAMES: usize = 8;

/// Layout of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureFormat {
    /// Uses the channel count the input device reported, falling back to the
    /// requested count when it reported none.
    pub fn negotiate(sample_rate: u32, reported: Option<u16>, requested: u16) -> Self {
        let channels = reported.unwrap_or(requested).clamp(1, 2);
        Self {
            sample_rate,
            channels,
        }
    }
}

/// Channel count and sample-rate range of one format an input device offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormatRange {
    pub channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
}

impl InputFormatRange {
    pub fn covers(&self, sample_rate: u32) -> bool {
        (self.min_sample_rate..=self.max_sample_rate).contains(&sample_rate)
    }
}

/// Picks the offered format that runs at `sample_rate`, preferring the
/// requested channel count, then the nearest larger count, then the nearest
/// smaller one. Returns its index, or `None` when no range covers the rate.
pub fn choose_input_format(
    offered: &[InputFormatRange],
    sample_rate: u32,
    requested_channels: u16,
) -> Option<usize> {
    offered
        .iter()
        .enumerate()
        .filter(|(_, range)| range.channels > 0 && range.covers(sample_rate))
        .min_by_key(|(_, range)| {
            let side = match range.channels.cmp(&requested_channels) {
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => 2,
            };
            (side, range.channels.abs_diff(requested_channels))
        })
        .map(|(index, _)| index)
}

/// Real-time side of a capture session.
///
/// Stereo input is interleaved L,R; anything beyond the first two input
/// channels is ignored. A full frame is posted to the session without
/// waiting; if the queue is full the frame is counted as dropped.
#[derive(Debug)]
pub struct FrameProducer {
    frames: Sender<Vec<f32>>,
    spares: Receiver<Vec<f32>>,
    current: Vec<f32>,
    frame_size: usize,
    dropped: Arc<AtomicUsize>,
    connected: bool,
}

impl FrameProducer {
    /// Accepts one callback's worth of planar input channels.
    pub fn push_planar(&mut self, inputs: &[&[f32]]) {
        match inputs {
            [] => {}
            [mono] => {
                for sample in mono.iter() {
                    self.push_sample(*sample);
                }
            }
            [left, right, ..] => {
                for (l, r) in left.iter().zip(right.iter()) {
                    self.push_sample(*l);
                    self.push_sample(*r);
                }
            }
        }
    }

    /// Accepts interleaved callback data with `channels` channels per frame.
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        match channels {
            0 => {}
            1 => {
                for sample in data {
                    self.push_sample(*sample);
                }
            }
            _ => {
                for frame in data.chunks_exact(channels) {
                    self.push_sample(frame[0]);
                    self.push_sample(frame[1]);
                }
            }
        }
    }

    /// Number of frames lost because the session could not keep up.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the consuming session still exists, as of the last posted
    /// frame.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn push_sample(&mut self, sample: f32) {
        self.current.push(sample);
        if self.current.len() >= self.frame_size {
            self.post_frame();
        }
    }

    fn post_frame(&mut self) {
        let full = std::mem::take(&mut self.current);
        match self.frames.try_send(full) {
            Ok(()) => {
                self.current = self
                    .spares
                    .try_recv()
                    .unwrap_or_else(|_| Vec::with_capacity(self.frame_size));
            }
            Err(TrySendError::Full(mut frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                frame.clear();
                self.current = frame;
            }
            Err(TrySendError::Disconnected(mut frame)) => {
                self.connected = false;
                frame.clear();
                self.current = frame;
            }
        }
    }
}

/// Consumer side: accumulates frames in arrival order while recording.
#[derive(Debug)]
pub struct CaptureSession {
    format: CaptureFormat,
    incoming: Receiver<Vec<f32>>,
    spares: Sender<Vec<f32>>,
    frames: Vec<Vec<f32>>,
    frame_size: usize,
    dropped: Arc<AtomicUsize>,
}

impl CaptureSession {
    /// Opens a session and the producer that feeds it. `queue_depth` bounds
    /// how many frames may wait between drains.
    pub fn open(
        format: CaptureFormat,
        frame_size: usize,
        queue_depth: usize,
    ) -> (CaptureSession, FrameProducer) {
        let frame_size = frame_size.max(1);
        let (frame_tx, frame_rx) = bounded(queue_depth.max(1));
        let (spare_tx, spare_rx) = bounded(SPARE_FRAMES);
        for _ in 0..SPARE_FRAMES {
            let _ = spare_tx.try_send(Vec::with_capacity(frame_size));
        }
        let dropped = Arc::new(AtomicUsize::new(0));

        let producer = FrameProducer {
            frames: frame_tx,
            spares: spare_rx,
            current: Vec::with_capacity(frame_size),
            frame_size,
            dropped: dropped.clone(),
            connected: true,
        };
        let session = CaptureSession {
            format,
            incoming: frame_rx,
            spares: spare_tx,
            frames: Vec::new(),
            frame_size,
            dropped,
        };
        (session, producer)
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Moves every frame waiting in the queue into the session without
    /// blocking, returning how many arrived.
    pub fn drain(&mut self) -> usize {
        let mut received = 0;
        while let Ok(frame) = self.incoming.try_recv() {
            self.frames.push(frame);
            let _ = self.spares.try_send(Vec::with_capacity(self.frame_size));
            received += 1;
        }
        received
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ends the session and concatenates its frames into one take. Samples
    /// still sitting in the producer's partial frame are not included.
    pub fn freeze(mut self) -> CapturedTake {
        self.drain();
        let mut samples = Vec::with_capacity(self.sample_count());
        for frame in &self.frames {
            samples.extend_from_slice(frame);
        }
        tracing::debug!(
            frames = self.frames.len(),
            samples = samples.len(),
            dropped = self.dropped_frames(),
            "capture session frozen"
        );
        CapturedTake {
            samples: samples.into(),
            format: self.format,
        }
    }
}

/// A finished recording: one contiguous interleaved sample array.
///
/// The samples are shared read-only; consumers build their own buffers from
/// them and never mutate the take.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedTake {
    samples: Arc<[f32]>,
    format: CaptureFormat,
}

impl CapturedTake {
    pub fn new(samples: Vec<f32>, format: CaptureFormat) -> Self {
        Self {
            samples: samples.into(),
            format,
        }
    }

    /// Builds a take from an already decoded buffer, e.g. a vocal file.
    pub fn from_buffer(buffer: &AudioBuffer) -> Self {
        let format = CaptureFormat {
            sample_rate: buffer.sample_rate(),
            channels: buffer.channel_count().min(usize::from(u16::MAX)) as u16,
        };
        Self::new(buffer.interleaved(), format)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels.max(1))
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.format.sample_rate.max(1))
    }

    /// De-interleaves the take into a fresh buffer.
    pub fn to_buffer(&self) -> Result<AudioBuffer> {
        AudioBuffer::from_interleaved(
            &self.samples,
            usize::from(self.format.channels),
            self.format.sample_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> CaptureFormat {
        CaptureFormat {
            sample_rate: 44_100,
            channels: 2,
        }
    }

    #[test]
    fn negotiates_reported_channels() {
        assert_eq!(CaptureFormat::negotiate(44_100, Some(1), 2).channels, 1);
        assert_eq!(CaptureFormat::negotiate(44_100, None, 2).channels, 2);
        assert_eq!(CaptureFormat::negotiate(48_000, Some(6), 2).channels, 2);
    }

    fn range(channels: u16, min: u32, max: u32) -> InputFormatRange {
        InputFormatRange {
            channels,
            min_sample_rate: min,
            max_sample_rate: max,
        }
    }

    #[test]
    fn input_format_prefers_requested_channels_at_requested_rate() {
        let offered = [
            range(1, 8_000, 96_000),
            range(2, 48_000, 48_000),
            range(4, 8_000, 96_000),
            range(2, 8_000, 96_000),
        ];
        assert_eq!(choose_input_format(&offered, 44_100, 2), Some(3));
        assert_eq!(choose_input_format(&offered, 48_000, 2), Some(1));
        assert_eq!(choose_input_format(&offered, 44_100, 1), Some(0));
    }

    #[test]
    fn input_format_falls_back_to_more_then_fewer_channels() {
        let offered = [range(1, 8_000, 96_000), range(6, 8_000, 96_000), range(4, 8_000, 96_000)];
        assert_eq!(choose_input_format(&offered, 44_100, 2), Some(2));
        assert_eq!(choose_input_format(&offered[..1], 44_100, 2), Some(0));
    }

    #[test]
    fn input_format_is_none_when_no_range_covers_the_rate() {
        let offered = [range(2, 48_000, 96_000), range(0, 8_000, 96_000)];
        assert_eq!(choose_input_format(&offered, 44_100, 2), None);
        assert_eq!(choose_input_format(&[], 44_100, 2), None);
    }

    #[test]
    fn emits_fixed_size_frames_in_order() {
        let (mut session, mut producer) = CaptureSession::open(stereo(), 4, 16);
        let (left, right) = ([1.0_f32, 3.0, 5.0], [2.0_f32, 4.0, 6.0]);
        producer.push_planar(&[&left[..], &right[..]]);
        assert_eq!(session.drain(), 1);
        producer.push_planar(&[&[7.0_f32][..], &[8.0_f32][..]]);

        let take = session.freeze();
        assert_eq!(take.samples(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(take.frames(), 4);
    }

    #[test]
    fn partial_frame_is_not_flushed() {
        let (session, mut producer) = CaptureSession::open(stereo(), FRAME_SIZE, 4);
        producer.push_interleaved(&[0.5; 100], 2);
        assert!(session.freeze().is_empty());
    }

    #[test]
    fn extra_input_channels_are_ignored() {
        let (session, mut producer) = CaptureSession::open(stereo(), 4, 4);
        producer.push_interleaved(&[1.0, 2.0, 9.0, 3.0, 4.0, 9.0], 3);
        assert_eq!(session.freeze().samples(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn full_queue_counts_dropped_frames() {
        let (session, mut producer) = CaptureSession::open(stereo(), 2, 1);
        producer.push_interleaved(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0], 1);
        assert_eq!(producer.dropped_frames(), 2);

        let take = session.freeze();
        assert_eq!(take.samples(), &[1.0, 1.0]);
    }

    #[test]
    fn producer_survives_session_teardown() {
        let (session, mut producer) = CaptureSession::open(stereo(), 2, 4);
        drop(session);
        producer.push_interleaved(&[0.1; 8], 1);
        assert!(!producer.is_connected());
    }

    #[test]
    fn take_converts_to_planar_buffer() {
        let take = CapturedTake::new(vec![0.1, 0.2, 0.3, 0.4], stereo());
        let buffer = take.to_buffer().unwrap();
        assert_eq!(buffer.channel(0), &[0.1, 0.3]);
        assert_eq!(buffer.channel(1), &[0.2, 0.4]);
        assert_eq!(CapturedTake::from_buffer(&buffer), take);
        assert!((take.duration() - 2.0 / 44_100.0).abs() < 1e-12);
    }
}
