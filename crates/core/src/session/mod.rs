//! The karaoke session: owns the lyrics, the backing track, the capture
//! session, the current take and the preview engine, and exposes the
//! operations a front end drives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{AudioClock, AudioContext};
use crate::capture::{CaptureFormat, CaptureSession, CapturedTake, FrameProducer};
use crate::config::{AppConfig, MixConfig, SettingsStore};
use crate::mixer::{self, MixJob};
use crate::preview::{GainRamp, PreviewEngine, PreviewSchedule};
use crate::timeline::{DisplayState, FollowerTick, LyricFollower, LyricTimeline};
use crate::wav::{self, BitDepth, WavBlob, WavSpec};
use crate::{AudioBuffer, KaraokeError, Result};

/// Output gain of the microphone monitor while it is on.
pub const MONITOR_GAIN: f32 = 0.8;
/// Time constant of the monitor's on/off ramp, in seconds.
pub const MONITOR_SMOOTHING_SECONDS: f64 = 0.1;

/// Outcome of the last backing-track load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BackingStatus {
    NotLoaded,
    Ready,
    /// Recording still works; only mixed export is unavailable.
    DecodeFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MicPermission {
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPurpose {
    Vocal,
    Mix,
}

impl ExportPurpose {
    fn prefix(self) -> &'static str {
        match self {
            Self::Vocal => "Vocal_Track",
            Self::Mix => "PureSing_Mix",
        }
    }
}

/// `Vocal_Track_<YYYY-MM-DD>.wav` or `PureSing_Mix_<YYYY-MM-DD>.wav`.
pub fn export_file_name(purpose: ExportPurpose, date: NaiveDate) -> String {
    format!("{}_{}.wav", purpose.prefix(), date.format("%Y-%m-%d"))
}

/// An encoded file ready to be written, with its suggested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub blob: WavBlob,
}

impl ExportedFile {
    /// Writes the file into `dir` under its suggested name.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        self.blob.save(&path)?;
        Ok(path)
    }
}

/// Produced when a recording stops.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// Vocal-only 32-bit float WAV of the take.
    pub vocal_wav: WavBlob,
    pub take_duration: f64,
    /// `max(take duration, backing duration)`.
    pub preview_duration: f64,
    pub dropped_frames: usize,
}

pub struct KaraokeSession {
    config: AppConfig,
    settings: Option<SettingsStore>,
    context: AudioContext,
    follower: LyricFollower,
    backing: Option<Arc<AudioBuffer>>,
    backing_status: BackingStatus,
    mic: MicPermission,
    capture: Option<CaptureSession>,
    /// Exists only while recording.
    monitor: Option<GainRamp>,
    take: Option<CapturedTake>,
    preview: PreviewEngine,
}

impl KaraokeSession {
    /// Opens the audio context and restores the persisted latency offset.
    pub fn new(
        mut config: AppConfig,
        clock: Arc<dyn AudioClock>,
        settings: Option<SettingsStore>,
    ) -> Result<Self> {
        if let Some(store) = &settings {
            config.mix.set_latency_offset_ms(store.load_latency_offset());
        }
        let context = AudioContext::open(config.audio.sample_rate, clock)?;
        let preview = PreviewEngine::new(context.clock());
        Ok(Self {
            config,
            settings,
            context,
            follower: LyricFollower::new(Arc::new(LyricTimeline::default())),
            backing: None,
            backing_status: BackingStatus::NotLoaded,
            mic: MicPermission::Unknown,
            capture: None,
            monitor: None,
            take: None,
            preview,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mix_config(&self) -> MixConfig {
        self.config.mix
    }

    /// Current audio-clock time.
    pub fn now(&self) -> Result<f64> {
        self.context.now()
    }

    // Lyrics

    /// Replaces the lyric timeline, returning the number of lines parsed.
    pub fn load_lyrics(&mut self, file_name: &str, text: &str) -> usize {
        let timeline = Arc::new(LyricTimeline::load(file_name, text));
        let count = timeline.len();
        let running = self.follower.is_running();
        self.follower = LyricFollower::new(timeline);
        if running {
            self.follower.start();
        }
        info!(file_name, lines = count, "lyrics loaded");
        count
    }

    pub fn timeline(&self) -> &Arc<LyricTimeline> {
        self.follower.timeline()
    }

    pub fn display_at(&self, time: f64) -> DisplayState {
        self.follower.timeline().display_at(time)
    }

    /// Advances the lyric view; `None` once the transport has stopped.
    pub fn tick_lyrics(&mut self, time: f64) -> Option<FollowerTick> {
        self.follower.tick(time)
    }

    // Backing track

    /// Records the result of decoding a backing track. A failure is kept as
    /// a status and does not prevent recording.
    pub fn load_backing(&mut self, decoded: Result<AudioBuffer>) {
        match decoded {
            Ok(buffer) => {
                info!(
                    duration = buffer.duration(),
                    channels = buffer.channel_count(),
                    sample_rate = buffer.sample_rate(),
                    "backing track ready"
                );
                self.backing = Some(Arc::new(buffer));
                self.backing_status = BackingStatus::Ready;
            }
            Err(err) => {
                warn!(%err, "backing track could not be decoded");
                self.backing = None;
                self.backing_status = BackingStatus::DecodeFailed(err.to_string());
            }
        }
        self.reload_preview();
    }

    pub fn backing(&self) -> Option<&Arc<AudioBuffer>> {
        self.backing.as_ref()
    }

    pub fn backing_status(&self) -> &BackingStatus {
        &self.backing_status
    }

    pub fn can_export_mix(&self) -> bool {
        self.backing.is_some() && self.take.as_ref().is_some_and(|take| !take.is_empty())
    }

    // Recording

    pub fn mic_permission(&self) -> MicPermission {
        self.mic
    }

    pub fn set_mic_permission(&mut self, permission: MicPermission) {
        self.mic = permission;
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    /// Opens a new capture session and returns the producer for the input
    /// callback. Any session in progress is torn down first, and the
    /// previous take is discarded.
    pub fn start_recording(&mut self, reported_channels: Option<u16>) -> Result<FrameProducer> {
        if self.mic == MicPermission::Denied {
            return Err(KaraokeError::Device("microphone access denied".into()));
        }
        self.abort_recording();
        self.discard_take();

        let audio = &self.config.audio;
        let format = CaptureFormat::negotiate(
            self.context.sample_rate(),
            reported_channels,
            audio.requested_channels,
        );
        let (session, producer) =
            CaptureSession::open(format, audio.frame_size, audio.frame_queue_depth);
        self.capture = Some(session);
        self.monitor = Some(GainRamp::with_time_constant(
            monitor_target(self.config.audio.monitor),
            MONITOR_SMOOTHING_SECONDS,
        ));
        self.mic = MicPermission::Granted;
        self.follower.start();
        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "recording started"
        );
        Ok(producer)
    }

    /// Pulls queued frames into the capture session.
    pub fn drain_capture(&mut self) -> usize {
        self.capture.as_mut().map_or(0, CaptureSession::drain)
    }

    /// Drops the capture session without keeping a take, e.g. when playback
    /// of the backing track failed to start.
    pub fn abort_recording(&mut self) -> bool {
        self.follower.stop();
        self.monitor = None;
        match self.capture.take() {
            Some(session) => {
                debug!(frames = session.frame_count(), "recording aborted");
                true
            }
            None => false,
        }
    }

    /// Ends the recording, keeps the take and loads it into the preview.
    /// Returns `None` when nothing was recording or nothing was captured.
    /// The take is kept even when its WAV cannot be encoded.
    pub fn stop_recording(&mut self) -> Result<Option<RecordingSummary>> {
        self.follower.stop();
        self.monitor = None;
        let Some(session) = self.capture.take() else {
            return Ok(None);
        };
        let dropped_frames = session.dropped_frames();
        let take = session.freeze();
        if take.is_empty() {
            warn!("recording stopped without captured audio");
            return Ok(None);
        }

        let take_duration = take.duration();
        let encoded = encode_take(&take);
        self.take = Some(take);
        self.reload_preview();
        info!(
            duration = take_duration,
            dropped_frames,
            "recording stopped"
        );

        let vocal_wav = encoded?;
        Ok(Some(RecordingSummary {
            vocal_wav,
            take_duration,
            preview_duration: self.preview.duration(),
            dropped_frames,
        }))
    }

    /// Stops before the song ends. The mix still spans the whole backing
    /// track.
    pub fn finish_early(&mut self) -> Result<Option<RecordingSummary>> {
        info!("finishing recording early");
        self.stop_recording()
    }

    // Monitoring

    /// Turns the microphone monitor on or off. A running recording ramps
    /// towards the new gain; later recordings start at it.
    pub fn set_monitor(&mut self, enabled: bool) {
        self.config.audio.monitor = enabled;
        if let (Some(ramp), Ok(now)) = (&mut self.monitor, self.context.now()) {
            ramp.retarget(monitor_target(enabled), now);
            debug!(enabled, "monitor retargeted");
        }
    }

    /// Monitor gain at `time`; zero when not recording.
    pub fn monitor_gain(&self, time: f64) -> f32 {
        self.monitor.map_or(0.0, |ramp| ramp.value_at(time))
    }

    /// Adds the monitored microphone signal to an interleaved output block.
    /// `input` holds captured frames in the capture format, the first of
    /// them at the current audio-clock time. Adds nothing when not
    /// recording.
    pub fn render_monitor(&self, input: &[f32], out: &mut [f32], channels: usize) {
        let (Some(ramp), Some(capture)) = (self.monitor, &self.capture) else {
            return;
        };
        let Ok(start) = self.context.now() else {
            return;
        };
        let format = capture.format();
        let input_channels = usize::from(format.channels);
        if channels == 0 || input_channels == 0 || format.sample_rate == 0 {
            return;
        }
        let rate = f64::from(format.sample_rate);
        let frames = out
            .chunks_exact_mut(channels)
            .zip(input.chunks_exact(input_channels));
        for (index, (frame, source)) in frames.enumerate() {
            let gain = ramp.value_at(start + index as f64 / rate);
            if gain == 0.0 {
                continue;
            }
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample += gain * source[channel.min(input_channels - 1)];
            }
        }
    }

    // Takes

    pub fn take(&self) -> Option<&CapturedTake> {
        self.take.as_ref()
    }

    /// Uses an existing recording (e.g. a decoded vocal file) as the take.
    pub fn set_take(&mut self, take: CapturedTake) {
        self.abort_recording();
        self.take = Some(take);
        self.reload_preview();
    }

    pub fn discard_take(&mut self) {
        self.preview.unload();
        if self.take.take().is_some() {
            debug!("take discarded");
        }
    }

    pub fn keep_take(&mut self) {
        self.preview.stop();
    }

    fn reload_preview(&mut self) {
        let Some(take) = &self.take else {
            return;
        };
        match take.to_buffer() {
            Ok(vocal) => self.preview.load(Arc::new(vocal), self.backing.clone()),
            Err(err) => warn!(%err, "take cannot be previewed"),
        }
    }

    // Export

    /// Vocal-only WAV of the take.
    pub fn export_vocal(&self, date: NaiveDate) -> Result<Option<ExportedFile>> {
        let Some(take) = self.take.as_ref().filter(|take| !take.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(ExportedFile {
            file_name: export_file_name(ExportPurpose::Vocal, date),
            blob: encode_take(take)?,
        }))
    }

    /// Renders the mix with the current settings on this thread.
    pub fn render_mix(&self) -> Option<AudioBuffer> {
        mixer::render_mix(self.backing.as_deref(), self.take.as_ref()?, &self.config.mix)
    }

    pub fn export_mix(&self, date: NaiveDate) -> Result<Option<ExportedFile>> {
        let Some(mix) = self.render_mix() else {
            return Ok(None);
        };
        Ok(Some(ExportedFile {
            file_name: export_file_name(ExportPurpose::Mix, date),
            blob: wav::encode_buffer(&mix, BitDepth::Float32)?,
        }))
    }

    /// Starts a background render with the current settings, or returns
    /// `None` if there is nothing to mix.
    pub fn spawn_mix(&self) -> Result<Option<MixJob>> {
        let (Some(backing), Some(take)) = (&self.backing, &self.take) else {
            return Ok(None);
        };
        MixJob::spawn(backing.clone(), take.clone(), self.config.mix).map(Some)
    }

    // Settings

    /// Clamps, applies and persists the latency offset. Returns the value in
    /// effect.
    pub fn set_latency_offset_ms(&mut self, offset_ms: i32) -> Result<i32> {
        self.config.mix.set_latency_offset_ms(offset_ms);
        let applied = self.config.mix.latency_offset_ms();
        if let Some(store) = &self.settings {
            store.save_latency_offset(applied)?;
        }
        Ok(applied)
    }

    /// Applies to later renders and ramps a running preview.
    pub fn set_vocal_volume(&mut self, volume: f32) {
        self.config.mix.set_vocal_volume(volume);
        self.preview.set_vocal_volume(self.config.mix.vocal_volume());
    }

    // Preview

    pub fn preview(&self) -> &PreviewEngine {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut PreviewEngine {
        &mut self.preview
    }

    pub fn play_preview(&mut self) -> Result<PreviewSchedule> {
        let config = self.config.mix;
        self.preview.play(&config)
    }

    pub fn toggle_preview(&mut self) -> Result<bool> {
        let config = self.config.mix;
        self.preview.toggle(&config)
    }

    /// Stops everything and closes the audio context.
    pub fn shutdown(&mut self) {
        self.abort_recording();
        self.preview.stop();
        self.context.close();
    }
}

fn monitor_target(enabled: bool) -> f32 {
    if enabled {
        MONITOR_GAIN
    } else {
        0.0
    }
}

/// 32-bit float WAV of a take in its capture format.
fn encode_take(take: &CapturedTake) -> Result<WavBlob> {
    let format = take.format();
    wav::encode(
        take.samples(),
        WavSpec {
            sample_rate: format.sample_rate,
            channels: format.channels,
            bit_depth: BitDepth::Float32,
        },
    )
}

impl Drop for KaraokeSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for KaraokeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaraokeSession")
            .field("context", &self.context)
            .field("backing_status", &self.backing_status)
            .field("mic", &self.mic)
            .field("recording", &self.capture.is_some())
            .field("monitor", &self.monitor.map(|ramp| ramp.target()))
            .field("has_take", &self.take.is_some())
            .field("preview", &self.preview)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ManualClock;
    use crate::wav::WavHeader;

    const RATE: u32 = 1_000;

    fn session_with(settings: Option<SettingsStore>) -> KaraokeSession {
        let mut config = AppConfig::default();
        config.audio.sample_rate = RATE;
        config.audio.frame_size = 4;
        config.audio.frame_queue_depth = 1_024;
        KaraokeSession::new(config, Arc::new(ManualClock::new(0.0)), settings).unwrap()
    }

    fn session() -> KaraokeSession {
        session_with(None)
    }

    fn backing(frames: usize) -> AudioBuffer {
        AudioBuffer::new(RATE, vec![vec![0.0; frames], vec![0.0; frames]]).unwrap()
    }

    fn record(session: &mut KaraokeSession, samples: &[f32]) -> RecordingSummary {
        let mut producer = session.start_recording(Some(1)).unwrap();
        producer.push_interleaved(samples, 1);
        session.drain_capture();
        session.stop_recording().unwrap().unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn export_names_carry_the_date() {
        assert_eq!(
            export_file_name(ExportPurpose::Vocal, date()),
            "Vocal_Track_2024-03-05.wav"
        );
        assert_eq!(
            export_file_name(ExportPurpose::Mix, date()),
            "PureSing_Mix_2024-03-05.wav"
        );
    }

    #[test]
    fn recording_produces_float_vocal_wav_and_preview() {
        let mut session = session();
        session.load_backing(Ok(backing(3_000)));
        let summary = record(&mut session, &[0.5; 2_000]);

        let header = WavHeader::parse(summary.vocal_wav.bytes()).unwrap();
        assert_eq!(header.format_tag, 3);
        assert_eq!(header.channels, 1);
        assert_eq!(header.sample_rate, RATE);
        assert_eq!(summary.take_duration, 2.0);
        assert_eq!(summary.preview_duration, 3.0);
        assert!(session.preview().is_loaded());
        assert_eq!(session.preview().position(), 0.0);
        assert!(!session.is_recording());
    }

    #[test]
    fn backing_decode_failure_still_allows_vocal_export() {
        let mut session = session();
        session.load_backing(Err(KaraokeError::msg("unsupported codec")));
        assert_eq!(
            session.backing_status(),
            &BackingStatus::DecodeFailed("unsupported codec".into())
        );

        record(&mut session, &[0.1; 8]);
        assert!(!session.can_export_mix());
        assert!(session.export_mix(date()).unwrap().is_none());
        let vocal = session.export_vocal(date()).unwrap().unwrap();
        assert_eq!(vocal.file_name, "Vocal_Track_2024-03-05.wav");
    }

    #[test]
    fn denied_microphone_refuses_to_record() {
        let mut session = session();
        session.set_mic_permission(MicPermission::Denied);
        assert!(matches!(
            session.start_recording(None),
            Err(KaraokeError::Device(_))
        ));
        assert!(!session.is_recording());
    }

    #[test]
    fn starting_again_tears_down_the_previous_session() {
        let mut session = session();
        let mut first = session.start_recording(None).unwrap();
        let mut second = session.start_recording(None).unwrap();

        first.push_interleaved(&[9.0; 8], 2);
        assert!(!first.is_connected());
        second.push_interleaved(&[1.0; 8], 2);
        session.drain_capture();

        let summary = session.stop_recording().unwrap().unwrap();
        assert!(second.is_connected());
        assert!(session.take().unwrap().samples().iter().all(|s| *s == 1.0));
        assert_eq!(summary.take_duration, 4.0 / RATE as f64);
    }

    #[test]
    fn aborting_keeps_no_take() {
        let mut session = session();
        let mut producer = session.start_recording(None).unwrap();
        producer.push_interleaved(&[0.2; 16], 2);
        assert!(session.abort_recording());
        assert!(!session.abort_recording());
        assert!(session.stop_recording().unwrap().is_none());
        assert!(session.take().is_none());
    }

    #[test]
    fn finishing_early_mixes_over_the_whole_backing() {
        let mut session = session();
        session.load_backing(Ok(backing(5_000)));
        let mut producer = session.start_recording(Some(1)).unwrap();
        producer.push_interleaved(&[0.3; 1_000], 1);
        session.drain_capture();
        let summary = session.finish_early().unwrap().unwrap();
        assert_eq!(summary.take_duration, 1.0);

        let mix = session.render_mix().unwrap();
        assert_eq!(mix.len(), 5_000);
        let export = session.export_mix(date()).unwrap().unwrap();
        assert_eq!(export.file_name, "PureSing_Mix_2024-03-05.wav");
        assert_eq!(WavHeader::parse(export.blob.bytes()).unwrap().channels, 2);
    }

    #[test]
    fn discard_and_keep_take() {
        let mut session = session();
        session.load_backing(Ok(backing(100)));
        record(&mut session, &[0.5; 40]);
        session.play_preview().unwrap();

        session.keep_take();
        assert!(!session.preview().is_playing());
        assert!(session.take().is_some());

        session.discard_take();
        assert!(session.take().is_none());
        assert!(!session.preview().is_loaded());
        assert!(session.export_vocal(date()).unwrap().is_none());
    }

    #[test]
    fn latency_offset_is_persisted_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        {
            let mut session = session_with(Some(SettingsStore::new(&path)));
            assert_eq!(session.set_latency_offset_ms(900).unwrap(), 500);
        }
        let session = session_with(Some(SettingsStore::new(&path)));
        assert_eq!(session.mix_config().latency_offset_ms(), 500);
    }

    #[test]
    fn spawned_mix_uses_settings_at_spawn_time() {
        let mut session = session();
        session.load_backing(Ok(backing(1_000)));
        record(&mut session, &[1.0; 8]);
        session.set_latency_offset_ms(100).unwrap();

        let job = session.spawn_mix().unwrap().unwrap();
        session.set_latency_offset_ms(0).unwrap();
        let mix = job.wait().unwrap().unwrap();
        assert_eq!(mix.channel(0)[99], 0.0);
        assert_eq!(mix.channel(0)[100], 1.0);
    }

    #[test]
    fn volume_changes_reach_the_running_preview() {
        let mut session = session();
        record(&mut session, &[0.5; 40]);
        session.play_preview().unwrap();
        session.set_vocal_volume(9.0);
        assert_eq!(session.mix_config().vocal_volume(), 3.0);
        assert_eq!(session.preview().current_gain(), Some(1.0));
    }

    #[test]
    fn lyrics_follow_only_while_recording() {
        let mut session = session();
        let lines = session.load_lyrics("song.lrc", "[00:01.00]hello [00:02.00]world");
        assert_eq!(lines, 1);
        assert!(session.tick_lyrics(1.5).is_none());

        session.start_recording(None).unwrap();
        let tick = session.tick_lyrics(1.5).unwrap();
        assert_eq!(tick.state.active_line, Some(0));
        session.abort_recording();
        assert!(session.tick_lyrics(1.6).is_none());
        assert_eq!(session.display_at(1.5).active_line, Some(0));
    }

    fn session_on(clock: &Arc<ManualClock>) -> KaraokeSession {
        let mut config = AppConfig::default();
        config.audio.sample_rate = RATE;
        config.audio.frame_size = 4;
        KaraokeSession::new(config, clock.clone(), None).unwrap()
    }

    #[test]
    fn monitor_ramps_towards_the_switched_gain() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut session = session_on(&clock);
        session.start_recording(Some(1)).unwrap();
        assert_eq!(session.monitor_gain(0.5), 0.0);

        clock.set(1.0);
        session.set_monitor(true);
        assert_eq!(session.monitor_gain(1.0), 0.0);
        let one_constant = MONITOR_GAIN * (1.0 - (-1.0_f32).exp());
        assert!((session.monitor_gain(1.0 + MONITOR_SMOOTHING_SECONDS) - one_constant).abs() < 1e-4);
        assert!((session.monitor_gain(2.0) - MONITOR_GAIN).abs() < 1e-3);

        clock.set(2.0);
        session.set_monitor(false);
        let falling = session.monitor_gain(2.0 + MONITOR_SMOOTHING_SECONDS);
        assert!((falling - MONITOR_GAIN * (-1.0_f32).exp()).abs() < 1e-3);
        assert!(session.monitor_gain(3.0) < 1e-3);
    }

    #[test]
    fn monitor_is_routed_only_while_recording() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut session = session_on(&clock);
        session.set_monitor(true);
        assert!(session.config().audio.monitor);
        assert_eq!(session.monitor_gain(0.0), 0.0);

        session.start_recording(Some(1)).unwrap();
        assert_eq!(session.monitor_gain(0.0), MONITOR_GAIN);
        let mut out = [0.0; 4];
        session.render_monitor(&[0.5, -0.5], &mut out, 2);
        assert_eq!(out, [0.4, 0.4, -0.4, -0.4]);

        session.stop_recording().unwrap();
        assert_eq!(session.monitor_gain(0.0), 0.0);
        let mut out = [0.0; 4];
        session.render_monitor(&[0.5, -0.5], &mut out, 2);
        assert_eq!(out, [0.0; 4]);

        session.start_recording(Some(1)).unwrap();
        session.abort_recording();
        assert_eq!(session.monitor_gain(0.0), 0.0);
    }

    #[test]
    fn shutdown_closes_the_audio_context() {
        let mut session = session();
        assert!(session.now().is_ok());
        session.shutdown();
        assert!(session.now().is_err());
    }
}
