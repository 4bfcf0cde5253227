use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use puresing_core::config::default_settings_path;
use puresing_core::{
    export_file_name, wav, AppConfig, AudioBuffer, AudioClock, BackingStatus, BitDepth,
    CapturedTake, ExportPurpose, KaraokeError, KaraokeSession, LyricFollower, LyricTimeline,
    ManualClock, MixConfig, PlaybackClock, SettingsStore, SystemClock,
};
use tracing_subscriber::EnvFilter;

mod decode;

fn main() -> puresing_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = SettingsStore::new(cli.settings.unwrap_or_else(default_settings_path));

    match cli.command {
        Commands::Lyrics { file, at } => run_lyrics(&file, &at),
        Commands::Follow { file, fps, until } => run_follow(&file, fps, until),
        Commands::Mix {
            backing,
            vocal,
            mix,
            bit_depth,
            out,
        } => run_mix(&settings, &backing, &vocal, &mix, bit_depth, out),
        Commands::Audition {
            vocal,
            backing,
            from,
            mix,
            out,
        } => run_audition(&settings, &vocal, backing.as_deref(), from, &mix, &out),
        Commands::Latency { set } => run_latency(settings, set),
        #[cfg(feature = "device")]
        Commands::Record {
            seconds,
            lyrics,
            backing,
            out_dir,
        } => record::run(settings, seconds, lyrics.as_deref(), backing.as_deref(), &out_dir),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Silent karaoke: lyrics, vocal capture and latency-compensated mixing", long_about = None)]
struct Cli {
    /// Settings file holding the persisted latency offset.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the parsed lyric timeline, or the display state at given times.
    Lyrics {
        /// LRC, SRT or ASS file; the dialect follows the extension.
        file: PathBuf,
        /// Playback positions in seconds.
        #[arg(long)]
        at: Vec<f64>,
    },
    /// Drive the lyric view with a simulated clock and print line changes.
    Follow {
        file: PathBuf,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Stop at this position; defaults to a few seconds past the last line.
        #[arg(long)]
        until: Option<f64>,
    },
    /// Render a vocal recording over a backing track.
    Mix {
        #[arg(long)]
        backing: PathBuf,
        #[arg(long)]
        vocal: PathBuf,
        #[command(flatten)]
        mix: MixArgs,
        /// 16 (PCM) or 32 (float).
        #[arg(long, default_value_t = 32)]
        bit_depth: u16,
        /// Defaults to `PureSing_Mix_<date>.wav` in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render what the preview would play from a seek position.
    Audition {
        #[arg(long)]
        vocal: PathBuf,
        #[arg(long)]
        backing: Option<PathBuf>,
        /// Seek position in seconds.
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[command(flatten)]
        mix: MixArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Show or change the persisted latency offset.
    Latency {
        /// New offset in milliseconds, clamped to [-500, 500].
        #[arg(long, allow_hyphen_values = true)]
        set: Option<i32>,
    },
    /// Record from the default microphone while following lyrics.
    #[cfg(feature = "device")]
    Record {
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
        #[arg(long)]
        lyrics: Option<PathBuf>,
        #[arg(long)]
        backing: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct MixArgs {
    /// Linear vocal gain in [0, 3].
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
    /// Vocal delay in milliseconds; defaults to the persisted offset.
    #[arg(long, allow_hyphen_values = true)]
    latency_ms: Option<i32>,
}

impl MixArgs {
    fn resolve(&self, settings: &SettingsStore) -> MixConfig {
        let offset = self
            .latency_ms
            .unwrap_or_else(|| settings.load_latency_offset());
        MixConfig::new(self.volume, offset)
    }
}

fn load_timeline(file: &Path) -> puresing_core::Result<LyricTimeline> {
    let text = std::fs::read_to_string(file)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    Ok(LyricTimeline::load(name, &text))
}

fn run_lyrics(file: &Path, at: &[f64]) -> puresing_core::Result<()> {
    let timeline = load_timeline(file)?;
    tracing::info!(?file, lines = timeline.len(), "parsed lyrics");

    if at.is_empty() {
        for line in timeline.lines() {
            println!("[{:>8.3}] {}", line.time, line.text.trim_end());
            for word in &line.words {
                println!(
                    "           {:>8.3} +{:.3} {}",
                    word.time,
                    word.duration,
                    word.text.trim_end()
                );
            }
        }
        return Ok(());
    }

    for &time in at {
        let state = timeline.display_at(time);
        match state.active_line {
            Some(index) => {
                let line = &timeline.lines()[index];
                let words: Vec<String> = line
                    .words
                    .iter()
                    .zip(&state.word_progress)
                    .map(|(word, progress)| {
                        format!("{}({:.0}%)", word.text.trim_end(), progress * 100.0)
                    })
                    .collect();
                println!("{time:>8.3}: #{index} {}", words.join(" "));
            }
            None => println!("{time:>8.3}: -"),
        }
        if let Some(next) = state.next_line {
            println!("          next: {}", timeline.lines()[next].text.trim_end());
        }
    }
    Ok(())
}

fn run_follow(file: &Path, fps: f64, until: Option<f64>) -> puresing_core::Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(KaraokeError::InvalidInput("fps must be positive"));
    }
    let timeline = Arc::new(load_timeline(file)?);
    let end = until.unwrap_or_else(|| timeline.lines().last().map_or(0.0, |l| l.time) + 5.0);

    let mut follower = LyricFollower::new(timeline.clone());
    let mut clock = PlaybackClock::default();
    follower.start();
    while clock.time_seconds <= end {
        if let Some(tick) = follower.tick(clock.time_seconds) {
            if tick.line_changed {
                match tick.state.active_line {
                    Some(index) => println!(
                        "{:>8.3} {}",
                        clock.time_seconds,
                        timeline.lines()[index].text.trim_end()
                    ),
                    None => println!("{:>8.3} -", clock.time_seconds),
                }
            }
        }
        clock.advance(1.0 / fps);
    }
    follower.stop();
    tracing::info!(end, "follow finished");
    Ok(())
}

/// Session with a decoded take and optional backing track.
fn session_for(
    clock: Arc<dyn AudioClock>,
    mix: MixConfig,
    vocal: &Path,
    backing: Option<&Path>,
) -> puresing_core::Result<KaraokeSession> {
    let vocal = decode::decode_file(vocal)?;
    let mut config = AppConfig::default();
    config.audio.sample_rate = vocal.sample_rate();
    config.mix = mix;

    let mut session = KaraokeSession::new(config, clock, None)?;
    if let Some(path) = backing {
        session.load_backing(decode::decode_file(path));
    }
    session.set_take(CapturedTake::from_buffer(&vocal));
    Ok(session)
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_mix(
    settings: &SettingsStore,
    backing: &Path,
    vocal: &Path,
    mix: &MixArgs,
    bit_depth: u16,
    out: Option<PathBuf>,
) -> puresing_core::Result<()> {
    let bit_depth = BitDepth::from_bits(bit_depth)
        .ok_or(KaraokeError::InvalidInput("bit depth must be 16 or 32"))?;
    let config = mix.resolve(settings);
    let session = session_for(Arc::new(SystemClock::new()), config, vocal, Some(backing))?;
    if let BackingStatus::DecodeFailed(reason) = session.backing_status() {
        return Err(KaraokeError::msg(format!(
            "backing track could not be decoded: {reason}"
        )));
    }

    let job = session
        .spawn_mix()?
        .ok_or_else(|| KaraokeError::msg("nothing to mix"))?;
    let rendered = job
        .wait()?
        .ok_or_else(|| KaraokeError::msg("nothing to mix"))?;

    let out = out.unwrap_or_else(|| PathBuf::from(export_file_name(ExportPurpose::Mix, today())));
    wav::encode_buffer(&rendered, bit_depth)?.save(&out)?;
    tracing::info!(
        ?out,
        duration = rendered.duration(),
        offset_ms = config.latency_offset_ms(),
        "mix written"
    );
    Ok(())
}

fn run_audition(
    settings: &SettingsStore,
    vocal: &Path,
    backing: Option<&Path>,
    from: f64,
    mix: &MixArgs,
    out: &Path,
) -> puresing_core::Result<()> {
    const BLOCK_FRAMES: usize = 1024;

    let clock = Arc::new(ManualClock::new(0.0));
    let mut session = session_for(clock.clone(), mix.resolve(settings), vocal, backing)?;
    let (channels, sample_rate) = match session.backing() {
        Some(backing) => (backing.channel_count(), backing.sample_rate()),
        None => (2, session.config().audio.sample_rate),
    };

    session.preview_mut().seek(from)?;
    let schedule = session.play_preview()?;
    clock.set(schedule.reference_time);

    let mut rendered = Vec::new();
    let mut block = vec![0.0; BLOCK_FRAMES * channels];
    loop {
        if session.preview_mut().tick().finished {
            break;
        }
        session.preview().render(&mut block, channels, sample_rate);
        rendered.extend_from_slice(&block);
        clock.advance(BLOCK_FRAMES as f64 / f64::from(sample_rate));
    }

    let buffer = AudioBuffer::from_interleaved(&rendered, channels, sample_rate)?;
    wav::encode_buffer(&buffer, BitDepth::Float32)?.save(out)?;
    tracing::info!(?out, from, duration = buffer.duration(), "audition written");
    Ok(())
}

fn run_latency(settings: SettingsStore, set: Option<i32>) -> puresing_core::Result<()> {
    let Some(offset_ms) = set else {
        println!("{} ms", settings.load_latency_offset());
        return Ok(());
    };
    let path = settings.path().to_path_buf();
    let mut session =
        KaraokeSession::new(AppConfig::default(), Arc::new(SystemClock::new()), Some(settings))?;
    let applied = session.set_latency_offset_ms(offset_ms)?;
    tracing::info!(?path, applied, "latency offset saved");
    println!("{applied} ms");
    Ok(())
}

#[cfg(feature = "device")]
mod record {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use puresing_core::device::{InputDevice, LiveStream, OutputDevice};
    use puresing_core::{
        AppConfig, BufferCursor, KaraokeSession, MicPermission, SettingsStore, SystemClock,
    };

    pub fn run(
        settings: SettingsStore,
        seconds: f64,
        lyrics: Option<&Path>,
        backing: Option<&Path>,
        out_dir: &Path,
    ) -> puresing_core::Result<()> {
        let mut config = AppConfig::default();
        let device = InputDevice::open(&config.audio)?;
        if !device.matches_request() {
            config.audio.sample_rate = device.sample_rate();
        }
        let mut session = KaraokeSession::new(config, Arc::new(SystemClock::new()), Some(settings))?;

        if let Some(path) = lyrics {
            let text = std::fs::read_to_string(path)?;
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            session.load_lyrics(name, &text);
        }
        if let Some(path) = backing {
            session.load_backing(crate::decode::decode_file(path));
        }

        let producer = session.start_recording(Some(device.channels()))?;
        let input = match device.start(producer) {
            Ok(input) => input,
            Err(err) => {
                session.abort_recording();
                session.set_mic_permission(MicPermission::Denied);
                return Err(err);
            }
        };
        let playback = play_backing(&session);

        let start = session.now()?;
        loop {
            let elapsed = session.now()? - start;
            if elapsed >= seconds {
                break;
            }
            session.drain_capture();
            if let Some(tick) = session.tick_lyrics(elapsed) {
                if tick.line_changed {
                    if let Some(index) = tick.state.active_line {
                        println!("{}", session.timeline().lines()[index].text.trim_end());
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(33));
        }
        drop(playback);
        drop(input);

        let Some(summary) = session.stop_recording()? else {
            tracing::warn!("nothing was captured");
            return Ok(());
        };
        tracing::info!(
            duration = summary.take_duration,
            dropped_frames = summary.dropped_frames,
            "take finished"
        );

        let date = super::today();
        if let Some(vocal) = session.export_vocal(date)? {
            vocal.save_in(out_dir)?;
        }
        if let Some(mix) = session.export_mix(date)? {
            mix.save_in(out_dir)?;
        }
        Ok(())
    }

    /// Starts the backing track on the default output. Recording goes on
    /// without it when no backing is loaded or the output cannot start.
    fn play_backing(session: &KaraokeSession) -> Option<LiveStream> {
        let backing = session.backing()?.clone();
        let started = OutputDevice::default_output()
            .and_then(|output| output.play(BufferCursor::new(backing, output.sample_rate())));
        match started {
            Ok(stream) => Some(stream),
            Err(err) => {
                tracing::warn!(%err, "backing track cannot be played, recording without it");
                None
            }
        }
    }
}
