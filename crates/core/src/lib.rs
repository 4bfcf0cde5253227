//! Core library for the PureSing karaoke recorder.
//!
//! Two subsystems live here. The timed lyric engine parses LRC, SRT and ASS
//! files into one word-level timing model and answers "what is highlighted at
//! time t". The audio pipeline captures microphone frames, encodes WAV, and
//! renders or previews a latency-compensated mix of the take over the backing
//! track. Decoding audio files, drawing, and file pickers belong to the host.

pub mod audio;
pub mod capture;
pub mod config;
#[cfg(feature = "device")]
pub mod device;
pub mod error;
pub mod lyrics;
pub mod mixer;
pub mod preview;
pub mod session;
pub mod timeline;
pub mod wav;

pub use audio::{AudioBuffer, AudioClock, AudioContext, BufferCursor, ManualClock, SystemClock};
pub use capture::{
    choose_input_format, CaptureFormat, CaptureSession, CapturedTake, FrameProducer,
    InputFormatRange,
};
pub use config::{AppConfig, AudioConfig, MixConfig, SettingsStore};
pub use error::{KaraokeError, Result};
pub use lyrics::{LyricFormat, LyricLine, Word};
pub use mixer::{render_mix, MixJob};
pub use preview::{GainRamp, PreviewEngine, PreviewProgress, PreviewSchedule};
pub use session::{
    export_file_name, BackingStatus, ExportPurpose, ExportedFile, KaraokeSession, MicPermission,
    RecordingSummary,
};
pub use timeline::{DisplayState, LyricFollower, LyricTimeline, PlaybackClock};
pub use wav::{BitDepth, WavBlob, WavSpec};
