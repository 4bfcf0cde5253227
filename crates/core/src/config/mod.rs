use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capture::FRAME_SIZE;
use crate::Result;

/// Settings key under which the latency offset is persisted.
pub const LATENCY_SETTINGS_KEY: &str = "puresing_latencyOffset";

pub const MIN_VOCAL_VOLUME: f32 = 0.0;
pub const MAX_VOCAL_VOLUME: f32 = 3.0;
pub const MIN_LATENCY_OFFSET_MS: i32 = -500;
pub const MAX_LATENCY_OFFSET_MS: i32 = 500;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub mix: MixConfig,
}

/// Microphone request and capture plumbing.
///
/// Karaoke capture wants the raw signal, so every voice-processing stage is
/// off by default. The three processing flags are hints for hosts that can
/// toggle them; a plain cpal input stream has no such controls and only
/// reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub requested_channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Route the microphone to the output while recording.
    pub monitor: bool,
    pub frame_size: usize,
    /// Frames that may queue between the capture callback and the session.
    pub frame_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            requested_channels: 2,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            monitor: false,
            frame_size: FRAME_SIZE,
            frame_queue_depth: 256,
        }
    }
}

/// User mix controls, read when a render or preview is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    vocal_volume: f32,
    latency_offset_ms: i32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            vocal_volume: 1.0,
            latency_offset_ms: 0,
        }
    }
}

impl MixConfig {
    pub fn new(vocal_volume: f32, latency_offset_ms: i32) -> Self {
        let mut config = Self::default();
        config.set_vocal_volume(vocal_volume);
        config.set_latency_offset_ms(latency_offset_ms);
        config
    }

    pub fn vocal_volume(&self) -> f32 {
        self.vocal_volume
    }

    pub fn latency_offset_ms(&self) -> i32 {
        self.latency_offset_ms
    }

    pub fn latency_offset_seconds(&self) -> f64 {
        f64::from(self.latency_offset_ms) / 1000.0
    }

    /// Linear vocal gain, clamped to `[0, 3]`. NaN is treated as silence.
    pub fn set_vocal_volume(&mut self, volume: f32) {
        self.vocal_volume = if volume.is_nan() {
            MIN_VOCAL_VOLUME
        } else {
            volume.clamp(MIN_VOCAL_VOLUME, MAX_VOCAL_VOLUME)
        };
    }

    /// Signed vocal delay in milliseconds, clamped to `[-500, 500]`.
    pub fn set_latency_offset_ms(&mut self, offset_ms: i32) {
        self.latency_offset_ms = offset_ms.clamp(MIN_LATENCY_OFFSET_MS, MAX_LATENCY_OFFSET_MS);
    }
}

/// Returns the default settings file location.
///
/// Returns: `<config dir>/puresing/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("puresing")
        .join("settings.json")
}

/// Small JSON key/value file holding persisted user settings.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the latency offset; a missing or unreadable file yields 0.
    pub fn load_latency_offset(&self) -> i32 {
        self.read_map()
            .get(LATENCY_SETTINGS_KEY)
            .and_then(Value::as_i64)
            .map(|value| {
                value.clamp(
                    i64::from(MIN_LATENCY_OFFSET_MS),
                    i64::from(MAX_LATENCY_OFFSET_MS),
                ) as i32
            })
            .unwrap_or(0)
    }

    /// Writes the latency offset, keeping any other keys in the file.
    pub fn save_latency_offset(&self, offset_ms: i32) -> Result<()> {
        let mut map = self.read_map();
        map.insert(LATENCY_SETTINGS_KEY.to_string(), Value::from(offset_ms));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&self.path, contents)?;
        tracing::debug!(path = ?self.path, offset_ms, "saved latency offset");
        Ok(())
    }

    fn read_map(&self) -> Map<String, Value> {
        if !self.path.exists() {
            return Map::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracing::warn!(path = ?self.path, "settings file is not an object, ignoring it");
                    Map::new()
                }
                Err(err) => {
                    tracing::warn!(path = ?self.path, %err, "failed to parse settings, using defaults");
                    Map::new()
                }
            },
            Err(err) => {
                tracing::warn!(path = ?self.path, %err, "failed to read settings, using defaults");
                Map::new()
            }
        }
    }
}
