//! Timed lyric model and the subtitle dialects that feed it.
//!
//! Every dialect is reduced to the same shape: an ascending list of
//! [`LyricLine`]s, each carrying word-level timing for karaoke highlighting.
//! Malformed input never raises an error; unusable lines are skipped and only
//! the aggregate list is returned.

use std::path::Path;

use serde::{Deserialize, Serialize};

mod ass;
mod lrc;
mod srt;
pub mod timetag;

pub use ass::parse_ass;
pub use lrc::parse_lrc;
pub use srt::parse_srt;

/// Shortest duration a word may be given so its highlight stays visible.
pub const MIN_WORD_DURATION: f64 = 0.1;

/// Duration assigned to the last word of an LRC line.
pub const TRAILING_WORD_DURATION: f64 = 0.5;

/// A single highlightable unit of a lyric line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub time: f64,
    pub duration: f64,
    pub text: String,
}

/// One lyric line with its word timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
    pub words: Vec<Word>,
}

/// Subtitle dialect, chosen once per loaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LyricFormat {
    Lrc,
    Srt,
    Ass,
}

impl LyricFormat {
    /// Picks the dialect from a file name: `.srt` and `.ass` by extension,
    /// anything else is treated as LRC.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".srt") {
            Self::Srt
        } else if lower.ends_with(".ass") {
            Self::Ass
        } else {
            Self::Lrc
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(Self::from_file_name)
            .unwrap_or(Self::Lrc)
    }

    /// Parses `text` in this dialect into lines sorted by start time.
    pub fn parse(self, text: &str) -> Vec<LyricLine> {
        match self {
            Self::Lrc => parse_lrc(text),
            Self::Srt => parse_srt(text),
            Self::Ass => parse_ass(text),
        }
    }
}

pub(crate) fn sort_lines(lines: &mut [LyricLine]) {
    lines.sort_by(|a, b| a.time.total_cmp(&b.time));
}

/// Spreads a cue's duration across its whitespace-separated tokens in
/// proportion to their non-whitespace character counts.
///
/// Returns `None` when the text holds no visible characters.
pub(crate) fn synthesize_words(start: f64, end: f64, text: &str) -> Option<Vec<Word>> {
    let total_chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if total_chars == 0 {
        return None;
    }

    let duration = (end - start).max(0.0);
    let mut cursor = start;
    let words = text
        .split_whitespace()
        .map(|token| {
            let weight = token.chars().count() as f64 / total_chars as f64;
            let word_duration = duration * weight;
            let word = Word {
                time: cursor,
                duration: word_duration,
                text: format!("{token} "),
            };
            cursor += word_duration;
            word
        })
        .collect();

    Some(words)
}
