use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lyrics::{LyricFormat, LyricLine, Word};

/// Playback position advanced by frame deltas, for hosts without a media clock.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f64) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// Immutable, time-sorted lyric lines for one loaded file.
///
/// A new file load builds a new timeline; the old one is replaced wholesale.
/// Serialized as a plain list of lines; deserializing re-sorts them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<LyricLine>", into = "Vec<LyricLine>")]
pub struct LyricTimeline {
    lines: Vec<LyricLine>,
}

impl From<Vec<LyricLine>> for LyricTimeline {
    fn from(lines: Vec<LyricLine>) -> Self {
        Self::new(lines)
    }
}

impl From<LyricTimeline> for Vec<LyricLine> {
    fn from(timeline: LyricTimeline) -> Self {
        timeline.lines
    }
}

impl LyricTimeline {
    pub fn new(mut lines: Vec<LyricLine>) -> Self {
        crate::lyrics::sort_lines(&mut lines);
        Self { lines }
    }

    /// Parses `text` with the dialect implied by `file_name`.
    pub fn load(file_name: &str, text: &str) -> Self {
        Self::new(LyricFormat::from_file_name(file_name).parse(text))
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the line that is playing at `time`, or `None` before the first
    /// line starts.
    pub fn active_index(&self, time: f64) -> Option<usize> {
        if time.is_nan() {
            return None;
        }
        let started = self.lines.partition_point(|line| line.time <= time);
        started.checked_sub(1)
    }

    /// Pure per-frame query: timestamp in, display state out.
    pub fn display_at(&self, time: f64) -> DisplayState {
        let active_line = self.active_index(time);
        let words = active_line
            .map(|index| {
                self.lines[index]
                    .words
                    .iter()
                    .map(|word| word_progress(word, time))
                    .collect()
            })
            .unwrap_or_default();
        let next_index = active_line.map_or(0, |index| index + 1);

        DisplayState {
            time,
            active_line,
            whole_line: active_line.is_some_and(|index| self.lines[index].words.len() <= 1),
            word_progress: words,
            next_line: (next_index < self.lines.len()).then_some(next_index),
        }
    }
}

/// Highlight fraction of `word` at `time`, from 0 before it starts to 1 once
/// its duration has elapsed.
pub fn word_progress(word: &Word, time: f64) -> f64 {
    let since_start = time - word.time;
    if since_start <= 0.0 {
        0.0
    } else if since_start >= word.duration {
        1.0
    } else {
        since_start / word.duration
    }
}

/// What a lyric view should show for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub time: f64,
    pub active_line: Option<usize>,
    /// Lines with at most one word are shown as a single block.
    pub whole_line: bool,
    /// One entry per word of the active line.
    pub word_progress: Vec<f64>,
    /// The line to preview below the active one.
    pub next_line: Option<usize>,
}

/// Tick driver for the lyric view. Only yields display state while its
/// owning transport is running.
#[derive(Debug, Clone)]
pub struct LyricFollower {
    timeline: Arc<LyricTimeline>,
    running: bool,
    last_line: Option<usize>,
}

impl LyricFollower {
    pub fn new(timeline: Arc<LyricTimeline>) -> Self {
        Self {
            timeline,
            running: false,
            last_line: None,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Cancels the follower; later ticks return `None` until restarted.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn timeline(&self) -> &Arc<LyricTimeline> {
        &self.timeline
    }

    /// Computes the display state for `time` if the follower is running.
    pub fn tick(&mut self, time: f64) -> Option<FollowerTick> {
        if !self.running {
            return None;
        }
        let state = self.timeline.display_at(time);
        let line_changed = state.active_line != self.last_line;
        self.last_line = state.active_line;
        Some(FollowerTick {
            state,
            line_changed,
        })
    }
}

/// Result of one [`LyricFollower::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerTick {
    pub state: DisplayState,
    pub line_changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(time: f64, words: &[(f64, f64, &str)]) -> LyricLine {
        LyricLine {
            time,
            text: words.iter().map(|(_, _, text)| *text).collect(),
            words: words
                .iter()
                .map(|(time, duration, text)| Word {
                    time: *time,
                    duration: *duration,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn timeline() -> LyricTimeline {
        LyricTimeline::new(vec![
            line(5.0, &[(5.0, 1.0, "c")]),
            line(0.0, &[(0.0, 1.0, "a")]),
            line(2.0, &[(2.0, 1.0, "b1"), (3.0, 2.0, "b2")]),
        ])
    }

    #[test]
    fn resolves_active_line_between_cues() {
        let timeline = timeline();
        assert_eq!(timeline.active_index(3.5), Some(1));
        assert_eq!(timeline.active_index(0.0), Some(0));
        assert_eq!(timeline.active_index(2.0), Some(1));
        assert_eq!(timeline.active_index(99.0), Some(2));
    }

    #[test]
    fn no_active_line_before_first_cue() {
        let timeline = LyricTimeline::new(vec![line(1.0, &[(1.0, 1.0, "x")])]);
        assert_eq!(timeline.active_index(0.5), None);
        assert_eq!(timeline.active_index(f64::NAN), None);
        assert_eq!(LyricTimeline::default().active_index(3.0), None);
    }

    #[test]
    fn word_progress_is_clamped() {
        let word = Word {
            time: 2.0,
            duration: 0.5,
            text: "go".into(),
        };
        assert_eq!(word_progress(&word, 1.0), 0.0);
        assert!((word_progress(&word, 2.25) - 0.5).abs() < 1e-9);
        assert_eq!(word_progress(&word, 9.0), 1.0);

        let instant = Word {
            time: 2.0,
            duration: 0.0,
            text: "!".into(),
        };
        assert_eq!(word_progress(&instant, 2.0), 0.0);
        assert_eq!(word_progress(&instant, 2.001), 1.0);
    }

    #[test]
    fn display_state_tracks_words_and_next_line() {
        let timeline = timeline();

        let before = LyricTimeline::new(vec![line(1.0, &[(1.0, 1.0, "x")])]).display_at(0.0);
        assert_eq!(before.active_line, None);
        assert_eq!(before.next_line, Some(0));
        assert!(before.word_progress.is_empty());

        let state = timeline.display_at(4.0);
        assert_eq!(state.active_line, Some(1));
        assert!(!state.whole_line);
        assert_eq!(state.word_progress.len(), 2);
        assert_eq!(state.word_progress[0], 1.0);
        assert!((state.word_progress[1] - 0.5).abs() < 1e-9);
        assert_eq!(state.next_line, Some(2));

        let last = timeline.display_at(5.5);
        assert!(last.whole_line);
        assert_eq!(last.next_line, None);
    }

    #[test]
    fn follower_stops_driving_state_when_cancelled() {
        let mut follower = LyricFollower::new(Arc::new(timeline()));
        assert!(follower.tick(0.5).is_none());

        follower.start();
        let first = follower.tick(0.5).unwrap();
        assert!(first.line_changed);
        let same = follower.tick(0.7).unwrap();
        assert!(!same.line_changed);
        let next = follower.tick(2.1).unwrap();
        assert!(next.line_changed);

        follower.stop();
        assert!(follower.tick(3.0).is_none());
    }

    #[test]
    fn deserialized_timeline_is_sorted() {
        let json = serde_json::to_string(&vec![
            line(5.0, &[(5.0, 1.0, "late")]),
            line(1.0, &[(1.0, 1.0, "early")]),
        ])
        .unwrap();
        let timeline: LyricTimeline = serde_json::from_str(&json).unwrap();
        let times: Vec<f64> = timeline.lines().iter().map(|l| l.time).collect();
        assert_eq!(times, vec![1.0, 5.0]);
        assert_eq!(timeline.active_index(2.0), Some(0));

        let back: Vec<LyricLine> = serde_json::from_str(&serde_json::to_string(&timeline).unwrap()).unwrap();
        assert_eq!(back.as_slice(), timeline.lines());
    }

    #[test]
    fn playback_clock_never_goes_negative() {
        let mut clock = PlaybackClock::default();
        clock.advance(1.5);
        clock.advance(-4.0);
        assert_eq!(clock.time_seconds, 0.0);
        clock.advance(0.25);
        clock.reset();
        assert_eq!(clock.time_seconds, 0.0);
    }
}
