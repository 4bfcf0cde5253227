use tracing::debug;

use super::timetag::parse_srt_time;
use super::{sort_lines, synthesize_words, LyricLine};

const RANGE_SEPARATOR: &str = "-->";

/// Parses SubRip cues into lyric lines with synthesized word timing.
///
/// Cues are separated by blank lines. The cue index, if present, sits before
/// the time range and is ignored; the text is every line after the range.
pub fn parse_srt(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    let mut skipped = 0usize;

    for block in blocks(text) {
        match parse_cue(&block) {
            Some(line) => lines.push(line),
            None => skipped += 1,
        }
    }

    sort_lines(&mut lines);
    debug!(lines = lines.len(), skipped, "parsed SRT lyrics");
    lines
}

fn blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(trimmed);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_cue(lines: &[&str]) -> Option<LyricLine> {
    if lines.len() < 2 {
        return None;
    }
    let range_index = lines.iter().position(|line| line.contains(RANGE_SEPARATOR))?;
    let (start, end) = parse_range(lines[range_index])?;

    let text = lines[range_index + 1..].join(" ");
    if text.is_empty() {
        return None;
    }
    let words = synthesize_words(start, end, &text)?;

    Some(LyricLine {
        time: start,
        text,
        words,
    })
}

fn parse_range(line: &str) -> Option<(f64, f64)> {
    let mut sides = line.split(RANGE_SEPARATOR);
    let start = first_token(sides.next()?)?;
    let end = first_token(sides.next()?)?;
    Some((parse_srt_time(start)?, parse_srt_time(end)?))
}

fn first_token(side: &str) -> Option<&str> {
    side.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn splits_cue_duration_by_character_count() {
        let lines = parse_srt("1\n00:00:01,000 --> 00:00:03,000\nab cd\n");
        assert_eq!(lines.len(), 1);

        let line = &lines[0];
        assert!(close(line.time, 1.0));
        assert_eq!(line.text, "ab cd");
        assert_eq!(line.words.len(), 2);
        assert!(close(line.words[0].duration, 1.0));
        assert!(close(line.words[1].duration, 1.0));
        assert!(close(line.words[1].time, 2.0));
        assert_eq!(line.words[0].text, "ab ");
    }

    #[test]
    fn word_durations_sum_to_cue_length() {
        let lines = parse_srt("7\n00:00:10,000 --> 00:00:13,700\nthe quick brown\nfox jumps\n");
        let line = &lines[0];
        assert_eq!(line.text, "the quick brown fox jumps");
        let total: f64 = line.words.iter().map(|w| w.duration).sum();
        assert!(close(total, 3.7));
        assert!(close(line.words[1].duration / line.words[0].duration, 5.0 / 3.0));
    }

    #[test]
    fn drops_blocks_without_valid_range() {
        let text = "\
1
00:00:01,000 --> 00:00:02,000
kept

2
no range here
text

3
xx:yy:zz,000 --> 00:00:05,000
broken start

4
00:00:06,000 --> 00:00:07,000
";
        let lines = parse_srt(text);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "kept");
    }

    #[test]
    fn tolerates_crlf_missing_index_and_positions() {
        let text = "00:00:05,000 --> 00:00:06,000 X1:10 X2:20\r\nlate\r\n\r\n\r\n\
                    2\r\n00:00:01.500 --> 00:00:02.500\r\nearly\r\n";
        let lines = parse_srt(text);
        assert_eq!(lines.len(), 2);
        assert!(close(lines[0].time, 1.5));
        assert_eq!(lines[0].text, "early");
        assert!(close(lines[1].time, 5.0));
    }
}
