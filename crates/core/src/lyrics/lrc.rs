use tracing::debug;

use super::timetag::{parse_lrc_tag, LRC_TAG};
use super::{sort_lines, LyricLine, Word, MIN_WORD_DURATION, TRAILING_WORD_DURATION};

/// Parses enhanced LRC, where extra time tags inside a line mark word starts.
///
/// `[00:01.50]hello[00:02.00]world` yields one line at 1.5s with two words.
/// Lines that do not open with a valid time tag (metadata such as `[ar:...]`,
/// blank lines, malformed tags) are skipped.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    let mut skipped = 0usize;

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Some(line) => lines.push(line),
            None => skipped += 1,
        }
    }

    sort_lines(&mut lines);
    debug!(lines = lines.len(), skipped, "parsed LRC lyrics");
    lines
}

enum Part<'a> {
    Tag(&'a str),
    Text(&'a str),
}

fn split_parts(line: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut last = 0;
    for tag in LRC_TAG.find_iter(line) {
        parts.push(Part::Text(&line[last..tag.start()]));
        parts.push(Part::Tag(tag.as_str()));
        last = tag.end();
    }
    parts.push(Part::Text(&line[last..]));
    parts.retain(|part| match part {
        Part::Tag(_) => true,
        Part::Text(text) => !text.trim().is_empty(),
    });
    parts
}

fn parse_line(line: &str) -> Option<LyricLine> {
    let parts = split_parts(line);
    let Some(Part::Tag(first)) = parts.first() else {
        return None;
    };
    let mut current = parse_lrc_tag(first)?;

    let mut timed: Vec<(f64, &str)> = Vec::new();
    for part in &parts {
        match part {
            Part::Tag(tag) => {
                if let Some(time) = parse_lrc_tag(tag) {
                    current = time;
                }
            }
            Part::Text(text) => {
                // A tag earlier than the previous word is held at that word's
                // time so words stay in order.
                let time = timed.last().map_or(current, |(prev, _)| current.max(*prev));
                timed.push((time, *text));
            }
        }
    }

    let words: Vec<Word> = timed
        .iter()
        .enumerate()
        .map(|(index, (time, text))| {
            let duration = timed
                .get(index + 1)
                .map(|(next, _)| next - time)
                .unwrap_or(TRAILING_WORD_DURATION);
            Word {
                time: *time,
                duration: duration.max(MIN_WORD_DURATION),
                text: (*text).to_string(),
            }
        })
        .collect();

    let first_word = words.first()?;
    Some(LyricLine {
        time: first_word.time,
        text: words.iter().map(|word| word.text.as_str()).collect(),
        words,
    })
}
