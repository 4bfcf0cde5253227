use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::timetag::parse_ass_time;
use super::{sort_lines, synthesize_words, LyricLine};

static OVERRIDE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{.*?\}").expect("override pattern must compile"));

const EVENTS_HEADER: &str = "[Events]";
const FORMAT_PREFIX: &str = "Format:";
const DIALOGUE_PREFIX: &str = "Dialogue:";

/// Parses the `[Events]` section of an Advanced SubStation Alpha script.
///
/// Field order comes from the section's `Format:` line, so `Start` and `End`
/// are found by name. Dialogue text may itself contain commas: only the first
/// `fields - 1` commas split metadata, the rest belongs to the text.
pub fn parse_ass(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    let mut skipped = 0usize;
    let mut in_events = false;
    let mut format: Vec<String> = Vec::new();

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_events = trimmed == EVENTS_HEADER;
            continue;
        }
        if !in_events {
            continue;
        }

        if let Some(fields) = trimmed.strip_prefix(FORMAT_PREFIX) {
            format = fields
                .split(',')
                .map(|field| field.trim().to_lowercase())
                .collect();
            continue;
        }

        if let Some(dialogue) = trimmed.strip_prefix(DIALOGUE_PREFIX) {
            match parse_dialogue(dialogue.trim(), &format) {
                Some(line) => lines.push(line),
                None => skipped += 1,
            }
        }
    }

    sort_lines(&mut lines);
    debug!(lines = lines.len(), skipped, "parsed ASS lyrics");
    lines
}

fn parse_dialogue(dialogue: &str, format: &[String]) -> Option<LyricLine> {
    let split_at = nth_comma(dialogue, format.len().checked_sub(1)?)?;
    let metadata: Vec<&str> = dialogue[..split_at].split(',').collect();
    let raw_text = &dialogue[split_at + 1..];

    let start_index = format.iter().position(|field| field == "start")?;
    let end_index = format.iter().position(|field| field == "end")?;
    let start = parse_ass_time(metadata.get(start_index)?)?;
    let end = parse_ass_time(metadata.get(end_index)?)?;

    let text = clean_text(raw_text);
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

/// Byte index of the `n`th comma (1-based); `n == 0` never matches.
fn nth_comma(text: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    text.match_indices(',').nth(n - 1).map(|(index, _)| index)
}

fn clean_text(raw: &str) -> String {
    let stripped = OVERRIDE_BLOCK.replace_all(raw, "");
    stripped
        .replace("\\N", " ")
        .replace("\\n", " ")
        .replace("\\h", " ")
        .trim()
        .to_string()
}
