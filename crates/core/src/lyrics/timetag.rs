//! Timestamp lexers for the three subtitle dialects.
//!
//! Each lexer turns one timestamp token into seconds. `None` means the token
//! is not a usable time; callers skip whatever line or cue it belonged to.

use once_cell::sync::Lazy;
use regex::Regex;

/// `[MM:SS.ff]` or `[MM:SS.fff]`.
pub(crate) static LRC_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([0-9]{2}):([0-9]{2})\.([0-9]{2,3})\]").expect("LRC tag pattern must compile")
});

/// Finds the first LRC time tag in `token` and converts it to seconds.
///
/// The fraction is right-padded to milliseconds, so `.5` is half a second.
pub fn parse_lrc_tag(token: &str) -> Option<f64> {
    let caps = LRC_TAG.captures(token)?;
    let minutes: u32 = caps[1].parse().ok()?;
    let seconds: u32 = caps[2].parse().ok()?;
    let millis: u32 = format!("{:0<3}", &caps[3]).parse().ok()?;
    Some(f64::from(minutes) * 60.0 + f64::from(seconds) + f64::from(millis) / 1000.0)
}

/// Parses `HH:MM:SS,mmm` (a `.` decimal separator also works) or the short
/// `MM:SS` form.
pub fn parse_srt_time(token: &str) -> Option<f64> {
    let normalized = token.trim().replacen(',', ".", 1);
    let fields: Vec<&str> = normalized.split(':').collect();
    match fields.as_slice() {
        [h, m, s] => Some(decimal(h)? * 3600.0 + decimal(m)? * 60.0 + decimal(s)?),
        [m, s] => Some(decimal(m)? * 60.0 + decimal(s)?),
        _ => None,
    }
}

/// Parses `H:MM:SS.cc`; the hour field may have any width.
pub fn parse_ass_time(token: &str) -> Option<f64> {
    let fields: Vec<&str> = token.trim().split(':').collect();
    let [h, m, s] = fields.as_slice() else {
        return None;
    };
    let hours: u32 = h.trim().parse().ok()?;
    let minutes: u32 = m.trim().parse().ok()?;
    Some(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + decimal(s)?)
}

fn decimal(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}
