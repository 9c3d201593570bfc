//! LRC parsing and formatting
//!
//! Handles `[mm:ss.xx]`, `[mm:ss.xxx]` and `[mm:ss]` stamps, several stamps
//! on one line (repeated choruses), metadata tags (`[ar:...]`, `[offset:...]`)
//! and enhanced-LRC inline word stamps (`<mm:ss.xx>`).

/// One timed line of an LRC document
#[derive(Debug, Clone, PartialEq)]
pub struct LrcLine {
    /// Line start in seconds
    pub time: f64,
    pub text: String,
}

/// Parse `mm:ss`, `mm:ss.xx` or `mm:ss.xxx` into seconds
pub fn parse_timestamp(stamp: &str) -> Option<f64> {
    let (minutes, seconds) = stamp.trim().split_once(':')?;
    if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty() || fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(minutes * 60.0 + seconds)
}

/// Format seconds as `mm:ss.xx`; negative input clamps to zero
pub fn format_timestamp(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    format!(
        "{:02}:{:02}.{:02}",
        centis / 6000,
        (centis / 100) % 60,
        centis % 100
    )
}

/// Split leading `[...]` tags off a raw line
///
/// Returns the parsed stamps and the remaining text, or `None` when the line
/// is a metadata tag rather than lyrics.
fn split_stamps(raw: &str) -> Option<(Vec<f64>, &str)> {
    let mut rest = raw.trim_start();
    let mut stamps = Vec::new();

    while let Some(tag_body) = rest.strip_prefix('[') {
        let Some(end) = tag_body.find(']') else {
            break;
        };
        match parse_timestamp(&tag_body[..end]) {
            Some(time) => {
                stamps.push(time);
                rest = &tag_body[end + 1..];
            }
            None if stamps.is_empty() => return None,
            None => break,
        }
    }

    Some((stamps, rest))
}

/// Remove `<mm:ss.xx>` word stamps
fn strip_inline_stamps(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(end) if parse_timestamp(&after[..end]).is_some() => {
                rest = &after[end + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse timed lines, sorted by start time
///
/// Untimed lines and metadata tags are dropped. A line carrying several
/// stamps yields one entry per stamp.
pub fn parse(document: &str) -> Vec<LrcLine> {
    let mut lines = Vec::new();

    for raw in document.lines() {
        let Some((stamps, text)) = split_stamps(raw) else {
            continue;
        };
        let text = strip_inline_stamps(text).trim().to_string();
        for time in stamps {
            lines.push(LrcLine {
                time,
                text: text.clone(),
            });
        }
    }

    lines.sort_by(|a, b| a.time.total_cmp(&b.time));
    lines
}

/// Render timed lines back into LRC
pub fn render(lines: &[LrcLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push('[');
        out.push_str(&format_timestamp(line.time));
        out.push(']');
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

/// Plain text of an LRC document: stamps and metadata removed, line order kept
pub fn strip_timestamps(document: &str) -> String {
    let lines: Vec<String> = document
        .lines()
        .filter_map(split_stamps)
        .map(|(_, text)| strip_inline_stamps(text).trim().to_string())
        .collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}
