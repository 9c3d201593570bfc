//! Timed token streams and word-level transcript handling

use super::lrc::{format_timestamp, LrcLine};
use serde::Deserialize;

/// Structural line-end marker; never carries a timestamp
pub const LINE_END: &str = "\n";

/// Word separator in line-level streams
pub const SPACE: &str = " ";

/// Alignment unit
#[derive(Debug, Clone, PartialEq)]
pub struct TimedToken {
    pub word: String,
    /// Absolute time in seconds; `None` for untimed tokens
    pub timestamp: Option<f64>,
}

impl TimedToken {
    pub fn timed(word: impl Into<String>, timestamp: f64) -> Self {
        Self {
            word: word.into(),
            timestamp: Some(timestamp),
        }
    }

    pub fn untimed(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            timestamp: None,
        }
    }

    /// Comparison key for the case-insensitive diff
    pub fn key(&self) -> String {
        self.word.to_lowercase()
    }
}

/// One line of a word-level (richsync) transcript
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RichsyncLine {
    /// Line start in seconds
    #[serde(rename = "ts")]
    pub start: f64,
    /// Line end in seconds
    #[serde(rename = "te", default)]
    pub end: Option<f64>,
    #[serde(rename = "l", default)]
    pub pieces: Vec<RichsyncPiece>,
    /// Full line text
    #[serde(rename = "x", default)]
    pub text: String,
}

/// A word or separator inside a richsync line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RichsyncPiece {
    #[serde(rename = "c")]
    pub chars: String,
    /// Offset from the line start in seconds
    #[serde(rename = "o", default)]
    pub offset: f64,
}

/// Parse a richsync body; malformed bodies yield `None`
pub fn parse_richsync(body: &str) -> Option<Vec<RichsyncLine>> {
    serde_json::from_str(body).ok()
}

/// Word-level stream: every piece (spaces included) timed at
/// `line start + offset`, each line closed by an untimed [`LINE_END`]
pub fn word_tokens(lines: &[RichsyncLine]) -> Vec<TimedToken> {
    let mut tokens = Vec::new();
    for line in lines {
        for piece in &line.pieces {
            tokens.push(TimedToken::timed(&piece.chars, line.start + piece.offset));
        }
        tokens.push(TimedToken::untimed(LINE_END));
    }
    tokens
}

/// Line-level stream: words split on whitespace with untimed [`SPACE`]
/// separators, only the first word timed, each line closed by [`LINE_END`]
///
/// Lines without words (instrumental breaks) produce no tokens.
pub fn line_tokens(lines: &[LrcLine]) -> Vec<TimedToken> {
    let mut tokens = Vec::new();
    for line in lines {
        let mut words = line.text.split_whitespace();
        let Some(first) = words.next() else {
            continue;
        };
        tokens.push(TimedToken::timed(first, line.time));
        for word in words {
            tokens.push(TimedToken::untimed(SPACE));
            tokens.push(TimedToken::untimed(word));
        }
        tokens.push(TimedToken::untimed(LINE_END));
    }
    tokens
}

/// Render as enhanced LRC: `[line]<word>text<word>text...<end>`
///
/// Whitespace pieces are emitted without their own stamp.
pub fn render_enhanced(lines: &[RichsyncLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push('[');
        out.push_str(&format_timestamp(line.start));
        out.push(']');
        for piece in &line.pieces {
            if !piece.chars.trim().is_empty() {
                out.push('<');
                out.push_str(&format_timestamp(line.start + piece.offset));
                out.push('>');
            }
            out.push_str(&piece.chars);
        }
        if let Some(end) = line.end {
            out.push('<');
            out.push_str(&format_timestamp(end));
            out.push('>');
        }
        out.push('\n');
    }
    out
}

/// Line-level LRC derived from a word-level transcript
pub fn render_lines(lines: &[RichsyncLine]) -> String {
    let lrc: Vec<LrcLine> = lines
        .iter()
        .map(|line| LrcLine {
            time: line.start,
            text: line_text(line),
        })
        .collect();
    super::lrc::render(&lrc)
}

/// Plain text of a word-level transcript
pub fn richsync_text(lines: &[RichsyncLine]) -> String {
    lines.iter().map(line_text).collect::<Vec<_>>().join("\n")
}

fn line_text(line: &RichsyncLine) -> String {
    if line.text.is_empty() {
        line.pieces.iter().map(|p| p.chars.as_str()).collect::<String>().trim().to_string()
    } else {
        line.text.trim().to_string()
    }
}
