//! Word-level / line-level transcript alignment
//!
//! Word-level timings occasionally carry a constant bias against
//! independently timed line-level lyrics. Matching both transcripts with a
//! case-insensitive LCS diff and sampling `word time - line time` on every
//! matched pair where both sides are timed gives a population of offsets:
//! low variance means the bias is constant and can be corrected with one
//! global `[offset:]` tag, high variance means the transcripts disagree and
//! the word-level one is dropped.

pub mod diff;
pub mod lrc;
pub mod tokens;

pub use tokens::{RichsyncLine, RichsyncPiece, TimedToken};

use crate::models::LyricsResult;
use diff::{DiffRun, RunKind};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

/// Longest token stream the diff will run on
pub const MAX_TOKENS: usize = 5000;

/// Offset variance (seconds²) at or above which fusion is rejected
pub const MAX_VARIANCE: f64 = 1.5;

/// Annotation for word-level transcripts that could not be checked
pub const UNVALIDATED_NOTE: &str = "no synced basic lyrics found for validation";

/// Offset samples summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetStats {
    /// Mean offset in seconds (word minus line)
    pub mean: f64,
    /// Population variance in seconds²
    pub variance: f64,
    pub samples: Vec<f64>,
}

impl OffsetStats {
    pub fn from_samples(samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            variance,
            samples,
        })
    }

    /// Mean as signed whole milliseconds
    pub fn offset_ms(&self) -> i64 {
        (self.mean * 1000.0).round() as i64
    }
}

/// Alignment verdict
#[derive(Debug, Clone, PartialEq)]
pub enum Alignment {
    /// A stream exceeded [`MAX_TOKENS`]; the diff was not computed
    TooLong { word_tokens: usize, line_tokens: usize },
    /// No matched pair carried timestamps on both sides
    Unvalidated,
    /// Offsets disagree too much to trust the word-level transcript
    Rejected { stats: OffsetStats, diff: Vec<DiffRun> },
    /// Constant offset detected
    Accepted { stats: OffsetStats },
}

/// Align a word-level stream (right) against a line-level stream (left)
pub fn align(word_tokens: &[TimedToken], line_tokens: &[TimedToken]) -> Alignment {
    if word_tokens.len() > MAX_TOKENS || line_tokens.len() > MAX_TOKENS {
        return Alignment::TooLong {
            word_tokens: word_tokens.len(),
            line_tokens: line_tokens.len(),
        };
    }

    let left_keys: Vec<String> = line_tokens.iter().map(TimedToken::key).collect();
    let right_keys: Vec<String> = word_tokens.iter().map(TimedToken::key).collect();
    let pairs = diff::lcs_pairs(&left_keys, &right_keys);

    let samples: Vec<f64> = pairs
        .iter()
        .filter_map(|&(i, j)| {
            let left = line_tokens[i].timestamp?;
            let right = word_tokens[j].timestamp?;
            Some(right - left)
        })
        .collect();

    let Some(stats) = OffsetStats::from_samples(samples) else {
        return Alignment::Unvalidated;
    };

    if stats.variance >= MAX_VARIANCE {
        let runs = diff::runs(line_tokens.len(), word_tokens.len(), &pairs);
        Alignment::Rejected { stats, diff: runs }
    } else {
        Alignment::Accepted { stats }
    }
}

/// Fuse a word-level transcript with an optional line-level LRC document
///
/// - too long: line-level only (derived from the word-level lines when no
///   line-level document exists)
/// - unvalidated: the bare word-level transcript with a note
/// - rejected: line-level only, with offset statistics and the diff
/// - accepted: offset-tagged word-level transcript plus line-level fallback
pub fn fuse(richsync: &[RichsyncLine], line_level: Option<&str>) -> LyricsResult {
    let line_level = line_level.filter(|text| !text.trim().is_empty());
    let line_lines = line_level.map(lrc::parse).unwrap_or_default();

    let word_stream = tokens::word_tokens(richsync);
    let line_stream = tokens::line_tokens(&line_lines);

    match align(&word_stream, &line_stream) {
        Alignment::TooLong {
            word_tokens,
            line_tokens,
        } => {
            debug!(word_tokens, line_tokens, "Transcripts too long to align");
            LyricsResult {
                line_synced: Some(
                    line_level
                        .map(str::to_string)
                        .unwrap_or_else(|| tokens::render_lines(richsync)),
                ),
                debug: Some(json!({
                    "alignment": "too_long",
                    "wordTokens": word_tokens,
                    "lineTokens": line_tokens,
                })),
                ..Default::default()
            }
        }
        Alignment::Unvalidated => LyricsResult {
            word_synced: Some(tokens::render_enhanced(richsync)),
            debug: Some(json!({ "alignment": "unvalidated", "note": UNVALIDATED_NOTE })),
            ..Default::default()
        },
        Alignment::Rejected { stats, diff } => {
            debug!(
                mean = stats.mean,
                variance = stats.variance,
                samples = stats.samples.len(),
                "Rejected word-level alignment"
            );
            LyricsResult {
                line_synced: line_level.map(str::to_string),
                debug: Some(json!({
                    "alignment": "rejected",
                    "mean": stats.mean,
                    "variance": stats.variance,
                    "samples": stats.samples,
                    "diff": describe_runs(&diff, &line_stream, &word_stream),
                })),
                ..Default::default()
            }
        }
        Alignment::Accepted { stats } => {
            let offset_ms = stats.offset_ms();
            let word_synced = format!(
                "[offset:{:+}]\n{}",
                offset_ms,
                tokens::render_enhanced(richsync)
            );
            LyricsResult {
                word_synced: Some(word_synced),
                line_synced: line_level.map(str::to_string),
                debug: Some(json!({
                    "alignment": "accepted",
                    "offsetMs": offset_ms,
                    "mean": stats.mean,
                    "variance": stats.variance,
                    "sampleCount": stats.samples.len(),
                })),
                ..Default::default()
            }
        }
    }
}

fn describe_runs(
    runs: &[DiffRun],
    left: &[TimedToken],
    right: &[TimedToken],
) -> Vec<serde_json::Value> {
    let text = |tokens: &[TimedToken]| tokens.iter().map(|t| t.word.as_str()).collect::<String>();
    runs.iter()
        .map(|run| match run.kind {
            RunKind::Equal => json!({ "kind": run.kind, "text": text(&right[run.right.clone()]) }),
            RunKind::LeftOnly => json!({ "kind": run.kind, "text": text(&left[run.left.clone()]) }),
            RunKind::RightOnly => json!({ "kind": run.kind, "text": text(&right[run.right.clone()]) }),
        })
        .collect()
}
