//! Lyric result types shared by the providers, the cache and the orchestrator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Stored lyric representation
///
/// The tag string is the blob file stem: `{track_id}/{tag}.gz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricFormat {
    /// Word-level synced (enhanced LRC)
    Richsync,
    /// Line-level synced (LRC)
    Synced,
    /// Unsynced plain text
    Plain,
    /// Alternate markup-synced format (TTML document)
    Ttml,
}

impl LyricFormat {
    pub const ALL: [LyricFormat; 4] = [
        LyricFormat::Richsync,
        LyricFormat::Synced,
        LyricFormat::Plain,
        LyricFormat::Ttml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LyricFormat::Richsync => "richsync",
            LyricFormat::Synced => "synced",
            LyricFormat::Plain => "plain",
            LyricFormat::Ttml => "ttml",
        }
    }
}

impl fmt::Display for LyricFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LyricFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LyricFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("unknown lyric format: {}", s))
    }
}

/// Lyrics found by one provider
///
/// Every field is independently optional: absence means that representation
/// was not available, not that something failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsResult {
    /// Word-level synced text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_synced: Option<String>,
    /// Line-level synced text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_synced: Option<String>,
    /// Unsynced plain text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain: Option<String>,
    /// Markup-synced document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttml: Option<String>,
    /// Diagnostic metadata (alignment statistics, cache provenance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl LyricsResult {
    /// True when no lyric representation is present (debug data ignored)
    pub fn is_empty(&self) -> bool {
        self.word_synced.is_none()
            && self.line_synced.is_none()
            && self.plain.is_none()
            && self.ttml.is_none()
    }

    /// True when any time-synchronized representation is present
    pub fn has_synced(&self) -> bool {
        self.word_synced.is_some() || self.line_synced.is_some() || self.ttml.is_some()
    }

    /// Build a result from cached contents
    pub fn from_contents(contents: &HashMap<LyricFormat, String>) -> Self {
        Self {
            word_synced: contents.get(&LyricFormat::Richsync).cloned(),
            line_synced: contents.get(&LyricFormat::Synced).cloned(),
            plain: contents.get(&LyricFormat::Plain).cloned(),
            ttml: contents.get(&LyricFormat::Ttml).cloned(),
            debug: None,
        }
    }

    /// Formats present in this result, paired with their content
    pub fn contents(&self) -> Vec<(LyricFormat, &str)> {
        [
            (LyricFormat::Richsync, self.word_synced.as_deref()),
            (LyricFormat::Synced, self.line_synced.as_deref()),
            (LyricFormat::Plain, self.plain.as_deref()),
            (LyricFormat::Ttml, self.ttml.as_deref()),
        ]
        .into_iter()
        .filter_map(|(format, content)| content.map(|c| (format, c)))
        .collect()
    }
}

/// Identity of a lookup as sent to providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsQuery {
    /// Media identifier the cache is keyed on
    pub video_id: String,
    pub song: String,
    pub artist: String,
    pub album: Option<String>,
    /// Track duration in seconds
    pub duration: Option<u32>,
}

/// Unified answer surfacing every format any provider found
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsResponse {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Word-level provider result
    pub musixmatch: Option<LyricsResult>,
    /// Line/plain-text provider result
    pub lrclib: Option<LyricsResult>,
    /// Markup-synced provider result
    pub ttml: Option<LyricsResult>,
    /// Where the richest format found lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<BestLyrics>,
}

/// The richest representation found across providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestLyrics {
    /// Provider key holding it: `musixmatch`, `lrclib` or `ttml`
    pub source: String,
    pub format: LyricFormat,
}

impl LyricsResponse {
    pub fn empty(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..Default::default()
        }
    }

    /// True when no provider returned anything
    pub fn is_empty(&self) -> bool {
        self.providers().all(|(_, result)| result.is_none())
    }

    /// True when any provider returned synced content
    pub fn has_synced(&self) -> bool {
        self.providers()
            .any(|(_, result)| result.is_some_and(LyricsResult::has_synced))
    }

    fn providers(&self) -> impl Iterator<Item = (&'static str, Option<&LyricsResult>)> {
        [
            ("musixmatch", self.musixmatch.as_ref()),
            ("lrclib", self.lrclib.as_ref()),
            ("ttml", self.ttml.as_ref()),
        ]
        .into_iter()
    }

    /// Pick the richest format found: word-level, then markup, then
    /// line-level, then plain
    pub fn pick_best(&self) -> Option<BestLyrics> {
        const PREFERENCE: [LyricFormat; 4] = [
            LyricFormat::Richsync,
            LyricFormat::Ttml,
            LyricFormat::Synced,
            LyricFormat::Plain,
        ];

        PREFERENCE.into_iter().find_map(|wanted| {
            self.providers().find_map(|(source, result)| {
                result?
                    .contents()
                    .into_iter()
                    .find(|(format, _)| *format == wanted)
                    .map(|(format, _)| BestLyrics {
                        source: source.to_string(),
                        format,
                    })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tags_roundtrip() {
        for format in LyricFormat::ALL {
            assert_eq!(format.as_str().parse::<LyricFormat>(), Ok(format));
        }
        assert!("karaoke".parse::<LyricFormat>().is_err());
    }

    #[test]
    fn test_debug_only_result_is_empty() {
        let result = LyricsResult {
            debug: Some(serde_json::json!({"note": "x"})),
            ..Default::default()
        };
        assert!(result.is_empty());
    }

    #[test]
    fn test_best_prefers_word_level_over_line_level() {
        let response = LyricsResponse {
            video_id: "abc".to_string(),
            lrclib: Some(LyricsResult {
                line_synced: Some("[00:01.00]line".to_string()),
                plain: Some("line".to_string()),
                ..Default::default()
            }),
            musixmatch: Some(LyricsResult {
                word_synced: Some("[00:01.00]<00:01.00>word".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let best = response.pick_best().expect("best lyrics");
        assert_eq!(best.source, "musixmatch");
        assert_eq!(best.format, LyricFormat::Richsync);
    }

    #[test]
    fn test_best_falls_back_to_plain() {
        let response = LyricsResponse {
            video_id: "abc".to_string(),
            lrclib: Some(LyricsResult {
                plain: Some("just words".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let best = response.pick_best().expect("best lyrics");
        assert_eq!(best.source, "lrclib");
        assert_eq!(best.format, LyricFormat::Plain);
        assert!(!response.has_synced());
    }

    #[test]
    fn test_empty_response() {
        let response = LyricsResponse::empty("abc");
        assert!(response.is_empty());
        assert!(response.pick_best().is_none());
    }

    #[test]
    fn test_best_is_serialized_when_set() {
        let mut response = LyricsResponse {
            video_id: "abc".to_string(),
            ttml: Some(LyricsResult {
                ttml: Some("<tt/>".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("best").is_none());

        response.best = response.pick_best();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["best"], serde_json::json!({"source": "ttml", "format": "ttml"}));
    }
}
