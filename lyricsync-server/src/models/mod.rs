//! Data models for lyricsync-server

pub mod lyrics;

pub use lyrics::{BestLyrics, LyricFormat, LyricsQuery, LyricsResponse, LyricsResult};
