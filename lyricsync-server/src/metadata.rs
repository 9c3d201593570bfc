//! Track metadata resolution seam
//!
//! Requests often arrive with only a video id, or with partial metadata.
//! A [`MetadataResolver`] fills the gaps before providers are queried. The
//! shipped resolver knows nothing; deployments plug in their own.

use async_trait::async_trait;
use lyricsync_common::Result;

/// Song identity as far as it is known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub song: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Seconds
    pub duration: Option<u32>,
}

impl TrackMetadata {
    /// Song, artist and album all present
    pub fn is_complete(&self) -> bool {
        self.song.is_some() && self.artist.is_some() && self.album.is_some()
    }

    /// Fill missing fields from `other`; present fields are kept
    pub fn fill_from(&mut self, other: TrackMetadata) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.song, other.song);
        fill(&mut self.artist, other.artist);
        fill(&mut self.album, other.album);
        fill(&mut self.duration, other.duration);
    }
}

#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Look up metadata for a media identifier; `Ok(None)` when unknown
    async fn resolve(&self, video_id: &str) -> Result<Option<TrackMetadata>>;
}

/// Resolver that never knows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataResolver;

#[async_trait]
impl MetadataResolver for NoopMetadataResolver {
    async fn resolve(&self, _video_id: &str) -> Result<Option<TrackMetadata>> {
        Ok(None)
    }
}
