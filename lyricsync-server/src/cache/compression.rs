//! Blob encoding: gzip-compressed UTF-8 text

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lyricsync_common::{Error, Result};
use std::io::{Read, Write};

/// Compress lyric text for the blob store
pub fn compress(text: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(text.len() / 2), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Decompress a blob back to text
pub fn decompress(bytes: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut raw = Vec::with_capacity(bytes.len() * 3);
    decoder.read_to_end(&mut raw)?;
    String::from_utf8(raw).map_err(|e| Error::Storage(format!("Blob is not valid UTF-8: {}", e)))
}
