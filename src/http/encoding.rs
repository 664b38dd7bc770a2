//! Response body compression.
//!
//! A compressor is chosen per request from `Accept-Encoding`, but only for
//! paths that name a file whose format is not already compressed.

use std::io::{self, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::http::request::Request;

/// File extensions whose content gains nothing from another compression pass.
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "png", "mp3", "mp4", "pdf", "rar", "apk", "jpg", "aac", "avi", "docx", "7z", "mpg", "jpeg",
    "ogg", "mkv", "xlsx", "gz", "tar.gz", "gif", "wma", "mov", "pptx", "iso", "webp", "flac",
    "webm", "zip", "epub",
];

pub trait Compressor: Send + Sync {
    /// Token used in `Content-Encoding`.
    fn name(&self) -> &'static str;

    fn encode(&self, body: &[u8]) -> io::Result<Vec<u8>>;
}

pub struct Gzip;

impl Compressor for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body)?;
        encoder.finish()
    }
}

pub struct Deflate;

impl Compressor for Deflate {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(body)?;
        encoder.finish()
    }
}

/// Looks up a compressor by its `Accept-Encoding` token.
pub fn compressor_for(token: &str) -> Option<Arc<dyn Compressor>> {
    let token = token.trim();

    if token.eq_ignore_ascii_case("gzip") {
        Some(Arc::new(Gzip))
    } else if token.eq_ignore_ascii_case("deflate") {
        Some(Arc::new(Deflate))
    } else {
        None
    }
}

/// Picks the compressor for a response to `req`, if any.
///
/// Requires an `Accept-Encoding` header and a last path segment containing
/// a `.` whose extension is not in [`COMPRESSED_EXTENSIONS`]. The first
/// supported token in the header wins.
pub fn negotiate(req: &Request) -> Option<Arc<dyn Compressor>> {
    let accepted = req.header("Accept-Encoding")?;
    let last_segment = req.path.rsplit('/').next().unwrap_or_default();

    if !last_segment.contains('.') || is_precompressed(last_segment) {
        return None;
    }

    accepted.split(',').find_map(|token| {
        // Quality values are not ranked, only stripped.
        let token = token.split(';').next().unwrap_or_default();
        compressor_for(token)
    })
}

fn is_precompressed(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    COMPRESSED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompressed_extensions_are_detected() {
        assert!(is_precompressed("photo.JPG"));
        assert!(is_precompressed("bundle.tar.gz"));
        assert!(!is_precompressed("index.html"));
    }
}
