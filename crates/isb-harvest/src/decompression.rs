//! Gzip handling for fetched documents
//!
//! Sitemap bodies are often served gzip-compressed, with or without a
//! `Content-Encoding` header, and mirrors sometimes truncate them. Decoding
//! keeps whatever was decoded before the stream broke.

use flate2::read::GzDecoder;
use std::io::{self, Read};
use tracing::{debug, warn};

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Whether `data` starts with a gzip member header
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Decompress gzip data, returning the decoded prefix if the stream is
/// truncated or corrupt. Errors only when nothing could be decoded.
pub fn decompress_gzip_lenient(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match decoder.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => decompressed.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if decompressed.is_empty() => return Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    decoded = decompressed.len(),
                    "Gzip stream ended early, keeping decoded prefix"
                );
                break;
            },
        }
    }

    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Undo gzip wrapping when present, otherwise return the body unchanged
pub fn maybe_gunzip(data: Vec<u8>) -> io::Result<Vec<u8>> {
    if is_gzip(&data) {
        decompress_gzip_lenient(&data)
    } else {
        Ok(data)
    }
}
