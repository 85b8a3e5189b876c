//! GZIP request compression.
//!
//! # Responsibilities
//! - Conditionally gzip-encode an outgoing request body
//! - Adjust content-encoding, accept-encoding and content-length headers
//! - Honor the per-request `Skip-Compression` opt-out header
//!
//! # Design Decisions
//! - Empty bodies pass through untouched
//! - Compression failures propagate; the request is never sent uncompressed
//!   as a fallback

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use tracing::debug;

/// Request header that disables compression for a single request. Presence
/// alone is enough; the value is ignored.
pub const SKIP_COMPRESSION: HeaderName = HeaderName::from_static("skip-compression");

const GZIP: HeaderValue = HeaderValue::from_static("gzip");

/// Gzip-compress a byte slice.
pub fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip byte slice.
pub fn gzip_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Request-pipeline stage that gzip-encodes outgoing bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipRequestInterceptor;

impl GzipRequestInterceptor {
    pub fn new() -> Self {
        Self
    }

    /// Compress the body and rewrite the headers, unless the body is empty
    /// or the request carries [`SKIP_COMPRESSION`].
    pub fn intercept(&self, headers: &mut HeaderMap, body: Bytes) -> std::io::Result<Bytes> {
        if body.is_empty() {
            return Ok(body);
        }
        if headers.contains_key(&SKIP_COMPRESSION) {
            debug!("Compression skipped via {} custom HTTP header", SKIP_COMPRESSION.as_str());
            return Ok(body);
        }

        let compressed = gzip_compress(&body)?;
        debug!(before = body.len(), after = compressed.len(), "Compressed request body");

        headers.append(CONTENT_ENCODING, GZIP);
        headers.append(ACCEPT_ENCODING, GZIP);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(compressed.len() as u64));
        Ok(Bytes::from(compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = b"some reasonably compressible payload payload payload";
        let compressed = gzip_compress(data).unwrap();
        assert_eq!(gzip_decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_empty_body_passes_through() {
        let interceptor = GzipRequestInterceptor::new();
        let mut headers = HeaderMap::new();
        let body = interceptor.intercept(&mut headers, Bytes::new()).unwrap();
        assert!(body.is_empty());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_skip_marker_passes_through_byte_identical() {
        let interceptor = GzipRequestInterceptor::new();
        let mut headers = HeaderMap::new();
        headers.insert(SKIP_COMPRESSION, HeaderValue::from_static("1"));
        let original = Bytes::from_static(b"do not touch");

        let body = interceptor.intercept(&mut headers, original.clone()).unwrap();
        assert_eq!(body, original);
        assert!(!headers.contains_key(CONTENT_ENCODING));
    }

    #[test]
    fn test_compresses_and_rewrites_headers() {
        let interceptor = GzipRequestInterceptor::new();
        let mut headers = HeaderMap::new();
        let original = Bytes::from(vec![b'a'; 10 * 1024]);

        let body = interceptor.intercept(&mut headers, original.clone()).unwrap();
        assert!(body.len() < original.len());
        assert_eq!(headers.get(CONTENT_ENCODING), Some(&GZIP));
        assert_eq!(headers.get(ACCEPT_ENCODING), Some(&GZIP));
        assert_eq!(
            headers.get(CONTENT_LENGTH),
            Some(&HeaderValue::from(body.len() as u64))
        );
        assert_eq!(gzip_decompress(&body).unwrap(), original);
    }
}
