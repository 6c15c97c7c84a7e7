//! Snappy compression of marshaled reply bytes.
//!
//! Uses the raw (block) snappy format. Replies compressed here carry the
//! [`SNAPPY_HEADER`] header set to `"true"`. Request bodies are never
//! compressed.

use crate::error::CompressionError;

/// Response header marking a snappy-compressed body.
pub const SNAPPY_HEADER: &str = "snappy";

/// Compresses `data` into a new buffer.
///
/// # Errors
///
/// Returns an error if `data` exceeds the maximum snappy block size.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    Ok(snap::raw::Encoder::new().compress_vec(data)?)
}

/// Decompresses a body produced by [`compress`].
///
/// # Errors
///
/// Returns an error if `data` is not a valid snappy block.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    Ok(snap::raw::Decoder::new().decompress_vec(data)?)
}
