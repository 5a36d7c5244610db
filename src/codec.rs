//! Streaming zstd compression for document bodies.
//!
//! Every document body in the database is a raw zstd frame with no extra
//! header or envelope, so `decompress(compress(x)) == x` for any byte string
//! including the empty one. Both functions are safe to call from any number
//! of tasks concurrently.

use crate::error::{Error, Result};

/// Default zstd compression level (`0` selects the library default, 3).
const LEVEL: i32 = 0;

/// Compress `data` into a single zstd frame.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::encode_all(data, LEVEL)
        .map_err(|err| Error::Other(format!("zstd encode: {err}")))
}

/// Decompress a zstd frame produced by [`compress`].
///
/// Malformed input is a [`Error::Corruption`]; this never panics.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::decode_all(data)
        .map_err(|err| Error::Corruption(format!("zstd decode: {err}")))
}
