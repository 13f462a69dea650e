use flate2::read::{DeflateDecoder, ZlibDecoder};
use serde_derive::{Deserialize, Serialize};
use std::io::{Read, Result};

/// Something that turns a compressed payload back into its raw bytes
pub trait Decompressor: Send + Sync {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// The compression methods a stored block may use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMethod {
    NoCompression,
    /// Raw deflate stream without a header
    Deflate,
    /// Deflate stream wrapped in a zlib header and checksum
    Zlib,
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Zlib
    }
}

impl Decompressor for CompressionMethod {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut ret = Vec::with_capacity(input.len() * 4);
        match self {
            CompressionMethod::NoCompression => ret.extend_from_slice(input),
            CompressionMethod::Deflate => {
                DeflateDecoder::new(input).read_to_end(&mut ret)?;
            }
            CompressionMethod::Zlib => {
                ZlibDecoder::new(input).read_to_end(&mut ret)?;
            }
        }
        Ok(ret)
    }
}
