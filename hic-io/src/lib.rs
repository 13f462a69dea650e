//! The byte-level layer of the Hi-C reader: where bytes come from, how to read
//! them at an absolute position, and how to decode little-endian primitives and
//! compressed payloads.
mod blob;
mod compression;
mod le_stream;
mod randfile;
mod retry;
mod source;

pub use blob::{Blob, MAX_SEGMENT_SIZE};
pub use compression::{CompressionMethod, Decompressor};
pub use le_stream::LeStream;
pub use randfile::RandFile;
pub use retry::RetryPolicy;
pub use source::{ByteSource, ByteSourceExt, LocalFile, MemorySource, SeekRead, SourceHandle};

#[cfg(all(feature = "mapped_io", not(target_arch = "wasm32")))]
pub mod mapped;

#[cfg(feature = "http_reader")]
pub mod http;
