use std::io::BufReader;
use std::sync::Arc;

use hic_io::{
    ByteSource, ByteSourceExt, CompressionMethod, Decompressor, LeStream, RandFile, SourceHandle,
};

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::version::FormatVersion;

/// What every component needs to touch the container: where the bytes are, which
/// layout they follow and how the reader was configured.
pub struct ReaderContext {
    source: Arc<dyn ByteSource>,
    version: FormatVersion,
    config: ReaderConfig,
    compression: CompressionMethod,
}

impl ReaderContext {
    pub(crate) fn new(
        source: Arc<dyn ByteSource>,
        version: FormatVersion,
        config: ReaderConfig,
    ) -> Self {
        Self {
            source,
            version,
            config,
            compression: CompressionMethod::Zlib,
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Acquire an independent handle for positioned reads
    pub(crate) fn open_file(&self) -> Result<RandFile<SourceHandle>> {
        Ok(self.source.open_with_retry(&self.config.retry)?)
    }

    pub(crate) fn stream_at(&self, position: u64) -> Result<LeStream<BufReader<SourceHandle>>> {
        Ok(self.source.stream_at(&self.config.retry, position)?)
    }

    pub(crate) fn read_range(&self, position: u64, size: u64) -> Result<Vec<u8>> {
        Ok(self.source.read_range(&self.config.retry, position, size)?)
    }

    pub(crate) fn decompress(&self, payload: &[u8]) -> std::io::Result<Vec<u8>> {
        self.compression.decompress(payload)
    }

    /// Decode `count` stored vector elements (f64 before v9, f32 after)
    pub(crate) fn decode_vector(&self, bytes: &[u8], count: usize) -> std::io::Result<Vec<f64>> {
        let mut stream = LeStream::new(bytes, 0);
        let mut ret = Vec::with_capacity(count);
        for _ in 0..count {
            ret.push(read_vector_element(&mut stream, self.version)?);
        }
        Ok(ret)
    }
}

/// Read one stored vector element in the width the version dictates
pub(crate) fn read_vector_element<R: std::io::Read>(
    stream: &mut LeStream<R>,
    version: FormatVersion,
) -> std::io::Result<f64> {
    if version.has_float_vectors() {
        Ok(stream.read_f32()? as f64)
    } else {
        stream.read_f64()
    }
}

/// Read a stored length field in the width the version dictates
pub(crate) fn read_length<R: std::io::Read>(
    stream: &mut LeStream<R>,
    version: FormatVersion,
) -> std::io::Result<i64> {
    if version.has_wide_offsets() {
        stream.read_i64()
    } else {
        Ok(stream.read_i32()? as i64)
    }
}
