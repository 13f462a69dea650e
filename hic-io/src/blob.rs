use crate::randfile::RandFile;
use std::io::{Error, ErrorKind, Read, Result, Seek};

/// Upper bound of a single positioned read issued by `Blob::read_all`.
/// Larger blobs are fetched as consecutive segments.
pub const MAX_SEGMENT_SIZE: usize = 1 << 30;

/// A byte range `[offset, offset + size)` inside a random access file
pub struct Blob<T> {
    file: RandFile<T>,
    size: u64,
    offset: u64,
}

impl<T: Read + Seek> Blob<T> {
    /// Load the whole blob into memory
    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read_segmented(MAX_SEGMENT_SIZE)
    }

    /// Load the whole blob, issuing one positioned read per `segment_size` bytes
    pub fn read_segmented(&self, segment_size: usize) -> Result<Vec<u8>> {
        if segment_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Zero segment size"));
        }
        let total = usize::try_from(self.size)
            .map_err(|_| Error::new(ErrorKind::Other, "Blob exceeds the address space"))?;
        let mut ret = Vec::new();
        ret.try_reserve_exact(total)
            .map_err(|e| Error::new(ErrorKind::Other, e))?;
        ret.resize(total, 0);
        for (idx, segment) in ret.chunks_mut(segment_size).enumerate() {
            let addr = self.offset + (idx * segment_size) as u64;
            self.file.read_exact_block(addr, segment)?;
        }
        Ok(ret)
    }
}

impl<T> Blob<T> {
    pub fn new(file: RandFile<T>, offset: u64, size: u64) -> Self {
        Self { file, size, offset }
    }
}
