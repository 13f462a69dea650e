use std::fs::File;
use std::io::{BufReader, Cursor, Read, Result, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{randfile::RandFile, retry::RetryPolicy, Blob, LeStream};

/// Any readable and seekable handle that can move to a worker thread
pub trait SeekRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekRead for T {}

pub type SourceHandle = Box<dyn SeekRead>;

/// A seekable, range-readable origin of bytes.
///
/// Each call to `open` must produce an independent handle, so that several workers can
/// issue positioned reads at the same time without sharing a cursor.
pub trait ByteSource: Send + Sync {
    fn open(&self) -> Result<SourceHandle>;

    /// Human readable name used in log messages
    fn describe(&self) -> String;
}

/// Convenience operations on top of a byte source
pub trait ByteSourceExt: ByteSource {
    /// Acquire a handle under the given retry policy
    fn open_with_retry(&self, policy: &RetryPolicy) -> Result<RandFile<SourceHandle>> {
        let what = format!("Opening {}", self.describe());
        policy.run(&what, |_| self.open()).map(RandFile::new)
    }

    /// Open a buffered little-endian stream positioned at `position`
    fn stream_at(
        &self,
        policy: &RetryPolicy,
        position: u64,
    ) -> Result<LeStream<BufReader<SourceHandle>>> {
        let what = format!("Opening {}", self.describe());
        let handle = policy.run(&what, |_| self.open())?;
        let mut stream = LeStream::new(BufReader::with_capacity(64 * 1024, handle), 0);
        stream.seek_to(position)?;
        Ok(stream)
    }

    /// Read `size` bytes at `position` through a fresh handle
    fn read_range(&self, policy: &RetryPolicy, position: u64, size: u64) -> Result<Vec<u8>> {
        let file = self.open_with_retry(policy)?;
        Blob::new(file, position, size).read_all()
    }
}

impl<S: ByteSource + ?Sized> ByteSourceExt for S {}

/// A file on the local file system; every handle is a fresh `File`
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ByteSource for LocalFile {
    fn open(&self) -> Result<SourceHandle> {
        Ok(Box::new(File::open(&self.path)?))
    }
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-memory byte source. Handles share the buffer and carry their own cursor.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new<N: Into<String>>(name: N, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn open(&self) -> Result<SourceHandle> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn open(&self) -> Result<SourceHandle> {
        self.as_ref().open()
    }
    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}
