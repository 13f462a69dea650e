use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// The file object that supports random access. Every read names the absolute
/// address it wants, so callers never depend on where a previous read left the cursor.
///
/// A RandFile wraps exactly one handle. Clones share that handle and serialize through
/// the internal mutex, which keeps each block read atomic. Readers that need truly
/// concurrent positioned reads should open one RandFile per worker from the byte source.
pub struct RandFile<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for RandFile<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RandFile<T> {
    /// Create a new random access file wrapper
    ///
    /// - `inner`: The underlying implementation for the backend
    /// - `returns`: The newly created random file object
    pub fn new(inner: T) -> Self {
        RandFile {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.inner
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "Lock Error"))
    }
}

impl<T: Read + Seek> RandFile<T> {
    /// Read a block from the random accessing file.
    /// The size of the buffer slice is the number of bytes requested, but there might
    /// not be enough bytes available, so the actual number of bytes loaded is returned.
    pub fn read_block(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.seek(SeekFrom::Start(addr))?;
        let mut ret = 0;
        loop {
            if ret == buf.len() {
                break Ok(ret);
            }
            let bytes_read = match inner.read(&mut buf[ret..]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if bytes_read == 0 {
                break Ok(ret);
            }
            ret += bytes_read;
        }
    }

    /// Like `read_block`, but a short read is an `UnexpectedEof` error.
    pub fn read_exact_block(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let size = self.read_block(addr, buf)?;
        if size < buf.len() {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "Short read at {}: {} of {} bytes available",
                    addr,
                    size,
                    buf.len()
                ),
            ));
        }
        Ok(())
    }
}
