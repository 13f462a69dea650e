use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom};

/// A little-endian primitive decoder that keeps track of the absolute byte position
/// of the underlying stream, so parsers can record where structures live without
/// querying the handle.
pub struct LeStream<R> {
    inner: R,
    position: u64,
}

macro_rules! impl_read_primitive {
    ($($name:ident => $ty:ty),*) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.read_exact(&mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }
        )*
    };
}

impl<R: Read> LeStream<R> {
    /// Wrap a reader whose next byte sits at `position` in the source
    pub fn new(inner: R, position: u64) -> Self {
        Self { inner, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    impl_read_primitive!(
        read_u8 => u8,
        read_i16 => i16,
        read_i32 => i32,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64
    );

    /// Read a NUL-terminated UTF-8 string. The terminator is consumed but not returned.
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut bytes = vec![];
        loop {
            match self.read_u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}

impl<R: Read + Seek> LeStream<R> {
    pub fn skip(&mut self, count: u64) -> Result<()> {
        let delta = i64::try_from(count)
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "Skip distance overflow"))?;
        self.inner.seek(SeekFrom::Current(delta))?;
        self.position += count;
        Ok(())
    }

    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }
}
