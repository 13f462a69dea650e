use memmap::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{Cursor, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::source::{ByteSource, SourceHandle};

#[derive(Clone)]
struct MappingHandle(Arc<Mmap>);

impl AsRef<[u8]> for MappingHandle {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// A local file mapped into memory once; each handle is a cursor over the shared mapping
pub struct MappedSource {
    path: PathBuf,
    mapping: MappingHandle,
}

impl MappedSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            mapping: MappingHandle(Arc::new(mmap)),
        })
    }

    pub fn len(&self) -> usize {
        self.mapping.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByteSource for MappedSource {
    fn open(&self) -> Result<SourceHandle> {
        Ok(Box::new(Cursor::new(self.mapping.clone())))
    }
    fn describe(&self) -> String {
        format!("mmap:{}", self.path.display())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{retry::RetryPolicy, ByteSourceExt};
    use std::io::Write;

    #[test]
    fn test_mapped_range_read() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&(0u8..=99).collect::<Vec<_>>()).unwrap();
        tmp.flush().unwrap();
        let source = MappedSource::open(tmp.path()).unwrap();
        assert_eq!(source.len(), 100);
        let bytes = source.read_range(&RetryPolicy::no_retry(), 90, 4).unwrap();
        assert_eq!(bytes, vec![90, 91, 92, 93]);
    }
}
