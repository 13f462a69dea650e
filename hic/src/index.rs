use std::collections::{BTreeSet, HashMap};
use std::io::{Error, ErrorKind, Read};

use hic_io::LeStream;

use crate::context::ReaderContext;
use crate::error::{HicError, Result};

/// On-disk size of one block index entry: i32 number, i64 position, i32 size
pub const INDEX_ENTRY_SIZE: u64 = 16;

/// A pointer into the byte source. Sizes are 64-bit so the same type also describes
/// large blobs such as normalization vectors, which are read in segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub position: u64,
    pub size: u64,
}

impl IndexEntry {
    pub fn new(position: u64, size: u64) -> Self {
        Self { position, size }
    }
}

fn read_index_entry<R: Read>(stream: &mut LeStream<R>) -> std::io::Result<(u32, IndexEntry)> {
    let number = stream.read_i32()?;
    let position = stream.read_i64()?;
    let size = stream.read_i32()?;
    if number < 0 || position < 0 || size < 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "Invalid block index entry ({}, {}, {})",
                number, position, size
            ),
        ));
    }
    Ok((number as u32, IndexEntry::new(position as u64, size as u64)))
}

/// Maps block numbers of one matrix zoom to their location in the byte source
pub enum BlockIndex {
    /// The whole index lives in memory
    Materialized(HashMap<u32, IndexEntry>),
    /// Only the location of the on-disk index is kept; lookups scan it in windows
    Dynamic {
        position: u64,
        count: u32,
        window: usize,
    },
}

impl BlockIndex {
    pub(crate) fn read_materialized<R: Read>(
        stream: &mut LeStream<R>,
        count: u32,
    ) -> std::io::Result<Self> {
        let mut entries = HashMap::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            let (number, entry) = read_index_entry(stream)?;
            entries.insert(number, entry);
        }
        Ok(BlockIndex::Materialized(entries))
    }

    pub(crate) fn dynamic(position: u64, count: u32, window: usize) -> Self {
        BlockIndex::Dynamic {
            position,
            count,
            window: window.max(1),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, BlockIndex::Dynamic { .. })
    }

    /// Number of blocks stored for the matrix zoom
    pub fn len(&self) -> usize {
        match self {
            BlockIndex::Materialized(entries) => entries.len(),
            BlockIndex::Dynamic { count, .. } => *count as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit the on-disk entries window by window until `visit` returns false
    fn scan<F>(&self, ctx: &ReaderContext, mut visit: F) -> Result<()>
    where
        F: FnMut(u32, IndexEntry) -> bool,
    {
        if let BlockIndex::Dynamic {
            position,
            count,
            window,
        } = *self
        {
            let mut first = 0u64;
            while first < count as u64 {
                let n = (window as u64).min(count as u64 - first);
                let start = position + first * INDEX_ENTRY_SIZE;
                let bytes = ctx.read_range(start, n * INDEX_ENTRY_SIZE)?;
                let mut stream = LeStream::new(&bytes[..], start);
                for _ in 0..n {
                    let (number, entry) = read_index_entry(&mut stream)
                        .map_err(|e| HicError::from_metadata_io("block index", e))?;
                    if !visit(number, entry) {
                        return Ok(());
                    }
                }
                first += n;
            }
        }
        Ok(())
    }

    /// Resolve the requested block numbers. Blocks that are not stored are simply
    /// missing from the returned map.
    pub fn lookup(&self, ctx: &ReaderContext, numbers: &[u32]) -> Result<HashMap<u32, IndexEntry>> {
        match self {
            BlockIndex::Materialized(entries) => Ok(numbers
                .iter()
                .filter_map(|n| entries.get(n).map(|e| (*n, *e)))
                .collect()),
            BlockIndex::Dynamic { .. } => {
                let mut wanted: BTreeSet<u32> = numbers.iter().copied().collect();
                let mut found = HashMap::with_capacity(wanted.len());
                if wanted.is_empty() {
                    return Ok(found);
                }
                self.scan(ctx, |number, entry| {
                    if wanted.remove(&number) {
                        found.insert(number, entry);
                    }
                    !wanted.is_empty()
                })?;
                Ok(found)
            }
        }
    }

    /// All stored block numbers in ascending order
    pub fn block_numbers(&self, ctx: &ReaderContext) -> Result<Vec<u32>> {
        let mut ret = match self {
            BlockIndex::Materialized(entries) => entries.keys().copied().collect::<Vec<_>>(),
            BlockIndex::Dynamic { .. } => {
                let mut ret = Vec::with_capacity(self.len().min(1 << 20));
                self.scan(ctx, |number, _| {
                    ret.push(number);
                    true
                })?;
                ret
            }
        };
        ret.sort_unstable();
        ret.dedup();
        Ok(ret)
    }
}
