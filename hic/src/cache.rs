use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;

use crate::block::Block;
use crate::norm::NormalizationType;
use crate::zoom::Zoom;

/// Identity of one matrix zoom: a chromosome pair at one resolution
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatrixZoomKey {
    pub chr1: i32,
    pub chr2: i32,
    pub zoom: Zoom,
}

/// Cache key of a decoded block. The normalization is part of the key, so raw and
/// normalized versions of the same block never share a slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub matrix: MatrixZoomKey,
    pub number: u32,
    pub norm: NormalizationType,
}

type Lru = LruCache<BlockKey, Arc<Block>>;

/// A bounded LRU of decoded blocks. Each matrix zoom owns its own instance.
pub struct BlockCache {
    inner: Option<Mutex<Lru>>,
}

impl BlockCache {
    /// A cache holding at most `capacity` blocks; a zero capacity disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    fn lock(&self) -> Option<MutexGuard<'_, Lru>> {
        self.inner
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Look up a block, marking it as recently used. A miss is `None`, never an error.
    pub fn get(&self, key: &BlockKey) -> Option<Arc<Block>> {
        self.lock()?.get(key).cloned()
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.lock().map_or(false, |c| c.contains(key))
    }

    pub fn put(&self, key: BlockKey, block: Arc<Block>) {
        if let Some(mut cache) = self.lock() {
            cache.put(key, block);
        }
    }

    /// Insert a batch of blocks under a single lock
    pub fn put_all<I: IntoIterator<Item = (BlockKey, Arc<Block>)>>(&self, blocks: I) {
        if let Some(mut cache) = self.lock() {
            for (key, block) in blocks {
                cache.put(key, block);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }
}
