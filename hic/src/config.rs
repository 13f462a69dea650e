use std::path::Path;

use hic_io::RetryPolicy;
use serde_derive::{Deserialize, Serialize};

use crate::error::{HicError, Result};

/// Tunables of the reader. Every field has a default, so a JSON document only needs
/// to name what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub use_block_cache: bool,
    /// Capacity of the LRU block cache owned by each matrix zoom
    pub block_cache_capacity: usize,
    pub norm_vector_cache_capacity: usize,
    /// Size of the block loader pool, defaults to the available parallelism
    pub worker_threads: Option<usize>,
    /// Matrix zooms with a bin size strictly below this keep their block index on disk
    pub dynamic_index_max_bin_size: i32,
    pub allow_dynamic_block_index: bool,
    /// Number of index entries read per window when scanning an on-disk block index
    pub dynamic_index_scan_window: usize,
    /// Memory budget in bytes for materializing contact records
    pub materialize_memory_ceiling: u64,
    pub materialize_chunk_len: usize,
    /// Number of values read per window when streaming a fine expected-value vector
    pub expected_stream_window: u64,
    /// Expected-value vectors of zooms finer than this are streamed instead of loaded
    pub expected_stream_min_bin_size: i32,
    pub retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            use_block_cache: true,
            block_cache_capacity: 500,
            norm_vector_cache_capacity: 25,
            worker_threads: None,
            dynamic_index_max_bin_size: 50,
            allow_dynamic_block_index: true,
            dynamic_index_scan_window: 1024,
            materialize_memory_ceiling: 4 << 30,
            materialize_chunk_len: 10_000_000,
            expected_stream_window: 500_000,
            expected_stream_min_bin_size: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReaderConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| HicError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) {
            return Err(HicError::Config("worker_threads must be positive".into()));
        }
        if self.materialize_chunk_len == 0 {
            return Err(HicError::Config(
                "materialize_chunk_len must be positive".into(),
            ));
        }
        if self.dynamic_index_scan_window == 0 {
            return Err(HicError::Config(
                "dynamic_index_scan_window must be positive".into(),
            ));
        }
        if self.expected_stream_window == 0 {
            return Err(HicError::Config(
                "expected_stream_window must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Worker count for the block loader pool
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_worker_threads())
            .thread_name(|idx| format!("hic-loader-{}", idx))
            .build()?)
    }
}
