use std::sync::Arc;
use std::time::{Duration, Instant};

use hic_io::{Blob, RandFile, SourceHandle};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::block::Block;
use crate::cache::{BlockCache, BlockKey, MatrixZoomKey};
use crate::codec::decode_block;
use crate::context::ReaderContext;
use crate::error::{HicError, Result};
use crate::index::{BlockIndex, IndexEntry};
use crate::norm::{normalize_records, NormalizationType, NormalizationVector};

/// What happened while serving one block request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Distinct block numbers asked for
    pub requested: usize,
    pub cache_hits: usize,
    /// Blocks read and decoded from the byte source
    pub loaded: usize,
    /// Blocks the index does not know; they hold no data
    pub absent: usize,
    /// Blocks that could not be read or decoded; their records are missing
    pub failed: usize,
    /// Records dropped because their bins do not fit genome-wide coordinates
    pub out_of_range: usize,
    /// The requested normalization has no vector for one of the chromosomes
    pub normalization_missing: bool,
    pub elapsed: Duration,
}

impl LoadReport {
    /// True when every requested block was served and every record kept
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.out_of_range == 0 && !self.normalization_missing
    }

    pub fn merge(&mut self, other: &LoadReport) {
        self.requested += other.requested;
        self.cache_hits += other.cache_hits;
        self.loaded += other.loaded;
        self.absent += other.absent;
        self.failed += other.failed;
        self.out_of_range += other.out_of_range;
        self.normalization_missing |= other.normalization_missing;
        self.elapsed += other.elapsed;
    }
}

/// Everything the loader needs to know about the matrix zoom being served
pub struct LoadRequest<'a> {
    pub matrix: &'a MatrixZoomKey,
    pub index: &'a BlockIndex,
    pub cache: &'a BlockCache,
    pub norm: &'a NormalizationType,
    /// Normalization vectors of the first and second chromosome, `None` for raw counts
    pub scaling: Option<(&'a NormalizationVector, &'a NormalizationVector)>,
}

impl<'a> LoadRequest<'a> {
    fn key(&self, number: u32) -> BlockKey {
        BlockKey {
            matrix: self.matrix.clone(),
            number,
            norm: self.norm.clone(),
        }
    }
}

enum Outcome {
    Loaded(Block),
    /// The block is unusable. Decode failures are remembered so they are not retried;
    /// I/O failures may be transient and are not.
    Failed { number: u32, remember: bool },
}

/// Reads, decompresses, decodes and normalizes blocks on a worker pool
pub struct BlockLoader {
    ctx: Arc<ReaderContext>,
    pool: Arc<ThreadPool>,
}

impl BlockLoader {
    pub fn new(ctx: Arc<ReaderContext>, pool: Arc<ThreadPool>) -> Self {
        Self { ctx, pool }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Serve the requested blocks. Cached blocks are returned as they are; the rest are
    /// resolved through the index and loaded in parallel. Blocks without data are left
    /// out of the result, which is sorted by block number. Failures never abort the
    /// request, they are counted in the report instead.
    pub fn load(
        &self,
        request: &LoadRequest<'_>,
        numbers: &[u32],
    ) -> (Vec<Arc<Block>>, LoadReport) {
        let start = Instant::now();
        let mut wanted = numbers.to_vec();
        wanted.sort_unstable();
        wanted.dedup();

        let mut report = LoadReport {
            requested: wanted.len(),
            ..Default::default()
        };
        let mut ret = Vec::with_capacity(wanted.len());
        let mut misses = vec![];
        for number in wanted {
            match request.cache.get(&request.key(number)) {
                Some(block) => {
                    report.cache_hits += 1;
                    if !block.is_empty() {
                        ret.push(block);
                    }
                }
                None => misses.push(number),
            }
        }

        if !misses.is_empty() {
            match request.index.lookup(&self.ctx, &misses) {
                Ok(entries) => {
                    let mut to_read = Vec::with_capacity(entries.len());
                    let mut absent = vec![];
                    for number in misses {
                        match entries.get(&number) {
                            Some(entry) => to_read.push((number, *entry)),
                            None => {
                                absent.push((request.key(number), Arc::new(Block::empty(number))))
                            }
                        }
                    }
                    report.absent = absent.len();
                    request.cache.put_all(absent);
                    self.read_all(request, &to_read, &mut ret, &mut report);
                }
                Err(e) => {
                    log::warn!(
                        "Block index lookup failed for {} blocks of {:?}: {}",
                        misses.len(),
                        request.matrix,
                        e
                    );
                    report.failed += misses.len();
                }
            }
        }

        ret.sort_by_key(|b| b.number());
        report.elapsed = start.elapsed();
        log::debug!(
            "Served {} blocks of chr{}-chr{} {} ({} cached, {} loaded, {} absent, {} failed) in {:?}",
            report.requested,
            request.matrix.chr1,
            request.matrix.chr2,
            request.matrix.zoom,
            report.cache_hits,
            report.loaded,
            report.absent,
            report.failed,
            report.elapsed
        );
        (ret, report)
    }

    fn read_all(
        &self,
        request: &LoadRequest<'_>,
        to_read: &[(u32, IndexEntry)],
        ret: &mut Vec<Arc<Block>>,
        report: &mut LoadReport,
    ) {
        if to_read.is_empty() {
            return;
        }
        let workers = self.worker_count().max(1);
        let chunk_size = (to_read.len() + workers - 1) / workers;
        let outcomes: Vec<Outcome> = self.pool.install(|| {
            to_read
                .par_chunks(chunk_size.max(1))
                .map(|part| self.read_partition(request, part))
                .flatten()
                .collect()
        });

        let mut fresh = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Outcome::Loaded(block) => {
                    report.loaded += 1;
                    let block = Arc::new(block);
                    fresh.push((request.key(block.number()), block.clone()));
                    if !block.is_empty() {
                        ret.push(block);
                    }
                }
                Outcome::Failed { number, remember } => {
                    report.failed += 1;
                    if remember {
                        fresh.push((request.key(number), Arc::new(Block::empty(number))));
                    }
                }
            }
        }
        request.cache.put_all(fresh);
    }

    /// Work of one pool thread: a private handle, then one block after another
    fn read_partition(
        &self,
        request: &LoadRequest<'_>,
        part: &[(u32, IndexEntry)],
    ) -> Vec<Outcome> {
        let file = match self.ctx.open_file() {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Cannot open {}: {}", self.ctx.describe(), e);
                return part
                    .iter()
                    .map(|&(number, _)| Outcome::Failed {
                        number,
                        remember: false,
                    })
                    .collect();
            }
        };
        part.iter()
            .map(|&(number, entry)| match self.read_block(request, &file, number, entry) {
                Ok(block) => Outcome::Loaded(block),
                Err(e) => {
                    log::warn!("Skipping block {} of {}: {}", number, self.ctx.describe(), e);
                    Outcome::Failed {
                        number,
                        remember: matches!(e, HicError::Decode { .. }),
                    }
                }
            })
            .collect()
    }

    fn read_block(
        &self,
        request: &LoadRequest<'_>,
        file: &RandFile<SourceHandle>,
        number: u32,
        entry: IndexEntry,
    ) -> Result<Block> {
        let compressed = Blob::new(file.clone(), entry.position, entry.size)
            .read_all()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    HicError::decode(Some(number), format!("payload out of bounds: {}", e))
                }
                _ => HicError::Io(e),
            })?;
        let payload = self
            .ctx
            .decompress(&compressed)
            .map_err(|e| HicError::decode(Some(number), format!("decompression failed: {}", e)))?;
        let block = decode_block(self.ctx.version(), number, &payload)?;
        Ok(match request.scaling {
            Some((nv1, nv2)) => Block::new(number, normalize_records(block.records(), nv1, nv2)),
            None => block,
        })
    }
}
