use std::io::Read;
use std::sync::{Arc, Mutex};

use hic_io::LeStream;

use crate::addressing::{BlockAddressing, DepthFunction};
use crate::block::{Block, ContactRecord};
use crate::cache::{BlockCache, MatrixZoomKey};
use crate::chrom::Chrom;
use crate::context::ReaderContext;
use crate::error::{HicError, Result};
use crate::header::Header;
use crate::index::{BlockIndex, IndexEntry, INDEX_ENTRY_SIZE};
use crate::iter::DirectIterator;
use crate::loader::{BlockLoader, LoadReport, LoadRequest};
use crate::norm::{NormalizationStore, NormalizationType, NormalizationVector};
use crate::zoom::{Unit, Zoom};

/// Summary statistics stored with every matrix zoom
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomMetadata {
    pub old_zoom_index: i32,
    pub sum_counts: f32,
    pub occupied_cell_count: f32,
    pub std_dev: f32,
    pub percent95: f32,
}

/// The collaborators shared by every matrix of a dataset
#[derive(Clone)]
pub(crate) struct MatrixShared {
    pub ctx: Arc<ReaderContext>,
    pub loader: Arc<BlockLoader>,
    pub norms: Arc<NormalizationStore>,
}

/// How records of one request have to be scaled
pub(crate) enum Scaling {
    Raw,
    Vectors(Arc<NormalizationVector>, Arc<NormalizationVector>),
    /// The requested normalization is not stored for one of the chromosomes
    Missing,
}

/// One chromosome pair at one resolution: its block addressing, block index and
/// block cache
pub struct MatrixZoom {
    key: MatrixZoomKey,
    chrom1: Chrom,
    chrom2: Chrom,
    matrix_size: u64,
    metadata: ZoomMetadata,
    addressing: BlockAddressing,
    index: BlockIndex,
    cache: BlockCache,
    shared: MatrixShared,
    record_count: Mutex<Option<u64>>,
}

impl MatrixZoom {
    pub fn key(&self) -> &MatrixZoomKey {
        &self.key
    }

    pub fn zoom(&self) -> Zoom {
        self.key.zoom
    }

    pub fn chrom1(&self) -> &Chrom {
        &self.chrom1
    }

    pub fn chrom2(&self) -> &Chrom {
        &self.chrom2
    }

    pub fn is_intra(&self) -> bool {
        self.key.chr1 == self.key.chr2
    }

    pub fn metadata(&self) -> &ZoomMetadata {
        &self.metadata
    }

    /// Average count per cell, `None` when a chromosome is shorter than one bin
    pub fn average_count(&self) -> Option<f64> {
        let bin = self.key.zoom.bin_size as f64;
        let bins1 = (self.chrom1.size as f64 / bin).floor();
        let bins2 = (self.chrom2.size as f64 / bin).floor();
        if bins1 < 1.0 || bins2 < 1.0 {
            return None;
        }
        Some(self.metadata.sum_counts as f64 / bins1 / bins2)
    }

    pub fn addressing(&self) -> &BlockAddressing {
        &self.addressing
    }

    pub fn block_index(&self) -> &BlockIndex {
        &self.index
    }

    /// Number of bins along the first chromosome
    pub fn matrix_size(&self) -> u64 {
        self.matrix_size
    }

    /// All stored block numbers, ascending
    pub fn block_numbers(&self) -> Result<Vec<u32>> {
        self.index.block_numbers(&self.shared.ctx)
    }

    /// Blocks that may hold records of the inclusive bin rectangle. The lower mirror is
    /// only meaningful for intra-chromosomal matrices.
    pub fn covering_blocks(
        &self,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        include_lower: bool,
    ) -> Vec<u32> {
        self.addressing
            .covering_blocks(x1, y1, x2, y2, include_lower && self.is_intra())
            .into_iter()
            .collect()
    }

    pub(crate) fn scaling(&self, norm: &NormalizationType) -> Result<Scaling> {
        if norm.is_none() {
            return Ok(Scaling::Raw);
        }
        let MatrixShared { ctx, norms, .. } = &self.shared;
        let zoom = self.key.zoom;
        let nv1 = norms.vector(ctx, norm, self.key.chr1, zoom)?;
        let nv2 = if self.is_intra() {
            nv1.clone()
        } else {
            norms.vector(ctx, norm, self.key.chr2, zoom)?
        };
        Ok(match (nv1, nv2) {
            (Some(nv1), Some(nv2)) => Scaling::Vectors(nv1, nv2),
            _ => Scaling::Missing,
        })
    }

    pub(crate) fn load_scaled(
        &self,
        numbers: &[u32],
        norm: &NormalizationType,
        scaling: &Scaling,
    ) -> (Vec<Arc<Block>>, LoadReport) {
        let vectors = match scaling {
            Scaling::Raw => None,
            Scaling::Vectors(nv1, nv2) => Some((nv1.as_ref(), nv2.as_ref())),
            Scaling::Missing => {
                let report = LoadReport {
                    requested: numbers.len(),
                    normalization_missing: true,
                    ..Default::default()
                };
                return (vec![], report);
            }
        };
        let request = LoadRequest {
            matrix: &self.key,
            index: &self.index,
            cache: &self.cache,
            norm,
            scaling: vectors,
        };
        self.shared.loader.load(&request, numbers)
    }

    /// Fetch blocks by number. A normalization that is not stored yields no blocks and
    /// sets `normalization_missing` in the report.
    pub fn load_blocks(
        &self,
        numbers: &[u32],
        norm: &NormalizationType,
    ) -> Result<(Vec<Arc<Block>>, LoadReport)> {
        let scaling = self.scaling(norm)?;
        Ok(self.load_scaled(numbers, norm, &scaling))
    }

    /// Fetch every block that may hold records of the inclusive bin rectangle
    pub fn blocks_overlapping(
        &self,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        norm: &NormalizationType,
        include_lower: bool,
    ) -> Result<(Vec<Arc<Block>>, LoadReport)> {
        let numbers = self.covering_blocks(x1, y1, x2, y2, include_lower);
        self.load_blocks(&numbers, norm)
    }

    /// Records inside the inclusive bin rectangle. With `fill_under_diagonal`, records of
    /// an intra-chromosomal matrix are also reflected across the diagonal.
    pub fn region_records(
        &self,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        norm: &NormalizationType,
        fill_under_diagonal: bool,
    ) -> Result<(Vec<ContactRecord>, LoadReport)> {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        let mirror = fill_under_diagonal && self.is_intra();
        let (blocks, report) = self.blocks_overlapping(x1, y1, x2, y2, norm, mirror)?;
        let inside = |r: &ContactRecord| {
            (x1..=x2).contains(&(r.bin_x as i64)) && (y1..=y2).contains(&(r.bin_y as i64))
        };
        let mut ret = vec![];
        for block in blocks.iter() {
            for rec in block.records() {
                if inside(rec) {
                    ret.push(*rec);
                }
                if mirror && !rec.is_on_diagonal() {
                    let reflected = rec.reflected();
                    if inside(&reflected) {
                        ret.push(reflected);
                    }
                }
            }
        }
        Ok((ret, report))
    }

    /// Blocks fetched per loader round trip when walking a whole matrix
    pub(crate) fn batch_len(&self) -> usize {
        self.shared.loader.worker_count().max(1) * 4
    }

    /// Number of raw records stored for this zoom. The count is computed once, by
    /// decoding every block, and remembered when no block failed.
    pub fn number_of_records(&self) -> Result<u64> {
        if let Some(n) = *self.lock_record_count() {
            return Ok(n);
        }
        let numbers = self.block_numbers()?;
        let none = NormalizationType::none();
        let mut total = 0u64;
        let mut complete = true;
        for batch in numbers.chunks(self.batch_len()) {
            let (blocks, report) = self.load_scaled(batch, &none, &Scaling::Raw);
            total += blocks.iter().map(|b| b.len() as u64).sum::<u64>();
            complete &= report.is_complete();
        }
        if complete {
            *self.lock_record_count() = Some(total);
        }
        Ok(total)
    }

    /// A cheap record count for memory estimates: the stored occupied cell count when
    /// the writer recorded one, otherwise the exact count
    pub(crate) fn estimated_records(&self) -> Result<u64> {
        let occupied = self.metadata.occupied_cell_count;
        if occupied.is_finite() && occupied > 0.0 {
            return Ok(occupied as u64);
        }
        self.number_of_records()
    }

    fn lock_record_count(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.record_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Lazily walk every record of this zoom, one batch of blocks at a time
    pub fn contacts(self: &Arc<Self>, norm: &NormalizationType) -> Result<DirectIterator> {
        DirectIterator::new(self.clone(), norm.clone())
    }
}

/// All resolutions stored for one chromosome pair
pub struct Matrix {
    chr1: i32,
    chr2: i32,
    zooms: Vec<Arc<MatrixZoom>>,
}

struct ZoomRecord {
    zoom: Zoom,
    metadata: ZoomMetadata,
    block_bin_count: i32,
    block_column_count: i32,
    index: BlockIndex,
}

fn invalid<S: Into<String>>(msg: S) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

impl Matrix {
    /// Parse the matrix record of a chromosome pair at the position the master index
    /// points to
    pub(crate) fn read(shared: &MatrixShared, header: &Header, entry: IndexEntry) -> Result<Self> {
        let ctx = &shared.ctx;
        let mut stream = ctx.stream_at(entry.position)?;
        let (chr1, chr2, records) = Self::read_record(&mut stream, ctx)
            .map_err(|e| HicError::from_metadata_io("matrix record", e))?;

        let chrom = |idx: i32| {
            header.chrom_by_index(idx).cloned().ok_or_else(|| {
                HicError::Format(format!("Matrix refers to unknown chromosome {}", idx))
            })
        };
        let chrom1 = chrom(chr1)?;
        let chrom2 = chrom(chr2)?;

        let depth = DepthFunction::from_base(header.depth_base());
        let band = ctx.version().uses_diagonal_band() && chr1 == chr2;
        let config = ctx.config();

        let mut zooms = Vec::with_capacity(records.len());
        for record in records {
            let addressing = if band {
                BlockAddressing::DiagonalBand {
                    block_bin_count: record.block_bin_count,
                    block_column_count: record.block_column_count,
                    depth,
                }
            } else {
                BlockAddressing::Grid {
                    block_bin_count: record.block_bin_count,
                    block_column_count: record.block_column_count,
                }
            };
            let cache = if config.use_block_cache {
                BlockCache::new(config.block_cache_capacity)
            } else {
                BlockCache::disabled()
            };
            log::debug!(
                "Matrix {}-{} {}: {} blocks ({} index), {:?}",
                chrom1.name,
                chrom2.name,
                record.zoom,
                record.index.len(),
                if record.index.is_dynamic() { "dynamic" } else { "in-memory" },
                addressing
            );
            zooms.push(Arc::new(MatrixZoom {
                key: MatrixZoomKey {
                    chr1,
                    chr2,
                    zoom: record.zoom,
                },
                matrix_size: header.bin_count(&chrom1, record.zoom),
                chrom1: chrom1.clone(),
                chrom2: chrom2.clone(),
                metadata: record.metadata,
                addressing,
                index: record.index,
                cache,
                shared: shared.clone(),
                record_count: Mutex::new(None),
            }));
        }

        Ok(Matrix { chr1, chr2, zooms })
    }

    fn read_record<R: Read + std::io::Seek>(
        stream: &mut LeStream<R>,
        ctx: &ReaderContext,
    ) -> std::io::Result<(i32, i32, Vec<ZoomRecord>)> {
        let config = ctx.config();
        let chr1 = stream.read_i32()?;
        let chr2 = stream.read_i32()?;
        let n_resolutions = stream.read_i32()?;
        let mut records = vec![];
        for _ in 0..n_resolutions.max(0) {
            let unit: Unit = stream
                .read_cstring()?
                .parse()
                .map_err(|e: HicError| invalid(e.to_string()))?;
            let metadata = ZoomMetadata {
                old_zoom_index: stream.read_i32()?,
                sum_counts: stream.read_f32()?,
                occupied_cell_count: stream.read_f32()?,
                std_dev: stream.read_f32()?,
                percent95: stream.read_f32()?,
            };
            let bin_size = stream.read_i32()?;
            let block_bin_count = stream.read_i32()?;
            let block_column_count = stream.read_i32()?;
            let n_blocks = u32::try_from(stream.read_i32()?)
                .map_err(|_| invalid("negative block count"))?;

            let index = if config.allow_dynamic_block_index
                && bin_size < config.dynamic_index_max_bin_size
            {
                let position = stream.position();
                stream.skip(n_blocks as u64 * INDEX_ENTRY_SIZE)?;
                BlockIndex::dynamic(position, n_blocks, config.dynamic_index_scan_window)
            } else {
                BlockIndex::read_materialized(stream, n_blocks)?
            };

            records.push(ZoomRecord {
                zoom: Zoom::new(unit, bin_size),
                metadata,
                block_bin_count,
                block_column_count,
                index,
            });
        }
        Ok((chr1, chr2, records))
    }

    pub fn chr1(&self) -> i32 {
        self.chr1
    }

    pub fn chr2(&self) -> i32 {
        self.chr2
    }

    pub fn zooms(&self) -> Vec<Zoom> {
        self.zooms.iter().map(|z| z.zoom()).collect()
    }

    /// The matrix zoom for `zoom`. The whole-genome matrix (chromosome 0 with itself)
    /// answers with its closest bin size of the same unit.
    pub fn zoom(&self, zoom: Zoom) -> Option<Arc<MatrixZoom>> {
        if let Some(found) = self.zooms.iter().find(|z| z.zoom() == zoom) {
            return Some(found.clone());
        }
        if self.chr1 == 0 && self.chr2 == 0 {
            return self
                .zooms
                .iter()
                .filter(|z| z.zoom().unit == zoom.unit)
                .min_by_key(|z| (z.zoom().bin_size as i64 - zoom.bin_size as i64).abs())
                .cloned();
        }
        None
    }

    pub fn clear_cache(&self) {
        for zoom in self.zooms.iter() {
            zoom.clear_cache();
        }
    }
}
