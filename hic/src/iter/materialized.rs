use rayon::prelude::*;

use crate::block::ContactRecord;
use crate::dataset::Dataset;
use crate::error::{HicError, Result};
use crate::iter::genome_wide::genome_wide_pairs;
use crate::loader::LoadReport;
use crate::norm::NormalizationType;
use crate::zoom::Zoom;

/// Memory charged per stored record: two i32 bins and one f32 count
pub const RECORD_FOOTPRINT: u64 = 12;
/// Memory charged per matrix row
pub const ROW_FOOTPRINT: u64 = 4;

/// Estimated memory needed to hold `records` records of a matrix with `matrix_size` rows
pub fn estimate_footprint(matrix_size: u64, records: u64) -> u64 {
    matrix_size
        .saturating_mul(ROW_FOOTPRINT)
        .saturating_add(records.saturating_mul(RECORD_FOOTPRINT))
}

fn out_of_memory(e: std::collections::TryReserveError) -> HicError {
    HicError::Io(std::io::Error::new(std::io::ErrorKind::OutOfMemory, e))
}

/// Columnar storage of at most one chunk length of records
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordChunk {
    bin_x: Vec<i32>,
    bin_y: Vec<i32>,
    counts: Vec<f32>,
}

impl RecordChunk {
    fn with_capacity(capacity: usize) -> Result<Self> {
        let mut chunk = Self::default();
        chunk.bin_x.try_reserve_exact(capacity).map_err(out_of_memory)?;
        chunk.bin_y.try_reserve_exact(capacity).map_err(out_of_memory)?;
        chunk.counts.try_reserve_exact(capacity).map_err(out_of_memory)?;
        Ok(chunk)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn bin_x(&self) -> &[i32] {
        &self.bin_x
    }

    pub fn bin_y(&self) -> &[i32] {
        &self.bin_y
    }

    pub fn counts(&self) -> &[f32] {
        &self.counts
    }

    pub fn get(&self, idx: usize) -> Option<ContactRecord> {
        Some(ContactRecord::new(
            *self.bin_x.get(idx)?,
            *self.bin_y.get(idx)?,
            *self.counts.get(idx)?,
        ))
    }
}

/// Contact records held in memory, for repeated traversal without decoding again.
/// Chunks hold at most `chunk_len` records; chunks moved in by `append` may hold fewer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedContacts {
    chunks: Vec<RecordChunk>,
    /// Position of the first record of each chunk
    starts: Vec<u64>,
    chunk_len: usize,
    len: u64,
    matrix_size: u64,
    report: LoadReport,
}

impl MaterializedContacts {
    pub fn new(matrix_size: u64, chunk_len: usize) -> Self {
        Self {
            chunks: vec![],
            starts: vec![],
            chunk_len: chunk_len.max(1),
            len: 0,
            matrix_size,
            report: LoadReport::default(),
        }
    }

    pub fn push(&mut self, record: ContactRecord) -> Result<()> {
        let needs_chunk = self
            .chunks
            .last()
            .map_or(true, |c| c.len() >= self.chunk_len);
        if needs_chunk {
            let capacity = (self.chunk_len as u64).min(1 << 20) as usize;
            self.chunks.push(RecordChunk::with_capacity(capacity)?);
            self.starts.push(self.len);
        }
        if let Some(chunk) = self.chunks.last_mut() {
            if chunk.counts.len() == chunk.counts.capacity() {
                let grow = chunk.len().min(self.chunk_len - chunk.len()).max(1);
                chunk.bin_x.try_reserve_exact(grow).map_err(out_of_memory)?;
                chunk.bin_y.try_reserve_exact(grow).map_err(out_of_memory)?;
                chunk.counts.try_reserve_exact(grow).map_err(out_of_memory)?;
            }
            chunk.bin_x.push(record.bin_x);
            chunk.bin_y.push(record.bin_y);
            chunk.counts.push(record.counts);
        }
        self.len += 1;
        Ok(())
    }

    /// Drain a record sequence into memory
    pub fn collect<I>(records: I, matrix_size: u64, chunk_len: usize) -> Result<Self>
    where
        I: IntoIterator<Item = ContactRecord>,
    {
        let mut ret = Self::new(matrix_size, chunk_len);
        for record in records {
            ret.push(record)?;
        }
        Ok(ret)
    }

    /// Move the chunks of `other` behind the records held so far, without copying them
    pub fn append(&mut self, other: MaterializedContacts) {
        self.report.merge(&other.report);
        for chunk in other.chunks.into_iter().filter(|c| !c.is_empty()) {
            self.starts.push(self.len);
            self.len += chunk.len() as u64;
            self.chunks.push(chunk);
        }
    }

    /// Materialize a genome-wide view, decoding the chromosome pairs in parallel. Each
    /// pair fills its own chunks on a worker; the chunks are then moved into the result
    /// in pair order.
    pub fn genome_wide(
        dataset: &Dataset,
        zoom: Zoom,
        norm: &NormalizationType,
        include_intra: bool,
    ) -> Result<Self> {
        let (pairs, total_bins) = genome_wide_pairs(dataset, zoom, include_intra)?;
        let chunk_len = dataset.config().materialize_chunk_len;
        let parts: Vec<Result<Self>> = dataset.pool().install(|| {
            pairs
                .par_iter()
                .map(|pair| -> Result<Self> {
                    let mut part = Self::new(total_bins, chunk_len);
                    let opened = dataset
                        .matrix_zoom(pair.chr1, pair.chr2, zoom)
                        .and_then(|zd| zd.map(|zd| zd.contacts(norm)).transpose());
                    match opened {
                        Ok(Some(mut iter)) => {
                            for rec in iter.by_ref() {
                                match pair.translate(&rec) {
                                    Some(rec) => part.push(rec)?,
                                    None => part.report.out_of_range += 1,
                                }
                            }
                            part.report.merge(iter.report());
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::warn!(
                                "Skipping chromosome pair {}-{} at {}: {}",
                                pair.chr1,
                                pair.chr2,
                                zoom,
                                e
                            );
                            part.report.failed += 1;
                        }
                    }
                    Ok(part)
                })
                .collect()
        });

        let mut ret = Self::new(total_bins, chunk_len);
        for part in parts {
            ret.append(part?);
        }
        Ok(ret)
    }

    pub(crate) fn set_report(&mut self, report: LoadReport) {
        self.report = report;
    }

    /// Load statistics of the traversal that filled this buffer
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn matrix_size(&self) -> u64 {
        self.matrix_size
    }

    pub fn chunks(&self) -> &[RecordChunk] {
        &self.chunks
    }

    /// Random access by record position
    pub fn get(&self, idx: u64) -> Option<ContactRecord> {
        let chunk = self.starts.partition_point(|&s| s <= idx).checked_sub(1)?;
        let offset = usize::try_from(idx - self.starts[chunk]).ok()?;
        self.chunks.get(chunk)?.get(offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = ContactRecord> + '_ {
        self.chunks
            .iter()
            .flat_map(|c| (0..c.len()).filter_map(move |i| c.get(i)))
    }
}
