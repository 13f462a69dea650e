use std::sync::Arc;

use crate::block::{Block, ContactRecord};
use crate::error::Result;
use crate::loader::LoadReport;
use crate::matrix::{MatrixZoom, Scaling};
use crate::norm::NormalizationType;

/// Walks every record of one matrix zoom in block order. Blocks are fetched lazily, a
/// batch at a time, so stopping early costs nothing more.
pub struct DirectIterator {
    zoom: Arc<MatrixZoom>,
    norm: NormalizationType,
    scaling: Scaling,
    numbers: Vec<u32>,
    next_number: usize,
    batch_len: usize,
    blocks: Vec<Arc<Block>>,
    block_idx: usize,
    record_idx: usize,
    report: LoadReport,
}

impl DirectIterator {
    pub fn new(zoom: Arc<MatrixZoom>, norm: NormalizationType) -> Result<Self> {
        let scaling = zoom.scaling(&norm)?;
        let mut report = LoadReport::default();
        let numbers = if let Scaling::Missing = scaling {
            report.normalization_missing = true;
            vec![]
        } else {
            zoom.block_numbers()?
        };
        Ok(Self {
            batch_len: zoom.batch_len(),
            zoom,
            norm,
            scaling,
            numbers,
            next_number: 0,
            blocks: vec![],
            block_idx: 0,
            record_idx: 0,
            report,
        })
    }

    pub fn matrix_zoom(&self) -> &Arc<MatrixZoom> {
        &self.zoom
    }

    /// Blocks that could not be read or decoded so far
    pub fn failed_blocks(&self) -> usize {
        self.report.failed
    }

    /// Accumulated load statistics of the blocks visited so far
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    fn fetch_next_batch(&mut self) -> bool {
        if self.next_number >= self.numbers.len() {
            return false;
        }
        let end = (self.next_number + self.batch_len).min(self.numbers.len());
        let (blocks, report) =
            self.zoom
                .load_scaled(&self.numbers[self.next_number..end], &self.norm, &self.scaling);
        self.next_number = end;
        self.report.merge(&report);
        self.blocks = blocks;
        self.block_idx = 0;
        self.record_idx = 0;
        true
    }
}

impl Iterator for DirectIterator {
    type Item = ContactRecord;

    fn next(&mut self) -> Option<ContactRecord> {
        loop {
            if let Some(block) = self.blocks.get(self.block_idx) {
                if let Some(rec) = block.records().get(self.record_idx) {
                    self.record_idx += 1;
                    return Some(*rec);
                }
                self.block_idx += 1;
                self.record_idx = 0;
                continue;
            }
            if !self.fetch_next_batch() {
                return None;
            }
        }
    }
}
