//! The three ways of walking contact records: straight through one matrix zoom,
//! across all chromosome pairs, or out of memory after materializing.
mod direct;
mod genome_wide;
mod materialized;

use std::sync::Arc;

pub use direct::DirectIterator;
pub use genome_wide::{genome_wide_pairs, ChromPair, GenomeWideIterator};
pub use materialized::{
    estimate_footprint, MaterializedContacts, RecordChunk, RECORD_FOOTPRINT, ROW_FOOTPRINT,
};

use crate::block::ContactRecord;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::matrix::MatrixZoom;
use crate::norm::NormalizationType;
use crate::zoom::Zoom;

/// A restartable source of contact records. Every call to `iter` starts a fresh walk.
pub enum Contacts<'a> {
    Direct {
        zoom: Arc<MatrixZoom>,
        norm: NormalizationType,
    },
    GenomeWide {
        dataset: &'a Dataset,
        zoom: Zoom,
        norm: NormalizationType,
        include_intra: bool,
        matrix_size: u64,
    },
    Materialized(MaterializedContacts),
}

impl<'a> Contacts<'a> {
    pub fn iter(&self) -> Result<Box<dyn Iterator<Item = ContactRecord> + '_>> {
        Ok(match self {
            Contacts::Direct { zoom, norm } => Box::new(zoom.contacts(norm)?),
            Contacts::GenomeWide {
                dataset,
                zoom,
                norm,
                include_intra,
                ..
            } => Box::new(GenomeWideIterator::new(
                dataset,
                *zoom,
                norm.clone(),
                *include_intra,
            )?),
            Contacts::Materialized(records) => Box::new(records.iter()),
        })
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Contacts::Materialized(_))
    }

    /// Number of bins along the first axis
    pub fn matrix_size(&self) -> u64 {
        match self {
            Contacts::Direct { zoom, .. } => zoom.matrix_size(),
            Contacts::GenomeWide { matrix_size, .. } => *matrix_size,
            Contacts::Materialized(records) => records.matrix_size(),
        }
    }

    /// Number of records a walk yields. Lazy views have to walk once to know.
    pub fn number_of_records(&self) -> Result<u64> {
        match self {
            Contacts::Materialized(records) => Ok(records.len()),
            Contacts::Direct { zoom, norm } if norm.is_none() => zoom.number_of_records(),
            _ => Ok(self.iter()?.count() as u64),
        }
    }
}
