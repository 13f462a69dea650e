/**
 * A random-access reader for .hic multi-resolution contact matrix containers.
 **/
mod addressing;
mod block;
mod cache;
mod chrom;
pub mod codec;
mod config;
mod context;
mod dataset;
mod error;
mod expected;
mod footer;
mod header;
mod index;
pub mod iter;
mod loader;
mod matrix;
mod norm;
mod version;
mod zoom;

#[cfg(test)]
mod test_utils;

pub use addressing::{BlockAddressing, DepthFunction};
pub use block::{Block, ContactRecord};
pub use cache::{BlockCache, BlockKey, MatrixZoomKey};
pub use chrom::{Chrom, ALL_CHROM_NAME};
pub use config::ReaderConfig;
pub use context::ReaderContext;
pub use dataset::Dataset;
pub use error::{HicError, Result};
pub use expected::ExpectedValues;
pub use footer::{matrix_key, Footer};
pub use header::{FragmentSiteIndex, Header};
pub use index::{BlockIndex, IndexEntry};
pub use iter::{Contacts, DirectIterator, GenomeWideIterator, MaterializedContacts};
pub use loader::{BlockLoader, LoadReport, LoadRequest};
pub use matrix::{Matrix, MatrixZoom, ZoomMetadata};
pub use norm::{
    normalize, normalize_records, NormVectorKey, NormalizationStore, NormalizationType,
    NormalizationVector,
};
pub use version::{FormatVersion, MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};
pub use zoom::{Unit, Zoom};

pub use hic_io::{ByteSource, LocalFile, MemorySource, RetryPolicy};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
