use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::{Arc, Mutex};

use hic_io::LeStream;

use crate::context::{read_length, read_vector_element, ReaderContext};
use crate::error::{HicError, Result};
use crate::norm::NormalizationType;
use crate::version::FormatVersion;
use crate::zoom::{Unit, Zoom};

enum ExpectedStorage {
    Loaded(Vec<f64>),
    /// Values stay on disk; the most recently read window is kept
    Streamed {
        position: u64,
        window: Mutex<Option<(u64, Arc<Vec<f64>>)>>,
    },
}

/// An expected-value-by-distance vector stored in the footer, with its
/// per-chromosome normalization factors
pub struct ExpectedValues {
    pub norm: NormalizationType,
    pub zoom: Zoom,
    len: u64,
    storage: ExpectedStorage,
    factors: HashMap<i32, f64>,
}

impl ExpectedValues {
    /// Parse one footer entry: unit, bin size, values, normalization factors.
    /// Vectors of zooms finer than `stream_min_bin_size` are skipped over and read on demand.
    pub(crate) fn read<R: Read + Seek>(
        stream: &mut LeStream<R>,
        norm: NormalizationType,
        version: FormatVersion,
        stream_min_bin_size: i32,
    ) -> Result<Self> {
        Self::read_entry(stream, norm, version, stream_min_bin_size)
            .map_err(|e| HicError::from_metadata_io("expected value table", e))
    }

    fn read_entry<R: Read + Seek>(
        stream: &mut LeStream<R>,
        norm: NormalizationType,
        version: FormatVersion,
        stream_min_bin_size: i32,
    ) -> std::io::Result<Self> {
        let unit: Unit = stream.read_cstring()?.parse().map_err(|e: HicError| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        let bin_size = stream.read_i32()?;
        let len = read_length(stream, version)?;
        let len = u64::try_from(len).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "negative vector length")
        })?;

        let storage = if bin_size >= stream_min_bin_size {
            let mut values = Vec::with_capacity(len.min(1 << 24) as usize);
            for _ in 0..len {
                values.push(read_vector_element(stream, version)?);
            }
            ExpectedStorage::Loaded(values)
        } else {
            let position = stream.position();
            stream.skip(len * version.vector_element_width())?;
            ExpectedStorage::Streamed {
                position,
                window: Mutex::new(None),
            }
        };

        let n_factors = stream.read_i32()?;
        let mut factors = HashMap::new();
        for _ in 0..n_factors.max(0) {
            let chr_idx = stream.read_i32()?;
            let factor = read_vector_element(stream, version)?;
            factors.insert(chr_idx, factor);
        }

        Ok(Self {
            norm,
            zoom: Zoom::new(unit, bin_size),
            len,
            storage,
            factors,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self.storage, ExpectedStorage::Streamed { .. })
    }

    pub fn normalization_factor(&self, chr_idx: i32) -> Option<f64> {
        self.factors.get(&chr_idx).copied()
    }

    pub fn normalization_factors(&self) -> &HashMap<i32, f64> {
        &self.factors
    }

    /// The raw stored value at `distance` bins from the diagonal. Distances past the
    /// end of the vector get its last value.
    pub fn raw_value(&self, ctx: &ReaderContext, distance: u64) -> Result<Option<f64>> {
        if self.len == 0 {
            return Ok(None);
        }
        let idx = distance.min(self.len - 1);
        match &self.storage {
            ExpectedStorage::Loaded(values) => Ok(values.get(idx as usize).copied()),
            ExpectedStorage::Streamed { position, window } => {
                let mut window = window.lock().unwrap_or_else(|e| e.into_inner());
                let hit = window.as_ref().and_then(|(start, values)| {
                    idx.checked_sub(*start)
                        .and_then(|off| values.get(off as usize).copied())
                });
                if let Some(value) = hit {
                    return Ok(Some(value));
                }
                let size = ctx.config().expected_stream_window.max(1);
                let start = idx.saturating_sub(size / 2);
                let end = (start + size).min(self.len);
                let width = ctx.version().vector_element_width();
                let bytes = ctx.read_range(position + start * width, (end - start) * width)?;
                let values = ctx
                    .decode_vector(&bytes, (end - start) as usize)
                    .map_err(|e| HicError::from_metadata_io("expected value vector", e))?;
                let value = values.get((idx - start) as usize).copied();
                *window = Some((start, Arc::new(values)));
                Ok(value)
            }
        }
    }

    /// The expected value for a chromosome: the stored value divided by the
    /// chromosome's normalization factor, when it has one.
    pub fn expected_value(
        &self,
        ctx: &ReaderContext,
        chr_idx: i32,
        distance: u64,
    ) -> Result<Option<f64>> {
        let factor = self.normalization_factor(chr_idx).unwrap_or(1.0);
        Ok(self.raw_value(ctx, distance)?.map(|v| v / factor))
    }
}
