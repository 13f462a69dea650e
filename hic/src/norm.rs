use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hic_io::LeStream;
use lru::LruCache;
use serde_derive::{Deserialize, Serialize};

use crate::block::ContactRecord;
use crate::context::{read_length, ReaderContext};
use crate::error::{HicError, Result};
use crate::index::IndexEntry;
use crate::zoom::Zoom;

/// Label of a normalization scheme. `NONE` means raw counts; every other label names
/// a family of precomputed per-bin vectors stored in the container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizationType(String);

impl NormalizationType {
    pub fn new<S: AsRef<str>>(label: S) -> Self {
        NormalizationType(label.as_ref().trim().to_ascii_uppercase())
    }

    pub fn none() -> Self {
        Self::new("NONE")
    }

    pub fn vc() -> Self {
        Self::new("VC")
    }

    pub fn vc_sqrt() -> Self {
        Self::new("VC_SQRT")
    }

    pub fn kr() -> Self {
        Self::new("KR")
    }

    pub fn scale() -> Self {
        Self::new("SCALE")
    }

    pub fn is_none(&self) -> bool {
        self.0 == "NONE"
    }

    pub fn label(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for NormalizationType {
    fn default() -> Self {
        Self::none()
    }
}

impl FromStr for NormalizationType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one stored normalization vector
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormVectorKey {
    pub norm: NormalizationType,
    pub chr_idx: i32,
    pub zoom: Zoom,
}

/// Per-bin scale factors of one chromosome at one zoom. A partial vector covers
/// the bins starting at `first_bin`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizationVector {
    pub norm: NormalizationType,
    pub chr_idx: i32,
    pub zoom: Zoom,
    first_bin: u64,
    values: Vec<f64>,
}

impl NormalizationVector {
    pub fn new(norm: NormalizationType, chr_idx: i32, zoom: Zoom, values: Vec<f64>) -> Self {
        Self::with_offset(norm, chr_idx, zoom, 0, values)
    }

    pub fn with_offset(
        norm: NormalizationType,
        chr_idx: i32,
        zoom: Zoom,
        first_bin: u64,
        values: Vec<f64>,
    ) -> Self {
        Self {
            norm,
            chr_idx,
            zoom,
            first_bin,
            values,
        }
    }

    /// The scale factor of `bin`, `None` outside the covered range
    pub fn get(&self, bin: i64) -> Option<f64> {
        let idx = u64::try_from(bin).ok()?.checked_sub(self.first_bin)?;
        self.values.get(idx as usize).copied()
    }

    pub fn first_bin(&self) -> u64 {
        self.first_bin
    }

    pub fn values(&self) -> &[f64] {
        self.values.as_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Divide the raw count by the product of the two bins' scale factors.
/// Results that are not finite (missing factor, zero factor, NaN) are dropped.
pub fn normalize(
    record: &ContactRecord,
    nv1: &NormalizationVector,
    nv2: &NormalizationVector,
) -> Option<ContactRecord> {
    let denominator = nv1.get(record.bin_x as i64)? * nv2.get(record.bin_y as i64)?;
    let counts = (record.counts as f64 / denominator) as f32;
    if counts.is_finite() {
        Some(ContactRecord::new(record.bin_x, record.bin_y, counts))
    } else {
        None
    }
}

pub fn normalize_records(
    records: &[ContactRecord],
    nv1: &NormalizationVector,
    nv2: &NormalizationVector,
) -> Vec<ContactRecord> {
    records
        .iter()
        .filter_map(|r| normalize(r, nv1, nv2))
        .collect()
}

/// The normalization-vector index read from the footer together with a bounded
/// cache of loaded vectors
pub struct NormalizationStore {
    index: HashMap<NormVectorKey, IndexEntry>,
    types: Vec<NormalizationType>,
    cache: Mutex<LruCache<NormVectorKey, Option<Arc<NormalizationVector>>>>,
    lookups: AtomicUsize,
}

impl NormalizationStore {
    pub(crate) fn new(index: HashMap<NormVectorKey, IndexEntry>, capacity: usize) -> Self {
        let mut types: Vec<_> = index.keys().map(|k| k.norm.clone()).collect();
        types.sort();
        types.dedup();
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            index,
            types,
            cache: Mutex::new(LruCache::new(capacity)),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Normalization types that have at least one stored vector
    pub fn types(&self) -> &[NormalizationType] {
        self.types.as_ref()
    }

    /// Number of vector lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Find the stored vector for a key. VC_SQRT may be derived from VC; the flag in
    /// the returned pair says whether a square root has to be applied.
    fn resolve(&self, key: &NormVectorKey) -> Option<(IndexEntry, bool)> {
        if let Some(entry) = self.index.get(key) {
            return Some((*entry, false));
        }
        if key.norm == NormalizationType::vc_sqrt() {
            let vc_key = NormVectorKey {
                norm: NormalizationType::vc(),
                ..key.clone()
            };
            return self.index.get(&vc_key).map(|e| (*e, true));
        }
        None
    }

    fn finish(values: Vec<f64>, take_sqrt: bool) -> Option<Vec<f64>> {
        if values.iter().all(|v| v.is_nan()) {
            return None;
        }
        if take_sqrt {
            Some(values.into_iter().map(f64::sqrt).collect())
        } else {
            Some(values)
        }
    }

    fn load(
        &self,
        ctx: &ReaderContext,
        key: &NormVectorKey,
    ) -> Result<Option<NormalizationVector>> {
        let (entry, take_sqrt) = match self.resolve(key) {
            Some(found) => found,
            None => return Ok(None),
        };
        let version = ctx.version();
        let bytes = ctx.read_range(entry.position, entry.size)?;
        let mut stream = LeStream::new(&bytes[..], entry.position);
        let count = read_length(&mut stream, version)
            .map_err(|e| HicError::from_metadata_io("normalization vector", e))?;
        let count = usize::try_from(count)
            .map_err(|_| HicError::Format(format!("Negative vector length {}", count)))?;
        let header = version.length_width() as usize;
        let available = (bytes.len() - header) / version.vector_element_width() as usize;
        if count > available {
            return Err(HicError::Format(format!(
                "Normalization vector declares {} values but only {} are stored",
                count, available
            )));
        }
        let values = ctx
            .decode_vector(&bytes[header..], count)
            .map_err(|e| HicError::from_metadata_io("normalization vector", e))?;
        Ok(Self::finish(values, take_sqrt)
            .map(|v| NormalizationVector::new(key.norm.clone(), key.chr_idx, key.zoom, v)))
    }

    /// Get the whole vector, through the cache. `None` means the container has no such
    /// vector, which callers treat as "normalization missing" rather than an error.
    pub fn vector(
        &self,
        ctx: &ReaderContext,
        norm: &NormalizationType,
        chr_idx: i32,
        zoom: Zoom,
    ) -> Result<Option<Arc<NormalizationVector>>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let key = NormVectorKey {
            norm: norm.clone(),
            chr_idx,
            zoom,
        };
        if let Some(cached) = self.lock_cache().get(&key) {
            return Ok(cached.clone());
        }
        let loaded = self.load(ctx, &key)?.map(Arc::new);
        if loaded.is_none() {
            log::warn!("Normalization {} missing for chromosome {} at {}", norm, chr_idx, zoom);
        }
        self.lock_cache().put(key, loaded.clone());
        Ok(loaded)
    }

    /// Read only the bins `[bound1, bound2]` of a vector, bypassing the cache
    pub fn vector_part(
        &self,
        ctx: &ReaderContext,
        norm: &NormalizationType,
        chr_idx: i32,
        zoom: Zoom,
        bound1: u64,
        bound2: u64,
    ) -> Result<Option<NormalizationVector>> {
        if bound2 < bound1 {
            return Err(HicError::InvalidQuery(format!(
                "Empty bin range [{}, {}]",
                bound1, bound2
            )));
        }
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let key = NormVectorKey {
            norm: norm.clone(),
            chr_idx,
            zoom,
        };
        let (entry, take_sqrt) = match self.resolve(&key) {
            Some(found) => found,
            None => return Ok(None),
        };
        let version = ctx.version();
        let width = version.vector_element_width();
        let count = bound2 - bound1 + 1;
        let position = entry.position + version.length_width() + width * bound1;
        if position + count * width > entry.position + entry.size {
            return Err(HicError::InvalidQuery(format!(
                "Bins [{}, {}] exceed the stored vector",
                bound1, bound2
            )));
        }
        let bytes = ctx.read_range(position, count * width)?;
        let values = ctx
            .decode_vector(&bytes, count as usize)
            .map_err(|e| HicError::from_metadata_io("normalization vector", e))?;
        Ok(Self::finish(values, take_sqrt).map(|v| {
            NormalizationVector::with_offset(key.norm.clone(), chr_idx, zoom, bound1, v)
        }))
    }

    pub fn clear(&self) {
        self.lock_cache().clear();
    }

    fn lock_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, LruCache<NormVectorKey, Option<Arc<NormalizationVector>>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::version::FormatVersion;
    use hic_io::MemorySource;

    fn nv(values: &[f64]) -> NormalizationVector {
        NormalizationVector::new(NormalizationType::kr(), 1, Zoom::bp(1000), values.to_vec())
    }

    #[test]
    fn test_normalize() {
        let nv1 = nv(&[1.0, 2.0, 0.5]);
        let nv2 = nv(&[4.0, 1.0, 2.0]);
        let rec = ContactRecord::new(1, 2, 8.0);
        let out = normalize(&rec, &nv1, &nv2).unwrap();
        assert_eq!(out, ContactRecord::new(1, 2, 2.0));
    }

    #[test]
    fn test_non_finite_is_dropped() {
        let nv1 = nv(&[0.0, f64::NAN, 1.0]);
        let nv2 = nv(&[1.0, 1.0, 1.0]);
        let records = [
            ContactRecord::new(0, 0, 3.0),
            ContactRecord::new(1, 2, 3.0),
            ContactRecord::new(2, 2, 3.0),
            ContactRecord::new(7, 2, 3.0),
        ];
        let out = normalize_records(&records, &nv1, &nv2);
        assert_eq!(out, vec![ContactRecord::new(2, 2, 3.0)]);
    }

    #[test]
    fn test_partial_vector_offset() {
        let part = NormalizationVector::with_offset(
            NormalizationType::vc(),
            2,
            Zoom::bp(100),
            10,
            vec![1.0, 2.0],
        );
        assert_eq!(part.get(9), None);
        assert_eq!(part.get(10), Some(1.0));
        assert_eq!(part.get(11), Some(2.0));
        assert_eq!(part.get(12), None);
        assert_eq!(part.get(-1), None);
    }

    #[test]
    fn test_type_labels() {
        assert!(NormalizationType::new(" none ").is_none());
        assert_eq!("kr".parse::<NormalizationType>().unwrap(), NormalizationType::kr());
        assert_ne!(NormalizationType::vc(), NormalizationType::vc_sqrt());
        assert_eq!(NormalizationType::scale().to_string(), "SCALE");
    }

    fn v8_vector_blob(values: &[f64]) -> Vec<u8> {
        let mut ret = (values.len() as i32).to_le_bytes().to_vec();
        for v in values {
            ret.extend_from_slice(&v.to_le_bytes());
        }
        ret
    }

    #[test]
    fn test_store_fallback_and_missing() {
        let mut bytes = v8_vector_blob(&[4.0, 9.0, 16.0]);
        let nan_at = bytes.len() as u64;
        bytes.extend(v8_vector_blob(&[f64::NAN, f64::NAN]));
        let ctx = ReaderContext::new(
            Arc::new(MemorySource::new("norm", bytes.clone())),
            FormatVersion::new(8).unwrap(),
            ReaderConfig::default(),
        );
        let zoom = Zoom::bp(1000);
        let mut index = HashMap::new();
        index.insert(
            NormVectorKey {
                norm: NormalizationType::vc(),
                chr_idx: 1,
                zoom,
            },
            IndexEntry::new(0, nan_at),
        );
        index.insert(
            NormVectorKey {
                norm: NormalizationType::scale(),
                chr_idx: 1,
                zoom,
            },
            IndexEntry::new(nan_at, bytes.len() as u64 - nan_at),
        );
        let store = NormalizationStore::new(index, 4);
        assert_eq!(
            store.types(),
            &[NormalizationType::scale(), NormalizationType::vc()]
        );

        let vc = store.vector(&ctx, &NormalizationType::vc(), 1, zoom).unwrap().unwrap();
        assert_eq!(vc.values(), &[4.0, 9.0, 16.0]);

        let sqrt = store
            .vector(&ctx, &NormalizationType::vc_sqrt(), 1, zoom)
            .unwrap()
            .unwrap();
        assert_eq!(sqrt.values(), &[2.0, 3.0, 4.0]);
        assert_eq!(sqrt.norm, NormalizationType::vc_sqrt());

        assert!(store
            .vector(&ctx, &NormalizationType::scale(), 1, zoom)
            .unwrap()
            .is_none());
        assert!(store
            .vector(&ctx, &NormalizationType::kr(), 1, zoom)
            .unwrap()
            .is_none());

        let part = store
            .vector_part(&ctx, &NormalizationType::vc_sqrt(), 1, zoom, 1, 2)
            .unwrap()
            .unwrap();
        assert_eq!(part.get(1), Some(3.0));
        assert_eq!(part.get(2), Some(4.0));
        assert_eq!(part.get(0), None);
        assert!(store
            .vector_part(&ctx, &NormalizationType::vc(), 1, zoom, 2, 5)
            .is_err());
        assert_eq!(store.lookup_count(), 6);
    }
}
