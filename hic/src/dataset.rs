use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use hic_io::{ByteSource, ByteSourceExt, LocalFile, MemorySource};
use rayon::ThreadPool;

use crate::chrom::Chrom;
use crate::config::ReaderConfig;
use crate::context::ReaderContext;
use crate::error::{HicError, Result};
use crate::expected::ExpectedValues;
use crate::footer::{matrix_key, Footer};
use crate::header::Header;
use crate::iter::{estimate_footprint, genome_wide_pairs, Contacts, MaterializedContacts};
use crate::loader::BlockLoader;
use crate::matrix::{Matrix, MatrixShared, MatrixZoom};
use crate::norm::{NormalizationStore, NormalizationType, NormalizationVector};
use crate::version::FormatVersion;
use crate::zoom::Zoom;

/// An opened container. Only the header and footer are read up front; matrices,
/// blocks and vectors are read when first asked for.
pub struct Dataset {
    header: Header,
    footer: Footer,
    shared: MatrixShared,
    pool: Arc<ThreadPool>,
    matrices: RwLock<HashMap<(i32, i32), Arc<Matrix>>>,
    fragment_sites: Mutex<HashMap<i32, Arc<Vec<i32>>>>,
}

impl Dataset {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        Self::from_source(Arc::new(LocalFile::new(path)), config)
    }

    /// Open a local file through a read-only memory mapping
    #[cfg(all(feature = "mapped_io", not(target_arch = "wasm32")))]
    pub fn open_mapped<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let source = hic_io::mapped::MappedSource::open(path)?;
        Self::from_source(Arc::new(source), config)
    }

    /// Open a remote container through HTTP range requests
    #[cfg(feature = "http_reader")]
    pub fn from_url(url: &str, config: ReaderConfig) -> Result<Self> {
        let source = hic_io::http::HttpSource::new(url)?;
        Self::from_source(Arc::new(source), config)
    }

    pub fn from_bytes(name: &str, bytes: Vec<u8>, config: ReaderConfig) -> Result<Self> {
        Self::from_source(Arc::new(MemorySource::new(name, bytes)), config)
    }

    pub fn from_source(source: Arc<dyn ByteSource>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let mut stream = source.stream_at(&config.retry, 0)?;
        let header = Header::read(&mut stream)?;
        stream.seek_to(header.master_index_position)?;
        let mut footer = Footer::read(
            &mut stream,
            header.version,
            config.expected_stream_min_bin_size,
        )?;
        drop(stream);

        let norms = Arc::new(NormalizationStore::new(
            std::mem::take(&mut footer.norm_vector_index),
            config.norm_vector_cache_capacity,
        ));
        let pool = Arc::new(config.build_pool()?);
        let ctx = Arc::new(ReaderContext::new(source, header.version, config));
        let loader = Arc::new(BlockLoader::new(ctx.clone(), pool.clone()));

        log::info!(
            "Opened {} ({}, genome {}): {} chromosomes, {} matrices, {} normalization types",
            ctx.describe(),
            header.version,
            header.genome_id,
            header.chrom_list.len(),
            footer.master_index.len(),
            norms.types().len()
        );

        Ok(Dataset {
            header,
            footer,
            shared: MatrixShared { ctx, loader, norms },
            pool,
            matrices: RwLock::new(HashMap::new()),
            fragment_sites: Mutex::new(HashMap::new()),
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.header.version
    }

    pub fn genome_id(&self) -> &str {
        &self.header.genome_id
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.header.attributes
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn config(&self) -> &ReaderConfig {
        self.shared.ctx.config()
    }

    pub(crate) fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn chromosomes(&self) -> &[Chrom] {
        self.header.chrom_list()
    }

    pub fn chromosome(&self, name: &str) -> Result<&Chrom> {
        self.header
            .chrom_by_name(name)
            .ok_or_else(|| HicError::UnknownChromosome(name.to_string()))
    }

    pub fn zooms(&self) -> Vec<Zoom> {
        self.header.zooms()
    }

    pub fn bin_count(&self, chrom: &Chrom, zoom: Zoom) -> u64 {
        self.header.bin_count(chrom, zoom)
    }

    /// Normalization types that have stored vectors, `NONE` first
    pub fn normalization_types(&self) -> Vec<NormalizationType> {
        let mut ret = vec![NormalizationType::none()];
        ret.extend(self.shared.norms.types().iter().cloned());
        ret
    }

    pub fn normalization_store(&self) -> &NormalizationStore {
        &self.shared.norms
    }

    /// Where the normalized expected values start
    pub fn norm_vector_file_position(&self) -> u64 {
        self.footer.norm_vector_file_position
    }

    /// The matrix of a chromosome pair, in either order. `None` when the container
    /// stores no data for the pair.
    pub fn matrix(&self, chr1: i32, chr2: i32) -> Result<Option<Arc<Matrix>>> {
        let key = (chr1.min(chr2), chr1.max(chr2));
        if let Some(found) = self
            .matrices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(Some(found.clone()));
        }
        let entry = match self.footer.master_index.get(&matrix_key(key.0, key.1)) {
            Some(entry) => *entry,
            None => return Ok(None),
        };
        let matrix = Arc::new(Matrix::read(&self.shared, &self.header, entry)?);
        let mut matrices = self.matrices.write().unwrap_or_else(|e| e.into_inner());
        Ok(Some(matrices.entry(key).or_insert(matrix).clone()))
    }

    pub fn matrix_zoom(&self, chr1: i32, chr2: i32, zoom: Zoom) -> Result<Option<Arc<MatrixZoom>>> {
        Ok(self.matrix(chr1, chr2)?.and_then(|m| m.zoom(zoom)))
    }

    /// The whole vector of a chromosome, `None` when it is not stored
    pub fn normalization_vector(
        &self,
        norm: &NormalizationType,
        chr_idx: i32,
        zoom: Zoom,
    ) -> Result<Option<Arc<NormalizationVector>>> {
        self.shared.norms.vector(&self.shared.ctx, norm, chr_idx, zoom)
    }

    /// The bins `[bound1, bound2]` of a vector, read without loading the rest
    pub fn normalization_vector_part(
        &self,
        norm: &NormalizationType,
        chr_idx: i32,
        zoom: Zoom,
        bound1: u64,
        bound2: u64,
    ) -> Result<Option<NormalizationVector>> {
        self.shared
            .norms
            .vector_part(&self.shared.ctx, norm, chr_idx, zoom, bound1, bound2)
    }

    pub fn expected_values(&self, zoom: Zoom, norm: &NormalizationType) -> Option<&ExpectedValues> {
        self.footer.expected_values(zoom, norm)
    }

    pub fn expected_value(
        &self,
        zoom: Zoom,
        norm: &NormalizationType,
        chr_idx: i32,
        distance: u64,
    ) -> Result<Option<f64>> {
        match self.expected_values(zoom, norm) {
            Some(expected) => expected.expected_value(&self.shared.ctx, chr_idx, distance),
            None => Ok(None),
        }
    }

    pub fn fragment_site_count(&self, name: &str) -> Result<u32> {
        let chrom = self.chromosome(name)?;
        Ok(self
            .header
            .fragment_sites
            .get(chrom.index as usize)
            .map_or(0, |s| s.count))
    }

    /// Restriction-site positions of a chromosome, read on first use
    pub fn fragment_sites(&self, name: &str) -> Result<Arc<Vec<i32>>> {
        let chrom = self.chromosome(name)?;
        if let Some(sites) = self.lock_sites().get(&chrom.index) {
            return Ok(sites.clone());
        }
        let sites = match self.header.fragment_sites.get(chrom.index as usize) {
            Some(table) if table.count > 0 => {
                let bytes = self
                    .shared
                    .ctx
                    .read_range(table.position, table.count as u64 * 4)?;
                bytes
                    .chunks_exact(4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect()
            }
            _ => vec![],
        };
        let sites = Arc::new(sites);
        self.lock_sites().insert(chrom.index, sites.clone());
        Ok(sites)
    }

    fn lock_sites(&self) -> std::sync::MutexGuard<'_, HashMap<i32, Arc<Vec<i32>>>> {
        self.fragment_sites.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records of one chromosome pair. They are materialized in memory when the estimated
    /// footprint fits under the configured ceiling, otherwise streamed from the blocks.
    pub fn contacts(
        &self,
        chr1: i32,
        chr2: i32,
        zoom: Zoom,
        norm: &NormalizationType,
    ) -> Result<Contacts<'_>> {
        let zd = self.matrix_zoom(chr1, chr2, zoom)?.ok_or_else(|| {
            HicError::InvalidQuery(format!("No matrix {}-{} at {}", chr1, chr2, zoom))
        })?;
        let ceiling = self.config().materialize_memory_ceiling;
        let fits = zd
            .estimated_records()
            .map(|records| estimate_footprint(zd.matrix_size(), records) <= ceiling);
        match fits {
            Ok(true) => match self.materialize(&zd, norm) {
                Ok(records) => return Ok(Contacts::Materialized(records)),
                Err(e) => log::warn!(
                    "Streaming {}-{} at {} instead of materializing: {}",
                    chr1,
                    chr2,
                    zoom,
                    e
                ),
            },
            Ok(false) => log::debug!("{}-{} at {} exceeds the memory ceiling", chr1, chr2, zoom),
            Err(e) => log::warn!(
                "Cannot estimate the size of {}-{} at {}: {}",
                chr1,
                chr2,
                zoom,
                e
            ),
        }
        Ok(Contacts::Direct {
            zoom: zd,
            norm: norm.clone(),
        })
    }

    fn materialize(
        &self,
        zd: &Arc<MatrixZoom>,
        norm: &NormalizationType,
    ) -> Result<MaterializedContacts> {
        let mut iter = zd.contacts(norm)?;
        let mut ret = MaterializedContacts::collect(
            iter.by_ref(),
            zd.matrix_size(),
            self.config().materialize_chunk_len,
        )?;
        ret.set_report(iter.report().clone());
        Ok(ret)
    }

    /// Records of every chromosome pair in genome-wide coordinates, materialized in
    /// parallel when the estimate fits under the memory ceiling
    pub fn genome_wide_contacts(
        &self,
        zoom: Zoom,
        norm: &NormalizationType,
        include_intra: bool,
    ) -> Result<Contacts<'_>> {
        let (pairs, matrix_size) = genome_wide_pairs(self, zoom, include_intra)?;
        let mut records = 0u64;
        let mut estimated = true;
        for pair in pairs.iter() {
            match self.matrix_zoom(pair.chr1, pair.chr2, zoom) {
                Ok(Some(zd)) => match zd.estimated_records() {
                    Ok(n) => records = records.saturating_add(n),
                    Err(_) => estimated = false,
                },
                Ok(None) => {}
                Err(_) => estimated = false,
            }
        }
        if estimated
            && estimate_footprint(matrix_size, records) <= self.config().materialize_memory_ceiling
        {
            match MaterializedContacts::genome_wide(self, zoom, norm, include_intra) {
                Ok(records) => return Ok(Contacts::Materialized(records)),
                Err(e) => log::warn!(
                    "Streaming genome-wide {} instead of materializing: {}",
                    zoom,
                    e
                ),
            }
        }
        Ok(Contacts::GenomeWide {
            dataset: self,
            zoom,
            norm: norm.clone(),
            include_intra,
            matrix_size,
        })
    }

    /// Drop every cached block, normalization vector and fragment-site table
    pub fn clear_cache(&self) {
        for matrix in self
            .matrices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
        {
            matrix.clear_cache();
        }
        self.shared.norms.clear();
        self.lock_sites().clear();
    }
}
