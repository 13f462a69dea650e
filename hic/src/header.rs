use std::collections::BTreeMap;
use std::io::{Read, Seek};

use hic_io::LeStream;

use crate::chrom::Chrom;
use crate::context::read_length;
use crate::error::{HicError, Result};
use crate::version::FormatVersion;
use crate::zoom::{Unit, Zoom};

pub const FILE_MAGIC_NUM: &[u8; 4] = b"HIC\0";

/// Attribute selecting the depth function of diagonal-band addressing
pub const DEPTH_BASE_ATTRIBUTE: &str = "v9-depth-base";

const DEFAULT_DEPTH_BASE: i32 = 2;

/// Where the restriction-site table of one chromosome is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentSiteIndex {
    pub position: u64,
    pub count: u32,
}

/// Everything stored in front of the matrices
#[derive(Debug, Clone)]
pub struct Header {
    pub version: FormatVersion,
    pub master_index_position: u64,
    pub genome_id: String,
    /// Position and length of the normalization vector index (v9+)
    pub nvi: Option<(u64, u64)>,
    pub attributes: BTreeMap<String, String>,
    pub chrom_list: Vec<Chrom>,
    pub bp_resolutions: Vec<i32>,
    pub frag_resolutions: Vec<i32>,
    /// Indexed by chromosome position in `chrom_list`
    pub fragment_sites: Vec<FragmentSiteIndex>,
}

pub(crate) fn validate_header<R: Read>(stream: &mut LeStream<R>) -> Result<FormatVersion> {
    let mut signature = [0u8; 4];
    stream
        .read_exact(&mut signature)
        .map_err(|e| HicError::from_metadata_io("header", e))?;
    if &signature != FILE_MAGIC_NUM {
        return Err(HicError::Format("Invalid .hic file magic number".to_string()));
    }
    let version = stream
        .read_i32()
        .map_err(|e| HicError::from_metadata_io("header", e))?;
    FormatVersion::new(version)
}

fn to_u64(value: i64, what: &str) -> std::io::Result<u64> {
    u64::try_from(value).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("negative {}: {}", what, value),
        )
    })
}

fn read_count<R: Read>(stream: &mut LeStream<R>, what: &str) -> std::io::Result<usize> {
    Ok(to_u64(stream.read_i32()? as i64, what)? as usize)
}

impl Header {
    /// Parse the header from a stream positioned at the beginning of the container
    pub fn read<R: Read + Seek>(stream: &mut LeStream<R>) -> Result<Self> {
        let version = validate_header(stream)?;
        Self::read_body(stream, version).map_err(|e| HicError::from_metadata_io("header", e))
    }

    fn read_body<R: Read + Seek>(
        stream: &mut LeStream<R>,
        version: FormatVersion,
    ) -> std::io::Result<Self> {
        let master_index_position = to_u64(stream.read_i64()?, "master index position")?;
        let genome_id = stream.read_cstring()?;

        let nvi = if version.has_nvi_pointer() {
            let position = to_u64(stream.read_i64()?, "nvi position")?;
            let length = to_u64(stream.read_i64()?, "nvi length")?;
            Some((position, length))
        } else {
            None
        };

        let mut attributes = BTreeMap::new();
        for _ in 0..read_count(stream, "attribute count")? {
            let key = stream.read_cstring()?;
            let value = stream.read_cstring()?;
            attributes.insert(key, value);
        }

        let n_chroms = read_count(stream, "chromosome count")?;
        let mut chrom_list = Vec::with_capacity(n_chroms.min(4096));
        for index in 0..n_chroms {
            let name = stream.read_cstring()?;
            let size = to_u64(read_length(stream, version)?, "chromosome length")?;
            chrom_list.push(Chrom {
                index: index as i32,
                name,
                size,
            });
        }

        let mut bp_resolutions = vec![];
        for _ in 0..read_count(stream, "resolution count")? {
            bp_resolutions.push(stream.read_i32()?);
        }
        let mut frag_resolutions = vec![];
        for _ in 0..read_count(stream, "resolution count")? {
            frag_resolutions.push(stream.read_i32()?);
        }

        let mut fragment_sites = vec![];
        if !frag_resolutions.is_empty() {
            for _ in 0..chrom_list.len() {
                let count = read_count(stream, "site count")? as u32;
                fragment_sites.push(FragmentSiteIndex {
                    position: stream.position(),
                    count,
                });
                stream.skip(count as u64 * 4)?;
            }
        }

        log::debug!(
            "Parsed {} header: {} chromosomes, {} bp and {} fragment resolutions",
            version,
            chrom_list.len(),
            bp_resolutions.len(),
            frag_resolutions.len()
        );

        Ok(Header {
            version,
            master_index_position,
            genome_id,
            nvi,
            attributes,
            chrom_list,
            bp_resolutions,
            frag_resolutions,
            fragment_sites,
        })
    }

    pub fn chrom_list(&self) -> &[Chrom] {
        self.chrom_list.as_ref()
    }

    pub fn chrom_by_name(&self, name: &str) -> Option<&Chrom> {
        self.chrom_list.iter().find(|c| c.name == name)
    }

    pub fn chrom_by_index(&self, index: i32) -> Option<&Chrom> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.chrom_list.get(idx))
    }

    /// All resolution levels, finest base-pair zoom first
    pub fn zooms(&self) -> Vec<Zoom> {
        let mut ret: Vec<_> = self
            .bp_resolutions
            .iter()
            .map(|&b| Zoom::bp(b))
            .chain(self.frag_resolutions.iter().map(|&b| Zoom::frag(b)))
            .collect();
        ret.sort();
        ret
    }

    /// Number of bins a chromosome spans at a zoom: base pairs for BP zooms,
    /// restriction fragments for FRAG zooms
    pub fn bin_count(&self, chrom: &Chrom, zoom: Zoom) -> u64 {
        if zoom.bin_size <= 0 {
            return 0;
        }
        match zoom.unit {
            Unit::Bp => chrom.bin_count(zoom.bin_size),
            Unit::Frag => {
                let sites = usize::try_from(chrom.index)
                    .ok()
                    .and_then(|idx| self.fragment_sites.get(idx))
                    .map_or(0, |s| s.count as u64);
                sites / zoom.bin_size as u64 + 1
            }
        }
    }

    /// The depth base used by diagonal-band addressing.
    /// A missing or unparsable attribute falls back to base 2.
    pub fn depth_base(&self) -> i32 {
        self.attributes
            .get(DEPTH_BASE_ATTRIBUTE)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_DEPTH_BASE)
    }
}
