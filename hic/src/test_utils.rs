//! Writers for synthetic containers used by the unit tests
use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::addressing::{BlockAddressing, DepthFunction};
use crate::block::ContactRecord;
use crate::header::{DEPTH_BASE_ATTRIBUTE, FILE_MAGIC_NUM};
use crate::version::FormatVersion;
use crate::zoom::Zoom;

/// Little-endian output buffer
#[derive(Default)]
struct Out(Vec<u8>);

impl Out {
    fn pos(&self) -> u64 {
        self.0.len() as u64
    }
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn cstr(&mut self, s: &str) {
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
    }
    fn length(&mut self, version: FormatVersion, v: i64) {
        if version.has_wide_offsets() {
            self.i64(v);
        } else {
            self.i32(v as i32);
        }
    }
    fn element(&mut self, version: FormatVersion, v: f64) {
        if version.has_float_vectors() {
            self.f32(v as f32);
        } else {
            self.f64(v);
        }
    }
    fn patch_i64(&mut self, at: u64, v: i64) {
        let at = at as usize;
        self.0[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }
    fn patch_length(&mut self, version: FormatVersion, at: u64, v: i64) {
        let at = at as usize;
        if version.has_wide_offsets() {
            self.0[at..at + 8].copy_from_slice(&v.to_le_bytes());
        } else {
            self.0[at..at + 4].copy_from_slice(&(v as i32).to_le_bytes());
        }
    }
}

fn zlib(payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    encoder.finish().unwrap()
}

/// Width flags of a rows payload
#[derive(Debug, Clone, Copy)]
pub struct RowEncoding {
    pub short_bin_x: bool,
    pub short_bin_y: bool,
    pub short_counts: bool,
}

fn write_block_header(
    out: &mut Out,
    version: FormatVersion,
    n_records: usize,
    x_offset: i32,
    y_offset: i32,
    enc: RowEncoding,
    block_type: u8,
) {
    out.i32(n_records as i32);
    out.i32(x_offset);
    out.i32(y_offset);
    out.u8(if enc.short_counts { 0 } else { 1 });
    if version.has_bin_width_flags() {
        out.u8(if enc.short_bin_x { 0 } else { 1 });
        out.u8(if enc.short_bin_y { 0 } else { 1 });
    }
    out.u8(block_type);
}

fn write_int(out: &mut Out, short: bool, v: i32) {
    if short {
        out.i16(v as i16);
    } else {
        out.i32(v);
    }
}

fn write_count(out: &mut Out, short: bool, v: Option<f32>) {
    match (short, v) {
        (true, Some(v)) => out.i16(v as i16),
        (true, None) => out.i16(i16::MIN),
        (false, Some(v)) => out.f32(v),
        (false, None) => out.f32(f32::NAN),
    }
}

/// Uncompressed pre-v7 payload
pub fn encode_triples(records: &[ContactRecord]) -> Vec<u8> {
    let mut out = Out::default();
    out.i32(records.len() as i32);
    for r in records {
        out.i32(r.bin_x);
        out.i32(r.bin_y);
        out.f32(r.counts);
    }
    out.0
}

/// Uncompressed rows payload. Before v9 bin coordinates are always short.
pub fn encode_rows(version: FormatVersion, records: &[ContactRecord], enc: RowEncoding) -> Vec<u8> {
    let enc = if version.has_bin_width_flags() {
        enc
    } else {
        RowEncoding {
            short_bin_x: true,
            short_bin_y: true,
            ..enc
        }
    };
    let x_offset = records.iter().map(|r| r.bin_x).min().unwrap_or(0);
    let y_offset = records.iter().map(|r| r.bin_y).min().unwrap_or(0);
    let mut rows: BTreeMap<i32, Vec<&ContactRecord>> = BTreeMap::new();
    for r in records {
        rows.entry(r.bin_y).or_default().push(r);
    }

    let mut out = Out::default();
    write_block_header(&mut out, version, records.len(), x_offset, y_offset, enc, 1);
    write_int(&mut out, enc.short_bin_y, rows.len() as i32);
    for (y, cols) in rows {
        write_int(&mut out, enc.short_bin_y, y - y_offset);
        write_int(&mut out, enc.short_bin_x, cols.len() as i32);
        for r in cols {
            write_int(&mut out, enc.short_bin_x, r.bin_x - x_offset);
            write_count(&mut out, enc.short_counts, Some(r.counts));
        }
    }
    out.0
}

/// Uncompressed dense payload: `cells[i]` lands at row `i / width`, column `i % width`
pub fn encode_dense(
    version: FormatVersion,
    x_offset: i32,
    y_offset: i32,
    width: i16,
    cells: &[Option<f32>],
    short_counts: bool,
) -> Vec<u8> {
    let enc = RowEncoding {
        short_bin_x: true,
        short_bin_y: true,
        short_counts,
    };
    let present = cells.iter().filter(|c| c.is_some()).count();
    let mut out = Out::default();
    write_block_header(&mut out, version, present, x_offset, y_offset, enc, 2);
    out.i32(cells.len() as i32);
    out.i16(width);
    for c in cells {
        write_count(&mut out, short_counts, *c);
    }
    out.0
}

/// Lay records of one block out as a dense grid
fn dense_from_records(version: FormatVersion, records: &[ContactRecord]) -> Vec<u8> {
    let x0 = records.iter().map(|r| r.bin_x).min().unwrap_or(0);
    let y0 = records.iter().map(|r| r.bin_y).min().unwrap_or(0);
    let x1 = records.iter().map(|r| r.bin_x).max().unwrap_or(0);
    let y1 = records.iter().map(|r| r.bin_y).max().unwrap_or(0);
    let width = (x1 - x0 + 1) as usize;
    let height = (y1 - y0 + 1) as usize;
    let mut cells = vec![None; width * height];
    for r in records {
        cells[(r.bin_y - y0) as usize * width + (r.bin_x - x0) as usize] = Some(r.counts);
    }
    encode_dense(version, x0, y0, width as i16, &cells, false)
}

/// Deliberately broken blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialBlock {
    /// The payload is not zlib data
    Corrupt,
    /// The index entry points past the end of the container
    Dangling,
    /// A dense payload whose type tag is unknown
    UnknownType,
}

struct ZoomSpec {
    zoom: Zoom,
    block_bin_count: i32,
    block_column_count: i32,
    records: Vec<ContactRecord>,
    special: Vec<(u32, SpecialBlock)>,
}

struct MatrixSpec {
    chr1: i32,
    chr2: i32,
    zooms: Vec<ZoomSpec>,
}

struct ExpectedSpec {
    norm: String,
    zoom: Zoom,
    values: Vec<f64>,
    factors: Vec<(i32, f64)>,
}

struct VectorSpec {
    norm: String,
    chr_idx: i32,
    zoom: Zoom,
    values: Vec<f64>,
}

/// Writes a complete container into memory
pub struct HicFileBuilder {
    version: FormatVersion,
    genome: String,
    attributes: Vec<(String, String)>,
    chroms: Vec<(String, u64)>,
    bp_resolutions: Vec<i32>,
    frag_resolutions: Vec<i32>,
    fragment_sites: Vec<Vec<i32>>,
    matrices: Vec<MatrixSpec>,
    expected: Vec<ExpectedSpec>,
    vectors: Vec<VectorSpec>,
    normalized_section: bool,
}

impl HicFileBuilder {
    pub fn new(version: i32) -> Self {
        Self {
            version: FormatVersion::new(version).unwrap(),
            genome: String::new(),
            attributes: vec![],
            chroms: vec![],
            bp_resolutions: vec![],
            frag_resolutions: vec![],
            fragment_sites: vec![],
            matrices: vec![],
            expected: vec![],
            vectors: vec![],
            normalized_section: true,
        }
    }

    /// Magic and version only
    pub fn raw_header_prefix(version: i32) -> Vec<u8> {
        let mut out = Out::default();
        out.0.extend_from_slice(FILE_MAGIC_NUM);
        out.i32(version);
        out.0
    }

    pub fn genome(mut self, id: &str) -> Self {
        self.genome = id.to_string();
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    pub fn chrom(mut self, name: &str, size: u64) -> Self {
        self.chroms.push((name.to_string(), size));
        self
    }

    pub fn resolutions(mut self, bp: &[i32], frag: &[i32]) -> Self {
        self.bp_resolutions = bp.to_vec();
        self.frag_resolutions = frag.to_vec();
        self
    }

    /// One site list per chromosome, in dictionary order
    pub fn fragment_sites(mut self, sites: Vec<Vec<i32>>) -> Self {
        self.fragment_sites = sites;
        self
    }

    fn zoom_spec(&mut self, chr1: i32, chr2: i32, zoom: Zoom) -> &mut ZoomSpec {
        let idx = match self
            .matrices
            .iter()
            .position(|m| m.chr1 == chr1 && m.chr2 == chr2)
        {
            Some(idx) => idx,
            None => {
                self.matrices.push(MatrixSpec {
                    chr1,
                    chr2,
                    zooms: vec![],
                });
                self.matrices.len() - 1
            }
        };
        let matrix = &mut self.matrices[idx];
        let zdx = match matrix.zooms.iter().position(|z| z.zoom == zoom) {
            Some(zdx) => zdx,
            None => {
                matrix.zooms.push(ZoomSpec {
                    zoom,
                    block_bin_count: 1,
                    block_column_count: 1,
                    records: vec![],
                    special: vec![],
                });
                matrix.zooms.len() - 1
            }
        };
        &mut matrix.zooms[zdx]
    }

    pub fn matrix(
        mut self,
        chr1: i32,
        chr2: i32,
        zoom: Zoom,
        block_bin_count: i32,
        block_column_count: i32,
        records: Vec<ContactRecord>,
    ) -> Self {
        let spec = self.zoom_spec(chr1, chr2, zoom);
        spec.block_bin_count = block_bin_count;
        spec.block_column_count = block_column_count;
        spec.records = records;
        self
    }

    pub fn special_block(
        mut self,
        chr1: i32,
        chr2: i32,
        zoom: Zoom,
        number: u32,
        kind: SpecialBlock,
    ) -> Self {
        self.zoom_spec(chr1, chr2, zoom).special.push((number, kind));
        self
    }

    pub fn expected(
        mut self,
        norm: &str,
        zoom: Zoom,
        values: Vec<f64>,
        factors: Vec<(i32, f64)>,
    ) -> Self {
        self.expected.push(ExpectedSpec {
            norm: norm.to_string(),
            zoom,
            values,
            factors,
        });
        self
    }

    pub fn vector(mut self, norm: &str, chr_idx: i32, zoom: Zoom, values: Vec<f64>) -> Self {
        self.vectors.push(VectorSpec {
            norm: norm.to_string(),
            chr_idx,
            zoom,
            values,
        });
        self
    }

    /// End the container right after the raw expected values
    pub fn without_normalized_section(mut self) -> Self {
        self.normalized_section = false;
        self
    }

    fn addressing(&self, chr1: i32, chr2: i32, spec: &ZoomSpec) -> BlockAddressing {
        if self.version.uses_diagonal_band() && chr1 == chr2 {
            let base = self
                .attributes
                .iter()
                .find(|(k, _)| k == DEPTH_BASE_ATTRIBUTE)
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(2);
            BlockAddressing::DiagonalBand {
                block_bin_count: spec.block_bin_count,
                block_column_count: spec.block_column_count,
                depth: DepthFunction::from_base(base),
            }
        } else {
            BlockAddressing::Grid {
                block_bin_count: spec.block_bin_count,
                block_column_count: spec.block_column_count,
            }
        }
    }

    fn encode_block(&self, number: u32, records: &[ContactRecord]) -> Vec<u8> {
        let version = self.version;
        let payload = if !version.has_block_encodings() {
            encode_triples(records)
        } else if number % 2 == 1 {
            dense_from_records(version, records)
        } else {
            let enc = RowEncoding {
                short_bin_x: number % 4 != 2,
                short_bin_y: true,
                short_counts: number % 3 != 0,
            };
            encode_rows(version, records, enc)
        };
        zlib(&payload)
    }

    fn encode_special(&self, kind: SpecialBlock) -> Vec<u8> {
        match kind {
            SpecialBlock::Corrupt | SpecialBlock::Dangling => b"definitely not zlib".to_vec(),
            SpecialBlock::UnknownType => {
                let mut payload = encode_dense(self.version, 0, 0, 1, &[Some(1.0)], false);
                let type_at = if self.version.has_bin_width_flags() { 15 } else { 13 };
                payload[type_at] = 9;
                zlib(&payload)
            }
        }
    }

    fn write_expected(&self, out: &mut Out, spec: &ExpectedSpec) {
        let version = self.version;
        out.cstr(spec.zoom.unit.as_str());
        out.i32(spec.zoom.bin_size);
        out.length(version, spec.values.len() as i64);
        for v in spec.values.iter() {
            out.element(version, *v);
        }
        out.i32(spec.factors.len() as i32);
        for (chr, f) in spec.factors.iter() {
            out.i32(*chr);
            out.element(version, *f);
        }
    }

    pub fn build(self) -> Vec<u8> {
        let version = self.version;
        let mut out = Out::default();

        out.0.extend_from_slice(FILE_MAGIC_NUM);
        out.i32(version.number());
        let master_at = out.pos();
        out.i64(0);
        out.cstr(&self.genome);
        let nvi_at = out.pos();
        if version.has_nvi_pointer() {
            out.i64(0);
            out.i64(0);
        }
        out.i32(self.attributes.len() as i32);
        for (k, v) in self.attributes.iter() {
            out.cstr(k);
            out.cstr(v);
        }
        out.i32(self.chroms.len() as i32);
        for (name, size) in self.chroms.iter() {
            out.cstr(name);
            out.length(version, *size as i64);
        }
        out.i32(self.bp_resolutions.len() as i32);
        for b in self.bp_resolutions.iter() {
            out.i32(*b);
        }
        out.i32(self.frag_resolutions.len() as i32);
        for b in self.frag_resolutions.iter() {
            out.i32(*b);
        }
        if !self.frag_resolutions.is_empty() {
            for idx in 0..self.chroms.len() {
                let sites = self.fragment_sites.get(idx).cloned().unwrap_or_default();
                out.i32(sites.len() as i32);
                for s in sites {
                    out.i32(s);
                }
            }
        }

        // Block payloads, remembering the index of every matrix zoom
        let mut indices: Vec<Vec<Vec<(u32, i64, i32)>>> = vec![];
        for matrix in self.matrices.iter() {
            let mut per_zoom = vec![];
            for spec in matrix.zooms.iter() {
                let addressing = self.addressing(matrix.chr1, matrix.chr2, spec);
                let mut blocks: BTreeMap<u32, Vec<ContactRecord>> = BTreeMap::new();
                for r in spec.records.iter() {
                    let number = addressing.block_number_of(r.bin_x as i64, r.bin_y as i64);
                    blocks.entry(number as u32).or_default().push(*r);
                }
                let mut entries = vec![];
                for (number, records) in blocks {
                    let bytes = self.encode_block(number, &records);
                    entries.push((number, out.pos() as i64, bytes.len() as i32));
                    out.0.extend_from_slice(&bytes);
                }
                for (number, kind) in spec.special.iter() {
                    let bytes = self.encode_special(*kind);
                    let position = if *kind == SpecialBlock::Dangling {
                        1 << 40
                    } else {
                        out.pos() as i64
                    };
                    entries.push((*number, position, bytes.len() as i32));
                    out.0.extend_from_slice(&bytes);
                }
                entries.sort_unstable();
                per_zoom.push(entries);
            }
            indices.push(per_zoom);
        }

        // Matrix records
        let mut master = vec![];
        for (matrix, per_zoom) in self.matrices.iter().zip(indices.iter()) {
            let start = out.pos();
            out.i32(matrix.chr1);
            out.i32(matrix.chr2);
            out.i32(matrix.zooms.len() as i32);
            for (idx, (spec, entries)) in matrix.zooms.iter().zip(per_zoom.iter()).enumerate() {
                out.cstr(spec.zoom.unit.as_str());
                out.i32(idx as i32);
                out.f32(spec.records.iter().map(|r| r.counts).sum());
                out.f32(spec.records.len() as f32);
                out.f32(0.0);
                out.f32(0.0);
                out.i32(spec.zoom.bin_size);
                out.i32(spec.block_bin_count);
                out.i32(spec.block_column_count);
                out.i32(entries.len() as i32);
                for (number, position, size) in entries.iter() {
                    out.i32(*number as i32);
                    out.i64(*position);
                    out.i32(*size);
                }
            }
            master.push((
                format!("{}_{}", matrix.chr1, matrix.chr2),
                start as i64,
                (out.pos() - start) as i32,
            ));
        }

        // Normalization vector blobs
        let mut vector_index = vec![];
        for spec in self.vectors.iter() {
            let start = out.pos();
            out.length(version, spec.values.len() as i64);
            for v in spec.values.iter() {
                out.element(version, *v);
            }
            vector_index.push((spec, start as i64, (out.pos() - start) as i64));
        }

        // Footer
        let master_index_position = out.pos();
        out.patch_i64(master_at, master_index_position as i64);
        let n_bytes_at = out.pos();
        out.length(version, 0);
        out.i32(master.len() as i32);
        for (key, position, size) in master.iter() {
            out.cstr(key);
            out.i64(*position);
            out.i32(*size);
        }
        let raw: Vec<_> = self.expected.iter().filter(|e| e.norm == "NONE").collect();
        out.i32(raw.len() as i32);
        for spec in raw {
            self.write_expected(&mut out, spec);
        }
        let n_bytes = out.pos() - master_index_position - version.length_width();
        out.patch_length(version, n_bytes_at, n_bytes as i64);

        if self.normalized_section && version.has_normalized_footer() {
            let normalized: Vec<_> = self.expected.iter().filter(|e| e.norm != "NONE").collect();
            out.i32(normalized.len() as i32);
            for spec in normalized {
                out.cstr(&spec.norm);
                self.write_expected(&mut out, spec);
            }
            let nvi_start = out.pos();
            out.i32(vector_index.len() as i32);
            for (spec, position, size) in vector_index {
                out.cstr(&spec.norm);
                out.i32(spec.chr_idx);
                out.cstr(spec.zoom.unit.as_str());
                out.i32(spec.zoom.bin_size);
                out.i64(position);
                out.length(version, size);
            }
            if version.has_nvi_pointer() {
                let nvi_len = out.pos() - nvi_start;
                out.patch_i64(nvi_at, nvi_start as i64);
                out.patch_i64(nvi_at + 8, nvi_len as i64);
            }
        }
        out.0
    }
}

pub const SAMPLE_CHROMS: [(&str, u64); 3] = [("All", 15), ("chr1", 10_000), ("chr2", 5_000)];

fn sample_bins(chr: i32, zoom: Zoom) -> i32 {
    (SAMPLE_CHROMS[chr as usize].1 / zoom.bin_size as u64) as i32 + 1
}

/// The raw records stored in the sample container for a matrix zoom
pub fn sample_records(chr1: i32, chr2: i32, zoom: Zoom) -> Vec<ContactRecord> {
    let (n1, n2) = (sample_bins(chr1, zoom), sample_bins(chr2, zoom));
    let mut ret = vec![];
    for x in 0..n1 {
        for y in 0..n2 {
            let keep = if chr1 == chr2 {
                x <= y && (x == y || (x * 7 + y * 3) % 5 == 0)
            } else {
                (x + 2 * y) % 7 == 0
            };
            if keep {
                ret.push(ContactRecord::new(x, y, (x + y + 1) as f32));
            }
        }
    }
    ret
}

/// The normalization vectors stored in the sample container
pub fn sample_vector(norm: &str, chr: i32, zoom: Zoom) -> Option<Vec<f64>> {
    let n = sample_bins(chr, zoom) as usize;
    match (norm, chr, zoom.bin_size) {
        ("KR", 1..=2, 1000) | ("KR", 1..=2, 100) => Some(
            (0..n)
                .map(|i| {
                    if chr == 1 && zoom.bin_size == 1000 && i == 7 {
                        f64::NAN
                    } else {
                        1.0 + (i % 3) as f64 * 0.5
                    }
                })
                .collect(),
        ),
        ("VC", 1..=2, 1000) => Some((0..n).map(|i| ((i % 4 + 1) * (i % 4 + 1)) as f64).collect()),
        ("SCALE", 1, 1000) => Some(vec![f64::NAN; n]),
        _ => None,
    }
}

/// The raw expected values stored for a zoom
pub fn sample_expected(zoom: Zoom) -> Vec<f64> {
    let n = sample_bins(1, zoom);
    (0..n).map(|d| 64.0 / (d + 1) as f64).collect()
}

/// Three chromosomes, two base-pair resolutions, one fragment resolution, every
/// matrix at both base-pair resolutions, expected values and normalization vectors
pub fn sample_builder(version: i32) -> HicFileBuilder {
    let mut builder = HicFileBuilder::new(version).genome("hg_test");
    for (name, size) in SAMPLE_CHROMS.iter() {
        builder = builder.chrom(name, *size);
    }
    builder = builder
        .resolutions(&[1000, 100], &[1])
        .fragment_sites(vec![vec![], vec![100, 2500, 5000, 9000], vec![1200, 4000]])
        .matrix(0, 0, Zoom::bp(1000), 4, 1, vec![ContactRecord::new(0, 0, 5.0)]);

    for &(chr1, chr2) in &[(1, 1), (1, 2), (2, 2)] {
        builder = builder
            .matrix(chr1, chr2, Zoom::bp(1000), 4, 3, sample_records(chr1, chr2, Zoom::bp(1000)))
            .matrix(chr1, chr2, Zoom::bp(100), 16, 7, sample_records(chr1, chr2, Zoom::bp(100)));
    }

    for zoom in [Zoom::bp(1000), Zoom::bp(100)] {
        builder = builder.expected("NONE", zoom, sample_expected(zoom), vec![(1, 2.0), (2, 1.0)]);
    }
    builder = builder.expected(
        "KR",
        Zoom::bp(1000),
        sample_expected(Zoom::bp(1000)),
        vec![(1, 1.0), (2, 4.0)],
    );

    for &(norm, chr, zoom) in &[
        ("KR", 1, Zoom::bp(1000)),
        ("KR", 2, Zoom::bp(1000)),
        ("KR", 1, Zoom::bp(100)),
        ("KR", 2, Zoom::bp(100)),
        ("VC", 1, Zoom::bp(1000)),
        ("VC", 2, Zoom::bp(1000)),
        ("SCALE", 1, Zoom::bp(1000)),
    ] {
        if let Some(values) = sample_vector(norm, chr, zoom) {
            builder = builder.vector(norm, chr, zoom, values);
        }
    }
    builder
}
