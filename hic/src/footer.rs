use std::collections::HashMap;
use std::io::{ErrorKind, Read, Seek};

use hic_io::LeStream;

use crate::error::{HicError, Result};
use crate::expected::ExpectedValues;
use crate::index::IndexEntry;
use crate::norm::{NormVectorKey, NormalizationType};
use crate::version::FormatVersion;
use crate::zoom::{Unit, Zoom};

/// The metadata stored behind the matrices: where each chromosome pair lives,
/// the expected-value tables and the normalization vector index.
pub struct Footer {
    pub master_index: HashMap<String, IndexEntry>,
    /// Where the normalized expected values start (v6+)
    pub norm_vector_file_position: u64,
    pub expected: Vec<ExpectedValues>,
    pub norm_vector_index: HashMap<NormVectorKey, IndexEntry>,
}

/// Key of a chromosome pair in the master index; the smaller index comes first
pub fn matrix_key(chr1: i32, chr2: i32) -> String {
    let (a, b) = if chr1 <= chr2 { (chr1, chr2) } else { (chr2, chr1) };
    format!("{}_{}", a, b)
}

fn io_err<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> std::io::Error {
    std::io::Error::new(ErrorKind::InvalidData, e)
}

fn to_u64(value: i64, what: &str) -> std::io::Result<u64> {
    u64::try_from(value).map_err(|_| io_err(format!("negative {}: {}", what, value)))
}

fn read_wide<R: Read>(stream: &mut LeStream<R>, version: FormatVersion) -> std::io::Result<i64> {
    crate::context::read_length(stream, version)
}

impl Footer {
    /// Parse the footer from a stream positioned at the master index
    pub fn read<R: Read + Seek>(
        stream: &mut LeStream<R>,
        version: FormatVersion,
        stream_min_bin_size: i32,
    ) -> Result<Self> {
        let master_position = stream.position();
        let (norm_vector_file_position, master_index) = Self::read_master_index(
            stream,
            version,
            master_position,
        )
        .map_err(|e| HicError::from_metadata_io("master index", e))?;

        let mut expected = vec![];
        let n_expected = stream
            .read_i32()
            .map_err(|e| HicError::from_metadata_io("expected value table", e))?;
        for _ in 0..n_expected.max(0) {
            expected.push(ExpectedValues::read(
                stream,
                NormalizationType::none(),
                version,
                stream_min_bin_size,
            )?);
        }

        let mut footer = Footer {
            master_index,
            norm_vector_file_position,
            expected,
            norm_vector_index: HashMap::new(),
        };

        if version.has_normalized_footer() {
            footer.read_normalized(stream, version, stream_min_bin_size)?;
        }

        log::debug!(
            "Parsed footer: {} matrices, {} expected tables, {} normalization vectors",
            footer.master_index.len(),
            footer.expected.len(),
            footer.norm_vector_index.len()
        );
        Ok(footer)
    }

    fn read_master_index<R: Read>(
        stream: &mut LeStream<R>,
        version: FormatVersion,
        master_position: u64,
    ) -> std::io::Result<(u64, HashMap<String, IndexEntry>)> {
        let n_bytes = to_u64(read_wide(stream, version)?, "footer size")?;
        let norm_vector_file_position = master_position + n_bytes + version.length_width();

        let n_entries = stream.read_i32()?;
        let mut master_index = HashMap::with_capacity(n_entries.clamp(0, 1 << 16) as usize);
        for _ in 0..n_entries.max(0) {
            let key = stream.read_cstring()?;
            let position = to_u64(stream.read_i64()?, "matrix position")?;
            let size = to_u64(stream.read_i32()? as i64, "matrix size")?;
            master_index.insert(key, IndexEntry::new(position, size));
        }
        Ok((norm_vector_file_position, master_index))
    }

    fn read_normalized<R: Read + Seek>(
        &mut self,
        stream: &mut LeStream<R>,
        version: FormatVersion,
        stream_min_bin_size: i32,
    ) -> Result<()> {
        stream.seek_to(self.norm_vector_file_position)?;
        let n_norm_expected = match stream.read_i32() {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                log::info!("Container has no normalization vectors");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        for _ in 0..n_norm_expected.max(0) {
            let norm = stream
                .read_cstring()
                .map_err(|e| HicError::from_metadata_io("expected value table", e))?;
            self.expected.push(ExpectedValues::read(
                stream,
                NormalizationType::new(norm),
                version,
                stream_min_bin_size,
            )?);
        }
        self.read_norm_vector_index(stream, version)
            .map_err(|e| HicError::from_metadata_io("normalization vector index", e))
    }

    fn read_norm_vector_index<R: Read>(
        &mut self,
        stream: &mut LeStream<R>,
        version: FormatVersion,
    ) -> std::io::Result<()> {
        let n_vectors = stream.read_i32()?;
        for _ in 0..n_vectors.max(0) {
            let norm = NormalizationType::new(stream.read_cstring()?);
            let chr_idx = stream.read_i32()?;
            let unit: Unit = stream
                .read_cstring()?
                .parse()
                .map_err(|e: HicError| io_err(e.to_string()))?;
            let bin_size = stream.read_i32()?;
            let position = to_u64(stream.read_i64()?, "vector position")?;
            let size = to_u64(read_wide(stream, version)?, "vector size")?;
            self.norm_vector_index.insert(
                NormVectorKey {
                    norm,
                    chr_idx,
                    zoom: Zoom::new(unit, bin_size),
                },
                IndexEntry::new(position, size),
            );
        }
        Ok(())
    }

    pub fn expected_values(&self, zoom: Zoom, norm: &NormalizationType) -> Option<&ExpectedValues> {
        self.expected
            .iter()
            .find(|e| e.zoom == zoom && &e.norm == norm)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::Header;
    use crate::test_utils::sample_builder;
    use std::io::Cursor;

    fn parse(version: i32) -> Footer {
        let bytes = sample_builder(version).build();
        let mut stream = LeStream::new(Cursor::new(bytes), 0);
        let header = Header::read(&mut stream).unwrap();
        stream.seek_to(header.master_index_position).unwrap();
        Footer::read(&mut stream, header.version, 500).unwrap()
    }

    #[test]
    fn test_matrix_key() {
        assert_eq!(matrix_key(2, 1), "1_2");
        assert_eq!(matrix_key(1, 1), "1_1");
    }

    #[test]
    fn test_parse_footer() {
        for version in [6, 8, 9] {
            let footer = parse(version);
            assert!(footer.master_index.contains_key("1_1"));
            assert!(footer.master_index.contains_key("1_2"));
            assert!(footer.master_index.contains_key("2_2"));

            let none = footer
                .expected_values(Zoom::bp(1000), &NormalizationType::none())
                .unwrap();
            assert!(!none.is_streamed());
            assert_eq!(none.normalization_factor(1), Some(2.0));
            let fine = footer
                .expected_values(Zoom::bp(100), &NormalizationType::none())
                .unwrap();
            assert!(fine.is_streamed());
            assert!(footer
                .expected_values(Zoom::bp(1000), &NormalizationType::kr())
                .is_some());

            let key = NormVectorKey {
                norm: NormalizationType::kr(),
                chr_idx: 1,
                zoom: Zoom::bp(1000),
            };
            assert!(footer.norm_vector_index.contains_key(&key));
        }
    }

    #[test]
    fn test_footer_without_normalization_section() {
        let bytes = sample_builder(8).without_normalized_section().build();
        let mut stream = LeStream::new(Cursor::new(bytes), 0);
        let header = Header::read(&mut stream).unwrap();
        stream.seek_to(header.master_index_position).unwrap();
        let footer = Footer::read(&mut stream, header.version, 500).unwrap();
        assert!(footer.norm_vector_index.is_empty());
        assert!(footer
            .expected_values(Zoom::bp(1000), &NormalizationType::none())
            .is_some());
    }
}
