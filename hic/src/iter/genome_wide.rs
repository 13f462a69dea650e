use crate::block::ContactRecord;
use crate::dataset::Dataset;
use crate::error::{HicError, Result};
use crate::iter::DirectIterator;
use crate::loader::LoadReport;
use crate::norm::NormalizationType;
use crate::zoom::Zoom;

/// One chromosome pair of a genome-wide walk, with the offsets that move its local
/// bins into genome-wide coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChromPair {
    pub chr1: i32,
    pub chr2: i32,
    pub offset1: i32,
    pub offset2: i32,
}

impl ChromPair {
    /// Move a record into genome-wide coordinates, `None` when a bin overflows
    pub fn translate(&self, record: &ContactRecord) -> Option<ContactRecord> {
        Some(ContactRecord::new(
            record.bin_x.checked_add(self.offset1)?,
            record.bin_y.checked_add(self.offset2)?,
            record.counts,
        ))
    }
}

/// Chromosome pairs in visiting order: every pair with `chr1 < chr2`, plus the diagonal
/// pairs when `include_intra` is set. The whole-genome pseudo chromosome is skipped.
/// Returns the pairs and the number of genome-wide bins.
pub fn genome_wide_pairs(
    dataset: &Dataset,
    zoom: Zoom,
    include_intra: bool,
) -> Result<(Vec<ChromPair>, u64)> {
    let chroms: Vec<_> = dataset
        .chromosomes()
        .iter()
        .filter(|c| !c.is_all())
        .collect();
    let mut offsets = Vec::with_capacity(chroms.len());
    let mut total = 0u64;
    for chrom in chroms.iter() {
        let offset = i32::try_from(total).map_err(|_| {
            HicError::InvalidQuery(format!(
                "Genome-wide coordinates at {} overflow 32-bit bins",
                zoom
            ))
        })?;
        offsets.push(offset);
        total += dataset.bin_count(chrom, zoom);
    }
    if total > i32::MAX as u64 {
        return Err(HicError::InvalidQuery(format!(
            "Genome-wide coordinates at {} overflow 32-bit bins",
            zoom
        )));
    }

    let mut pairs = vec![];
    for (i, c1) in chroms.iter().enumerate() {
        for (j, c2) in chroms.iter().enumerate().skip(i) {
            if c1.index < c2.index || (c1.index == c2.index && include_intra) {
                pairs.push(ChromPair {
                    chr1: c1.index,
                    chr2: c2.index,
                    offset1: offsets[i],
                    offset2: offsets[j],
                });
            }
        }
    }
    Ok((pairs, total))
}

/// Chains the direct iterators of every chromosome pair, translating their records into
/// genome-wide coordinates. Pairs without a matrix at the zoom are skipped, and so are
/// records whose bins overflow; those are counted in `out_of_range`.
pub struct GenomeWideIterator<'a> {
    dataset: &'a Dataset,
    zoom: Zoom,
    norm: NormalizationType,
    pairs: std::vec::IntoIter<ChromPair>,
    current: Option<(ChromPair, DirectIterator)>,
    report: LoadReport,
    failed_pairs: usize,
}

impl<'a> GenomeWideIterator<'a> {
    pub fn new(
        dataset: &'a Dataset,
        zoom: Zoom,
        norm: NormalizationType,
        include_intra: bool,
    ) -> Result<Self> {
        let (pairs, _) = genome_wide_pairs(dataset, zoom, include_intra)?;
        Ok(Self {
            dataset,
            zoom,
            norm,
            pairs: pairs.into_iter(),
            current: None,
            report: LoadReport::default(),
            failed_pairs: 0,
        })
    }

    /// Statistics of the pairs finished so far
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn failed_blocks(&self) -> usize {
        self.report.failed + self.current.as_ref().map_or(0, |(_, it)| it.failed_blocks())
    }

    /// Chromosome pairs whose matrix could not be opened
    pub fn failed_pairs(&self) -> usize {
        self.failed_pairs
    }

    fn finish_current(&mut self) {
        if let Some((_, iter)) = self.current.take() {
            self.report.merge(iter.report());
        }
    }

    fn open_next(&mut self) -> bool {
        self.finish_current();
        for pair in self.pairs.by_ref() {
            let opened = self
                .dataset
                .matrix_zoom(pair.chr1, pair.chr2, self.zoom)
                .and_then(|zd| zd.map(|zd| zd.contacts(&self.norm)).transpose());
            match opened {
                Ok(Some(iter)) => {
                    self.current = Some((pair, iter));
                    return true;
                }
                Ok(None) => continue,
                Err(e) => {
                    log::warn!(
                        "Skipping chromosome pair {}-{} at {}: {}",
                        pair.chr1,
                        pair.chr2,
                        self.zoom,
                        e
                    );
                    self.failed_pairs += 1;
                }
            }
        }
        false
    }
}

impl<'a> Iterator for GenomeWideIterator<'a> {
    type Item = ContactRecord;

    fn next(&mut self) -> Option<ContactRecord> {
        loop {
            if let Some((pair, iter)) = self.current.as_mut() {
                if let Some(rec) = iter.next() {
                    match pair.translate(&rec) {
                        Some(rec) => return Some(rec),
                        None => {
                            self.report.out_of_range += 1;
                            continue;
                        }
                    }
                }
            }
            if !self.open_next() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::test_utils::{sample_builder, sample_records};

    fn open(version: i32) -> Dataset {
        Dataset::from_bytes("sample", sample_builder(version).build(), ReaderConfig::default())
            .unwrap()
    }

    #[test]
    fn test_pairs_and_offsets() {
        let dataset = open(9);
        let (pairs, total) = genome_wide_pairs(&dataset, Zoom::bp(1000), true).unwrap();
        assert_eq!(total, 11 + 6);
        let order: Vec<_> = pairs.iter().map(|p| (p.chr1, p.chr2)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 2)]);
        assert_eq!(pairs[1].offset1, 0);
        assert_eq!(pairs[1].offset2, 11);
        assert_eq!(pairs[2].offset1, 11);

        let (inter_only, _) = genome_wide_pairs(&dataset, Zoom::bp(1000), false).unwrap();
        assert_eq!(inter_only.len(), 1);
    }

    #[test]
    fn test_translate_rejects_overflow() {
        let pair = ChromPair {
            chr1: 1,
            chr2: 2,
            offset1: 0,
            offset2: 11,
        };
        let rec = pair.translate(&ContactRecord::new(3, 4, 1.0)).unwrap();
        assert_eq!((rec.bin_x, rec.bin_y), (3, 15));
        assert!(pair
            .translate(&ContactRecord::new(0, i32::MAX - 3, 1.0))
            .is_none());
    }

    #[test]
    fn test_genome_wide_records() {
        let dataset = open(8);
        let zoom = Zoom::bp(1000);
        let mut iter =
            GenomeWideIterator::new(&dataset, zoom, NormalizationType::none(), true).unwrap();
        let mut got: Vec<_> = iter.by_ref().map(|r| (r.bin_x, r.bin_y)).collect();
        got.sort_unstable();

        let mut expected = vec![];
        for (c1, c2, o1, o2) in [(1, 1, 0, 0), (1, 2, 0, 11), (2, 2, 11, 11)] {
            for r in sample_records(c1, c2, zoom) {
                expected.push((r.bin_x + o1, r.bin_y + o2));
            }
        }
        expected.sort_unstable();
        assert_eq!(got, expected);
        assert_eq!(iter.failed_blocks(), 0);
        assert_eq!(iter.failed_pairs(), 0);
        assert!(iter.report().is_complete());

        let inter: Vec<_> =
            GenomeWideIterator::new(&dataset, zoom, NormalizationType::none(), false)
                .unwrap()
                .collect();
        assert_eq!(inter.len(), sample_records(1, 2, zoom).len());
        assert!(inter.iter().all(|r| r.bin_y >= 11));
    }
}
