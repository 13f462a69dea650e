use serde_derive::{Deserialize, Serialize};

/// Name of the synthetic whole-genome chromosome some containers store at index 0
pub const ALL_CHROM_NAME: &str = "All";

/// The information of a chromosome
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Chrom {
    /// Position in the container's chromosome dictionary
    pub index: i32,
    /// The human-readable name for this chromosome
    pub name: String,
    /// The size of current chromosome in base pairs
    pub size: u64,
}

impl Chrom {
    pub fn is_all(&self) -> bool {
        self.name.eq_ignore_ascii_case(ALL_CHROM_NAME)
    }

    /// Number of bins this chromosome spans at the given bin size
    pub fn bin_count(&self, bin_size: i32) -> u64 {
        if bin_size <= 0 {
            return 0;
        }
        self.size / bin_size as u64 + 1
    }
}
