use crate::error::{HicError, Result};

pub const MIN_SUPPORTED_VERSION: i32 = 5;
pub const MAX_SUPPORTED_VERSION: i32 = 9;

/// The container format version. Every layout decision that changed between
/// versions is answered here, so the rest of the reader never compares raw numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion(i32);

impl FormatVersion {
    pub fn new(version: i32) -> Result<Self> {
        if (MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
            Ok(FormatVersion(version))
        } else {
            Err(HicError::UnsupportedVersion(version))
        }
    }

    pub fn number(&self) -> i32 {
        self.0
    }

    /// v7 introduced offset-relative records with per-block encodings
    pub fn has_block_encodings(&self) -> bool {
        self.0 >= 7
    }

    /// v9 blocks carry independent width flags for binX and binY
    pub fn has_bin_width_flags(&self) -> bool {
        self.0 > 8
    }

    /// v9 intra-chromosomal matrices use diagonal-band block addressing
    pub fn uses_diagonal_band(&self) -> bool {
        self.0 > 8
    }

    /// 64-bit lengths, counts and sizes instead of 32-bit ones
    pub fn has_wide_offsets(&self) -> bool {
        self.0 > 8
    }

    /// Vector elements are stored as f32 instead of f64
    pub fn has_float_vectors(&self) -> bool {
        self.0 > 8
    }

    /// The header stores the normalization-vector index location
    pub fn has_nvi_pointer(&self) -> bool {
        self.0 > 8
    }

    /// Normalized expected values and normalization vectors follow the footer
    pub fn has_normalized_footer(&self) -> bool {
        self.0 >= 6
    }

    /// Width in bytes of a stored vector element
    pub fn vector_element_width(&self) -> u64 {
        if self.has_float_vectors() {
            4
        } else {
            8
        }
    }

    /// Width in bytes of a stored length field
    pub fn length_width(&self) -> u64 {
        if self.has_wide_offsets() {
            8
        } else {
            4
        }
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
