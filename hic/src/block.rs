use serde_derive::{Deserialize, Serialize};

/// One observation between two bins
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub bin_x: i32,
    pub bin_y: i32,
    pub counts: f32,
}

impl ContactRecord {
    pub fn new(bin_x: i32, bin_y: i32, counts: f32) -> Self {
        Self {
            bin_x,
            bin_y,
            counts,
        }
    }

    /// The same observation mirrored across the diagonal
    pub fn reflected(&self) -> Self {
        Self {
            bin_x: self.bin_y,
            bin_y: self.bin_x,
            counts: self.counts,
        }
    }

    pub fn is_on_diagonal(&self) -> bool {
        self.bin_x == self.bin_y
    }

    pub fn is_upper_triangular(&self) -> bool {
        self.bin_x <= self.bin_y
    }
}

/// The decoded content of one stored block. An empty block stands for a block
/// that has no data, so that asking for it again costs no I/O.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    number: u32,
    records: Vec<ContactRecord>,
}

impl Block {
    pub fn new(number: u32, records: Vec<ContactRecord>) -> Self {
        Self { number, records }
    }

    pub fn empty(number: u32) -> Self {
        Self::new(number, vec![])
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn records(&self) -> &[ContactRecord] {
        self.records.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
