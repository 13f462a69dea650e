//! Mapping between bin coordinates and block numbers.
//!
//! Two schemes exist. The grid scheme cuts the matrix into square tiles of
//! `block_bin_count` bins, numbered row-major with `block_column_count` columns.
//! The diagonal-band scheme (intra-chromosomal matrices from v9 on) numbers blocks by
//! their distance from the diagonal ("depth") and their position along it, so that
//! tiles near the diagonal, where contacts are dense, are small.
use std::collections::BTreeSet;

/// How the distance from the diagonal is turned into a depth
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DepthFunction {
    /// `floor(ln(1 + d) / ln(base))`
    Log { base: i32 },
    /// `floor(|d| / step)`
    Constant { step: i32 },
}

impl DepthFunction {
    /// Interpret the depth base attribute: above 1 is a log base, negative values
    /// are a constant step, anything else means log base 2.
    pub fn from_base(depth_base: i32) -> Self {
        if depth_base > 1 {
            DepthFunction::Log { base: depth_base }
        } else if depth_base < 0 {
            DepthFunction::Constant {
                step: depth_base.saturating_neg(),
            }
        } else {
            DepthFunction::Log { base: 2 }
        }
    }

    fn scale(&self, value: f64) -> i64 {
        match *self {
            DepthFunction::Log { base } => ((1.0 + value).ln() / (base as f64).ln()) as i64,
            DepthFunction::Constant { step } => (value / step as f64).abs() as i64,
        }
    }

    /// Depth of the bin pair `(x, y)`
    pub fn depth(&self, x: i64, y: i64, block_bin_count: i32) -> i64 {
        let distance = (x - y).abs() as f64 / std::f64::consts::SQRT_2 / block_bin_count as f64;
        self.scale(distance)
    }
}

/// Grid block number of the tile at `(row, col)`
pub fn encode_grid(row: i64, col: i64, block_column_count: i32) -> i64 {
    row * block_column_count as i64 + col
}

/// The `(row, col)` tile of a grid block number
pub fn decode_grid(number: i64, block_column_count: i32) -> (i64, i64) {
    let bcc = block_column_count as i64;
    (number / bcc, number % bcc)
}

/// Diagonal-band block number of the tile at `(depth, position along diagonal)`
pub fn encode_band(depth: i64, position: i64, block_column_count: i32) -> i64 {
    depth * block_column_count as i64 + position
}

/// The `(depth, position along diagonal)` tile of a diagonal-band block number
pub fn decode_band(number: i64, block_column_count: i32) -> (i64, i64) {
    let bcc = block_column_count as i64;
    (number / bcc, number % bcc)
}

/// The block numbering scheme of one matrix zoom
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlockAddressing {
    Grid {
        block_bin_count: i32,
        block_column_count: i32,
    },
    DiagonalBand {
        block_bin_count: i32,
        block_column_count: i32,
        depth: DepthFunction,
    },
}

fn push_number(set: &mut BTreeSet<u32>, number: i64) {
    if let Ok(n) = u32::try_from(number) {
        set.insert(n);
    }
}

impl BlockAddressing {
    pub fn block_bin_count(&self) -> i32 {
        match *self {
            BlockAddressing::Grid {
                block_bin_count, ..
            }
            | BlockAddressing::DiagonalBand {
                block_bin_count, ..
            } => block_bin_count,
        }
    }

    pub fn block_column_count(&self) -> i32 {
        match *self {
            BlockAddressing::Grid {
                block_column_count, ..
            }
            | BlockAddressing::DiagonalBand {
                block_column_count, ..
            } => block_column_count,
        }
    }

    /// The block that stores the bin pair `(x, y)`
    pub fn block_number_of(&self, x: i64, y: i64) -> i64 {
        match *self {
            BlockAddressing::Grid {
                block_bin_count,
                block_column_count,
            } => {
                let bbc = block_bin_count as i64;
                encode_grid(y / bbc, x / bbc, block_column_count)
            }
            BlockAddressing::DiagonalBand {
                block_bin_count,
                block_column_count,
                depth,
            } => {
                let position = (x + y) / 2 / block_bin_count as i64;
                let depth = depth.depth(x, y, block_bin_count);
                encode_band(depth, position, block_column_count)
            }
        }
    }

    /// All blocks that may hold records inside the inclusive rectangle
    /// `[x1, x2] x [y1, y2]`. The result can contain blocks that do not touch the
    /// rectangle, but never misses one that does. With `include_lower_mirror`, blocks
    /// holding the transposed rectangle are included as well (grid scheme only; the
    /// diagonal band is symmetric by construction).
    pub fn covering_blocks(
        &self,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        include_lower_mirror: bool,
    ) -> BTreeSet<u32> {
        let mut ret = BTreeSet::new();
        if self.block_bin_count() <= 0 || self.block_column_count() <= 0 {
            return ret;
        }
        let (x1, x2) = (x1.min(x2).max(0), x1.max(x2).max(0));
        let (y1, y2) = (y1.min(y2).max(0), y1.max(y2).max(0));
        match *self {
            BlockAddressing::Grid {
                block_bin_count,
                block_column_count,
            } => {
                let bbc = block_bin_count as i64;
                let (col1, col2) = (x1 / bbc, x2 / bbc);
                let (row1, row2) = (y1 / bbc, y2 / bbc);
                for r in row1..=row2 {
                    for c in col1..=col2 {
                        push_number(&mut ret, encode_grid(r, c, block_column_count));
                    }
                }
                if include_lower_mirror && y1 < x2 {
                    for r in row1..=row2 {
                        for c in col1..=col2 {
                            push_number(&mut ret, encode_grid(c, r, block_column_count));
                        }
                    }
                }
            }
            BlockAddressing::DiagonalBand {
                block_bin_count,
                block_column_count,
                depth,
            } => {
                let bbc = block_bin_count as i64;
                let lower_position = (x1 + y1) / 2 / bbc;
                let higher_position = (x2 + y2) / 2 / bbc + 1;
                let corner_a = depth.depth(x1, y2, block_bin_count);
                let corner_b = depth.depth(x2, y1, block_bin_count);
                let straddles_diagonal = x2 > y1 && x1 < y2;
                let nearer = if straddles_diagonal {
                    0
                } else {
                    corner_a.min(corner_b)
                };
                let further = corner_a.max(corner_b) + 1;
                for d in nearer..=further {
                    for p in lower_position..=higher_position {
                        push_number(&mut ret, encode_band(d, p, block_column_count));
                    }
                }
            }
        }
        ret
    }
}
