use hic_io::LeStream;

use crate::block::{Block, ContactRecord};
use crate::error::{HicError, Result};
use crate::version::FormatVersion;

/// Short-encoded counts equal to this are placeholders for missing cells
pub const SHORT_COUNT_SENTINEL: i16 = i16::MIN;

/// Width of a stored bin coordinate or count field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntWidth {
    Short,
    Int,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountWidth {
    Short,
    Float,
}

/// The encoding of one block payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLayout {
    /// Pre-v7: absolute `(i32 x, i32 y, f32 counts)` triples
    Triples,
    /// List of rows; `row` is the width of the row count and row offsets,
    /// `col` the width of the column counts and column offsets
    Rows {
        row: IntWidth,
        col: IntWidth,
        counts: CountWidth,
    },
    /// Dense grid of `n` points with a fixed row width
    Dense { counts: CountWidth },
}

/// The per-block flags stored in front of a v7+ payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingFlags {
    pub short_counts: bool,
    pub short_bin_x: bool,
    pub short_bin_y: bool,
    pub block_type: u8,
}

pub const BLOCK_TYPE_ROWS: u8 = 1;
pub const BLOCK_TYPE_DENSE: u8 = 2;

fn width(short: bool) -> IntWidth {
    if short {
        IntWidth::Short
    } else {
        IntWidth::Int
    }
}

impl RecordLayout {
    /// The decode dispatch table, keyed on version, block type and width flags.
    /// Pre-v7 payloads carry no flags. `None` means the block type is unknown.
    pub fn select(version: FormatVersion, flags: Option<&EncodingFlags>) -> Option<Self> {
        let flags = match (version.has_block_encodings(), flags) {
            (false, _) => return Some(RecordLayout::Triples),
            (true, None) => return None,
            (true, Some(flags)) => flags,
        };
        let counts = if flags.short_counts {
            CountWidth::Short
        } else {
            CountWidth::Float
        };
        match flags.block_type {
            BLOCK_TYPE_ROWS => Some(RecordLayout::Rows {
                row: width(flags.short_bin_y),
                col: width(flags.short_bin_x),
                counts,
            }),
            BLOCK_TYPE_DENSE => Some(RecordLayout::Dense { counts }),
            _ => None,
        }
    }
}

struct PayloadReader<'a> {
    stream: LeStream<&'a [u8]>,
    block: u32,
}

impl<'a> PayloadReader<'a> {
    fn map<T>(&self, r: std::io::Result<T>) -> Result<T> {
        r.map_err(|e| HicError::from_payload_io(self.block, e))
    }

    fn u8(&mut self) -> Result<u8> {
        let r = self.stream.read_u8();
        self.map(r)
    }

    fn i32(&mut self) -> Result<i32> {
        let r = self.stream.read_i32();
        self.map(r)
    }

    fn int(&mut self, width: IntWidth) -> Result<i32> {
        let r = match width {
            IntWidth::Short => self.stream.read_i16().map(i32::from),
            IntWidth::Int => self.stream.read_i32(),
        };
        self.map(r)
    }

    /// Read a count, `None` for the missing-cell placeholders. A NaN float only marks a
    /// missing cell in dense grids.
    fn counts(&mut self, width: CountWidth, nan_is_missing: bool) -> Result<Option<f32>> {
        match width {
            CountWidth::Short => {
                let r = self.stream.read_i16();
                let v = self.map(r)?;
                Ok(if v == SHORT_COUNT_SENTINEL {
                    None
                } else {
                    Some(v as f32)
                })
            }
            CountWidth::Float => {
                let r = self.stream.read_f32();
                let v = self.map(r)?;
                Ok(if nan_is_missing && v.is_nan() { None } else { Some(v) })
            }
        }
    }

    fn count_field(&mut self, width: IntWidth, what: &str) -> Result<usize> {
        let n = self.int(width)?;
        usize::try_from(n)
            .map_err(|_| HicError::decode(Some(self.block), format!("negative {} {}", what, n)))
    }

    fn consumed(&self) -> usize {
        self.stream.position() as usize
    }
}

/// Decode the decompressed payload of block `number`
pub fn decode_block(version: FormatVersion, number: u32, payload: &[u8]) -> Result<Block> {
    let mut reader = PayloadReader {
        stream: LeStream::new(payload, 0),
        block: number,
    };
    let n_records = reader.count_field(IntWidth::Int, "record count")?;
    // The declared count is only a hint; never trust it for allocation beyond the payload
    let mut records = Vec::with_capacity(n_records.min(payload.len() / 4));

    let (x_offset, y_offset, flags) = if version.has_block_encodings() {
        let x_offset = reader.i32()?;
        let y_offset = reader.i32()?;
        let short_counts = reader.u8()? == 0;
        let (short_bin_x, short_bin_y) = if version.has_bin_width_flags() {
            (reader.u8()? == 0, reader.u8()? == 0)
        } else {
            (true, true)
        };
        let flags = EncodingFlags {
            short_counts,
            short_bin_x,
            short_bin_y,
            block_type: reader.u8()?,
        };
        (x_offset, y_offset, Some(flags))
    } else {
        (0, 0, None)
    };

    match RecordLayout::select(version, flags.as_ref()) {
        Some(RecordLayout::Triples) => {
            for _ in 0..n_records {
                let x = reader.i32()?;
                let y = reader.i32()?;
                let r = reader.stream.read_f32();
                let counts = reader.map(r)?;
                records.push(ContactRecord::new(x, y, counts));
            }
        }
        Some(RecordLayout::Rows { row, col, counts }) => {
            let row_count = reader.count_field(row, "row count")?;
            for _ in 0..row_count {
                let y = y_offset.wrapping_add(reader.int(row)?);
                let col_count = reader.count_field(col, "column count")?;
                for _ in 0..col_count {
                    let x = x_offset.wrapping_add(reader.int(col)?);
                    if let Some(c) = reader.counts(counts, false)? {
                        records.push(ContactRecord::new(x, y, c));
                    }
                }
            }
        }
        Some(RecordLayout::Dense { counts }) => {
            let n_points = reader.count_field(IntWidth::Int, "point count")?;
            let w = reader.int(IntWidth::Short)?;
            if w <= 0 && n_points > 0 {
                return Err(HicError::decode(
                    Some(number),
                    format!("invalid dense row width {}", w),
                ));
            }
            for i in 0..n_points {
                let row = (i / w as usize) as i32;
                let col = (i % w as usize) as i32;
                if let Some(c) = reader.counts(counts, true)? {
                    records.push(ContactRecord::new(
                        x_offset.wrapping_add(col),
                        y_offset.wrapping_add(row),
                        c,
                    ));
                }
            }
        }
        None => {
            return Err(HicError::decode(
                Some(number),
                format!(
                    "unknown block type {}",
                    flags.map(|f| f.block_type).unwrap_or_default()
                ),
            ));
        }
    }

    if reader.consumed() < payload.len() {
        log::debug!(
            "Block {} has {} trailing bytes",
            number,
            payload.len() - reader.consumed()
        );
    }
    Ok(Block::new(number, records))
}
