use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::error::HicError;

/// Coordinate unit of a resolution level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    /// Base pairs
    Bp,
    /// Restriction fragments
    Frag,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Bp => "BP",
            Unit::Frag => "FRAG",
        }
    }
}

impl FromStr for Unit {
    type Err = HicError;
    fn from_str(s: &str) -> Result<Self, HicError> {
        match s.to_ascii_uppercase().as_str() {
            "BP" => Ok(Unit::Bp),
            "FRAG" => Ok(Unit::Frag),
            _ => Err(HicError::Format(format!("Unknown unit {:?}", s))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolution level: unit plus bin size. Zooms order base pairs before fragments,
/// then finest to coarsest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zoom {
    pub unit: Unit,
    pub bin_size: i32,
}

impl Zoom {
    pub fn new(unit: Unit, bin_size: i32) -> Self {
        Self { unit, bin_size }
    }

    pub fn bp(bin_size: i32) -> Self {
        Self::new(Unit::Bp, bin_size)
    }

    pub fn frag(bin_size: i32) -> Self {
        Self::new(Unit::Frag, bin_size)
    }
}

impl PartialOrd for Zoom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Zoom {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.unit, self.bin_size).cmp(&(other.unit, other.bin_size))
    }
}

impl fmt::Display for Zoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit, self.bin_size)
    }
}
