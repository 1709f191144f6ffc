//! Core machinery for alpha-entanglement coding over content-addressed
//! block storage.
//!
//! Glossary:
//!  - `strand`: one of the alpha parity sequences woven through the data;
//!    strand 0 runs horizontally, strands 1 and 2 are the right and left
//!    helices.
//!  - `chain`: a closed cycle of parity blocks along one strand that wraps
//!    around the lattice.
//!  - `wrap`: the edge that closes a chain by linking its last parity back
//!    to the first data block of that chain.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

pub mod block;
pub mod entangler;
pub mod geometry;
pub mod lattice;
pub mod recovery;
pub mod source;
pub mod xor;

pub use block::{BlockError, BlockNode, BlockStatus, CellId, RecoverPair};
pub use entangler::{EntangleError, EntangledBlock, Entangler};
pub use geometry::{Geometry, PositionClass};
pub use lattice::{Chunk, Lattice, LatticeGraph};
pub use recovery::RecoveryError;
pub use source::{BlockSource, FilteredSource, MemorySource, SourceError};

/// 1-based index of a block along the lattice. Geometry arithmetic may step
/// outside `[1, len]`; range checks happen at the lattice boundary.
pub type BlockIndex = i64;

/// Monotone token identifying one top-level recovery request.
pub type RequestId = u64;

/// Raw block payload.
pub type BlockData = Vec<u8>;

/// One of the alpha parity strands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Horizontal,
    Right,
    Left,
}

impl Strand {
    pub const ALL: [Strand; 3] = [Strand::Horizontal, Strand::Right, Strand::Left];

    /// The first `alpha` strands, in wire order.
    pub fn take(alpha: usize) -> impl Iterator<Item = Strand> {
        Self::ALL.into_iter().take(alpha)
    }

    pub fn from_index(index: usize) -> Option<Strand> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Horizontal => write!(f, "horizontal"),
            Strand::Right => write!(f, "right"),
            Strand::Left => write!(f, "left"),
        }
    }
}

/// Entanglement parameters, immutable per file.
///
/// `s` is the horizontal chain period, `p` the helical one. Alpha 1
/// degenerates to a single linear XOR chain with `s = 1, p = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntanglementParams {
    pub alpha: usize,
    pub s: usize,
    pub p: usize,
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("alpha {0} is not supported, expect 1 or 3")]
    UnsupportedAlpha(usize),

    #[error("expect s = 1 and p = 0 when alpha = 1, got s = {s} and p = {p}")]
    BadLinearPeriods { s: usize, p: usize },

    #[error("expect p >= s >= 1, got s = {s} and p = {p}")]
    BadHelicalPeriods { s: usize, p: usize },
}

impl EntanglementParams {
    pub fn new(alpha: usize, s: usize, p: usize) -> Result<Self, ParamError> {
        let params = Self { alpha, s, p };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        match self.alpha {
            1 if self.s != 1 || self.p != 0 => Err(ParamError::BadLinearPeriods {
                s: self.s,
                p: self.p,
            }),
            1 => Ok(()),
            3 if self.s < 1 || self.p < self.s => Err(ParamError::BadHelicalPeriods {
                s: self.s,
                p: self.p,
            }),
            3 => Ok(()),
            other => Err(ParamError::UnsupportedAlpha(other)),
        }
    }

    /// Width of the parity cache row for the given strand.
    pub fn cache_width(&self, strand: Strand) -> usize {
        match strand {
            Strand::Horizontal => self.s,
            _ => self.p,
        }
    }

    /// Size of one lattice window.
    pub fn window(&self) -> usize {
        self.s * self.p
    }
}
