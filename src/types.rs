//! Key and extent types shared by every layer
//!
//! ```text
//! container ─▶ object ─▶ dkey ─▶ akey ─▶ recx (idx, nr) ─▶ { epoch → value }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Caller-assigned version stamp
pub type Epoch = u64;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque container token handed in by the lifecycle manager
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId([u8; 16]);

impl ContainerId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({:032x})", u128::from_be_bytes(self.0))
    }
}

/// Application-supplied object identifier
///
/// Only equality, ordering and hashing are ever applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub hi: u64,
    pub lo: u64,
}

impl ObjectId {
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}.{:016x}", self.hi, self.lo)
    }
}

// =============================================================================
// Epoch Range
// =============================================================================

/// Inclusive epoch window used by iterators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRange {
    pub lo: Epoch,
    pub hi: Epoch,
}

impl EpochRange {
    pub fn new(lo: Epoch, hi: Epoch) -> Self {
        Self { lo, hi }
    }

    /// Every epoch
    pub fn full() -> Self {
        Self { lo: 0, hi: Epoch::MAX }
    }

    /// Everything visible at `epoch`
    pub fn upto(epoch: Epoch) -> Self {
        Self { lo: 0, hi: epoch }
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        epoch >= self.lo && epoch <= self.hi
    }
}

impl Default for EpochRange {
    fn default() -> Self {
        Self::full()
    }
}

// =============================================================================
// Record Extents
// =============================================================================

/// Record extent: `nr` records of `rsize` bytes starting at record `idx`
///
/// `rsize == 0` is a punch. On fetch, `rsize == Recx::ANY_SIZE` asks the
/// engine to report the stored record size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recx {
    pub idx: u64,
    pub nr: u64,
    pub rsize: u64,
}

impl Recx {
    /// Sentinel record size for fetches of unknown size
    pub const ANY_SIZE: u64 = u64::MAX;

    pub fn new(idx: u64, nr: u64, rsize: u64) -> Self {
        Self { idx, nr, rsize }
    }

    /// Single-record extent
    pub fn single(idx: u64, rsize: u64) -> Self {
        Self { idx, nr: 1, rsize }
    }

    /// Fetch-side extent that learns the stored record size
    pub fn any(idx: u64, nr: u64) -> Self {
        Self { idx, nr, rsize: Self::ANY_SIZE }
    }

    pub fn is_punch(&self) -> bool {
        self.rsize == 0
    }

    /// Payload length in bytes (`nr * rsize`)
    pub fn payload_len(&self) -> Result<u64> {
        self.nr
            .checked_mul(self.rsize)
            .ok_or_else(|| KvError::invalid(format!("extent size overflow: {:?}", self)))
    }

    /// The index range that identifies this extent's version chain
    pub(crate) fn index(&self) -> RecxIndex {
        RecxIndex { idx: self.idx, nr: self.nr }
    }
}

/// Exact extent index range; keys a version chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecxIndex {
    pub idx: u64,
    pub nr: u64,
}

/// One (akey, extent) tuple of an update or fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoDesc {
    pub akey: Vec<u8>,
    pub recx: Recx,
}

impl IoDesc {
    pub fn new(akey: impl Into<Vec<u8>>, recx: Recx) -> Self {
        Self { akey: akey.into(), recx }
    }

    /// Checks shared by update and fetch descriptors
    pub(crate) fn validate(&self) -> Result<()> {
        if self.akey.is_empty() {
            return Err(KvError::invalid("empty akey"));
        }
        if self.recx.nr == 0 {
            return Err(KvError::invalid(format!("zero-length extent at idx {}", self.recx.idx)));
        }
        if self.recx.rsize != Recx::ANY_SIZE {
            self.recx.payload_len()?;
        }
        Ok(())
    }

    /// Payload length for an update; `ANY_SIZE` is only meaningful on fetch
    pub(crate) fn update_len(&self) -> Result<u64> {
        self.validate()?;
        if self.recx.rsize == Recx::ANY_SIZE {
            return Err(KvError::invalid("record size must be explicit on update"));
        }
        self.recx.payload_len()
    }
}

pub(crate) fn validate_dkey(dkey: &[u8]) -> Result<()> {
    if dkey.is_empty() {
        return Err(KvError::invalid("empty dkey"));
    }
    Ok(())
}
