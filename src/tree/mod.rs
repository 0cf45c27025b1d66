//! Tree Module
//!
//! In-memory, epoch-versioned key hierarchy.
//!
//! ## Responsibilities
//! - Per-container object index (find-or-create, ordered scan)
//! - Per-object dkey → akey → extent → epoch version chains
//! - Near-epoch selection for fetch
//! - Epoch-window visibility for iterators
//!
//! ## Data Structure Choice
//! Nested BTreeMaps behind one RwLock per object:
//! - Ordered keys give iterators a stable order to resume from
//! - A multi-extent update applies under a single write lock, so readers
//!   see either none or all of it
//! - Versions are never dropped; a punch is just a newer version

mod container;
mod object;

use bytes::Bytes;

pub use container::Container;
pub use object::{ObjectTree, VisibleRecx};

/// One stored version of an extent
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// `nr * rsize` bytes of payload
    Value { rsize: u64, data: Bytes },

    /// Punch: hides all older versions from its epoch onward
    Punch,
}

impl RecordValue {
    /// Bytes charged against the pool for this version
    pub fn payload_len(&self) -> u64 {
        match self {
            RecordValue::Value { data, .. } => data.len() as u64,
            RecordValue::Punch => 0,
        }
    }

    pub fn is_punch(&self) -> bool {
        matches!(self, RecordValue::Punch)
    }
}

/// A single extent write, as applied to an object tree
#[derive(Debug, Clone)]
pub struct ExtentWrite {
    pub akey: Vec<u8>,
    pub idx: u64,
    pub nr: u64,
    pub value: RecordValue,
}
