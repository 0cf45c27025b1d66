//! Iterator Module
//!
//! Resumable cursors over the key hierarchy.
//!
//! ## Cursor kinds
//! ```text
//! Object  scope: container                          yields object ids
//! Dkey    scope: container + object                 yields dkeys
//! Akey    scope: container + object + dkey          yields akeys
//! Recx    scope: container + object + dkey + akey   yields live extents
//! ```
//! All four share one protocol: `probe` → (`fetch` → `next`)* → `finish`.
//! Nesting is up to the caller: walk dkeys, prepare an akey cursor for
//! each, and so on.
//!
//! ## Visibility
//! Dkey/akey/recx cursors only see extents whose newest version inside the
//! cursor's epoch window is a value (not a punch). Objects are unfiltered.
//!
//! ## Anchors
//! `fetch` returns an [`Anchor`] naming the entry it returned. Probing a
//! fresh cursor with that anchor lands on the same entry, or on the next
//! one if it has since disappeared.

mod anchor;
mod cursor;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{ContainerId, Epoch, EpochRange, ObjectId, Recx};

pub use anchor::Anchor;
pub use cursor::Cursor;

pub(crate) use cursor::Scope;

/// Which level of the hierarchy a cursor walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterKind {
    Object,
    Dkey,
    Akey,
    Recx,
}

/// Scoping parameters for `Engine::iter_prepare`
///
/// Each kind needs the scope of the level above it; missing pieces are
/// rejected with `InvalidArgument`.
#[derive(Debug, Clone)]
pub struct IterParam {
    pub container: ContainerId,
    pub oid: Option<ObjectId>,
    pub dkey: Option<Vec<u8>>,
    pub akey: Option<Vec<u8>>,
    pub epr: EpochRange,
}

impl IterParam {
    pub fn new(container: ContainerId) -> Self {
        Self {
            container,
            oid: None,
            dkey: None,
            akey: None,
            epr: EpochRange::full(),
        }
    }

    pub fn object(mut self, oid: ObjectId) -> Self {
        self.oid = Some(oid);
        self
    }

    pub fn dkey(mut self, dkey: impl Into<Vec<u8>>) -> Self {
        self.dkey = Some(dkey.into());
        self
    }

    pub fn akey(mut self, akey: impl Into<Vec<u8>>) -> Self {
        self.akey = Some(akey.into());
        self
    }

    pub fn epoch_range(mut self, epr: EpochRange) -> Self {
        self.epr = epr;
        self
    }
}

/// The entry a cursor is positioned on
#[derive(Debug, Clone, PartialEq)]
pub enum IterEntry {
    Object(ObjectId),
    Dkey(Vec<u8>),
    Akey(Vec<u8>),
    Recx { recx: Recx, epoch: Epoch, data: Bytes },
}

impl IterEntry {
    /// Key bytes for dkey/akey entries
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            IterEntry::Dkey(key) | IterEntry::Akey(key) => Some(key),
            _ => None,
        }
    }
}
