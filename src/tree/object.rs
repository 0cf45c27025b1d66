//! Object tree
//!
//! dkey → akey → extent → epoch version chains for one object.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::types::{Epoch, EpochRange, IoDesc, ObjectId, RecxIndex};

use super::{ExtentWrite, RecordValue};

/// Versions of one extent, keyed by epoch
type Versions = BTreeMap<Epoch, RecordValue>;
type ExtentMap = BTreeMap<RecxIndex, Versions>;
type AkeyMap = BTreeMap<Vec<u8>, ExtentMap>;
type DkeyMap = BTreeMap<Vec<u8>, AkeyMap>;

/// A live extent as seen through an epoch window
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRecx {
    pub index: RecxIndex,
    pub epoch: Epoch,
    pub rsize: u64,
    pub data: Bytes,
}

/// All keys and versions of a single object
pub struct ObjectTree {
    oid: ObjectId,
    dkeys: RwLock<DkeyMap>,
}

impl ObjectTree {
    pub fn new(oid: ObjectId) -> Self {
        Self {
            oid,
            dkeys: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    // =========================================================================
    // Update / Fetch
    // =========================================================================

    /// Apply every write of one update under a single write lock
    ///
    /// A write at an epoch that already holds a version replaces it.
    /// Returns the payload bytes of replaced versions so the caller can
    /// hand them back to the pool.
    pub fn apply(&self, epoch: Epoch, dkey: &[u8], writes: Vec<ExtentWrite>) -> u64 {
        let mut dkeys = self.dkeys.write();
        let akeys = dkeys.entry(dkey.to_vec()).or_default();

        let mut replaced = 0;
        for write in writes {
            let versions = akeys
                .entry(write.akey)
                .or_default()
                .entry(RecxIndex { idx: write.idx, nr: write.nr })
                .or_default();

            if let Some(old) = versions.insert(epoch, write.value) {
                replaced += old.payload_len();
            }
        }
        replaced
    }

    /// Near-epoch read of each requested extent, under one read lock
    ///
    /// Returns `(rsize, data)` per descriptor. Any absent or punched extent
    /// fails the whole read with `NotFound`.
    pub fn read(&self, epoch: Epoch, dkey: &[u8], iods: &[IoDesc]) -> Result<Vec<(u64, Bytes)>> {
        let dkeys = self.dkeys.read();
        let akeys = dkeys.get(dkey).ok_or(KvError::NotFound)?;

        iods.iter()
            .map(|iod| {
                let versions = akeys
                    .get(&iod.akey)
                    .and_then(|extents| extents.get(&iod.recx.index()))
                    .ok_or(KvError::NotFound)?;

                match near_epoch(versions, epoch) {
                    Some((_, RecordValue::Value { rsize, data })) => Ok((*rsize, data.clone())),
                    Some((_, RecordValue::Punch)) | None => Err(KvError::NotFound),
                }
            })
            .collect()
    }

    // =========================================================================
    // Iteration Support
    // =========================================================================

    /// First dkey at or after `from` with a live extent in `epr`
    pub fn next_dkey(&self, from: Bound<&[u8]>, epr: EpochRange) -> Option<Vec<u8>> {
        let dkeys = self.dkeys.read();
        dkeys
            .range::<[u8], _>((from, Bound::Unbounded))
            .find(|(_, akeys)| akeys.values().any(|extents| has_live(extents, epr)))
            .map(|(dkey, _)| dkey.clone())
    }

    /// First akey under `dkey` at or after `from` with a live extent in `epr`
    pub fn next_akey(&self, dkey: &[u8], from: Bound<&[u8]>, epr: EpochRange) -> Option<Vec<u8>> {
        let dkeys = self.dkeys.read();
        dkeys
            .get(dkey)?
            .range::<[u8], _>((from, Bound::Unbounded))
            .find(|(_, extents)| has_live(extents, epr))
            .map(|(akey, _)| akey.clone())
    }

    /// First live extent under (`dkey`, `akey`) at or after `from`
    pub fn next_recx(
        &self,
        dkey: &[u8],
        akey: &[u8],
        from: Bound<RecxIndex>,
        epr: EpochRange,
    ) -> Option<VisibleRecx> {
        let dkeys = self.dkeys.read();
        let extents = dkeys.get(dkey)?.get(akey)?;

        extents
            .range((from, Bound::Unbounded))
            .find_map(|(index, versions)| match visible(versions, epr) {
                Some((epoch, RecordValue::Value { rsize, data })) => Some(VisibleRecx {
                    index: *index,
                    epoch,
                    rsize: *rsize,
                    data: data.clone(),
                }),
                _ => None,
            })
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of dkeys ever written, punched or not
    pub fn dkey_count(&self) -> usize {
        self.dkeys.read().len()
    }

    /// Number of stored versions across the whole object
    pub fn version_count(&self) -> usize {
        self.dkeys
            .read()
            .values()
            .flat_map(|akeys| akeys.values())
            .flat_map(|extents| extents.values())
            .map(|versions| versions.len())
            .sum()
    }
}

impl std::fmt::Debug for ObjectTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTree")
            .field("oid", &self.oid)
            .field("dkeys", &self.dkey_count())
            .finish()
    }
}

/// Greatest-epoch version not newer than `epoch`
fn near_epoch(versions: &Versions, epoch: Epoch) -> Option<(Epoch, &RecordValue)> {
    versions.range(..=epoch).next_back().map(|(e, v)| (*e, v))
}

/// Greatest-epoch version inside the window
fn visible(versions: &Versions, epr: EpochRange) -> Option<(Epoch, &RecordValue)> {
    if epr.lo > epr.hi {
        return None;
    }
    versions.range(epr.lo..=epr.hi).next_back().map(|(e, v)| (*e, v))
}

fn has_live(extents: &ExtentMap, epr: EpochRange) -> bool {
    extents
        .values()
        .any(|versions| matches!(visible(versions, epr), Some((_, v)) if !v.is_punch()))
}
