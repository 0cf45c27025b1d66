//! Phase-tagged zero-copy handle

use bytes::{Bytes, BytesMut};

use crate::cache::ObjectRef;
use crate::error::{KvError, Result};
use crate::storage::Reservation;
use crate::types::{Epoch, IoDesc};

/// Buffers and bookkeeping for one direction of zero-copy I/O
pub(crate) enum IoPhase {
    /// Reserved storage the caller fills in
    Update {
        bufs: Vec<BytesMut>,
        reservation: Reservation,
    },

    /// Stored bytes exposed read-only
    Fetch { bufs: Vec<Bytes> },
}

pub(crate) struct IoInner {
    pub(crate) object: ObjectRef,
    pub(crate) epoch: Epoch,
    pub(crate) dkey: Vec<u8>,
    pub(crate) iods: Vec<IoDesc>,
    pub(crate) phase: IoPhase,
}

/// Handle returned by `update_begin` / `fetch_begin`
///
/// Buffers are only reachable through the handle, and the handle is
/// consumed by its end call, so no buffer outlives the I/O.
#[must_use = "a zero-copy handle must be passed to update_end or fetch_end"]
pub struct IoHandle {
    inner: Option<IoInner>,
}

impl IoHandle {
    pub(crate) fn new(inner: IoInner) -> Self {
        Self { inner: Some(inner) }
    }

    /// Take the state out for the end call
    pub(crate) fn take(mut self) -> Result<IoInner> {
        self.inner
            .take()
            .ok_or_else(|| KvError::Internal("zero-copy handle already ended".to_string()))
    }

    fn inner(&self) -> Result<&IoInner> {
        self.inner
            .as_ref()
            .ok_or_else(|| KvError::Internal("zero-copy handle already ended".to_string()))
    }

    /// True for handles from `update_begin`
    pub fn is_update(&self) -> bool {
        matches!(
            self.inner.as_ref().map(|i| &i.phase),
            Some(IoPhase::Update { .. })
        )
    }

    pub fn epoch(&self) -> Epoch {
        self.inner.as_ref().map(|i| i.epoch).unwrap_or_default()
    }

    /// Descriptors of this I/O; on fetch, record sizes are the stored ones
    pub fn iods(&self) -> &[IoDesc] {
        self.inner.as_ref().map(|i| i.iods.as_slice()).unwrap_or(&[])
    }

    pub fn buffer_count(&self) -> usize {
        self.iods().len()
    }

    /// Read-only view of extent `index`'s buffer
    pub fn buffer(&self, index: usize) -> Result<&[u8]> {
        let inner = self.inner()?;
        let buf: Option<&[u8]> = match &inner.phase {
            IoPhase::Update { bufs, .. } => bufs.get(index).map(|b| &b[..]),
            IoPhase::Fetch { bufs } => bufs.get(index).map(|b| &b[..]),
        };
        buf.ok_or_else(|| out_of_range(index, inner.iods.len()))
    }

    /// Writable view of extent `index`'s reserved storage (update only)
    ///
    /// Its length is exactly `nr * rsize` of the descriptor.
    pub fn buffer_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| KvError::Internal("zero-copy handle already ended".to_string()))?;
        let count = inner.iods.len();
        match &mut inner.phase {
            IoPhase::Update { bufs, .. } => bufs
                .get_mut(index)
                .map(|b| &mut b[..])
                .ok_or_else(|| out_of_range(index, count)),
            IoPhase::Fetch { .. } => Err(KvError::invalid("fetch buffers are read-only")),
        }
    }
}

impl Drop for IoHandle {
    fn drop(&mut self) {
        if let Some(inner) = &self.inner {
            tracing::warn!(
                object = %inner.object.oid(),
                epoch = inner.epoch,
                update = self.is_update(),
                "zero-copy handle dropped without end, discarding"
            );
        }
    }
}

impl std::fmt::Debug for IoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoHandle")
            .field("update", &self.is_update())
            .field("epoch", &self.epoch())
            .field("buffers", &self.buffer_count())
            .finish()
    }
}

fn out_of_range(index: usize, count: usize) -> KvError {
    KvError::invalid(format!("buffer index {} out of range ({} extents)", index, count))
}
