//! Space Manager
//!
//! Capacity accounting for the pool's payload region.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{KvError, Result};

/// Tracks committed and reserved bytes against a fixed capacity
///
/// ## Concurrency:
/// - `used` is a single atomic counter (reserved + committed bytes)
/// - Reservations use a CAS loop, so concurrent writers never overshoot
pub struct SpaceManager {
    /// Total bytes the pool can hold
    capacity: u64,

    /// Bytes currently reserved or committed
    used: AtomicU64,
}

impl SpaceManager {
    /// Create a manager for a pool of `capacity` bytes
    pub fn new(capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            used: AtomicU64::new(0),
        })
    }

    /// Reserve `len` bytes
    ///
    /// The bytes return to the pool when the reservation is dropped,
    /// unless it was committed first.
    pub fn reserve(self: &Arc<Self>, len: u64) -> Result<Reservation> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(len) {
                Some(next) if next <= self.capacity => next,
                _ => {
                    return Err(KvError::OutOfSpace {
                        requested: len,
                        available: self.capacity.saturating_sub(current),
                    })
                }
            };

            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(Reservation {
            space: Arc::clone(self),
            len,
            committed: false,
        })
    }

    /// Reserve and commit in one step (used by log replay)
    pub fn charge(self: &Arc<Self>, len: u64) -> Result<()> {
        self.reserve(len)?.commit();
        Ok(())
    }

    /// Return committed bytes (a version was replaced in place)
    pub fn release(&self, len: u64) {
        let prev = self.used.fetch_sub(len, Ordering::AcqRel);
        debug_assert!(prev >= len, "space release underflow");
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes reserved or committed
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.used())
    }
}

/// Bytes held for an in-flight write
///
/// Dropping an uncommitted reservation hands its bytes back.
#[must_use = "dropping a reservation releases its space"]
pub struct Reservation {
    space: Arc<SpaceManager>,
    len: u64,
    committed: bool,
}

impl Reservation {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keep the bytes: they now belong to a committed version
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed && self.len > 0 {
            self.space.release(self.len);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("len", &self.len)
            .field("committed", &self.committed)
            .finish()
    }
}
