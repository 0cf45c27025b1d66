//! Object cache implementation
//!
//! HashMap of entries behind one Mutex, with a logical clock for LRU.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::tree::ObjectTree;
use crate::types::{ContainerId, ObjectId};

use super::ObjectRef;

/// Cache key: objects are only unique within their container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub container: ContainerId,
    pub oid: ObjectId,
}

impl ObjectKey {
    pub fn new(container: ContainerId, oid: ObjectId) -> Self {
        Self { container, oid }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of holds served from the cache
    pub hits: AtomicU64,
    /// Number of holds that had to load the object
    pub misses: AtomicU64,
    /// Number of entries evicted
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

struct CacheEntry {
    object: Arc<ObjectTree>,
    /// Identity of this entry; a reload after eviction gets a new one
    handle_id: u64,
    refs: usize,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<ObjectKey, CacheEntry>,
    /// Logical clock for LRU ordering and handle ids
    clock: u64,
    closed: bool,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Unpinned entry with the oldest access, if any
    fn find_lru_unpinned(&self) -> Option<ObjectKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.refs == 0)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key)
    }
}

pub(crate) struct CacheShared {
    capacity: usize,
    state: Mutex<CacheState>,
    stats: CacheStats,
}

impl CacheShared {
    /// Drop one reference; called from `ObjectRef::drop`
    pub(crate) fn release(&self, key: &ObjectKey, handle_id: u64) {
        let mut state = self.state.lock();

        let Some(entry) = state.entries.get_mut(key) else {
            // Cache was closed under this holder
            return;
        };
        if entry.handle_id != handle_id {
            tracing::warn!(?key, "release of a stale object reference ignored");
            return;
        }
        if entry.refs == 0 {
            tracing::warn!(?key, "object reference released more times than held");
            return;
        }
        entry.refs -= 1;

        // Shrink back if pinning pushed us past capacity
        if entry.refs == 0 {
            self.evict_to(&mut state, self.capacity);
        }
    }

    /// Evict unpinned LRU entries until at most `limit` remain
    fn evict_to(&self, state: &mut CacheState, limit: usize) {
        while state.entries.len() > limit {
            let Some(victim) = state.find_lru_unpinned() else {
                break;
            };
            state.entries.remove(&victim);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = ?victim, "evicted object reference");
        }
    }
}

/// Bounded LRU cache of object handles
///
/// ## Concurrency:
/// - One Mutex guards the entry map; a miss loads under that lock, so
///   two racing holds of the same key always resolve to one entry
/// - Reference counts track liveness only; they do not serialize I/O
///
/// Cloning the cache yields another handle to the same entries.
#[derive(Clone)]
pub struct ObjectCache {
    shared: Arc<CacheShared>,
}

impl ObjectCache {
    /// Create a cache holding about `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                capacity: capacity.max(1),
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    clock: 0,
                    closed: false,
                }),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Hold a reference to `key`, loading it with `load` on a miss
    ///
    /// Eviction, if any, happens before the new entry is inserted and only
    /// ever touches entries nobody holds.
    pub fn hold<F>(&self, key: ObjectKey, load: F) -> Result<ObjectRef>
    where
        F: FnOnce() -> Result<Arc<ObjectTree>>,
    {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            return Err(KvError::Internal("object cache is closed".to_string()));
        }

        let now = state.tick();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.refs += 1;
            entry.last_used = now;
            shared.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ObjectRef::new(
                Arc::clone(shared),
                key,
                Arc::clone(&entry.object),
                entry.handle_id,
            ));
        }

        shared.stats.misses.fetch_add(1, Ordering::Relaxed);
        let object = load()?;
        if object.oid() != key.oid {
            return Err(KvError::Internal(format!(
                "loader returned object {} for key {}",
                object.oid(),
                key.oid
            )));
        }

        shared.evict_to(&mut state, shared.capacity - 1);
        if state.entries.len() >= shared.capacity {
            tracing::debug!(
                entries = state.entries.len(),
                capacity = shared.capacity,
                "all cached objects pinned, growing past capacity"
            );
        }

        state.entries.insert(
            key,
            CacheEntry {
                object: Arc::clone(&object),
                handle_id: now,
                refs: 1,
                last_used: now,
            },
        );

        Ok(ObjectRef::new(Arc::clone(shared), key, object, now))
    }

    /// Discard every entry
    ///
    /// Holders must not keep using references past this point; their
    /// eventual release is a no-op.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        let pinned = state.entries.values().filter(|e| e.refs > 0).count();
        if pinned > 0 {
            tracing::warn!(pinned, "object cache closed with pinned entries");
        }
        state.entries.clear();
        state.closed = true;
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Nominal capacity
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Entries currently cached (pinned or not)
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries with at least one holder
    pub fn pinned(&self) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .values()
            .filter(|e| e.refs > 0)
            .count()
    }

    /// Holders of `key`, or `None` if it is not cached
    pub fn ref_count(&self, key: &ObjectKey) -> Option<usize> {
        self.shared.state.lock().entries.get(key).map(|e| e.refs)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.shared.state.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.shared.stats
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("capacity", &self.capacity())
            .field("entries", &self.len())
            .finish()
    }
}
