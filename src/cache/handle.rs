//! Object reference guard

use std::ops::Deref;
use std::sync::Arc;

use crate::tree::ObjectTree;

use super::object_cache::CacheShared;
use super::ObjectKey;

/// A held reference to a cached object
///
/// The reference is released when the guard is dropped, on every exit
/// path. `release` does the same thing explicitly.
#[must_use = "dropping an ObjectRef releases it immediately"]
pub struct ObjectRef {
    cache: Arc<CacheShared>,
    key: ObjectKey,
    object: Arc<ObjectTree>,
    handle_id: u64,
}

impl ObjectRef {
    pub(crate) fn new(
        cache: Arc<CacheShared>,
        key: ObjectKey,
        object: Arc<ObjectTree>,
        handle_id: u64,
    ) -> Self {
        Self {
            cache,
            key,
            object,
            handle_id,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn object(&self) -> &Arc<ObjectTree> {
        &self.object
    }

    /// Identity of the cache entry this reference pins
    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// True if both references pin the same cache entry
    pub fn same_handle(&self, other: &ObjectRef) -> bool {
        self.key == other.key
            && self.handle_id == other.handle_id
            && Arc::ptr_eq(&self.object, &other.object)
    }

    /// Release the reference now
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for ObjectRef {
    type Target = ObjectTree;

    fn deref(&self) -> &ObjectTree {
        &self.object
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.cache.release(&self.key, self.handle_id);
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("key", &self.key)
            .field("handle_id", &self.handle_id)
            .finish()
    }
}
