//! Container object index
//!
//! Ordered `ObjectId → ObjectTree` map for one container.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{ContainerId, ObjectId};

use super::ObjectTree;

/// One container's namespace
///
/// Identical object ids in two containers resolve to two unrelated trees.
pub struct Container {
    id: ContainerId,
    objects: RwLock<BTreeMap<ObjectId, Arc<ObjectTree>>>,
}

impl Container {
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Look up an object without creating it
    pub fn find(&self, oid: ObjectId) -> Option<Arc<ObjectTree>> {
        self.objects.read().get(&oid).cloned()
    }

    /// Look up an object, creating an empty one on first use
    ///
    /// Returns the tree and whether this call created it.
    pub fn find_or_create(&self, oid: ObjectId) -> (Arc<ObjectTree>, bool) {
        if let Some(tree) = self.find(oid) {
            return (tree, false);
        }

        let mut objects = self.objects.write();
        // Re-check: another writer may have created it between the locks
        if let Some(tree) = objects.get(&oid) {
            return (Arc::clone(tree), false);
        }
        let tree = Arc::new(ObjectTree::new(oid));
        objects.insert(oid, Arc::clone(&tree));
        (tree, true)
    }

    /// First object id at or after `from`
    pub fn next_object(&self, from: Bound<ObjectId>) -> Option<ObjectId> {
        self.objects
            .read()
            .range((from, Bound::Unbounded))
            .next()
            .map(|(oid, _)| *oid)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("objects", &self.object_count())
            .finish()
    }
}
