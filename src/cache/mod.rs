//! Object Cache Module
//!
//! Bounded, reference-counted cache of per-object handles.
//!
//! ## Responsibilities
//! - Resolve `(container, object id)` to one shared in-memory handle
//! - Count holders so pinned entries are never evicted or duplicated
//! - Evict the least recently used unpinned entry under capacity pressure
//!
//! ## Lifecycle of an entry
//! ```text
//!  hold (miss) ──▶ loaded, refs=1 ──▶ hold (hit), refs+1
//!                        │                 │
//!                        ▼                 ▼
//!                  release, refs-1 ◀───────┘
//!                        │
//!                 refs == 0: eviction candidate (LRU by logical clock)
//! ```
//! When every entry is pinned the cache grows past its nominal capacity
//! and shrinks back as references are released.

mod handle;
mod object_cache;

pub use handle::ObjectRef;
pub use object_cache::{CacheStats, ObjectCache, ObjectKey};
