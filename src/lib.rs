//! # epochkv
//!
//! An embedded, epoch-versioned key-value engine with:
//! - A four-level key hierarchy: object → dkey → akey → extent
//! - Multi-version records addressed by epoch, with punch (logical delete)
//! - Near-epoch reads and epoch-window iteration
//! - A reference-counted LRU cache of object handles
//! - Resumable cursors driven by opaque anchors
//! - A zero-copy begin/expose/end I/O path
//! - An optional commit log for restart recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │     update / punch / fetch / *_begin / *_end / iter_prepare │
//! └──────┬───────────────┬───────────────┬──────────────┬───────┘
//!        │               │               │              │
//!        ▼               ▼               ▼              ▼
//! ┌─────────────┐ ┌─────────────┐ ┌─────────────┐ ┌───────────┐
//! │ ObjectCache │ │    Space    │ │     WAL     │ │  Cursors  │
//! │ (LRU, refs) │ │ (capacity)  │ │  (append)   │ │ (anchors) │
//! └──────┬──────┘ └─────────────┘ └─────────────┘ └─────┬─────┘
//!        │                                              │
//!        ▼                                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Container ──▶ ObjectTree: dkey ──▶ akey ──▶ extent ──▶ epoch │
//! │                       (RwLock per object)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use epochkv::{ContainerId, Engine, IoDesc, ObjectId, Recx};
//!
//! let engine = Engine::in_memory()?;
//! let coh = ContainerId::from_u128(1);
//! let oid = ObjectId::new(0, 1);
//!
//! let iod = IoDesc::new("akey", Recx::single(0, 5));
//! engine.update(coh, oid, 10, b"dkey", &[iod], &[&b"hello"[..]])?;
//!
//! let mut iods = [IoDesc::new("akey", Recx::any(0, 1))];
//! let mut bufs = [Vec::new()];
//! engine.fetch(coh, oid, 12, b"dkey", &mut iods, &mut bufs)?;
//! assert_eq!(bufs[0], b"hello");
//! # Ok::<(), epochkv::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

pub mod storage;
pub mod tree;
pub mod cache;
pub mod wal;
pub mod iter;
pub mod io;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, WalSyncStrategy};
pub use types::{ContainerId, Epoch, EpochRange, IoDesc, ObjectId, Recx};
pub use cache::{ObjectCache, ObjectKey, ObjectRef};
pub use iter::{Anchor, Cursor, IterEntry, IterKind, IterParam};
pub use io::IoHandle;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of epochkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
