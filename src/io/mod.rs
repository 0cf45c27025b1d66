//! Zero-Copy I/O Module
//!
//! Two-phase I/O that hands callers the engine's own buffers.
//!
//! ## Protocol
//! ```text
//! update:  update_begin ──▶ buffer_mut(i) ... ──▶ update_end(Ok)  → version visible
//!                                            └──▶ update_end(Err) → space released
//! fetch:   fetch_begin  ──▶ buffer(i) ...     ──▶ fetch_end
//! ```
//! - Update buffers are reserved against the pool at begin and frozen into
//!   the stored value at end, so the caller's writes are the only copy.
//! - Fetch buffers share the stored bytes (reference counted), no copy.
//! - Nothing an update writes is visible before `update_end` succeeds.
//! - A handle dropped without its end call discards its work.

mod handle;

pub use handle::IoHandle;

pub(crate) use handle::{IoInner, IoPhase};
