//! Storage Module
//!
//! The pool backing every container: a capacity-bounded byte region.
//!
//! ## Responsibilities
//! - Admit or refuse writes against the pool capacity (`OutOfSpace`)
//! - Hold space for in-flight writes until they commit or fail
//! - Give bytes back when a version is replaced in place
//!
//! ## Accounting Model
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ capacity                                             │
//! │ ┌──────────────────┬───────────────┬───────────────┐ │
//! │ │ committed        │ reserved      │ available     │ │
//! │ │ (visible values) │ (in flight)   │               │ │
//! │ └──────────────────┴───────────────┴───────────────┘ │
//! └──────────────────────────────────────────────────────┘
//! ```
//! Only payload bytes (`nr * rsize`) are charged; punches are free.

mod space;

pub use space::{Reservation, SpaceManager};
