//! Fixed-capacity lock-free SPSC queue.
//!
//! - `ring` - The core ring buffer algorithm (crate-private, unsafe API)
//! - `storage` - Slot storage, allocated once at construction (crate-private)
//! - [`queue`] - The safe [`channel`]/[`Producer`]/[`Consumer`] surface

pub(crate) mod ring;
pub(crate) mod storage;

pub mod queue;

pub use queue::{channel, reset, Consumer, Producer, Timeout};
