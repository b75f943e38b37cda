//! Fixed-capacity lock-free SPSC queue with cached indices.
//!
//! A bounded ring buffer that hands ownership of values between exactly two
//! threads — one producer, one consumer — with no locks, no syscalls, and no
//! allocation per operation. Each side keeps a private cache of the other
//! side's index, so the common path never touches the peer's cache line; the
//! cache is refreshed with a single acquire load only when the queue appears
//! full or empty.
//!
//! # Example
//!
//! ```
//! let (tx, rx) = handoff::channel::<u64, 1024>();
//!
//! let producer = std::thread::spawn(move || {
//!     for i in 0..100 {
//!         tx.force_push(i);
//!     }
//! });
//!
//! let consumer = std::thread::spawn(move || {
//!     for expected in 0..100 {
//!         assert_eq!(rx.force_pop(), expected);
//!     }
//! });
//!
//! producer.join().unwrap();
//! consumer.join().unwrap();
//! ```
//!
//! # Limits
//!
//! Strictly single-producer, single-consumer: the endpoint handles are `Send`
//! but not `Sync`, and there is exactly one of each per queue. Multi-producer
//! or multi-consumer use requires a different algorithm and is out of scope.
//! The `force_*` operations busy-spin with no cancellation; callers needing
//! cancellable waits should loop over the non-blocking primitives with their
//! own exit condition.

#![warn(missing_docs)]

pub(crate) mod cache;
pub mod spsc;
pub mod trace;

pub use spsc::{channel, reset, Consumer, Producer, Timeout};
