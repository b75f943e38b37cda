//! Safe producer/consumer surface over the SPSC ring.
//!
//! # Overview
//!
//! - [`Producer`] - Write end (single producer per queue)
//! - [`Consumer`] - Read end (single consumer per queue)
//! - Lock-free, wait-free non-blocking operations: no mutexes or syscalls in
//!   the hot path; the `force_*` operations busy-spin, never park
//!
//! A queue of `N` slots holds at most `N - 1` elements: one slot stays free as
//! the sentinel gap that distinguishes "full" from "empty".
//!
//! # Example
//!
//! ```
//! let (producer, consumer) = handoff::channel::<u64, 1024>();
//!
//! // Producer thread
//! producer.push(42).expect("queue full");
//!
//! // Consumer thread
//! assert_eq!(consumer.pop(), Some(42));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;

use crate::spsc::ring::Ring;
use crate::trace::debug;

/// Timeout specification for the `*_blocking` operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Marker type to opt out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the SPSC queue.
///
/// Only one producer exists per queue; `channel()` never hands out a second.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer` (no concurrent `push()`)
pub struct Producer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
///
/// Only one consumer exists per queue. See [`Producer`] for thread safety
/// details (same semantics apply).
pub struct Consumer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

/// Creates a new SPSC channel over a ring of `N` slots.
///
/// Returns a `(Producer, Consumer)` pair; each can be sent to its own thread.
/// Usable capacity is `N - 1`.
///
/// Fails to compile if `N` is not a power of two at least 2.
///
/// # Example
///
/// ```
/// let (tx, rx) = handoff::channel::<String, 16>();
///
/// tx.push("hello".to_string()).unwrap();
/// assert_eq!(rx.pop(), Some("hello".to_string()));
/// ```
#[must_use]
pub fn channel<T: Send, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    let ring = Arc::new(Ring::<T, N>::new());

    debug!(
        slots = N,
        capacity = Ring::<T, N>::capacity(),
        "spsc channel created"
    );

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<T: Send, const N: usize> Producer<T, N> {
    /// Attempts to push an item onto the queue (wait-free).
    ///
    /// A full queue is the expected steady-state condition, not an error to
    /// report loudly: the item comes back for the caller to retry or drop.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, with no state change.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: this handle is the sole producer and !Sync, so no other
        // thread can run a producer-side operation concurrently.
        unsafe { self.ring.try_push(item) }
    }

    /// Pushes an item, spinning until space is available.
    ///
    /// Never returns without succeeding. If the consumer never drains the
    /// queue, this spins forever; compose [`push`](Self::push) with an
    /// external cancellation flag if you need a way out.
    #[inline]
    pub fn force_push(&self, item: T) {
        // SAFETY: sole producer, as in push().
        unsafe { self.ring.force_push(item) }
    }

    /// Spins until space is available or the timeout expires, then pushes.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` on timeout.
    #[inline]
    pub fn push_blocking(&self, mut item: T, timeout: Timeout) -> Result<(), T> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    item = returned;
                    if let Some(dl) = deadline {
                        if Instant::now() > dl {
                            return Err(item);
                        }
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Momentary snapshot of whether the queue is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Momentary snapshot of whether the queue is full.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Momentary snapshot of the number of queued elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Usable capacity of the queue: `N - 1`.
    ///
    /// One slot short of the raw slot count, because the ring keeps a
    /// sentinel gap to tell "full" from "empty".
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        Ring::<T, N>::capacity()
    }
}

impl<T: Send, const N: usize> Consumer<T, N> {
    /// Attempts to pop an item from the queue (wait-free).
    ///
    /// Returns `None` if the queue is empty, with no state change.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: this handle is the sole consumer and !Sync, so no other
        // thread can run a consumer-side operation concurrently.
        unsafe { self.ring.try_pop() }
    }

    /// Pops and drops the next item without returning it.
    ///
    /// Returns whether an item was discarded.
    #[inline]
    pub fn skip(&self) -> bool {
        self.pop().is_some()
    }

    /// Pops an item, spinning until one is available.
    ///
    /// Never returns without succeeding. If the producer never pushes, this
    /// spins forever; compose [`pop`](Self::pop) with an external cancellation
    /// flag if you need a way out.
    #[inline]
    #[must_use]
    pub fn force_pop(&self) -> T {
        // SAFETY: sole consumer, as in pop().
        unsafe { self.ring.force_pop() }
    }

    /// Spins until an item is available or the timeout expires, then pops.
    ///
    /// Returns `None` on timeout.
    #[inline]
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<T> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if let Some(dl) = deadline {
                if Instant::now() > dl {
                    return None;
                }
            }
            std::hint::spin_loop();
        }
    }

    /// Pops one item and hands it to `func` by value.
    ///
    /// Returns whether an item was consumed; `func` is never invoked on an
    /// empty queue.
    #[inline]
    pub fn consume_one<F>(&self, func: F) -> bool
    where
        F: FnOnce(T),
    {
        // SAFETY: sole consumer, as in pop().
        unsafe { self.ring.consume_one(func) }
    }

    /// Drains the queue, handing each item to `func`, and returns the count.
    ///
    /// This is a snapshot drain: it stops at the first empty check, so a
    /// concurrent producer may leave the queue non-empty right after it
    /// returns.
    pub fn consume_all<F>(&self, func: F) -> usize
    where
        F: FnMut(T),
    {
        // SAFETY: sole consumer, as in pop().
        unsafe { self.ring.consume_all(func) }
    }

    /// Pops at most `limit` items, handing each to `func`.
    ///
    /// Returns the number actually consumed (`<= limit`), stopping early if
    /// the queue runs empty.
    pub fn consume_n<F>(&self, func: F, limit: usize) -> usize
    where
        F: FnMut(T),
    {
        // SAFETY: sole consumer, as in pop().
        unsafe { self.ring.consume_n(func, limit) }
    }

    /// Returns a reference to the next item to be popped, or `None` if the
    /// queue is empty.
    ///
    /// Takes `&mut self` so the borrow checker guarantees the slot cannot be
    /// popped (and reused by the producer) while the reference is alive.
    #[inline]
    #[must_use]
    pub fn front(&mut self) -> Option<&T> {
        // SAFETY: sole consumer; the exclusive borrow of self ties the
        // returned reference's lifetime to this handle, so no consumer-side
        // operation can advance the read index while it is alive.
        unsafe { self.ring.front() }
    }

    /// Momentary snapshot of whether the queue is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Momentary snapshot of whether the queue is full.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Momentary snapshot of the number of queued elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Usable capacity of the queue: `N - 1`.
    ///
    /// One slot short of the raw slot count, because the ring keeps a
    /// sentinel gap to tell "full" from "empty".
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        Ring::<T, N>::capacity()
    }
}

/// Drops any queued elements and restores the queue to its freshly
/// constructed state.
///
/// Requiring `&mut` on both endpoints proves no push or pop is in flight on
/// either side, which is the precondition the underlying operation cannot
/// check at runtime.
///
/// # Panics
///
/// Panics if the two handles belong to different queues.
pub fn reset<T: Send, const N: usize>(
    producer: &mut Producer<T, N>,
    consumer: &mut Consumer<T, N>,
) {
    assert!(
        Arc::ptr_eq(&producer.ring, &consumer.ring),
        "reset requires both endpoints of the same queue"
    );
    // SAFETY: exclusive borrows of the only two handles rule out any
    // concurrent producer or consumer operation.
    unsafe { producer.ring.reset() }

    debug!(slots = N, "spsc queue reset");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_basic_push_pop() {
        let (producer, consumer) = channel::<u64, 8>();

        assert!(producer.push(42).is_ok());
        assert_eq!(consumer.pop(), Some(42));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_fresh_queue_is_empty() {
        let (producer, consumer) = channel::<u64, 8>();

        assert!(producer.is_empty());
        assert!(consumer.is_empty());
        assert!(!producer.is_full());
        assert_eq!(producer.len(), 0);
        assert_eq!(consumer.len(), 0);
    }

    #[test]
    fn test_capacity_is_slots_minus_one() {
        let (producer, consumer) = channel::<u64, 8>();

        // One slot is the sentinel gap, so 8 slots hold 7 elements.
        assert_eq!(producer.capacity(), 7);
        assert_eq!(consumer.capacity(), 7);

        for i in 1..=7 {
            assert!(producer.push(i).is_ok(), "failed to push item {i}");
        }
        assert!(producer.is_full());
        assert_eq!(producer.len(), 7);
        assert_eq!(producer.push(8), Err(8));
    }

    #[test]
    fn test_wraparound() {
        let (producer, consumer) = channel::<u64, 4>();

        for i in 1..=3 {
            assert!(producer.push(i).is_ok());
        }
        assert_eq!(producer.push(4), Err(4));

        assert_eq!(consumer.pop(), Some(1));
        assert!(producer.push(4).is_ok());

        for i in 2..=4 {
            assert_eq!(consumer.pop(), Some(i));
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_len_tracks_wraparound() {
        let (producer, consumer) = channel::<u64, 4>();

        // Walk the indices several times around the physical end of the ring,
        // checking len() at every step of a fill-then-drain cycle.
        for round in 0..10 {
            for i in 0..3 {
                producer.push(round * 10 + i).unwrap();
                assert_eq!(producer.len(), (i + 1) as usize);
            }
            for i in 0..3 {
                assert_eq!(consumer.pop(), Some(round * 10 + i));
                assert_eq!(consumer.len(), (2 - i) as usize);
            }
            assert!(consumer.is_empty());
        }
    }

    #[test]
    fn test_consume_one() {
        let (producer, consumer) = channel::<u64, 8>();

        assert!(!consumer.consume_one(|_| panic!("callback on empty queue")));

        producer.push(10).unwrap();
        producer.push(20).unwrap();

        let mut seen = Vec::new();
        assert!(consumer.consume_one(|v| seen.push(v)));
        assert!(consumer.consume_one(|v| seen.push(v)));
        assert_eq!(seen, vec![10, 20]);

        assert!(consumer.is_empty());
        assert!(!consumer.consume_one(|_| panic!("callback on empty queue")));
    }

    #[test]
    fn test_consume_all() {
        let (producer, consumer) = channel::<u64, 8>();

        for i in 0..5 {
            producer.push(i).unwrap();
        }

        let mut sum = 0;
        let n = consumer.consume_all(|v| sum += v);

        assert_eq!(n, 5);
        assert_eq!(sum, 10);
        assert!(consumer.is_empty());
        assert_eq!(consumer.consume_all(|_| ()), 0);
    }

    #[test]
    fn test_consume_n() {
        let (producer, consumer) = channel::<u64, 16>();

        for i in 0..6 {
            producer.push(i).unwrap();
        }

        let mut seen = Vec::new();
        assert_eq!(consumer.consume_n(|v| seen.push(v), 4), 4);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(consumer.len(), 2);

        // Limit past the remaining elements stops at empty.
        assert_eq!(consumer.consume_n(|v| seen.push(v), 10), 2);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(consumer.consume_n(|_| (), 3), 0);
    }

    #[test]
    fn test_skip() {
        let (producer, consumer) = channel::<String, 8>();

        assert!(!consumer.skip());

        producer.push("a".to_string()).unwrap();
        producer.push("b".to_string()).unwrap();

        assert!(consumer.skip());
        assert_eq!(consumer.pop(), Some("b".to_string()));
        assert!(!consumer.skip());
    }

    #[test]
    fn test_front() {
        let (producer, mut consumer) = channel::<u64, 8>();

        assert_eq!(consumer.front(), None);

        producer.push(7).unwrap();
        producer.push(8).unwrap();

        // Peeking does not consume.
        assert_eq!(consumer.front(), Some(&7));
        assert_eq!(consumer.front(), Some(&7));
        assert_eq!(consumer.len(), 2);

        assert_eq!(consumer.pop(), Some(7));
        assert_eq!(consumer.front(), Some(&8));
        assert_eq!(consumer.pop(), Some(8));
        assert_eq!(consumer.front(), None);
    }

    #[test]
    fn test_reset() {
        let (mut producer, mut consumer) = channel::<u64, 8>();

        producer.push(1).unwrap();
        producer.push(2).unwrap();

        reset(&mut producer, &mut consumer);

        assert!(consumer.is_empty());
        assert_eq!(consumer.len(), 0);

        // Behaves like a freshly constructed queue afterwards.
        producer.push(3).unwrap();
        assert_eq!(consumer.pop(), Some(3));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    #[should_panic(expected = "same queue")]
    fn test_reset_rejects_mismatched_endpoints() {
        let (mut producer, _consumer) = channel::<u64, 8>();
        let (_producer, mut consumer) = channel::<u64, 8>();

        reset(&mut producer, &mut consumer);
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_reset_drops_live_elements() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (mut producer, mut consumer) = channel::<DropCounter, 8>();

        for _ in 0..3 {
            assert!(producer.push(DropCounter(Arc::clone(&drops))).is_ok());
        }
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        reset(&mut producer, &mut consumer);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_drop_drains_remaining_elements() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (producer, consumer) = channel::<DropCounter, 8>();

        for _ in 0..5 {
            assert!(producer.push(DropCounter(Arc::clone(&drops))).is_ok());
        }
        drop(consumer.pop());
        assert_eq!(drops.load(Ordering::Relaxed), 1);

        drop(producer);
        drop(consumer);
        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_non_copy_type() {
        let (producer, consumer) = channel::<String, 8>();

        producer.push("hello".to_string()).unwrap();
        producer.push("world".to_string()).unwrap();

        assert_eq!(consumer.pop(), Some("hello".to_string()));
        assert_eq!(consumer.pop(), Some("world".to_string()));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_move_only_type() {
        let (producer, consumer) = channel::<Box<u64>, 8>();

        producer.push(Box::new(42)).unwrap();
        assert_eq!(consumer.pop(), Some(Box::new(42)));
    }

    #[test]
    fn test_large_queue() {
        // 8192 slots at two cache lines each is a megabyte of slot storage;
        // construction takes one allocation and the protocol is unchanged.
        let (producer, consumer) = channel::<u64, 8192>();

        assert_eq!(producer.capacity(), 8191);
        for i in 0..100 {
            producer.push(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(consumer.pop(), Some(i));
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_pop_blocking_timeout() {
        let (_producer, consumer) = channel::<u64, 8>();

        let timeout = Timeout::from(Duration::from_millis(5));
        assert_eq!(consumer.pop_blocking(timeout), None);
    }

    #[test]
    fn test_push_blocking_timeout() {
        let (producer, _consumer) = channel::<u64, 4>();

        for i in 0..3 {
            producer.push(i).unwrap();
        }

        let timeout = Timeout::from(Duration::from_millis(5));
        assert_eq!(producer.push_blocking(99, timeout), Err(99));
    }

    #[test]
    fn test_send_to_thread() {
        let (producer, consumer) = channel::<u64, 16>();

        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                producer.push(i).unwrap();
            }
        });

        handle.join().unwrap();

        for i in 0..10 {
            assert_eq!(consumer.pop(), Some(i));
        }
    }

    #[test]
    fn test_concurrent_push_pop() {
        let (producer, consumer) = channel::<u64, 64>();
        let count = 10_000u64;

        let producer_handle = std::thread::spawn(move || {
            for i in 0..count {
                while producer.push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        let consumer_handle = std::thread::spawn(move || {
            let mut received = Vec::with_capacity(count as usize);
            while received.len() < count as usize {
                if let Some(item) = consumer.pop() {
                    received.push(item);
                } else {
                    std::hint::spin_loop();
                }
            }
            received
        });

        producer_handle.join().unwrap();
        let received = consumer_handle.join().unwrap();

        // Verify FIFO order
        for (i, &val) in received.iter().enumerate() {
            assert_eq!(val, i as u64);
        }
    }

    #[test]
    fn test_concurrent_force_push_force_pop() {
        let (producer, consumer) = channel::<u64, 16>();
        let count = 10_000u64;

        let producer_handle = std::thread::spawn(move || {
            for i in 0..count {
                producer.force_push(i);
            }
        });

        let consumer_handle = std::thread::spawn(move || {
            for expected in 0..count {
                assert_eq!(consumer.force_pop(), expected);
            }
            assert_eq!(consumer.pop(), None);
        });

        producer_handle.join().unwrap();
        consumer_handle.join().unwrap();
    }
}
