//! Core lock-free SPSC ring buffer algorithm.
//!
//! A fixed-capacity ring of `N` slots (`N` a power of two) addressed by masked
//! indices. Each side owns one authoritative atomic index plus a private,
//! non-atomic cache of the other side's index, so the common path touches no
//! shared cache line belonging to the peer. The cache is refreshed with a single
//! acquire load only when the queue appears full (producer) or empty (consumer).
//!
//! The ring distinguishes "empty" from "full" by never letting the write index
//! advance onto the read index, so one slot is always a sentinel gap and the
//! usable capacity is `N - 1`.
//!
//! # Ordering
//!
//! The only cross-thread synchronization is through the two indices. Each index
//! has exactly one writer. The producer's release store of the write index,
//! observed by the consumer's acquire load, makes the slot's contents visible
//! before the consumer reads them; symmetrically the consumer's release store of
//! the read index guarantees the old occupant has been moved out before the
//! producer reuses the slot.
//!
//! # Safety
//!
//! The types in this module have unsafe APIs because they require the caller to
//! uphold the SPSC invariant: exactly one producer and one consumer, with no
//! concurrent access to either role.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::spsc::storage::Buffer;

/// Role marker: fields with this role are owned exclusively by the producer.
pub(crate) struct WriterRole;

/// Role marker: fields with this role are owned exclusively by the consumer.
pub(crate) struct ReaderRole;

/// Role marker: buffer slots whose ownership transfers via the SPSC protocol.
pub(crate) struct SlotRole;

/// Interior-mutable cell with a role marker for nominal type safety.
///
/// The `Role` doesn't affect runtime behavior; it exists purely to make the
/// different logical kinds of cells distinct types at compile time.
#[repr(transparent)]
pub(crate) struct RoleCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T, Role> RoleCell<T, Role> {
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    pub(crate) const fn get(&self) -> *mut T {
        self.0.get()
    }
}

// SAFETY: RoleCell is Sync because the SPSC protocol guarantees each cell has
// exactly one accessing thread at any time: index caches are private to their
// role, and a slot is either being written (producer) or read (consumer), never
// both. The atomic indices with release/acquire ordering provide the barrier
// between writes and reads.
unsafe impl<T: Send, Role> Sync for RoleCell<T, Role> {}
unsafe impl<T: Send, Role> Send for RoleCell<T, Role> {}

/// Index cache owned exclusively by the producer.
pub(crate) type WriterCache<T> = RoleCell<T, WriterRole>;

/// Index cache owned exclusively by the consumer.
pub(crate) type ReaderCache<T> = RoleCell<T, ReaderRole>;

/// Buffer slot cell with ownership governed by the SPSC protocol.
pub(crate) type SlotCell<T> = RoleCell<T, SlotRole>;

/// Producer-side state: write index and cached read index.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct WriterState {
    /// Next slot to write to, always in `[0, N)`.
    /// Owned by the producer, read by the consumer.
    pub(crate) write_index: AtomicUsize,

    /// Last observed value of the consumer's read index.
    pub(crate) read_index_cache: WriterCache<usize>,
}

impl WriterState {
    pub(crate) const fn new() -> Self {
        Self {
            write_index: AtomicUsize::new(0),
            read_index_cache: WriterCache::new(0),
        }
    }
}

/// Consumer-side state: read index and cached write index.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ReaderState {
    /// Next slot to read from, always in `[0, N)`.
    /// Owned by the consumer, read by the producer.
    pub(crate) read_index: AtomicUsize,

    /// Last observed value of the producer's write index.
    pub(crate) write_index_cache: ReaderCache<usize>,
}

impl ReaderState {
    pub(crate) const fn new() -> Self {
        Self {
            read_index: AtomicUsize::new(0),
            write_index_cache: ReaderCache::new(0),
        }
    }
}

/// Spin iterations before falling back to `yield_now` in blocking operations.
const SPIN_LIMIT: usize = 64;

/// One step of the spin-then-yield wait used by the `force_*` operations.
#[inline(always)]
fn backoff(mut spin: usize) -> usize {
    if spin < SPIN_LIMIT {
        spin += 1;
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
    spin
}

/// The SPSC ring: both index states plus the slot storage.
#[repr(C)]
pub(crate) struct Ring<T, const N: usize> {
    /// Producer state (write index + cached read index).
    writer: WriterState,

    /// Consumer state (read index + cached write index).
    reader: ReaderState,

    /// Keeps the reader state and the buffer off the same cache line.
    _pad: [u8; 64],

    /// Slot storage, allocated once at construction.
    buffer: Buffer<T, N>,
}

impl<T, const N: usize> Ring<T, N> {
    /// Compile-time capacity validation. `N` must be a power of two for masked
    /// indexing, and at least 2 since one slot is the sentinel gap.
    const CAPACITY_OK: () = assert!(
        N.is_power_of_two() && N >= 2,
        "queue capacity must be a power of two and at least 2"
    );

    const MASK: usize = N - 1;

    pub(crate) fn new() -> Self {
        let () = Self::CAPACITY_OK;
        Self {
            writer: WriterState::new(),
            reader: ReaderState::new(),
            _pad: [0u8; 64],
            buffer: Buffer::new(),
        }
    }

    /// Attempts to push an item onto the queue (wait-free).
    ///
    /// Returns `Err(item)` if the queue is full, with no state change.
    ///
    /// # Safety
    ///
    /// Caller must be the sole producer: no other thread may call any
    /// producer-side operation concurrently.
    #[inline]
    pub(crate) unsafe fn try_push(&self, item: T) -> Result<(), T> {
        // Producer-owned index, relaxed is enough to read our own last store.
        let write = self.writer.write_index.load(Ordering::Relaxed);
        let next = (write + 1) & Self::MASK;

        // SAFETY: producer has exclusive access to its read-index cache.
        let mut cached_read = unsafe { *self.writer.read_index_cache.get() };
        if next == cached_read {
            // Apparently full: refresh from the authoritative read index
            // (acquire pairs with the consumer's release store, proving the
            // old occupant of any freed slot has been moved out).
            cached_read = self.reader.read_index.load(Ordering::Acquire);
            // SAFETY: producer has exclusive write access to its cache.
            unsafe {
                *self.writer.read_index_cache.get() = cached_read;
            }
            if next == cached_read {
                return Err(item);
            }
        }

        // SAFETY: the producer owns the slot at `write`: the write index has
        // not been published yet, and the fullness check above proves the
        // consumer is not reading it. `write` is in [0, N) by construction.
        unsafe {
            ptr::write(self.buffer.slot(write).value.get(), MaybeUninit::new(item));
        }

        // Publish: release pairs with the consumer's acquire load, making the
        // slot write above visible before the index advance is observed.
        self.writer.write_index.store(next, Ordering::Release);

        Ok(())
    }

    /// Pushes an item, spinning until space is available.
    ///
    /// Never returns without succeeding; if the consumer never drains, this
    /// spins forever. Callers needing cancellation or deadlines must build a
    /// retry loop around [`try_push`](Self::try_push).
    ///
    /// # Safety
    ///
    /// Same single-producer requirement as [`try_push`](Self::try_push).
    #[inline]
    pub(crate) unsafe fn force_push(&self, item: T) {
        let write = self.writer.write_index.load(Ordering::Relaxed);
        let next = (write + 1) & Self::MASK;

        // SAFETY: producer has exclusive access to its read-index cache.
        let mut cached_read = unsafe { *self.writer.read_index_cache.get() };
        let mut spin = 0usize;
        while next == cached_read {
            cached_read = self.reader.read_index.load(Ordering::Acquire);
            if next == cached_read {
                spin = backoff(spin);
            }
        }
        // SAFETY: producer has exclusive write access to its cache.
        unsafe {
            *self.writer.read_index_cache.get() = cached_read;
        }

        // SAFETY: same slot ownership argument as try_push.
        unsafe {
            ptr::write(self.buffer.slot(write).value.get(), MaybeUninit::new(item));
        }

        self.writer.write_index.store(next, Ordering::Release);
    }

    /// Attempts to pop an item from the queue (wait-free).
    ///
    /// Returns `None` if the queue is empty, with no state change.
    ///
    /// # Safety
    ///
    /// Caller must be the sole consumer: no other thread may call any
    /// consumer-side operation concurrently.
    #[inline]
    pub(crate) unsafe fn try_pop(&self) -> Option<T> {
        let read = self.reader.read_index.load(Ordering::Relaxed);

        // SAFETY: consumer has exclusive access to its write-index cache.
        let mut cached_write = unsafe { *self.reader.write_index_cache.get() };
        if read == cached_write {
            // Apparently empty: refresh from the authoritative write index
            // (acquire pairs with the producer's release store, proving the
            // slot contents are visible).
            cached_write = self.writer.write_index.load(Ordering::Acquire);
            // SAFETY: consumer has exclusive write access to its cache.
            unsafe {
                *self.reader.write_index_cache.get() = cached_write;
            }
            if read == cached_write {
                return None;
            }
        }

        // SAFETY: the slot at `read` was initialized by the producer (the
        // acquire/release pairing on the write index guarantees visibility),
        // and the consumer owns it until the read index advance below.
        let item = unsafe { ptr::read(self.buffer.slot(read).value.get()).assume_init() };

        // Publish: release pairs with the producer's acquire load, so the
        // producer observes the move-out above before reusing the slot.
        self.reader
            .read_index
            .store((read + 1) & Self::MASK, Ordering::Release);

        Some(item)
    }

    /// Pops an item, spinning until one is available.
    ///
    /// Never returns without succeeding; if the producer never pushes, this
    /// spins forever.
    ///
    /// # Safety
    ///
    /// Same single-consumer requirement as [`try_pop`](Self::try_pop).
    #[inline]
    pub(crate) unsafe fn force_pop(&self) -> T {
        let read = self.reader.read_index.load(Ordering::Relaxed);

        // SAFETY: consumer has exclusive access to its write-index cache.
        let mut cached_write = unsafe { *self.reader.write_index_cache.get() };
        let mut spin = 0usize;
        while read == cached_write {
            cached_write = self.writer.write_index.load(Ordering::Acquire);
            if read == cached_write {
                spin = backoff(spin);
            }
        }
        // SAFETY: consumer has exclusive write access to its cache.
        unsafe {
            *self.reader.write_index_cache.get() = cached_write;
        }

        // SAFETY: same slot ownership argument as try_pop.
        let item = unsafe { ptr::read(self.buffer.slot(read).value.get()).assume_init() };

        self.reader
            .read_index
            .store((read + 1) & Self::MASK, Ordering::Release);

        item
    }

    /// Pops one item and hands it to `func` by value.
    ///
    /// Returns whether an element was consumed. The value is moved out of the
    /// slot and the read index is published before `func` runs, so the slot can
    /// be reused immediately and a panicking callback cannot double-drop.
    ///
    /// # Safety
    ///
    /// Same single-consumer requirement as [`try_pop`](Self::try_pop).
    #[inline]
    pub(crate) unsafe fn consume_one<F>(&self, func: F) -> bool
    where
        F: FnOnce(T),
    {
        // SAFETY: forwarded single-consumer obligation.
        match unsafe { self.try_pop() } {
            Some(item) => {
                func(item);
                true
            }
            None => false,
        }
    }

    /// Pops until the queue appears empty, handing each item to `func`.
    ///
    /// Returns the number of items consumed. This is a snapshot drain: a
    /// concurrent producer may refill the queue while (or right after) it runs.
    ///
    /// # Safety
    ///
    /// Same single-consumer requirement as [`try_pop`](Self::try_pop).
    pub(crate) unsafe fn consume_all<F>(&self, mut func: F) -> usize
    where
        F: FnMut(T),
    {
        let mut count = 0;
        // SAFETY: forwarded single-consumer obligation.
        while unsafe { self.consume_one(&mut func) } {
            count += 1;
        }
        count
    }

    /// Pops at most `limit` items, handing each to `func`.
    ///
    /// Returns the number actually consumed (`<= limit`), stopping early if the
    /// queue appears empty.
    ///
    /// # Safety
    ///
    /// Same single-consumer requirement as [`try_pop`](Self::try_pop).
    pub(crate) unsafe fn consume_n<F>(&self, mut func: F, limit: usize) -> usize
    where
        F: FnMut(T),
    {
        let mut count = 0;
        while count < limit {
            // SAFETY: forwarded single-consumer obligation.
            if !unsafe { self.consume_one(&mut func) } {
                break;
            }
            count += 1;
        }
        count
    }

    /// Returns a reference to the next element to be popped, or `None` if the
    /// queue is empty.
    ///
    /// Reads the authoritative read index, consistent with [`try_pop`].
    ///
    /// # Safety
    ///
    /// Same single-consumer requirement as [`try_pop`](Self::try_pop), and the
    /// caller must not pop (or otherwise advance the read index) while the
    /// returned reference is alive.
    ///
    /// [`try_pop`]: Self::try_pop
    #[inline]
    pub(crate) unsafe fn front(&self) -> Option<&T> {
        let read = self.reader.read_index.load(Ordering::Relaxed);

        // SAFETY: consumer has exclusive access to its write-index cache.
        let mut cached_write = unsafe { *self.reader.write_index_cache.get() };
        if read == cached_write {
            cached_write = self.writer.write_index.load(Ordering::Acquire);
            // SAFETY: consumer has exclusive write access to its cache.
            unsafe {
                *self.reader.write_index_cache.get() = cached_write;
            }
            if read == cached_write {
                return None;
            }
        }

        // SAFETY: the slot at `read` is initialized and stays untouched by the
        // producer until the read index advances, which the caller has promised
        // not to do while the reference lives.
        Some(unsafe { (*self.buffer.slot(read).value.get()).assume_init_ref() })
    }

    /// Momentary emptiness snapshot from fresh acquire loads of both indices.
    ///
    /// Not synchronized with any mutation; by the time the caller acts on the
    /// result, the other thread may have changed it.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.writer.write_index.load(Ordering::Acquire)
            == self.reader.read_index.load(Ordering::Acquire)
    }

    /// Momentary fullness snapshot: the next write index would land on the
    /// read index.
    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        let write = self.writer.write_index.load(Ordering::Acquire);
        let read = self.reader.read_index.load(Ordering::Acquire);
        (write + 1) & Self::MASK == read
    }

    /// Momentary element count, wraparound-aware.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        let write = self.writer.write_index.load(Ordering::Acquire);
        let read = self.reader.read_index.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            (N - read) + write
        }
    }

    /// Usable capacity: `N - 1`, one slot short of the raw slot count because
    /// the ring keeps a sentinel gap to tell "full" from "empty".
    #[inline]
    pub(crate) const fn capacity() -> usize {
        Self::MASK
    }

    /// Drops any live elements and restores both indices and both caches to
    /// the initial empty configuration.
    ///
    /// # Safety
    ///
    /// No producer or consumer operation may run concurrently. This is not
    /// part of the lock-free protocol and has no ordering guarantees with
    /// concurrent use.
    pub(crate) unsafe fn reset(&self) {
        // SAFETY: exclusivity is the caller's obligation, which subsumes the
        // single-consumer requirement of try_pop.
        while unsafe { self.try_pop() }.is_some() {}

        // SAFETY: no concurrent access per the caller's contract.
        unsafe {
            *self.writer.read_index_cache.get() = 0;
            *self.reader.write_index_cache.get() = 0;
        }
        self.reader.read_index.store(0, Ordering::Relaxed);
        self.writer.write_index.store(0, Ordering::Relaxed);
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        // `&mut self` proves exclusivity; drop whatever is still queued.
        let write = self.writer.write_index.load(Ordering::Relaxed);
        let mut read = self.reader.read_index.load(Ordering::Relaxed);
        while read != write {
            // SAFETY: slots in [read, write) were initialized by the producer
            // and never moved out.
            unsafe {
                (*self.buffer.slot(read).value.get()).assume_init_drop();
            }
            read = (read + 1) & Self::MASK;
        }
    }
}

// SAFETY: Ring is Send because all fields are Send (AtomicUsize, RoleCell).
unsafe impl<T: Send, const N: usize> Send for Ring<T, N> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - write_index/read_index are AtomicUsize with release/acquire ordering
// - buffer slots and index caches are protected by the SPSC invariant
//   (see RoleCell)
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}
