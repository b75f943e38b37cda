//! Slot storage: a single owned buffer allocated once at construction.
//!
//! The slot array always lives in one heap allocation made when the ring is
//! built. An inline specialization for small compile-time capacities would
//! need type-level selection on `N` (the allocation-threshold trick of making
//! the buffer a tagged union does not work here: a Rust enum is sized to its
//! largest variant, so the inline variant's footprint would be paid even when
//! the heap variant is active). This is a placement decision only: it affects
//! allocation strategy and construction-time failure modes, never the
//! concurrency protocol or the public contract, and no allocation ever happens
//! on the hot path.

use std::mem::MaybeUninit;

use crate::spsc::ring::SlotCell;

/// A single slot in the ring buffer.
///
/// Aligned to two cache lines ([`SLOT_ALIGN`]) so neighboring slots, and the
/// prefetcher pulling the line after one, never contend with the index state
/// or with each other.
///
/// [`SLOT_ALIGN`]: crate::cache::SLOT_ALIGN
#[repr(C)]
#[repr(align(128))]
pub(crate) struct Slot<T> {
    pub(crate) value: SlotCell<MaybeUninit<T>>,
}

const _: () = assert!(std::mem::align_of::<Slot<u8>>() == crate::cache::SLOT_ALIGN);

impl<T> Slot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            value: SlotCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Owned slot array for a ring of `N` elements.
pub(crate) struct Buffer<T, const N: usize>(Box<[Slot<T>; N]>);

impl<T, const N: usize> Buffer<T, N> {
    /// Allocates the slot array. The slots start uninitialized; a slot's value
    /// is alive only between a successful push and the matching pop.
    pub(crate) fn new() -> Self {
        let slots: Box<[Slot<T>]> = (0..N).map(|_| Slot::new()).collect();
        match slots.try_into() {
            Ok(array) => Self(array),
            // The iterator above produced exactly N slots.
            Err(_) => unreachable!("slot array length mismatch"),
        }
    }

    /// Returns the slot at `index`.
    ///
    /// `index` is always in `[0, N)` because every index in the ring is masked
    /// by `N - 1`, so the bounds check here compiles away.
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &Slot<T> {
        &self.0[index]
    }
}
