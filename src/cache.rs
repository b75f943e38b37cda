//! Cache-line geometry used for padding and alignment.
//!
//! The value only affects layout (false-sharing avoidance), never behavior.
//! 64 bytes is correct for every mainstream x86_64 and aarch64 part this crate
//! targets; platforms with larger destructive-interference sizes merely lose
//! some padding headroom, not correctness.

/// Size of one cache line in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Alignment applied to each buffer slot: two cache lines, so that adjacent
/// slots and the prefetcher's next-line pulls never alias the index state.
pub const SLOT_ALIGN: usize = 2 * CACHE_LINE_SIZE;
