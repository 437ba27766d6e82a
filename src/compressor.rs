//! `CompressedPtr` and the `PtrCompressor` trait.
//!
//! Per the redesign note on compressed pointers: linked-list hooks and
//! bucket heads store a 32-bit `CompressedPtr` rather than a native pointer,
//! and all arithmetic on it is delegated to a `PtrCompressor` the facade
//! supplies. [`ArenaCompressor`] is the one compressor this crate ships: the
//! node arena is already index-addressed, so compressing a node reference
//! means nothing more than widening its `u32` slot index by one (reserving 0
//! for null) - the same relationship `malloc::Allocator` has to
//! `malloc::GlobalAllocator`, a trait for a concern this crate has exactly
//! one real implementation of.

use core::sync::atomic::{AtomicU32, Ordering};

/// A 32-bit compressed pointer into a bounded arena.
///
/// `0` is the null sentinel; any other value `v` denotes arena slot `v - 1`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CompressedPtr(u32);

impl CompressedPtr {
    /// The null compressed pointer.
    pub const NULL: CompressedPtr = CompressedPtr(0);

    /// Build a compressed pointer from an arena slot index.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        CompressedPtr(index + 1)
    }

    /// Recover the arena slot index, or `None` if this is the null pointer.
    #[inline]
    pub fn to_index(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0 - 1)
        }
    }

    /// Whether this is the null compressed pointer.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn from_raw(v: u32) -> Self {
        CompressedPtr(v)
    }
}

/// An atomic [`CompressedPtr`] slot, usable directly in a node's hooks.
#[derive(Debug, Default)]
pub struct AtomicCompressedPtr(AtomicU32);

impl AtomicCompressedPtr {
    /// Create a new atomic slot holding the null pointer.
    pub const fn new(ptr: CompressedPtr) -> Self {
        Self(AtomicU32::new(ptr.0))
    }

    /// Load the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> CompressedPtr {
        CompressedPtr::from_raw(self.0.load(order))
    }

    /// Store a new value.
    #[inline]
    pub fn store(&self, ptr: CompressedPtr, order: Ordering) {
        self.0.store(ptr.raw(), order);
    }

    /// Compare-and-swap.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: CompressedPtr,
        new: CompressedPtr,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CompressedPtr, CompressedPtr> {
        self.0
            .compare_exchange(current.raw(), new.raw(), success, failure)
            .map(CompressedPtr::from_raw)
            .map_err(CompressedPtr::from_raw)
    }

    /// Compare-and-swap, permitted to fail spuriously.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: CompressedPtr,
        new: CompressedPtr,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CompressedPtr, CompressedPtr> {
        self.0
            .compare_exchange_weak(current.raw(), new.raw(), success, failure)
            .map(CompressedPtr::from_raw)
            .map_err(CompressedPtr::from_raw)
    }

    /// Fetch-and-store.
    #[inline]
    pub fn swap(&self, new: CompressedPtr, order: Ordering) -> CompressedPtr {
        CompressedPtr::from_raw(self.0.swap(new.raw(), order))
    }
}

/// Translates between arena slot indices and [`CompressedPtr`] values.
///
/// Kept as a trait (rather than inlining `CompressedPtr::from_index`
/// everywhere) so an alternate arena layout - e.g. one that packs a
/// generation counter into the spare high bits to catch stale handles -
/// can supply its own encoding without touching `list.rs`/`index.rs`.
pub trait PtrCompressor {
    /// Compress an arena slot index.
    fn compress(&self, index: u32) -> CompressedPtr;

    /// Decompress a pointer back into an arena slot index.
    fn decompress(&self, ptr: CompressedPtr) -> Option<u32>;
}

/// The default, stateless compressor: arena slots map 1:1 onto compressed
/// pointers, shifted by one to reserve `0` for null.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArenaCompressor;

impl PtrCompressor for ArenaCompressor {
    #[inline]
    fn compress(&self, index: u32) -> CompressedPtr {
        CompressedPtr::from_index(index)
    }

    #[inline]
    fn decompress(&self, ptr: CompressedPtr) -> Option<u32> {
        ptr.to_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_null() {
        assert!(CompressedPtr::NULL.is_null());
        assert_eq!(CompressedPtr::NULL.to_index(), None);
    }

    #[test]
    fn test_round_trip() {
        let ptr = CompressedPtr::from_index(41);
        assert!(!ptr.is_null());
        assert_eq!(ptr.to_index(), Some(41));
    }

    #[test]
    fn test_arena_compressor_round_trip() {
        let c = ArenaCompressor;
        let ptr = c.compress(7);
        assert_eq!(c.decompress(ptr), Some(7));
    }

    #[test]
    fn test_atomic_compressed_ptr_cas() {
        let slot = AtomicCompressedPtr::new(CompressedPtr::NULL);
        let a = CompressedPtr::from_index(3);
        assert!(slot
            .compare_exchange(CompressedPtr::NULL, a, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok());
        assert_eq!(slot.load(Ordering::SeqCst), a);
    }
}
