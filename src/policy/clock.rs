//! CLOCK, Atomic-CLOCK, and the buffered Atomic-CLOCK variant.
//!
//! All three share one list and one atomic hand; the source's distinction
//! between a plain-mutex `Clock` and a CAS-based `AtomicClock` collapses
//! here because [`crate::list::ADList`]'s head/tail are already lock-free -
//! there is no non-atomic hand to offer. `AtomicClockBufferedPolicy` is
//! the one with real behavioral difference: it precomputes victims into a
//! bounded queue so eviction callers usually just dequeue instead of
//! walking the list themselves.

use core::sync::atomic::Ordering;

use crate::arena::NodeArena;
use crate::backoff::Backoff;
use crate::compressor::CompressedPtr;
use crate::fifo::BoundedMpmcFifo;
use crate::list::ADList;

use super::{AccessMode, EvictionPolicy, PolicyConfig};

/// CLOCK / Atomic-CLOCK: a single list, a hand that sweeps it, and one
/// reference bit per node.
pub struct ClockPolicy {
    list: ADList,
    hand: crate::compressor::AtomicCompressedPtr,
    config: PolicyConfig,
}

impl ClockPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            list: ADList::new(),
            hand: crate::compressor::AtomicCompressedPtr::new(CompressedPtr::NULL),
            config,
        }
    }

    /// Move the hand off a node it currently points at, e.g. because that
    /// node is about to be unlinked out from under it by `remove`/`replace`.
    fn retarget_hand(&self, from: u32, to: CompressedPtr) {
        let from_ptr = CompressedPtr::from_index(from);
        let _ = self
            .hand
            .compare_exchange(from_ptr, to, Ordering::AcqRel, Ordering::Relaxed);
    }
}

impl EvictionPolicy for ClockPolicy {
    fn add(&self, arena: &NodeArena, index: u32) {
        self.list.link_at_head(arena, index);
        let node = arena.get(index);
        node.flags.unmark_accessed();
        node.flags.set_policy_indexed();
    }

    fn record_access(&self, arena: &NodeArena, index: u32, mode: AccessMode) {
        if !self.config.should_record(mode) {
            return;
        }
        arena.get(index).flags.mark_accessed();
    }

    fn remove(&self, arena: &NodeArena, index: u32) {
        let prev = arena.get(index).access_hooks.prev();
        self.list.remove(arena, index);
        self.retarget_hand(index, prev);
        let node = arena.get(index);
        node.flags.clear_policy_indexed();
    }

    fn replace(&self, arena: &NodeArena, old_index: u32, new_index: u32) {
        self.list.replace(arena, old_index, new_index);
        self.retarget_hand(old_index, CompressedPtr::from_index(new_index));

        let old = arena.get(old_index);
        old.flags.clear_policy_indexed();
        let new = arena.get(new_index);
        new.flags.set_policy_indexed();
        new.flags.unmark_accessed();
    }

    /// Sweep from the hand toward the head, wrapping back to the tail when
    /// it runs off the end. Insertion always links at the head, so the
    /// tail is the oldest node - starting there and walking `prev()` visits
    /// nodes in insertion order, oldest first. Referenced nodes get their
    /// bit cleared and are skipped; the first unreferenced node found is
    /// unlinked and returned.
    fn get_eviction_candidate(&self, arena: &NodeArena) -> Option<u32> {
        if self.list.is_empty() {
            return None;
        }

        let mut wraps = 0u32;
        let mut cur = self.hand.load(Ordering::Acquire);
        if cur.is_null() {
            cur = CompressedPtr::from_index(self.list.tail()?);
        }

        let mut backoff = Backoff::new();
        loop {
            let idx = match cur.to_index() {
                Some(i) => i,
                None => {
                    wraps += 1;
                    crate::invariant!(
                        wraps <= 2,
                        "CLOCK hand wrapped past the list twice; list may be torn"
                    );
                    if wraps > 2 {
                        return None;
                    }
                    cur = CompressedPtr::from_index(self.list.tail()?);
                    backoff.spin();
                    continue;
                }
            };

            let node = arena.get(idx);
            if node.flags.unmark_accessed() {
                let prev = node.access_hooks.prev();
                self.hand.store(prev, Ordering::Release);
                cur = prev;
            } else {
                let prev = node.access_hooks.prev();
                self.list.remove(arena, idx);
                node.flags.clear_policy_indexed();
                self.hand.store(prev, Ordering::Release);
                return Some(idx);
            }
        }
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}

/// Atomic-CLOCK with a bounded prefetch queue of pre-selected victims.
///
/// Consumers first try the queue; only when it runs dry do they fall back
/// to walking the list directly, then trigger a refill. Per the redesign
/// note on prefetch queues, a dequeued victim may already have been
/// concurrently re-removed by another path (e.g. an explicit `remove`) -
/// callers of `get_eviction_candidate` must re-check the node is still
/// policy-indexed before acting on it, exactly as with the
/// non-buffered policy's racy reference-bit reads.
pub struct AtomicClockBufferedPolicy {
    inner: ClockPolicy,
    prefetch: BoundedMpmcFifo<u32>,
    low_water: usize,
    high_water: usize,
}

impl AtomicClockBufferedPolicy {
    const QUEUE_CAPACITY: usize = 64;

    pub fn new(config: PolicyConfig, capacity_hint: usize) -> Self {
        let low_water = (capacity_hint / 4).max(1);
        let high_water = (capacity_hint * 3 / 4).max(low_water + 1);
        Self {
            inner: ClockPolicy::new(config),
            prefetch: BoundedMpmcFifo::new(Self::QUEUE_CAPACITY),
            low_water,
            high_water,
        }
    }

    /// Refill the prefetch queue by walking the underlying CLOCK list
    /// until it is above the high-water mark or the list runs dry.
    fn refill(&self, arena: &NodeArena) {
        while self.prefetch.len() < self.high_water {
            match self.inner.get_eviction_candidate(arena) {
                Some(idx) => {
                    // SAFETY: `entry` is a fresh heap box consumed by
                    // exactly one of `try_enqueue`'s two outcomes.
                    unsafe {
                        let entry = alloc::boxed::Box::into_raw(alloc::boxed::Box::new(
                            crate::fifo::FifoEntry::new(idx),
                        ));
                        if self.prefetch.try_enqueue(entry).is_err() {
                            drop(alloc::boxed::Box::from_raw(entry));
                            break;
                        }
                    }
                }
                None => break,
            }
        }
    }
}

impl EvictionPolicy for AtomicClockBufferedPolicy {
    fn add(&self, arena: &NodeArena, index: u32) {
        self.inner.add(arena, index);
    }

    fn record_access(&self, arena: &NodeArena, index: u32, mode: AccessMode) {
        self.inner.record_access(arena, index, mode);
    }

    fn remove(&self, arena: &NodeArena, index: u32) {
        self.inner.remove(arena, index);
    }

    fn replace(&self, arena: &NodeArena, old_index: u32, new_index: u32) {
        self.inner.replace(arena, old_index, new_index);
    }

    fn get_eviction_candidate(&self, arena: &NodeArena) -> Option<u32> {
        if self.prefetch.len() <= self.low_water {
            self.refill(arena);
        }
        // SAFETY: entries are produced exclusively by `refill`, which
        // boxes a single `u32` per entry and never frees it itself.
        unsafe {
            if let Some(entry) = self.prefetch.dequeue() {
                let boxed = alloc::boxed::Box::from_raw(entry);
                let idx = *boxed.data();
                return Some(idx);
            }
        }
        self.inner.get_eviction_candidate(arena)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn arena_with(n: usize) -> NodeArena {
        NodeArena::new(n)
    }

    #[test]
    fn test_clock_evicts_unreferenced_before_referenced() {
        let arena = arena_with(4);
        let policy = ClockPolicy::new(PolicyConfig::default());
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let b = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        policy.add(&arena, b);

        // Mark `a` referenced; clock should skip it and evict `b`.
        policy.record_access(&arena, a, AccessMode::Read);
        let victim = policy.get_eviction_candidate(&arena).unwrap();
        assert_eq!(victim, b);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn test_clock_clears_reference_bit_on_skip() {
        let arena = arena_with(4);
        let policy = ClockPolicy::new(PolicyConfig::default());
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        policy.record_access(&arena, a, AccessMode::Read);

        // First sweep clears the bit and wraps back to find `a` again,
        // this time evicting it.
        let victim = policy.get_eviction_candidate(&arena).unwrap();
        assert_eq!(victim, a);
    }

    #[test]
    fn test_clock_no_candidate_when_empty() {
        let arena = arena_with(2);
        let policy = ClockPolicy::new(PolicyConfig::default());
        assert!(policy.get_eviction_candidate(&arena).is_none());
    }

    #[test]
    fn test_update_on_read_false_suppresses_reference_bit() {
        let arena = arena_with(4);
        let config = PolicyConfig {
            update_on_read: false,
            update_on_write: true,
        };
        let policy = ClockPolicy::new(config);
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        policy.record_access(&arena, a, AccessMode::Read);
        assert!(!arena.get(a).flags.is_referenced());
    }

    #[test]
    fn test_buffered_clock_refills_and_drains() {
        let arena = arena_with(8);
        let policy = AtomicClockBufferedPolicy::new(PolicyConfig::default(), 8);
        let mut indices = alloc::vec::Vec::new();
        for k in 0..4u8 {
            let idx = arena.alloc(Node::new(&[k], 0, 0, 0)).unwrap();
            policy.add(&arena, idx);
            indices.push(idx);
        }

        let mut evicted = alloc::vec::Vec::new();
        for _ in 0..4 {
            evicted.push(policy.get_eviction_candidate(&arena).unwrap());
        }
        evicted.sort_unstable();
        let mut expected = indices.clone();
        expected.sort_unstable();
        assert_eq!(evicted, expected);
        assert!(policy.get_eviction_candidate(&arena).is_none());
    }
}
