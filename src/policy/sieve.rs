//! SIEVE: a CLOCK-shaped list whose hand never resets and whose victims
//! are not necessarily adjacent to the tail.
//!
//! The list shape and reference bit are identical to CLOCK's; the
//! difference is entirely in the eviction walk: SIEVE's hand sweeps from
//! head toward tail (insertion order, newest first) and persists across
//! calls, evicting the *first* unreferenced node it meets rather than the
//! one nearest the tail.

use core::sync::atomic::Ordering;

use crate::arena::NodeArena;
use crate::backoff::Backoff;
use crate::compressor::CompressedPtr;
use crate::list::ADList;

use super::{AccessMode, EvictionPolicy, PolicyConfig};

pub struct SievePolicy {
    list: ADList,
    hand: crate::compressor::AtomicCompressedPtr,
    config: PolicyConfig,
}

impl SievePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            list: ADList::new(),
            hand: crate::compressor::AtomicCompressedPtr::new(CompressedPtr::NULL),
            config,
        }
    }

    fn retarget_hand(&self, from: u32, to: CompressedPtr) {
        let from_ptr = CompressedPtr::from_index(from);
        let _ = self
            .hand
            .compare_exchange(from_ptr, to, Ordering::AcqRel, Ordering::Relaxed);
    }
}

impl EvictionPolicy for SievePolicy {
    fn add(&self, arena: &NodeArena, index: u32) {
        self.list.link_at_head(arena, index);
        let node = arena.get(index);
        node.flags.unmark_accessed();
        node.flags.set_policy_indexed();
    }

    fn record_access(&self, arena: &NodeArena, index: u32, mode: AccessMode) {
        // SIEVE's record_access never relinks the node - only CLOCK-style
        // add/eviction ever move it.
        if !self.config.should_record(mode) {
            return;
        }
        arena.get(index).flags.mark_accessed();
    }

    fn remove(&self, arena: &NodeArena, index: u32) {
        let next = arena.get(index).access_hooks.next();
        self.list.remove(arena, index);
        self.retarget_hand(index, next);
        arena.get(index).flags.clear_policy_indexed();
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

    /// Sweep from the hand toward the tail, wrapping back to the head
    /// when it runs off the end. The hand never resets to a fixed
    /// starting point the way CLOCK's does; it is left at the victim's
    /// next neighbor, so the node most recently inserted at the head is
    /// the last one visited rather than the first.
    fn get_eviction_candidate(&self, arena: &NodeArena) -> Option<u32> {
        if self.list.is_empty() {
            return None;
        }

        let mut wraps = 0u32;
        let mut cur = self.hand.load(Ordering::Acquire);
        if cur.is_null() {
            cur = CompressedPtr::from_index(self.list.head()?);
        }

        let mut backoff = Backoff::new();
        loop {
            let idx = match cur.to_index() {
                Some(i) => i,
                None => {
                    wraps += 1;
                    crate::invariant!(
                        wraps <= 2,
                        "SIEVE hand wrapped past the list twice; list may be torn"
                    );
                    if wraps > 2 {
                        return None;
                    }
                    cur = CompressedPtr::from_index(self.list.head()?);
                    backoff.spin();
                    continue;
                }
            };

            let node = arena.get(idx);
            if node.flags.unmark_accessed() {
                let next = node.access_hooks.next();
                self.hand.store(next, Ordering::Release);
                cur = next;
            } else {
                let next = node.access_hooks.next();
                self.list.remove(arena, idx);
                node.flags.clear_policy_indexed();
                self.hand.store(next, Ordering::Release);
                return Some(idx);
            }
        }
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}
