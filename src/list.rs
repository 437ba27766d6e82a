//! C1: the atomic doubly linked list (ADList).
//!
//! The hot paths - `link_at_head`, `remove_tail` - are lock-free CAS loops
//! over `head`/`tail`. Anything that must see three pointers consistently
//! at once - `unlink`, `remove`, `replace`, `move_to_head` - takes
//! [`ADList::mutex`], a [`crate::spinlock::TicketLock`] rather than an
//! external lock crate, per the redesign note resolving the source's
//! `folly::DistributedMutex` dependency.
//!
//! Every operation is expressed in terms of arena slot indices and a
//! [`NodeArena`] passed in by the caller - there is no pointer embedded in
//! the list itself, matching the redesign note on intrusive hook pointers.

use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use crate::arena::NodeArena;
use crate::backoff::Backoff;
use crate::compressor::CompressedPtr;
use crate::spinlock::TicketLock;

/// A lock-free doubly linked list of arena-resident nodes.
///
/// Every node has at most one `ADList` it belongs to at a time (a node's
/// single [`crate::node::AccessHooks`] pair is shared by whichever policy
/// list currently holds it), so the list itself carries no per-node state
/// beyond `head`/`tail`/`size`.
pub struct ADList {
    head: crate::compressor::AtomicCompressedPtr,
    tail: crate::compressor::AtomicCompressedPtr,
    size: core::sync::atomic::AtomicUsize,
    mutex: TicketLock<()>,
}

impl Default for ADList {
    fn default() -> Self {
        Self::new()
    }
}

impl ADList {
    /// An empty list.
    pub const fn new() -> Self {
        Self {
            head: crate::compressor::AtomicCompressedPtr::new(CompressedPtr::NULL),
            tail: crate::compressor::AtomicCompressedPtr::new(CompressedPtr::NULL),
            size: core::sync::atomic::AtomicUsize::new(0),
            mutex: TicketLock::new(()),
        }
    }

    /// Current head, or `None` if empty.
    pub fn head(&self) -> Option<u32> {
        self.head.load(Ordering::Acquire).to_index()
    }

    /// Current tail, or `None` if empty.
    pub fn tail(&self) -> Option<u32> {
        self.tail.load(Ordering::Acquire).to_index()
    }

    /// Eventually-consistent size; not used for correctness, only policy
    /// balancing (e.g. S3-FIFO's probationary-ratio check).
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Whether the list is (eventually-consistently) empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Link a single, already-detached node at the head of the list.
    ///
    /// Lock-free: retries the head CAS on contention, re-reading the
    /// current head and rewriting `node.next` each attempt.
    pub fn link_at_head(&self, arena: &NodeArena, index: u32) {
        let me = CompressedPtr::from_index(index);
        let hooks = &arena.get(index).access_hooks;
        hooks.set_prev(CompressedPtr::NULL);

        let mut backoff = Backoff::new();
        loop {
            let h = self.head.load(Ordering::Acquire);
            hooks.set_next(h);

            match self
                .head
                .compare_exchange_weak(h, me, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    if h.is_null() {
                        let _ = self.tail.compare_exchange(
                            CompressedPtr::NULL,
                            me,
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        );
                    } else {
                        // SAFETY: h was just observed non-null and is a
                        // live arena index until unlinked under `mutex`.
                        arena.get(h.to_index().unwrap()).access_hooks.set_prev(me);
                    }
                    self.size.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Link a pre-built chain `start..=end` of `n` nodes as a prefix.
    ///
    /// `start` and `end` must already be linked to each other (and to
    /// nothing else); `start.prev` is reset to null here.
    pub fn link_at_head_multi(&self, arena: &NodeArena, start: u32, end: u32, n: usize) {
        let start_ptr = CompressedPtr::from_index(start);
        let end_ptr = CompressedPtr::from_index(end);
        arena.get(start).access_hooks.set_prev(CompressedPtr::NULL);

        let mut backoff = Backoff::new();
        loop {
            let h = self.head.load(Ordering::Acquire);
            arena.get(end).access_hooks.set_next(h);

            match self.head.compare_exchange_weak(
                h,
                start_ptr,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if h.is_null() {
                        let _ = self.tail.compare_exchange(
                            CompressedPtr::NULL,
                            end_ptr,
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        );
                    } else {
                        arena
                            .get(h.to_index().unwrap())
                            .access_hooks
                            .set_prev(start_ptr);
                    }
                    self.size.fetch_add(n, Ordering::Relaxed);
                    return;
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Detach and return the current tail, or `None` if the list is empty.
    ///
    /// The returned node's `next` pointer is deliberately left untouched -
    /// the caller takes ownership of the node and either discards or
    /// relinks it; reading stale `next` on a removed node is never done by
    /// this list itself.
    pub fn remove_tail(&self, arena: &NodeArena) -> Option<u32> {
        let mut backoff = Backoff::new();
        loop {
            let t = self.tail.load(Ordering::Acquire);
            let t_idx = match t.to_index() {
                Some(i) => i,
                None => return None,
            };
            let p = arena.get(t_idx).access_hooks.prev();

            match self
                .tail
                .compare_exchange_weak(t, p, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    let h = self.head.load(Ordering::Acquire);
                    if h == t {
                        // The list held exactly one element; the head/tail
                        // transition to empty is guarded by the coarse
                        // mutex so a concurrent `link_at_head` cannot
                        // observe a torn head==tail!=null state.
                        let _guard = self.mutex.lock();
                        let _ = self.head.compare_exchange(
                            t,
                            CompressedPtr::NULL,
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        );
                    }
                    arena.get(t_idx).access_hooks.set_prev(CompressedPtr::NULL);
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    return Some(t_idx);
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Splice `index` out of the list, wherever it currently sits.
    ///
    /// Takes the coarse mutex: patching `prev`/`next`/`head`/`tail`
    /// consistently needs all of them to be seen together.
    pub fn remove(&self, arena: &NodeArena, index: u32) {
        let _guard = self.mutex.lock();
        self.unlink_locked(arena, index);
    }

    /// Equivalent to [`remove`](Self::remove); kept as a distinct name to
    /// mirror the source's `unlink`/`remove` pair (callers that already
    /// know the node is mid-list use this name).
    pub fn unlink(&self, arena: &NodeArena, index: u32) {
        self.remove(arena, index);
    }

    fn unlink_locked(&self, arena: &NodeArena, index: u32) {
        let hooks = &arena.get(index).access_hooks;
        let prev = hooks.prev();
        let next = hooks.next();

        match prev.to_index() {
            Some(p) => arena.get(p).access_hooks.set_next(next),
            None => self.head.store(next, Ordering::Release),
        }
        match next.to_index() {
            Some(n) => arena.get(n).access_hooks.set_prev(prev),
            None => self.tail.store(prev, Ordering::Release),
        }

        hooks.set_prev(CompressedPtr::NULL);
        hooks.set_next(CompressedPtr::NULL);
        self.size.fetch_sub(1, Ordering::Relaxed);
    }

    /// Swap `new_index` into `old_index`'s position, preserving its
    /// neighbors. `old_index` must currently be linked; `new_index` must
    /// not be linked anywhere.
    pub fn replace(&self, arena: &NodeArena, old_index: u32, new_index: u32) {
        let _guard = self.mutex.lock();
        let new_ptr = CompressedPtr::from_index(new_index);

        let (prev, next) = {
            let old_hooks = &arena.get(old_index).access_hooks;
            (old_hooks.prev(), old_hooks.next())
        };
        {
            let new_hooks = &arena.get(new_index).access_hooks;
            new_hooks.set_prev(prev);
            new_hooks.set_next(next);
        }

        match prev.to_index() {
            Some(p) => arena.get(p).access_hooks.set_next(new_ptr),
            None => self.head.store(new_ptr, Ordering::Release),
        }
        match next.to_index() {
            Some(n) => arena.get(n).access_hooks.set_prev(new_ptr),
            None => self.tail.store(new_ptr, Ordering::Release),
        }

        let old_hooks = &arena.get(old_index).access_hooks;
        old_hooks.set_prev(CompressedPtr::NULL);
        old_hooks.set_next(CompressedPtr::NULL);
    }

    /// Move an already-linked node to the head of the list.
    pub fn move_to_head(&self, arena: &NodeArena, index: u32) {
        let _guard = self.mutex.lock();
        self.unlink_locked(arena, index);
        drop(_guard);
        self.link_at_head(arena, index);
    }

    /// Snapshot the list's indices from head to tail, for observability.
    ///
    /// Takes the coarse mutex for the duration of the walk so the snapshot
    /// is consistent; never called from a hot path.
    pub fn snapshot_from_head(&self, arena: &NodeArena) -> Vec<u32> {
        let _guard = self.mutex.lock();
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.head.load(Ordering::Acquire);
        while let Some(idx) = cur.to_index() {
            out.push(idx);
            cur = arena.get(idx).access_hooks.next();
        }
        out
    }
}
