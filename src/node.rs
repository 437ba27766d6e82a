//! The per-object [`Node`] and its access/policy hooks.
//!
//! A node is immutable in its identity (`key`, `value_len`, the value bytes)
//! while indexed; everything that changes after insertion - chain pointers,
//! policy list pointers, the flags byte, the reference count, expiry - is
//! modeled with atomics so C1/C3/C4 can all observe and mutate a node
//! concurrently without a per-node lock.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::compressor::{AtomicCompressedPtr, CompressedPtr};

/// `prev`/`next` pointers into a policy's doubly linked list, plus the
/// node's last-touched time.
///
/// One `AccessHooks` per node serves whichever policy list currently holds
/// it (CLOCK's single ring, SIEVE's ring, or one of S3-FIFO's two FIFOs) -
/// a node is a member of at most one policy list at a time, so one hook
/// struct suffices.
#[derive(Debug, Default)]
pub struct AccessHooks {
    pub(crate) prev: AtomicCompressedPtr,
    pub(crate) next: AtomicCompressedPtr,
    update_time: AtomicU32,
}

impl AccessHooks {
    /// A fresh, unlinked hook pair.
    pub const fn new() -> Self {
        Self {
            prev: AtomicCompressedPtr::new(CompressedPtr::NULL),
            next: AtomicCompressedPtr::new(CompressedPtr::NULL),
            update_time: AtomicU32::new(0),
        }
    }

    /// Load `prev`.
    #[inline]
    pub fn prev(&self) -> CompressedPtr {
        self.prev.load(Ordering::Acquire)
    }

    /// Load `next`.
    #[inline]
    pub fn next(&self) -> CompressedPtr {
        self.next.load(Ordering::Acquire)
    }

    /// Store `prev`.
    #[inline]
    pub fn set_prev(&self, ptr: CompressedPtr) {
        self.prev.store(ptr, Ordering::Release);
    }

    /// Store `next`.
    #[inline]
    pub fn set_next(&self, ptr: CompressedPtr) {
        self.next.store(ptr, Ordering::Release);
    }

    /// Last time (seconds since epoch-of-trace) this node was touched by a
    /// policy promotion.
    #[inline]
    pub fn update_time(&self) -> u32 {
        self.update_time.load(Ordering::Relaxed)
    }

    /// Record `now` as the last-touched time.
    #[inline]
    pub fn set_update_time(&self, now: u32) {
        self.update_time.store(now, Ordering::Relaxed);
    }
}

/// Bit layout of [`Node::flags`].
///
/// Single-bit sets/clears are relaxed read-modify-write; reads are relaxed.
/// The scan that inspects a node's reference bit tolerates observing it one
/// cycle late - these are approximate-policy bits, not a consistency
/// mechanism.
pub mod flag_bits {
    /// Node is reachable from the access index (C4).
    pub const ACCESS_INDEXED: u8 = 1 << 0;
    /// Node is linked into a policy's list (C3).
    pub const POLICY_INDEXED: u8 = 1 << 1;
    /// Set on access, cleared and inspected by the eviction scan.
    pub const REFERENCE: u8 = 1 << 2;
    /// Low bit of the two-bit queue tag (S3-FIFO: probationary/main/none).
    pub const QUEUE_TAG_BIT0: u8 = 1 << 3;
    /// High bit of the two-bit queue tag.
    pub const QUEUE_TAG_BIT1: u8 = 1 << 4;
    /// Mask covering both queue-tag bits.
    pub const QUEUE_TAG_MASK: u8 = QUEUE_TAG_BIT0 | QUEUE_TAG_BIT1;
    /// CLOCK's "this was the insertion point" marker.
    pub const TAIL_MARKER: u8 = 1 << 5;
}

/// The two-bit queue tag S3-FIFO uses to record which FIFO a node is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTag {
    /// Not currently a member of either S3-FIFO queue.
    None,
    /// Member of the probationary FIFO.
    Probationary,
    /// Member of the main FIFO.
    Main,
}

impl QueueTag {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & flag_bits::QUEUE_TAG_MASK {
            0 => QueueTag::None,
            flag_bits::QUEUE_TAG_BIT0 => QueueTag::Probationary,
            flag_bits::QUEUE_TAG_BIT1 => QueueTag::Main,
            _ => QueueTag::Main,
        }
    }

    #[inline]
    fn to_bits(self) -> u8 {
        match self {
            QueueTag::None => 0,
            QueueTag::Probationary => flag_bits::QUEUE_TAG_BIT0,
            QueueTag::Main => flag_bits::QUEUE_TAG_BIT1,
        }
    }
}

/// The node's atomic state byte: index/policy membership, reference bit,
/// queue tag, and CLOCK's tail marker.
#[derive(Debug, Default)]
pub struct Flags(core::sync::atomic::AtomicU8);

impl Flags {
    /// A freshly zeroed flags byte, matching a node's state right after
    /// construction and before `C4.insert`/`P.add` run.
    pub const fn new() -> Self {
        Self(core::sync::atomic::AtomicU8::new(0))
    }

    #[inline]
    fn test(&self, bit: u8) -> bool {
        self.0.load(Ordering::Relaxed) & bit != 0
    }

    #[inline]
    fn set_bit(&self, bit: u8) {
        self.0.fetch_or(bit, Ordering::Relaxed);
    }

    #[inline]
    fn clear_bit(&self, bit: u8) {
        self.0.fetch_and(!bit, Ordering::Relaxed);
    }

    /// `fetch_or`, returning whether the bit was already set.
    #[inline]
    fn test_and_set_bit(&self, bit: u8) -> bool {
        self.0.fetch_or(bit, Ordering::Relaxed) & bit != 0
    }

    /// `fetch_and`, returning whether the bit was set beforehand.
    #[inline]
    fn test_and_clear_bit(&self, bit: u8) -> bool {
        self.0.fetch_and(!bit, Ordering::Relaxed) & bit != 0
    }

    /// Whether `AccessIndexed` is set.
    pub fn is_access_indexed(&self) -> bool {
        self.test(flag_bits::ACCESS_INDEXED)
    }

    /// Set `AccessIndexed`.
    pub fn set_access_indexed(&self) {
        self.set_bit(flag_bits::ACCESS_INDEXED);
    }

    /// Clear `AccessIndexed`.
    pub fn clear_access_indexed(&self) {
        self.clear_bit(flag_bits::ACCESS_INDEXED);
    }

    /// Whether `PolicyIndexed` is set.
    pub fn is_policy_indexed(&self) -> bool {
        self.test(flag_bits::POLICY_INDEXED)
    }

    /// Set `PolicyIndexed`.
    pub fn set_policy_indexed(&self) {
        self.set_bit(flag_bits::POLICY_INDEXED);
    }

    /// Clear `PolicyIndexed`.
    pub fn clear_policy_indexed(&self) {
        self.clear_bit(flag_bits::POLICY_INDEXED);
    }

    /// Whether the reference bit is set.
    pub fn is_referenced(&self) -> bool {
        self.test(flag_bits::REFERENCE)
    }

    /// Set the reference bit. Returns whether it was already set.
    pub fn mark_accessed(&self) -> bool {
        self.test_and_set_bit(flag_bits::REFERENCE)
    }

    /// Clear the reference bit. Returns whether it was set.
    pub fn unmark_accessed(&self) -> bool {
        self.test_and_clear_bit(flag_bits::REFERENCE)
    }

    /// Whether the tail marker is set.
    pub fn is_tail_marker(&self) -> bool {
        self.test(flag_bits::TAIL_MARKER)
    }

    /// Set the tail marker.
    pub fn set_tail_marker(&self) {
        self.set_bit(flag_bits::TAIL_MARKER);
    }

    /// Clear the tail marker.
    pub fn clear_tail_marker(&self) {
        self.clear_bit(flag_bits::TAIL_MARKER);
    }

    /// Read the current queue tag.
    pub fn queue_tag(&self) -> QueueTag {
        QueueTag::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set the queue tag, leaving the other bits untouched.
    pub fn set_queue_tag(&self, tag: QueueTag) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (cur & !flag_bits::QUEUE_TAG_MASK) | tag.to_bits();
            match self.0.compare_exchange_weak(
                cur,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Raw bits, for diagnostics/tests only.
    pub fn bits(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One cached object.
///
/// `key`, `value_len`, and the value bytes are fixed at construction; every
/// other field is atomic so the index, the active policy, and any holder of
/// a [`crate::cache::Handle`] can observe the node concurrently.
pub struct Node {
    key: alloc::boxed::Box<[u8]>,
    value_len: u32,
    value: alloc::boxed::Box<[u8]>,

    /// Prev/next into whichever policy list currently holds this node.
    pub access_hooks: AccessHooks,
    /// Next pointer for the access index's intrusive per-bucket chain.
    pub hash_next: AtomicCompressedPtr,
    /// AccessIndexed / PolicyIndexed / ReferenceBit / QueueTag / TailMarker.
    pub flags: Flags,

    refs: AtomicU32,
    /// Absolute expiry second; `0` means no TTL.
    expire_at: AtomicU32,
}

impl Node {
    /// Build a new, unindexed node. `flags` start zeroed, `refs` start at 1
    /// (the facade's own handle from the call that created it).
    pub fn new(key: &[u8], value_len: u32, ttl: u32, now: u32) -> Self {
        Self {
            key: alloc::boxed::Box::from(key),
            value_len,
            value: alloc::vec![0u8; value_len as usize].into_boxed_slice(),
            access_hooks: AccessHooks::new(),
            hash_next: AtomicCompressedPtr::new(CompressedPtr::NULL),
            flags: Flags::new(),
            refs: AtomicU32::new(1),
            expire_at: AtomicU32::new(if ttl == 0 { 0 } else { now.saturating_add(ttl) }),
        }
    }

    /// The node's key.
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The declared value length (equal to `self.value().len()`).
    #[inline]
    pub fn value_len(&self) -> u32 {
        self.value_len
    }

    /// The value bytes.
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Whether `now` is past this node's expiry. `false` for TTL-less nodes.
    #[inline]
    pub fn is_expired(&self, now: u32) -> bool {
        let exp = self.expire_at.load(Ordering::Relaxed);
        exp != 0 && now >= exp
    }

    /// Acquire one reference, for a new [`crate::cache::Handle`].
    #[inline]
    pub fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one reference. Returns the count remaining.
    #[inline]
    pub fn release(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Current reference count.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Total bytes this node charges against the memory budget.
    #[inline]
    pub fn charged_bytes(&self) -> usize {
        self.key.len() + self.value_len as usize
    }
}
