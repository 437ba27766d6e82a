//! C4: the access index - a striped, open-chained bucket hash table
//! keyed by the node's `hash_next` slot rather than an external vector.
//!
//! `find` deliberately takes no lock: buckets are only ever prepended to
//! under a stripe's mutex, so a lock-free reader walking `hash_next` either
//! sees a fully-linked node or doesn't see it yet, and a key-mismatched
//! node encountered mid-removal is simply skipped. Every mutating
//! operation - `insert`, `insert_or_replace`, `remove`, `remove_if` - takes
//! the owning stripe's [`crate::spinlock::TicketLock`] for the duration of
//! its chain walk and patch.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::arena::NodeArena;
use crate::compressor::{AtomicCompressedPtr, CompressedPtr};
use crate::error::CacheError;
use crate::spinlock::TicketLock;

fn hash_key(key: &[u8]) -> u64 {
    use core::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Lazily recomputed bucket-occupancy statistics.
///
/// Per the source's "single boolean gate" note: recomputation is skipped
/// unless the snapshot is more than 10 minutes old or the key count has
/// drifted more than 5% since it was taken.
#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    pub max_chain_len: usize,
    pub avg_chain_len: f64,
    pub num_keys_at_computation: usize,
}

struct StatsCache {
    stats: BucketStats,
    computed_at: Instant,
}

const STATS_STALE_AFTER: Duration = Duration::from_secs(600);
const STATS_DRIFT_THRESHOLD: f64 = 0.05;

/// A fixed-size, striped-lock access index over arena-resident nodes.
pub struct AccessIndex {
    buckets: Box<[AtomicCompressedPtr]>,
    stripes: Box<[TicketLock<()>]>,
    bucket_mask: usize,
    stripe_mask: usize,
    num_keys: AtomicUsize,
    stats: Mutex<Option<StatsCache>>,
}

impl AccessIndex {
    /// Build an index with `num_buckets` buckets striped across
    /// `num_stripes` locks. Both must be nonzero powers of two.
    pub fn new(num_buckets: usize, num_stripes: usize) -> Result<Self, CacheError> {
        if num_buckets == 0 || !num_buckets.is_power_of_two() {
            return Err(CacheError::InvalidArgument(
                "num_buckets must be a nonzero power of two".into(),
            ));
        }
        if num_stripes == 0 || !num_stripes.is_power_of_two() {
            return Err(CacheError::InvalidArgument(
                "num_stripes must be a nonzero power of two".into(),
            ));
        }

        let mut buckets = Vec::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            buckets.push(AtomicCompressedPtr::new(CompressedPtr::NULL));
        }
        let mut stripes = Vec::with_capacity(num_stripes);
        for _ in 0..num_stripes {
            stripes.push(TicketLock::new(()));
        }

        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            stripes: stripes.into_boxed_slice(),
            bucket_mask: num_buckets - 1,
            stripe_mask: num_stripes - 1,
            num_keys: AtomicUsize::new(0),
            stats: Mutex::new(None),
        })
    }

    /// Number of keys currently indexed.
    pub fn len(&self) -> usize {
        self.num_keys.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_of(&self, key: &[u8]) -> usize {
        (hash_key(key) as usize) & self.bucket_mask
    }

    fn stripe_of(&self, bucket: usize) -> usize {
        bucket & self.stripe_mask
    }

    /// Walk a bucket's chain without taking any lock.
    ///
    /// Safe because the chain is only ever prepended to or spliced under
    /// a stripe lock; a concurrent mutation either hasn't happened yet
    /// from this reader's point of view, or has already completed, never
    /// half-applied.
    pub fn find(&self, arena: &NodeArena, key: &[u8]) -> Option<u32> {
        let bucket = self.bucket_of(key);
        let mut cur = self.buckets[bucket].load(Ordering::Acquire);
        while let Some(idx) = cur.to_index() {
            let node = arena.get(idx);
            if node.flags.is_access_indexed() && node.key() == key {
                return Some(idx);
            }
            cur = node.hash_next.load(Ordering::Acquire);
        }
        None
    }

    /// Insert `index` under `key`, failing if the node is already indexed
    /// or a node with the same key is already present in the bucket.
    pub fn insert(&self, arena: &NodeArena, key: &[u8], index: u32) -> Result<(), CacheError> {
        let bucket = self.bucket_of(key);
        let _guard = self.stripes[self.stripe_of(bucket)].lock();

        if arena.get(index).flags.is_access_indexed() {
            return Err(CacheError::Duplicate);
        }

        let mut cur = self.buckets[bucket].load(Ordering::Acquire);
        while let Some(idx) = cur.to_index() {
            let node = arena.get(idx);
            if node.key() == key {
                return Err(CacheError::Duplicate);
            }
            cur = node.hash_next.load(Ordering::Acquire);
        }

        self.link_new_head(arena, bucket, index);
        Ok(())
    }

    /// Insert `index` under `key`, swapping out and returning any existing
    /// node with the same key (preserving its position in the chain).
    pub fn insert_or_replace(&self, arena: &NodeArena, key: &[u8], index: u32) -> Option<u32> {
        let bucket = self.bucket_of(key);
        let _guard = self.stripes[self.stripe_of(bucket)].lock();

        let mut prev: Option<u32> = None;
        let mut cur = self.buckets[bucket].load(Ordering::Acquire);
        while let Some(idx) = cur.to_index() {
            let node = arena.get(idx);
            if node.key() == key {
                let new_ptr = CompressedPtr::from_index(index);
                let next = node.hash_next.load(Ordering::Acquire);
                arena.get(index).hash_next.store(next, Ordering::Release);

                match prev {
                    Some(p) => arena.get(p).hash_next.store(new_ptr, Ordering::Release),
                    None => self.buckets[bucket].store(new_ptr, Ordering::Release),
                }

                node.hash_next.store(CompressedPtr::NULL, Ordering::Release);
                node.flags.clear_access_indexed();
                arena.get(index).flags.set_access_indexed();
                return Some(idx);
            }
            prev = Some(idx);
            cur = node.hash_next.load(Ordering::Acquire);
        }

        self.link_new_head(arena, bucket, index);
        None
    }

    fn link_new_head(&self, arena: &NodeArena, bucket: usize, index: u32) {
        let head = self.buckets[bucket].load(Ordering::Acquire);
        arena.get(index).hash_next.store(head, Ordering::Release);
        self.buckets[bucket].store(CompressedPtr::from_index(index), Ordering::Release);
        arena.get(index).flags.set_access_indexed();
        self.num_keys.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty();
    }

    /// Remove the node indexed under `key`, if present.
    pub fn remove(&self, arena: &NodeArena, key: &[u8]) -> Option<u32> {
        self.remove_if(arena, key, |_| true)
    }

    /// Remove the node indexed under `key` iff it satisfies `pred`,
    /// atomically with respect to other stripe-local mutations.
    pub fn remove_if(
        &self,
        arena: &NodeArena,
        key: &[u8],
        pred: impl FnOnce(&crate::node::Node) -> bool,
    ) -> Option<u32> {
        let bucket = self.bucket_of(key);
        let _guard = self.stripes[self.stripe_of(bucket)].lock();

        let mut prev: Option<u32> = None;
        let mut cur = self.buckets[bucket].load(Ordering::Acquire);
        while let Some(idx) = cur.to_index() {
            let node = arena.get(idx);
            let next = node.hash_next.load(Ordering::Acquire);
            if node.key() == key {
                if !node.flags.is_access_indexed() || !pred(node) {
                    return None;
                }
                match prev {
                    Some(p) => arena.get(p).hash_next.store(next, Ordering::Release),
                    None => self.buckets[bucket].store(next, Ordering::Release),
                }
                node.hash_next.store(CompressedPtr::NULL, Ordering::Release);
                node.flags.clear_access_indexed();
                self.num_keys.fetch_sub(1, Ordering::Relaxed);
                self.mark_dirty();
                return Some(idx);
            }
            prev = Some(idx);
            cur = next;
        }
        None
    }

    fn mark_dirty(&self) {
        // Recomputation staleness is judged against the stored snapshot's
        // own `num_keys_at_computation`, so nothing needs doing here
        // beyond letting `bucket_stats` observe the updated `num_keys` on
        // its next call.
    }

    /// Per-bucket chain length statistics, recomputed only if the cached
    /// snapshot is stale (see [`STATS_STALE_AFTER`]/[`STATS_DRIFT_THRESHOLD`]).
    pub fn bucket_stats(&self, arena: &NodeArena) -> BucketStats {
        let current_keys = self.len();
        {
            let cache = self.stats.lock().unwrap();
            if let Some(c) = cache.as_ref() {
                let age_ok = c.computed_at.elapsed() < STATS_STALE_AFTER;
                let drift = if c.stats.num_keys_at_computation == 0 {
                    if current_keys == 0 { 0.0 } else { 1.0 }
                } else {
                    (current_keys as f64 - c.stats.num_keys_at_computation as f64).abs()
                        / c.stats.num_keys_at_computation as f64
                };
                if age_ok && drift < STATS_DRIFT_THRESHOLD {
                    return c.stats;
                }
            }
        }

        let mut max_len = 0usize;
        let mut total_len = 0usize;
        for bucket in self.buckets.iter() {
            let mut len = 0usize;
            let mut cur = bucket.load(Ordering::Acquire);
            while let Some(idx) = cur.to_index() {
                len += 1;
                cur = arena.get(idx).hash_next.load(Ordering::Acquire);
            }
            max_len = max_len.max(len);
            total_len += len;
        }

        let stats = BucketStats {
            max_chain_len: max_len,
            avg_chain_len: total_len as f64 / self.buckets.len() as f64,
            num_keys_at_computation: current_keys,
        };
        *self.stats.lock().unwrap() = Some(StatsCache {
            stats,
            computed_at: Instant::now(),
        });
        stats
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
    fn test_insert_then_find() {
        let arena = arena_with(4);
        let index = AccessIndex::new(4, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        assert_eq!(index.find(&arena, b"a"), Some(a));
        assert_eq!(index.find(&arena, b"missing"), None);
    }

    #[test]
    fn test_insert_duplicate_key_fails() {
        let arena = arena_with(4);
        let index = AccessIndex::new(4, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let a2 = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        assert!(matches!(
            index.insert(&arena, b"a", a2),
            Err(CacheError::Duplicate)
        ));
    }

    #[test]
    fn test_insert_or_replace_preserves_chain_position() {
        let arena = arena_with(8);
        // Force a collision: construct with 1 bucket so every key chains.
        let index = AccessIndex::new(1, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let b = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        let c = arena.alloc(Node::new(b"c", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        index.insert(&arena, b"b", b).unwrap();
        index.insert(&arena, b"c", c).unwrap();

        let b2 = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        let old = index.insert_or_replace(&arena, b"b", b2).unwrap();
        assert_eq!(old, b);
        assert_eq!(index.find(&arena, b"b"), Some(b2));
        assert_eq!(index.find(&arena, b"a"), Some(a));
        assert_eq!(index.find(&arena, b"c"), Some(c));
        assert!(!arena.get(b).flags.is_access_indexed());
        assert!(arena.get(b2).flags.is_access_indexed());
    }

    #[test]
    fn test_remove() {
        let arena = arena_with(4);
        let index = AccessIndex::new(4, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        assert_eq!(index.remove(&arena, b"a"), Some(a));
        assert_eq!(index.find(&arena, b"a"), None);
        assert_eq!(index.remove(&arena, b"a"), None);
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let arena = arena_with(4);
        let index = AccessIndex::new(4, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        assert_eq!(index.remove_if(&arena, b"a", |_| false), None);
        assert_eq!(index.find(&arena, b"a"), Some(a));
        assert_eq!(index.remove_if(&arena, b"a", |_| true), Some(a));
    }

    #[test]
    fn test_collision_bucket_removal_keeps_siblings() {
        let arena = arena_with(4);
        let index = AccessIndex::new(1, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let b = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        index.insert(&arena, b"b", b).unwrap();
        assert_eq!(index.remove(&arena, b"a"), Some(a));
        assert_eq!(index.find(&arena, b"b"), Some(b));
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(AccessIndex::new(3, 1).is_err());
        assert!(AccessIndex::new(4, 3).is_err());
        assert!(AccessIndex::new(0, 1).is_err());
    }

    #[test]
    fn test_bucket_stats_reflects_chain_lengths() {
        let arena = arena_with(4);
        let index = AccessIndex::new(1, 1).unwrap();
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let b = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        index.insert(&arena, b"a", a).unwrap();
        index.insert(&arena, b"b", b).unwrap();
        let stats = index.bucket_stats(&arena);
        assert_eq!(stats.max_chain_len, 2);
    }
}
