//! C5: the cache facade tying the access index, the active eviction
//! policy, and the node arena together behind one small API surface.

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

use crate::arena::NodeArena;
use crate::error::CacheError;
use crate::index::AccessIndex;
use crate::malloc::{BudgetAllocator, GlobalAllocator};
use crate::node::Node;
use crate::policy::clock::{AtomicClockBufferedPolicy, ClockPolicy};
use crate::policy::s3fifo::S3FifoPolicy;
use crate::policy::sieve::SievePolicy;
use crate::policy::{AccessMode, EvictionPolicy, PolicyConfig, PolicyKind};
use crate::time::TraceClock;

/// Bytes assumed per entry when no more specific sizing is available, used
/// only to size the fixed-capacity node arena from a byte budget.
const ASSUMED_MIN_ENTRY_BYTES: usize = 64;

/// Validated configuration for a [`Cache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_size_bytes: usize,
    pub hash_buckets_power: u32,
    pub hash_locks_power: u32,
    pub policy: PolicyKind,
    pub update_on_read: bool,
    pub update_on_write: bool,
    pub s3_probationary_ratio: f64,
    pub reconfigure_interval_sec: u32,
    pub max_eviction_attempts: u32,
}

impl CacheConfig {
    /// Start building a config from the library's defaults.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for [`CacheConfig`]; [`build`](Self::build) is where validation
/// happens, not at each setter call.
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    cache_size_bytes: usize,
    hash_buckets_power: u32,
    hash_locks_power: u32,
    policy: PolicyKind,
    update_on_read: bool,
    update_on_write: bool,
    s3_probationary_ratio: f64,
    reconfigure_interval_sec: u32,
    max_eviction_attempts: u32,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self {
            cache_size_bytes: 64 * 1024 * 1024,
            hash_buckets_power: 10,
            hash_locks_power: 6,
            policy: PolicyKind::Clock,
            update_on_read: true,
            update_on_write: true,
            // spec default; the original source's equivalent constant
            // (pRatio_) is 0.05 - see DESIGN.md.
            s3_probationary_ratio: 0.1,
            reconfigure_interval_sec: 300,
            max_eviction_attempts: 16,
        }
    }
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = value;
            self
        }
    };
}

impl CacheConfigBuilder {
    setter!(cache_size_bytes, usize);
    setter!(hash_buckets_power, u32);
    setter!(hash_locks_power, u32);
    setter!(policy, PolicyKind);
    setter!(update_on_read, bool);
    setter!(update_on_write, bool);
    setter!(s3_probationary_ratio, f64);
    setter!(reconfigure_interval_sec, u32);
    setter!(max_eviction_attempts, u32);

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<CacheConfig, CacheError> {
        if self.cache_size_bytes == 0 {
            return Err(CacheError::InvalidArgument("cache_size_bytes must be nonzero".into()));
        }
        if self.hash_buckets_power == 0 || self.hash_buckets_power > 32 {
            return Err(CacheError::InvalidArgument(
                "hash_buckets_power must be in 1..=32".into(),
            ));
        }
        if self.hash_locks_power == 0 || self.hash_locks_power > self.hash_buckets_power {
            return Err(CacheError::InvalidArgument(
                "hash_locks_power must be in 1..=hash_buckets_power".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.s3_probationary_ratio) {
            return Err(CacheError::InvalidArgument(
                "s3_probationary_ratio must be in [0, 1)".into(),
            ));
        }
        if self.max_eviction_attempts == 0 {
            return Err(CacheError::InvalidArgument(
                "max_eviction_attempts must be nonzero".into(),
            ));
        }

        Ok(CacheConfig {
            cache_size_bytes: self.cache_size_bytes,
            hash_buckets_power: self.hash_buckets_power,
            hash_locks_power: self.hash_locks_power,
            policy: self.policy,
            update_on_read: self.update_on_read,
            update_on_write: self.update_on_write,
            s3_probationary_ratio: self.s3_probationary_ratio,
            reconfigure_interval_sec: self.reconfigure_interval_sec,
            max_eviction_attempts: self.max_eviction_attempts,
        })
    }
}

/// A point-in-time snapshot of the cache's memory accounting.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub used_bytes: usize,
    pub budget_bytes: usize,
    pub num_keys: usize,
    pub arena_slots_used: usize,
    pub arena_capacity: usize,
}

/// The cache facade: `find`/`allocate_and_insert`/`remove`/`iter`/`memory_stats`.
pub struct Cache {
    arena: NodeArena,
    index: AccessIndex,
    policy: Box<dyn EvictionPolicy>,
    budget: BudgetAllocator<GlobalAllocator>,
    clock: TraceClock,
    max_eviction_attempts: u32,
}

impl Cache {
    /// Build a cache from a validated [`CacheConfig`].
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        if !config.policy.is_implemented() {
            return Err(CacheError::InvalidArgument(format!(
                "policy {:?} is not implemented by this crate",
                config.policy
            )));
        }

        let num_buckets = 1usize << config.hash_buckets_power;
        let num_stripes = 1usize << config.hash_locks_power;
        let index = AccessIndex::new(num_buckets, num_stripes)?;

        let max_entries = (config.cache_size_bytes / ASSUMED_MIN_ENTRY_BYTES).max(16);
        let arena = NodeArena::new(max_entries);

        let policy_config = PolicyConfig {
            update_on_read: config.update_on_read,
            update_on_write: config.update_on_write,
        };
        let policy: Box<dyn EvictionPolicy> = match config.policy {
            PolicyKind::Clock | PolicyKind::AtomicClock => {
                Box::new(ClockPolicy::new(policy_config))
            }
            PolicyKind::AtomicClockBuffered => {
                Box::new(AtomicClockBufferedPolicy::new(policy_config, max_entries))
            }
            PolicyKind::Sieve => Box::new(SievePolicy::new(policy_config)),
            PolicyKind::S3Fifo => Box::new(S3FifoPolicy::new(
                policy_config,
                max_entries,
                config.s3_probationary_ratio,
            )),
            PolicyKind::Lru | PolicyKind::TwoQ | PolicyKind::TinyLfu => {
                unreachable!("rejected by is_implemented check above")
            }
        };

        Ok(Self {
            arena,
            index,
            policy,
            budget: BudgetAllocator::new(GlobalAllocator, config.cache_size_bytes),
            clock: TraceClock::new(),
            max_eviction_attempts: config.max_eviction_attempts,
        })
    }

    /// Advance the cache's notion of "now" (used for TTL expiry checks).
    /// The benchmark harness calls this as it replays trace timestamps.
    pub fn advance_clock(&self, now: u32) {
        self.clock.advance_to(now);
    }

    /// Look up `key`. Returns `None` on a miss or if the stored value has
    /// expired (a lazily-reaped stale node is left for the next eviction
    /// pass to reclaim, per the TTL design note).
    pub fn find(&self, key: &[u8]) -> Option<Handle<'_>> {
        let idx = self.index.find(&self.arena, key)?;
        let node = self.arena.get(idx);
        if node.is_expired(self.clock.get()) {
            return None;
        }
        node.acquire();
        self.policy.record_access(&self.arena, idx, AccessMode::Read);
        Some(Handle {
            cache: self,
            index: idx,
        })
    }

    /// Insert `key` with a freshly allocated `value_len`-byte value,
    /// evicting under the active policy as needed to clear allocator
    /// pressure. `ttl` of `0` means no expiry. `now` is the caller's
    /// current trace second, stamped onto the node directly rather than
    /// read back from the cache's own clock.
    pub fn allocate_and_insert(
        &self,
        key: &[u8],
        value_len: u32,
        ttl: u32,
        now: u32,
    ) -> Result<Handle<'_>, CacheError> {
        let node = Node::new(key, value_len, ttl, now);
        let charged = node.charged_bytes();

        let mut attempts = 0u32;
        while !self.budget.reserve(charged) {
            if attempts >= self.max_eviction_attempts {
                return Err(CacheError::AllocatorPressure {
                    requested: charged,
                    attempts,
                });
            }
            attempts += 1;
            match self.policy.get_eviction_candidate(&self.arena) {
                Some(victim_idx) => self.evict_and_reclaim(victim_idx),
                None => {
                    return Err(CacheError::AllocatorPressure {
                        requested: charged,
                        attempts,
                    })
                }
            }
        }

        let idx = match self.arena.alloc(node) {
            Some(i) => i,
            None => {
                self.budget.release(charged);
                return Err(CacheError::AllocatorPressure {
                    requested: charged,
                    attempts,
                });
            }
        };

        if let Some(old_idx) = self.index.insert_or_replace(&self.arena, key, idx) {
            self.policy.remove(&self.arena, old_idx);
            self.try_reclaim(old_idx);
        }
        self.policy.add(&self.arena, idx);

        Ok(Handle {
            cache: self,
            index: idx,
        })
    }

    /// Remove `key` outright, independent of the eviction policy's own
    /// schedule. Returns whether a node was actually present.
    pub fn remove(&self, key: &[u8]) -> bool {
        match self.index.remove(&self.arena, key) {
            Some(idx) => {
                self.policy.remove(&self.arena, idx);
                self.try_reclaim(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot every currently indexed key. Observability only - never
    /// called from a hot path, and the result may be stale the instant it
    /// is returned under concurrent mutation.
    pub fn iter(&self) -> Vec<Vec<u8>> {
        self.arena
            .iter_indices()
            .filter(|&idx| self.arena.get(idx).flags.is_access_indexed())
            .map(|idx| self.arena.get(idx).key().to_vec())
            .collect()
    }

    /// A snapshot of current memory accounting.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            used_bytes: self.budget.used_bytes(),
            budget_bytes: self.budget.budget_bytes(),
            num_keys: self.index.len(),
            arena_slots_used: self.arena.len(),
            arena_capacity: self.arena.capacity(),
        }
    }

    /// Unlink `victim_idx` from the index (by its own key) and attempt to
    /// reclaim it. The policy has already detached it from its own list by
    /// the time this is called (it came from `get_eviction_candidate`).
    fn evict_and_reclaim(&self, victim_idx: u32) {
        let key = self.arena.get(victim_idx).key().to_vec();
        self.index.remove(&self.arena, &key);
        self.try_reclaim(victim_idx);
    }

    /// Free `index`'s arena slot and release its budget charge, but only
    /// if nothing still references it - no outstanding `Handle`, not
    /// access-indexed, not policy-indexed. Otherwise it is left for
    /// whichever of those conditions clears last to retry.
    fn try_reclaim(&self, index: u32) {
        let node = self.arena.get(index);
        if node.ref_count() == 0
            && !node.flags.is_access_indexed()
            && !node.flags.is_policy_indexed()
        {
            let charged = node.charged_bytes();
            self.arena.free(index);
            self.budget.release(charged);
        }
    }
}

/// An RAII handle to a found or inserted node.
///
/// Holding one keeps the node's bytes alive even if it is concurrently
/// evicted or removed; dropping it releases the reference and, if that
/// was the last one and the node is already unindexed, reclaims it.
pub struct Handle<'a> {
    cache: &'a Cache,
    index: u32,
}

impl<'a> Handle<'a> {
    /// The node's key.
    pub fn key(&self) -> &[u8] {
        self.cache.arena.get(self.index).key()
    }

    /// The node's value bytes.
    pub fn value(&self) -> &[u8] {
        self.cache.arena.get(self.index).value()
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        let node = self.cache.arena.get(self.index);
        if node.release() == 0 {
            self.cache.try_reclaim(self.index);
        }
    }
}
