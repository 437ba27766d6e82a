//! S3-FIFO / QDList: a small probationary FIFO feeding a larger main FIFO,
//! gated by a ghost history of recently evicted fingerprints.
//!
//! A node lands in the probationary FIFO on first admission; if it is
//! still referenced when it reaches the probationary tail, it graduates
//! to the main FIFO instead of being evicted. A node whose fingerprint is
//! already in the ghost history at admission time is judged to deserve
//! main-FIFO treatment immediately, skipping probation entirely.

use std::sync::OnceLock;

use crate::arena::NodeArena;
use crate::ghost::GhostHistoryTable;
use crate::list::ADList;
use crate::node::QueueTag;

use super::{fingerprint, AccessMode, EvictionPolicy, PolicyConfig};

pub struct S3FifoPolicy {
    p_fifo: ADList,
    m_fifo: ADList,
    hist: OnceLock<GhostHistoryTable>,
    capacity: usize,
    probationary_ratio: f64,
    config: PolicyConfig,
}

impl S3FifoPolicy {
    /// `capacity` is the policy's expected total node count (used to size
    /// the lazily-initialized ghost history and, together with
    /// `probationary_ratio`, to decide which sub-list to evict from).
    pub fn new(config: PolicyConfig, capacity: usize, probationary_ratio: f64) -> Self {
        Self {
            p_fifo: ADList::new(),
            m_fifo: ADList::new(),
            hist: OnceLock::new(),
            capacity: capacity.max(1),
            probationary_ratio,
            config,
        }
    }

    fn hist(&self) -> &GhostHistoryTable {
        self.hist
            .get_or_init(|| GhostHistoryTable::new((self.capacity / 2).max(8), self.capacity as u32))
    }

    fn list_for(&self, tag: QueueTag) -> Option<&ADList> {
        match tag {
            QueueTag::Probationary => Some(&self.p_fifo),
            QueueTag::Main => Some(&self.m_fifo),
            QueueTag::None => None,
        }
    }
}

impl EvictionPolicy for S3FifoPolicy {
    fn add(&self, arena: &NodeArena, index: u32) {
        let fp = fingerprint(arena.get(index).key());
        let promote = self.hist().contains(fp);

        let node = arena.get(index);
        if promote {
            self.m_fifo.link_at_head(arena, index);
            node.flags.set_queue_tag(QueueTag::Main);
        } else {
            self.p_fifo.link_at_head(arena, index);
            node.flags.set_queue_tag(QueueTag::Probationary);
        }
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
        let tag = arena.get(index).flags.queue_tag();
        if let Some(list) = self.list_for(tag) {
            list.remove(arena, index);
        }
        let node = arena.get(index);
        node.flags.clear_policy_indexed();
        node.flags.set_queue_tag(QueueTag::None);
    }

    fn replace(&self, arena: &NodeArena, old_index: u32, new_index: u32) {
        let tag = arena.get(old_index).flags.queue_tag();
        if let Some(list) = self.list_for(tag) {
            list.replace(arena, old_index, new_index);
        }

        let old = arena.get(old_index);
        old.flags.clear_policy_indexed();
        old.flags.set_queue_tag(QueueTag::None);

        let new = arena.get(new_index);
        new.flags.set_policy_indexed();
        new.flags.unmark_accessed();
        new.flags.set_queue_tag(tag);
    }

    /// Evict from the probationary FIFO while it is over its target
    /// share; otherwise evict from the main FIFO. A referenced
    /// probationary node graduates to the main FIFO instead of being
    /// evicted; a referenced main node is simply relinked at its own
    /// head. Only an unreferenced tail node is ever actually returned.
    fn get_eviction_candidate(&self, arena: &NodeArena) -> Option<u32> {
        let total = self.p_fifo.len() + self.m_fifo.len();
        if total == 0 {
            return None;
        }

        let max_iterations = (total.saturating_mul(2)).max(4);
        for _ in 0..max_iterations {
            let p_len = self.p_fifo.len();
            let m_len = self.m_fifo.len();
            let over_share = (p_len as f64) > self.probationary_ratio * ((p_len + m_len) as f64);

            if over_share && p_len > 0 {
                let idx = match self.p_fifo.remove_tail(arena) {
                    Some(i) => i,
                    None => continue,
                };
                let node = arena.get(idx);
                if node.flags.unmark_accessed() {
                    node.flags.set_queue_tag(QueueTag::Main);
                    self.m_fifo.link_at_head(arena, idx);
                    continue;
                }
                let fp = fingerprint(node.key());
                self.hist().insert(fp);
                node.flags.clear_policy_indexed();
                node.flags.set_queue_tag(QueueTag::None);
                return Some(idx);
            }

            if m_len == 0 {
                if p_len == 0 {
                    return None;
                }
                continue;
            }

            let idx = match self.m_fifo.remove_tail(arena) {
                Some(i) => i,
                None => continue,
            };
            let node = arena.get(idx);
            if node.flags.unmark_accessed() {
                self.m_fifo.link_at_head(arena, idx);
                continue;
            }
            node.flags.clear_policy_indexed();
            node.flags.set_queue_tag(QueueTag::None);
            return Some(idx);
        }

        crate::invariant!(
            false,
            "S3-FIFO eviction scan exceeded its iteration bound without a candidate"
        );
        None
    }

    fn len(&self) -> usize {
        self.p_fifo.len() + self.m_fifo.len()
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
    fn test_fresh_key_lands_in_probationary() {
        let arena = arena_with(4);
        let policy = S3FifoPolicy::new(PolicyConfig::default(), 10, 0.1);
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        assert_eq!(arena.get(a).flags.queue_tag(), QueueTag::Probationary);
    }

    #[test]
    fn test_ghost_promotion_lands_in_main() {
        let arena = arena_with(4);
        let policy = S3FifoPolicy::new(PolicyConfig::default(), 10, 0.1);

        // Seed the ghost history as if this key had been evicted before.
        let fp = fingerprint(b"k5");
        policy.hist().insert(fp);

        let idx = arena.alloc(Node::new(b"k5", 0, 0, 0)).unwrap();
        policy.add(&arena, idx);
        assert_eq!(arena.get(idx).flags.queue_tag(), QueueTag::Main);
    }

    #[test]
    fn test_unreferenced_probationary_tail_is_evicted_into_ghost() {
        let arena = arena_with(4);
        let policy = S3FifoPolicy::new(PolicyConfig::default(), 4, 0.5);
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        let b = arena.alloc(Node::new(b"b", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        policy.add(&arena, b);

        let victim = policy.get_eviction_candidate(&arena).unwrap();
        assert_eq!(victim, a);
        assert!(policy.hist().contains(fingerprint(b"a")));
    }

    #[test]
    fn test_referenced_probationary_graduates_to_main() {
        let arena = arena_with(4);
        let policy = S3FifoPolicy::new(PolicyConfig::default(), 4, 0.9);
        let a = arena.alloc(Node::new(b"a", 0, 0, 0)).unwrap();
        policy.add(&arena, a);
        policy.record_access(&arena, a, AccessMode::Read);

        // `a` survives the first pass (graduates), so a second call is
        // needed before anything can actually be evicted - with nothing
        // else in the cache, it should come back around unreferenced.
        let victim = policy.get_eviction_candidate(&arena).unwrap();
        assert_eq!(victim, a);
    }
}
