//! # cachecore
//!
//! A concurrent in-memory object cache core: the access index and eviction
//! machinery that sit underneath a trace-driven cache benchmark.
//!
//! This crate does not manage the bytes of cached objects, parse traces, or
//! time a benchmark run on its own — those are external collaborators. What
//! it provides is the hard part: a lock-free access index, a family of
//! eviction policies (CLOCK, Atomic-CLOCK, SIEVE, S3-FIFO) sharing one
//! contract, the lock-free doubly linked list they're built from, and the
//! atomic ghost history table S3-FIFO uses for promotion decisions.
//!
//! ## Module organization
//!
//! ### Foundation (no internal dependencies)
//! - [`cc`] - bit manipulation helpers (population count, find-first-set)
//! - [`pr`] - atomic primitives and memory barriers
//! - [`backoff`] - exponential backoff for CAS retry loops
//! - [`spinlock`] - ticket lock used for the coarse paths of C1/C4
//! - [`malloc`] - allocator abstraction and the cache's memory budget
//! - [`error`] - the crate's error kinds
//! - [`time`] - the benchmark's "current trace second" time source
//!
//! ### Data model
//! - [`compressor`] - `CompressedPtr` / `PtrCompressor`
//! - [`node`] - the per-object `Node` and its access/policy hooks
//! - [`arena`] - the bounded node arena backing `CompressedPtr`
//!
//! ### Core
//! - [`list`] - C1: the atomic doubly linked list (ADList)
//! - [`ghost`] - C2: the ghost history table
//! - [`policy`] - C3: the eviction policy family
//! - [`index`] - C4: the striped-lock bucket hash table
//! - [`cache`] - C5: the cache facade
//!
//! ### Benchmark harness support
//! - [`fifo`] - the bounded MPMC queue backing prefetching policy variants
//! - [`trace`] - the `oracleGeneral` trace record reader

#![warn(rust_2018_idioms)]
#![allow(clippy::module_inception)]

extern crate alloc;

// =============================================================================
// Tier 0: Foundation (No Internal Dependencies)
// =============================================================================

/// Bit manipulation helpers (ffs, ctz, popcount) and branch prediction hints.
pub mod cc;

/// Memory allocator abstraction and the cache's memory budget tracker.
pub mod malloc;

/// The crate's error kinds.
pub mod error;

// =============================================================================
// Tier 1: Core Primitives (Depends on Tier 0)
// =============================================================================

/// Atomic primitives and memory barriers.
pub mod pr;

/// The benchmark's "current trace second" time source.
pub mod time;

// =============================================================================
// Tier 2: Basic Building Blocks (Depends on Tiers 0-1)
// =============================================================================

/// Exponential backoff for contention management.
pub mod backoff;

/// Lock-free stack, reused here as the node arena's free-index pool.
pub mod stack;

/// Various spinlock implementations.
pub mod spinlock;

/// Lock-free FIFO queues, including the bounded variant used for prefetching.
pub mod fifo;

// =============================================================================
// Tier 3: Data Model (Depends on Tiers 0-2)
// =============================================================================

/// `CompressedPtr` and the `PtrCompressor` trait.
pub mod compressor;

/// The per-object `Node` and its access/policy hooks.
pub mod node;

/// The bounded node arena backing `CompressedPtr`.
pub mod arena;

// =============================================================================
// Tier 4: Core Components (C1-C5)
// =============================================================================

/// C1: the atomic doubly linked list (ADList).
pub mod list;

/// C2: the atomic ghost history table.
pub mod ghost;

/// C3: the eviction policy family (CLOCK, Atomic-CLOCK, SIEVE, S3-FIFO).
pub mod policy;

/// C4: the striped-lock access index.
pub mod index;

/// C5: the cache facade.
pub mod cache;

// =============================================================================
// Tier 5: Benchmark Harness Support
// =============================================================================

/// The `oracleGeneral` trace record reader.
pub mod trace;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use cache::{Cache, CacheConfig, Handle, MemoryStats};
pub use error::CacheError;
