//! The crate's error kinds.
//!
//! Propagation policy (see also `invariant!` below): the access index (C4)
//! returns `Result`/`Option` for every fallible path; C1-C3's structural
//! invariants are expected to hold by construction, so a violation there
//! panics via [`invariant!`] in debug builds rather than threading an error
//! through every caller. The facade (C5) surfaces `CacheError` to callers
//! only after its own retry budget against [`InvariantViolated`] is spent.

use thiserror::Error;

/// Errors produced by the cache's public API.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A configuration or call argument was out of its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(alloc::string::String),

    /// An insert targeted a key that is already present.
    #[error("duplicate key")]
    Duplicate,

    /// A lookup or removal targeted a key that is not present.
    #[error("key not found")]
    NotFound,

    /// The allocator's budget could not absorb the request even after
    /// running eviction to its configured retry limit.
    #[error("allocator pressure: unable to admit {requested} bytes after {attempts} eviction attempts")]
    AllocatorPressure {
        /// Bytes the caller asked to admit.
        requested: usize,
        /// Number of eviction attempts made before giving up.
        attempts: u32,
    },

    /// A structural invariant the core relies on was found broken.
    ///
    /// In release builds this is the only variant of the family that is
    /// surfaced at all - debug builds panic through [`invariant!`] instead,
    /// since by the time C1-C3 can observe a broken invariant the data
    /// structure may already be unsafe to keep using.
    #[error("invariant violated: {0}")]
    InvariantViolated(alloc::string::String),
}

/// Assert a structural invariant, panicking in debug builds and logging in
/// release builds.
///
/// Debug builds fail loudly and immediately: a broken list/index/ghost-table
/// invariant means subsequent unsafe pointer arithmetic is no longer sound to
/// trust, so stopping immediately is preferable to returning an error that
/// the caller might recover from and continue using the structure.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)*) => {
        if cfg!(debug_assertions) {
            assert!($cond, $($arg)*);
        } else if !($cond) {
            log::error!($($arg)*);
        }
    };
}
