//! Concurrent pipelines for capturing and restoring page-cache residency
//! over a directory tree.
//!
//! `happycache-core` is deliberately free of argument parsing and process
//! setup; it exposes the two pipelines (`dump::run`, `load::run`) plus
//! their shared building blocks, leaving the command-line surface to
//! `happycache-cli`.

pub mod codec;
pub mod dump;
pub mod error;
pub mod load;
pub mod prefetch;
pub mod queue;
pub mod residency;

pub use error::{HappycacheError, Result};

/// The OS page size in bytes, queried once per process.
pub fn page_size() -> u64 {
    // SAFETY: `_SC_PAGESIZE` takes no arguments and cannot fail in a way
    // that leaves `sysconf` returning a value outside `{-1} ∪ ℕ`.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    debug_assert!(size > 0, "sysconf(_SC_PAGESIZE) returned {size}");
    size as u64
}
