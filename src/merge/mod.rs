//! Merge engine and partial-output cache.
//!
//! [`TsMerger`] streams one compatible segment run into a single output
//! file on a background task, with cooperative pause/resume/cancel and
//! cache-based resumption of interrupted work.

/// Partial-output cache keyed by job id
pub mod cache;

/// Merge state machine and background worker
pub mod engine;

pub use cache::{CacheEntry, CacheManager};
pub use engine::{MergeOutcome, MergeState, TsMerger};
