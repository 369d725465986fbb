//! Sync engine: cached reads, remote refresh, search and send
//!
//! Sync is idempotent: records are upserted by message id, so running it
//! again never creates duplicates and never shrinks the cached view.

mod inbox;

pub use inbox::{Orchestrator, SyncOutcome, SyncStats};

/// Maximum number of records returned by cached reads and sync read-back
pub const CACHED_VIEW_LIMIT: usize = 50;

/// Threads fetched per sync or search when the caller does not say
pub const DEFAULT_THREAD_COUNT: u32 = 10;

/// Upper bound on threads fetched per sync or search
pub const MAX_THREAD_COUNT: u32 = 20;

/// Clamp a requested thread count to `1..=MAX_THREAD_COUNT`
pub fn clamp_thread_count(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_THREAD_COUNT)
        .clamp(1, MAX_THREAD_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_thread_count() {
        assert_eq!(clamp_thread_count(None), 10);
        assert_eq!(clamp_thread_count(Some(0)), 1);
        assert_eq!(clamp_thread_count(Some(5)), 5);
        assert_eq!(clamp_thread_count(Some(20)), 20);
        assert_eq!(clamp_thread_count(Some(500)), 20);
    }
}
