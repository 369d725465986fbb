//! Query API for UI consumption
//!
//! Rebuilds threads from cached messages and formats them for display.

mod threads;

pub use threads::{ThreadSummary, group_into_threads, list_threads};
