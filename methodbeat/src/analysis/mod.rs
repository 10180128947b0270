//! Analysis of recorded traces
//!
//! Pure logic over snapshots of packed records, kept apart from the recording
//! engine and the CLI that prints the results.

pub mod evil_methods;

pub use evil_methods::{find_evil_methods, EvilMethod, EvilMethodStats, MethodSummary};
