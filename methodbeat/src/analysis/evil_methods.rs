//! Slow-call ("evil method") detection.
//!
//! Replays a snapshot of records against a call stack: every ENTER pushes a
//! frame, every EXIT pops back to the matching frame. Calls whose duration
//! reaches the threshold are reported together with their nesting depth.
//!
//! # Architecture
//!
//! - **`find_evil_methods()`** - batch pass over one snapshot
//! - **`EvilMethodStats`** - per-method aggregation across many snapshots
//!
//! ```text
//! copy_between(..)
//!     │
//!     └──► find_evil_methods() ──► Vec<EvilMethod> ──► EvilMethodStats.record()
//!                                                          │
//!                                                          └──► to_summaries()
//! ```
//!
//! Dispatch markers only bracket loop work and never become frames. An EXIT
//! with no matching ENTER (its ENTER was overwritten or predates the snapshot)
//! is ignored, and frames still open when the snapshot ends are not reported.

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use methodbeat_common::{offset_delta, EventKind, EventRecord};
use serde::Serialize;

use crate::domain::{MethodId, TimeOffset};

/// One completed call at or above the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvilMethod {
    pub method: MethodId,

    /// Frames open beneath this call when it was entered (0 = outermost).
    pub depth: usize,

    /// Index of the ENTER record within the analysed snapshot.
    pub index: usize,

    pub enter_offset: TimeOffset,

    pub duration_ms: u64,
}

struct Frame {
    method: MethodId,
    index: usize,
    offset: u64,
}

/// Completed calls lasting at least `threshold_ms`, slowest first.
///
/// Ties keep snapshot order.
#[must_use]
pub fn find_evil_methods(records: &[EventRecord], threshold_ms: u64) -> Vec<EvilMethod> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut found = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if record.is_dispatch_marker() {
            continue;
        }
        let method = MethodId(record.method_id());

        match record.kind() {
            EventKind::Enter => {
                stack.push(Frame { method, index, offset: record.time_offset() });
            }
            EventKind::Exit => {
                let Some(matched) = stack.iter().rposition(|frame| frame.method == method) else {
                    continue;
                };
                // Frames above the match never saw their EXIT; drop them.
                stack.truncate(matched + 1);
                let Some(frame) = stack.pop() else {
                    continue;
                };

                let duration_ms = offset_delta(frame.offset, record.time_offset());
                if duration_ms >= threshold_ms {
                    found.push(EvilMethod {
                        method,
                        depth: matched,
                        index: frame.index,
                        enter_offset: TimeOffset(frame.offset),
                        duration_ms,
                    });
                }
            }
        }
    }

    found.sort_by_key(|evil| std::cmp::Reverse(evil.duration_ms));
    found
}

/// Aggregated view of one method across every recorded report.
#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub method: MethodId,
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,

    /// Share of all reported milliseconds (0.0 - 100.0).
    pub percentage: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct MethodTotals {
    count: u64,
    total_ms: u64,
    max_ms: u64,
}

/// Per-method totals, fed one report at a time.
#[derive(Debug, Default)]
pub struct EvilMethodStats {
    methods: HashMap<MethodId, MethodTotals>,
    total_ms: u64,
}

impl EvilMethodStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, evil: &EvilMethod) {
        let totals = self.methods.entry(evil.method).or_default();
        totals.count += 1;
        totals.total_ms = totals.total_ms.saturating_add(evil.duration_ms);
        totals.max_ms = totals.max_ms.max(evil.duration_ms);
        self.total_ms = self.total_ms.saturating_add(evil.duration_ms);
    }

    pub fn record_all<'a>(&mut self, reports: impl IntoIterator<Item = &'a EvilMethod>) {
        for evil in reports {
            self.record(evil);
        }
    }

    #[must_use]
    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Summaries sorted by total time, largest first.
    #[must_use]
    pub fn to_summaries(&self) -> Vec<MethodSummary> {
        let mut summaries: Vec<MethodSummary> = self
            .methods
            .iter()
            .map(|(&method, totals)| {
                let percentage = if self.total_ms > 0 {
                    (totals.total_ms as f64 / self.total_ms as f64) * 100.0
                } else {
                    0.0
                };
                MethodSummary {
                    method,
                    count: totals.count,
                    total_ms: totals.total_ms,
                    max_ms: totals.max_ms,
                    percentage,
                }
            })
            .collect();

        summaries.sort_unstable_by_key(|s| (std::cmp::Reverse(s.total_ms), s.method.0));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use methodbeat_common::{METHOD_ID_DISPATCH, TIME_OFFSET_MASK};

    fn enter(id: u32, at: u64) -> EventRecord {
        EventRecord::pack(EventKind::Enter, id, at)
    }

    fn exit(id: u32, at: u64) -> EventRecord {
        EventRecord::pack(EventKind::Exit, id, at)
    }

    #[test]
    fn test_nested_calls_report_depth() {
        let records = [enter(1, 0), enter(2, 10), exit(2, 900), exit(1, 1000)];
        let evil = find_evil_methods(&records, 700);

        assert_eq!(evil.len(), 2);
        assert_eq!(evil[0].method, MethodId(1));
        assert_eq!(evil[0].depth, 0);
        assert_eq!(evil[0].duration_ms, 1000);
        assert_eq!(evil[1].method, MethodId(2));
        assert_eq!(evil[1].depth, 1);
        assert_eq!(evil[1].index, 1);
    }

    #[test]
    fn test_fast_calls_are_not_reported() {
        let records = [enter(1, 0), exit(1, 699)];
        assert!(find_evil_methods(&records, 700).is_empty());
    }

    #[test]
    fn test_dispatch_markers_are_skipped() {
        let records = [
            enter(METHOD_ID_DISPATCH, 0),
            enter(1, 0),
            exit(1, 800),
            exit(METHOD_ID_DISPATCH, 2000),
        ];
        let evil = find_evil_methods(&records, 700);
        assert_eq!(evil.len(), 1);
        assert_eq!(evil[0].method, MethodId(1));
        assert_eq!(evil[0].depth, 0);
    }

    #[test]
    fn test_unmatched_exit_and_open_frames_ignored() {
        let records = [exit(9, 5), enter(1, 10), enter(2, 20)];
        assert!(find_evil_methods(&records, 0).is_empty());
    }

    #[test]
    fn test_missing_inner_exit_is_unwound() {
        let records = [enter(1, 0), enter(2, 5), exit(1, 900)];
        let evil = find_evil_methods(&records, 700);
        assert_eq!(evil.len(), 1);
        assert_eq!(evil[0].method, MethodId(1));
    }

    #[test]
    fn test_duration_across_offset_wrap() {
        let records = [enter(1, TIME_OFFSET_MASK - 99), exit(1, 700)];
        let evil = find_evil_methods(&records, 700);
        assert_eq!(evil[0].duration_ms, 800);
    }

    #[test]
    fn test_stats_aggregate_per_method() {
        let records = [
            enter(1, 0),
            exit(1, 1000),
            enter(2, 1000),
            exit(2, 1500),
            enter(1, 1500),
            exit(1, 3000),
        ];
        let mut stats = EvilMethodStats::new();
        stats.record_all(&find_evil_methods(&records, 0));

        let summaries = stats.to_summaries();
        assert_eq!(stats.total_ms(), 3000);
        assert_eq!(summaries[0].method, MethodId(1));
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].max_ms, 1500);
        assert!((summaries[0].percentage - 83.333).abs() < 0.01);
        assert_eq!(summaries[1].total_ms, 500);
    }
}
