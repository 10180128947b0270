//! # Index Registry
//!
//! Sorted chain of bookmarks into the event buffer. A monitor that wants to
//! look at "everything recorded from now on" marks the current position,
//! later copies the buffer from that bookmark forward, and finally releases
//! it.
//!
//! The chain is a singly linked list ordered ascending by position. It is
//! expected to hold a handful of nodes (one per interested monitor), so every
//! operation walks it linearly under one mutex.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::domain::Position;

/// A bookmarked buffer position.
///
/// The slot alone cannot tell whether it has since been overwritten, so the
/// record also keeps the write sequence number the slot held when marked.
#[derive(Debug)]
pub struct IndexRecord {
    position: Position,
    sequence: usize,
    source: String,
    valid: AtomicBool,
}

impl IndexRecord {
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Sequence number of the bookmarked write, 0 if nothing was written yet.
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// False once the record has been released from its registry.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

impl fmt::Display for IndexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index:{}\tseq:{} valid:{} source:{}",
            self.position.0,
            self.sequence,
            self.is_valid(),
            self.source
        )
    }
}

struct Node {
    record: Arc<IndexRecord>,
    next: Option<Box<Node>>,
}

type Link = Option<Box<Node>>;

/// Owner of the bookmark chain.
///
/// Cloning is cheap and yields a handle to the same chain.
#[derive(Clone, Default)]
pub struct IndexRegistry {
    head: Arc<Mutex<Link>>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a bookmark at `position`, the slot holding write number
    /// `sequence`, and return a handle to it.
    ///
    /// The new node goes immediately before the first node whose position is
    /// greater than or equal to `position`, so among equal positions the
    /// newest bookmark sorts first.
    pub fn mark(
        &self,
        source: impl Into<String>,
        position: Position,
        sequence: usize,
    ) -> Bookmark {
        let record = Arc::new(IndexRecord {
            position,
            sequence,
            source: source.into(),
            valid: AtomicBool::new(true),
        });

        {
            let mut head = self.lock();
            insert_sorted(&mut head, Box::new(Node { record: Arc::clone(&record), next: None }));
        }
        debug!("[mark] {record}");

        Bookmark { record, registry: self.clone() }
    }

    /// Unlink `record` and invalidate it. Releasing a record that is not in
    /// the chain only invalidates it.
    pub fn release(&self, record: &Arc<IndexRecord>) {
        record.valid.store(false, Ordering::Release);
        let removed = {
            let mut head = self.lock();
            unlink(&mut head, record)
        };
        if removed {
            debug!("[release] {record}");
        }
    }

    /// Records in chain order (ascending by position).
    #[must_use]
    pub fn records(&self) -> Vec<Arc<IndexRecord>> {
        let head = self.lock();
        let mut records = Vec::new();
        let mut node = head.as_deref();
        while let Some(current) = node {
            records.push(Arc::clone(&current.record));
            node = current.next.as_deref();
        }
        records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Drop every bookmark, invalidating each one.
    pub fn clear(&self) {
        let mut head = self.lock();
        let mut node = head.take();
        while let Some(mut current) = node {
            current.record.valid.store(false, Ordering::Release);
            node = current.next.take();
        }
    }
}

impl fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records().iter().map(|r| r.position)).finish()
    }
}

fn insert_sorted(link: &mut Link, mut node: Box<Node>) {
    match link {
        Some(existing) if existing.record.position < node.record.position => {
            insert_sorted(&mut existing.next, node);
        }
        _ => {
            node.next = link.take();
            *link = Some(node);
        }
    }
}

fn unlink(link: &mut Link, target: &Arc<IndexRecord>) -> bool {
    match link {
        None => false,
        Some(node) if Arc::ptr_eq(&node.record, target) => {
            let next = node.next.take();
            *link = next;
            true
        }
        Some(node) => unlink(&mut node.next, target),
    }
}

/// Client handle for one bookmark.
///
/// Dropping the handle does not release the bookmark; call
/// [`Bookmark::release`] once the region is no longer of interest.
#[derive(Clone)]
pub struct Bookmark {
    record: Arc<IndexRecord>,
    registry: IndexRegistry,
}

impl Bookmark {
    #[must_use]
    pub fn position(&self) -> Position {
        self.record.position
    }

    #[must_use]
    pub fn sequence(&self) -> usize {
        self.record.sequence
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.record.source
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.record.is_valid()
    }

    #[must_use]
    pub fn record(&self) -> &Arc<IndexRecord> {
        &self.record
    }

    /// Remove this bookmark from its registry. Idempotent.
    pub fn release(&self) {
        self.registry.release(&self.record);
    }
}

impl fmt::Debug for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bookmark")
            .field("position", &self.record.position)
            .field("source", &self.record.source)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(registry: &IndexRegistry) -> Vec<usize> {
        registry.records().iter().map(|r| r.position().0).collect()
    }

    #[test]
    fn test_increasing_marks_stay_ascending() {
        let registry = IndexRegistry::new();
        for position in [1, 4, 9, 16] {
            registry.mark("scan", Position(position), position + 1);
        }
        assert_eq!(positions(&registry), vec![1, 4, 9, 16]);
    }

    #[test]
    fn test_out_of_order_marks_are_sorted() {
        let registry = IndexRegistry::new();
        for position in [9, 1, 16, 4] {
            registry.mark("scan", Position(position), position + 1);
        }
        assert_eq!(positions(&registry), vec![1, 4, 9, 16]);
    }

    #[test]
    fn test_equal_positions_newest_first() {
        let registry = IndexRegistry::new();
        let first = registry.mark("first", Position(5), 6);
        let second = registry.mark("second", Position(5), 6);

        let records = registry.records();
        assert!(Arc::ptr_eq(&records[0], second.record()));
        assert!(Arc::ptr_eq(&records[1], first.record()));
    }

    #[test]
    fn test_release_head_keeps_chain_linked() {
        let registry = IndexRegistry::new();
        let head = registry.mark("a", Position(1), 2);
        registry.mark("b", Position(2), 3);
        registry.mark("c", Position(3), 4);

        head.release();
        assert!(!head.is_valid());
        assert_eq!(positions(&registry), vec![2, 3]);
    }

    #[test]
    fn test_release_middle_and_tail() {
        let registry = IndexRegistry::new();
        registry.mark("a", Position(1), 2);
        let middle = registry.mark("b", Position(2), 3);
        let tail = registry.mark("c", Position(3), 4);

        middle.release();
        assert_eq!(positions(&registry), vec![1, 3]);
        tail.release();
        assert_eq!(positions(&registry), vec![1]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = IndexRegistry::new();
        let a = registry.mark("a", Position(1), 2);
        registry.mark("b", Position(2), 3);

        a.release();
        a.release();
        assert_eq!(positions(&registry), vec![2]);
    }

    #[test]
    fn test_release_foreign_record_is_noop() {
        let registry = IndexRegistry::new();
        registry.mark("a", Position(1), 2);
        registry.mark("b", Position(2), 3);

        let other = IndexRegistry::new();
        let stranger = other.mark("stranger", Position(1), 2);
        registry.release(stranger.record());

        assert_eq!(positions(&registry), vec![1, 2]);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_concurrent_mark_and_release_keep_chain_sorted() {
        let registry = IndexRegistry::new();
        let handles: Vec<_> = (0..4usize)
            .map(|thread| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..50usize {
                        let position = (i * 37 + thread * 11) % 64;
                        let bookmark = registry.mark(format!("t{thread}"), Position(position), i);
                        if i % 2 == 0 {
                            bookmark.release();
                        } else {
                            kept.push(bookmark);
                        }
                    }
                    kept
                })
            })
            .collect();
        let kept: Vec<Bookmark> =
            handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

        let records = registry.records();
        assert_eq!(records.len(), kept.len());
        for pair in records.windows(2) {
            assert!(pair[0].position() <= pair[1].position());
            assert!(!Arc::ptr_eq(&pair[0], &pair[1]));
        }
        for bookmark in &kept {
            assert!(bookmark.is_valid());
            let hits = records.iter().filter(|r| Arc::ptr_eq(r, bookmark.record())).count();
            assert_eq!(hits, 1);
        }
        assert!(records.iter().all(|r| r.is_valid()));
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let registry = IndexRegistry::new();
        let a = registry.mark("a", Position(1), 2);
        let b = registry.mark("b", Position(2), 3);

        registry.clear();
        assert!(registry.is_empty());
        assert!(!a.is_valid());
        assert!(!b.is_valid());
    }
}
