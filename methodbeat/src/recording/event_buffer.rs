//! # Event Buffer
//!
//! Fixed-capacity circular array of packed [`EventRecord`]s shared by every
//! instrumented thread.
//!
//! ## Write Path
//!
//! A write is one `fetch_add` on the cursor plus one relaxed store into the
//! claimed slot. No lock, no clock read; the caller supplies the cached time
//! offset. Two threads writing at the same instant may land in either order,
//! but each thread's own writes keep program order.
//!
//! ## Overflow
//!
//! Never an error. Once `capacity` writes have happened the cursor wraps and
//! the oldest slot is overwritten.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use methodbeat_common::{EventKind, EventRecord};

use crate::domain::{MethodId, Position, TimeOffset};

pub struct EventBuffer {
    slots: Box<[AtomicU64]>,
    /// Total writes ever claimed. The slot for a write is `written % capacity`.
    written: AtomicUsize,
}

impl EventBuffer {
    /// Allocate a zeroed buffer of `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| AtomicU64::new(0)).collect();
        Self { slots, written: AtomicUsize::new(0) }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pack and store one record, returning the slot it landed in.
    #[inline]
    pub fn write(&self, kind: EventKind, method: MethodId, now: TimeOffset) -> Position {
        let record = EventRecord::pack(kind, method.0, now.0);
        let ticket = self.written.fetch_add(1, Ordering::Relaxed);
        let index = ticket % self.slots.len();
        self.slots[index].store(record.raw(), Ordering::Release);
        Position(index)
    }

    /// Slot the next write will claim.
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> Position {
        Position(self.written.load(Ordering::Acquire) % self.slots.len())
    }

    /// Slot of the most recent write, `capacity - 1` if nothing was written yet.
    #[must_use]
    pub fn last_written(&self) -> Position {
        let cursor = self.cursor().0;
        Position((cursor + self.slots.len() - 1) % self.slots.len())
    }

    /// Slot and sequence number of the most recent write, from one read of
    /// the cursor. Sequence numbers count writes from 1, so an empty buffer
    /// reports sequence 0 at slot `capacity - 1`.
    #[must_use]
    pub fn head(&self) -> (Position, usize) {
        let written = self.written.load(Ordering::Acquire);
        let capacity = self.slots.len();
        (Position((written + capacity - 1) % capacity), written)
    }

    /// Number of writes since allocation, including overwritten ones.
    #[must_use]
    pub fn total_written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }

    /// Number of slots currently holding a written record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_written().min(self.slots.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_written() == 0
    }

    /// Decode the record at `position`, `None` if it is outside the buffer.
    #[must_use]
    pub fn read(&self, position: Position) -> Option<EventRecord> {
        self.slots.get(position.0).map(|slot| EventRecord(slot.load(Ordering::Acquire)))
    }

    /// Records from `start` through `end` inclusive, walking forward and
    /// wrapping past the end of the array when `end < start`.
    #[must_use]
    pub fn copy_range(&self, start: Position, end: Position) -> Vec<EventRecord> {
        let capacity = self.slots.len();
        if start.0 >= capacity || end.0 >= capacity {
            return Vec::new();
        }

        let load = |index: usize| EventRecord(self.slots[index].load(Ordering::Acquire));
        if end.0 >= start.0 {
            (start.0..=end.0).map(load).collect()
        } else {
            (start.0..capacity).chain(0..=end.0).map(load).collect()
        }
    }

    /// Records with sequence numbers `first` through `last` inclusive.
    ///
    /// `None` when `last < first`, or when the write numbered `first` has
    /// already been overwritten (more than `capacity` writes since). A `first`
    /// of 0 starts at the oldest write ever made.
    #[must_use]
    pub fn copy_sequences(&self, first: usize, last: usize) -> Option<Vec<EventRecord>> {
        if last < first {
            return None;
        }
        let first = first.max(1);
        if last < first {
            return Some(Vec::new());
        }

        let capacity = self.slots.len();
        let overwritten = || self.total_written() - (first - 1) > capacity;
        if overwritten() {
            return None;
        }
        let records =
            self.copy_range(Position((first - 1) % capacity), Position((last - 1) % capacity));
        // A writer may have lapped the range while it was being copied.
        if overwritten() {
            return None;
        }
        Some(records)
    }

    /// Every retained record, oldest first.
    #[must_use]
    pub fn records_oldest_first(&self) -> Vec<EventRecord> {
        let written = self.total_written();
        if written == 0 {
            return Vec::new();
        }
        let capacity = self.slots.len();
        if written <= capacity {
            return self.copy_range(Position(0), Position(written - 1));
        }
        let cursor = written % capacity;
        self.copy_range(Position(cursor), Position((cursor + capacity - 1) % capacity))
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("capacity", &self.capacity())
            .field("written", &self.total_written())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_returns_sequential_positions() {
        let buffer = EventBuffer::new(4);
        let a = buffer.write(EventKind::Enter, MethodId(1), TimeOffset(10));
        let b = buffer.write(EventKind::Exit, MethodId(1), TimeOffset(12));
        assert_eq!(a, Position(0));
        assert_eq!(b, Position(1));
        assert_eq!(buffer.cursor(), Position(2));
        assert_eq!(buffer.last_written(), Position(1));

        let record = buffer.read(Position(1)).unwrap();
        assert_eq!(record.kind(), EventKind::Exit);
        assert_eq!(record.method_id(), 1);
        assert_eq!(record.time_offset(), 12);
    }

    #[test]
    fn test_last_written_wraps_when_empty() {
        let buffer = EventBuffer::new(8);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_written(), Position(7));
    }

    #[test]
    fn test_read_out_of_range_is_none() {
        let buffer = EventBuffer::new(2);
        assert!(buffer.read(Position(2)).is_none());
    }

    #[test]
    fn test_overflow_keeps_most_recent_capacity_records() {
        let buffer = EventBuffer::new(5);
        for id in 0..13u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(u64::from(id)));
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.total_written(), 13);

        let ids: Vec<u32> = buffer.records_oldest_first().iter().map(|r| r.method_id()).collect();
        assert_eq!(ids, vec![8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_copy_range_wraps_around() {
        let buffer = EventBuffer::new(4);
        for id in 0..6u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(0));
        }
        // slots now hold [4, 5, 2, 3]
        let ids: Vec<u32> =
            buffer.copy_range(Position(2), Position(1)).iter().map(|r| r.method_id()).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
        assert!(buffer.copy_range(Position(0), Position(4)).is_empty());
    }

    #[test]
    fn test_head_reports_sequence() {
        let buffer = EventBuffer::new(3);
        assert_eq!(buffer.head(), (Position(2), 0));
        for id in 0..4u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(0));
        }
        assert_eq!(buffer.head(), (Position(0), 4));
    }

    #[test]
    fn test_copy_sequences_across_wrap() {
        let buffer = EventBuffer::new(4);
        for id in 1..=6u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(0));
        }
        let ids: Vec<u32> =
            buffer.copy_sequences(3, 6).unwrap().iter().map(|r| r.method_id()).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_copy_sequences_rejects_overwritten_start() {
        let buffer = EventBuffer::new(4);
        for id in 1..=7u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(0));
        }
        assert!(buffer.copy_sequences(2, 7).is_none());
        assert!(buffer.copy_sequences(4, 7).is_some());
    }

    #[test]
    fn test_copy_sequences_rejects_reversed_range() {
        let buffer = EventBuffer::new(8);
        for id in 1..=4u32 {
            buffer.write(EventKind::Enter, MethodId(id), TimeOffset(0));
        }
        assert!(buffer.copy_sequences(4, 3).is_none());
        assert_eq!(buffer.copy_sequences(0, 0), Some(Vec::new()));
        assert_eq!(buffer.copy_sequences(0, 2).map(|r| r.len()), Some(2));
    }

    #[test]
    fn test_concurrent_writers_claim_distinct_slots() {
        let buffer = std::sync::Arc::new(EventBuffer::new(4_000));
        let handles: Vec<_> = (0..4u32)
            .map(|thread| {
                let buffer = std::sync::Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        buffer.write(EventKind::Enter, MethodId(thread + 1), TimeOffset(0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.total_written(), 4_000);
        let records = buffer.records_oldest_first();
        for thread in 1..=4u32 {
            assert_eq!(records.iter().filter(|r| r.method_id() == thread).count(), 1_000);
        }
    }
}
