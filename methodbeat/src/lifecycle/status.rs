//! Tracer status and its integer ranking.
//!
//! Ranks are compared, not just matched: "alive" means rank ≥ STARTED,
//! "actively tracing" means rank ≥ READY, and recording is refused at or below
//! STOPPED. `Default` sits at the very top so a tracer nobody has touched yet
//! never reads as stopped.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Constructed, nothing instrumented yet
    Default = i32::MAX,
    /// Recording with a client attached
    Started = 2,
    /// Brought up by the first instrumented call, waiting for `start()`
    Ready = 1,
    Stopped = -1,
    /// Nobody called `start()` within the expiry window
    ExpiredStart = -2,
    /// Never used; resources freed
    Released = -3,
}

impl Status {
    #[inline]
    #[must_use]
    pub const fn rank(self) -> i32 {
        self as i32
    }

    fn from_rank(rank: i32) -> Self {
        match rank {
            2 => Status::Started,
            1 => Status::Ready,
            -1 => Status::Stopped,
            -2 => Status::ExpiredStart,
            -3 => Status::Released,
            _ => Status::Default,
        }
    }

    /// `start()` is legal from here (besides the lazy path out of `Default`).
    #[must_use]
    pub const fn can_start(self) -> bool {
        self.rank() >= Status::ExpiredStart.rank() && self.rank() < Status::Started.rank()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Default => "DEFAULT",
            Status::Started => "STARTED",
            Status::Ready => "READY",
            Status::Stopped => "STOPPED",
            Status::ExpiredStart => "EXPIRED_START",
            Status::Released => "OUT_OF_RELEASE",
        };
        write!(f, "{name}({})", self.rank())
    }
}

/// Status readable without a lock. Writers serialize on the controller's
/// status lock; this cell does not enforce that.
#[derive(Debug)]
pub struct StatusCell(AtomicI32);

impl StatusCell {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self(AtomicI32::new(status.rank()))
    }

    #[inline]
    #[must_use]
    pub fn rank(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Status {
        Status::from_rank(self.rank())
    }

    pub(crate) fn set(&self, status: Status) {
        self.0.store(status.rank(), Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.rank() >= Status::Started.rank()
    }

    #[inline]
    #[must_use]
    pub fn is_actively_tracing(&self) -> bool {
        self.rank() >= Status::Ready.rank()
    }

    /// Above STOPPED: instrumented calls are still accepted.
    #[inline]
    #[must_use]
    pub fn accepts_records(&self) -> bool {
        self.rank() > Status::Stopped.rank()
    }
}
