//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep method ids, thread ids and buffer positions
//! from being mixed up at call sites that take several integers.

use methodbeat_common::{METHOD_ID_DISPATCH, METHOD_ID_OVERFLOW};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrumented method identifier
///
/// Assigned by the application's instrumentation step. Only the low 20 bits
/// are recorded; the two topmost values are reserved for markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u32);

impl MethodId {
    /// Dispatch-boundary marker
    pub const DISPATCH: MethodId = MethodId(METHOD_ID_DISPATCH);

    /// Stand-in for ids that collide with or exceed the reserved range
    pub const OVERFLOW: MethodId = MethodId(METHOD_ID_OVERFLOW);

    /// Id as it will be stored in a record.
    ///
    /// Application ids at or above [`MethodId::DISPATCH`] are folded onto
    /// [`MethodId::OVERFLOW`] so they can never be mistaken for a dispatch
    /// boundary.
    #[must_use]
    pub fn recordable(self) -> MethodId {
        if self.0 >= METHOD_ID_DISPATCH {
            MethodId::OVERFLOW
        } else {
            self
        }
    }

    #[must_use]
    pub fn is_reserved(self) -> bool {
        self.0 >= METHOD_ID_DISPATCH
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MethodId::DISPATCH => write!(f, "Method#dispatch"),
            MethodId::OVERFLOW => write!(f, "Method#overflow"),
            MethodId(id) => write!(f, "Method#{id}"),
        }
    }
}

impl From<u32> for MethodId {
    fn from(id: u32) -> Self {
        MethodId(id)
    }
}

/// Calling thread identifier
///
/// Opaque to the tracer except for the optional loop-thread filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Slot index inside the event buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position(pub usize);

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Milliseconds since the tracer epoch
///
/// Relative, and wraps after 2^43 ms. Never compare across wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOffset(pub u64);

impl TimeOffset {
    /// Milliseconds elapsed from `earlier` to `self`
    #[must_use]
    pub fn since(self, earlier: TimeOffset) -> u64 {
        methodbeat_common::offset_delta(earlier.0, self.0)
    }
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids_fold_to_overflow() {
        assert_eq!(MethodId(7).recordable(), MethodId(7));
        assert_eq!(MethodId::DISPATCH.recordable(), MethodId::OVERFLOW);
        assert_eq!(MethodId(u32::MAX).recordable(), MethodId::OVERFLOW);
        assert!(MethodId::OVERFLOW.is_reserved());
    }

    #[test]
    fn test_display() {
        assert_eq!(MethodId(42).to_string(), "Method#42");
        assert_eq!(MethodId::DISPATCH.to_string(), "Method#dispatch");
        assert_eq!(Position(3).to_string(), "@3");
        assert_eq!(TimeOffset(12).since(TimeOffset(2)), 10);
    }
}
