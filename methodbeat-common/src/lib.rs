//! # Packed Event Records (Call Sites ↔ Consumers)
//!
//! Defines the 64-bit record layout shared between the recording engine and
//! anything that later decodes the event buffer (stack reconstruction,
//! evil-method analysis, external dump tools).
//!
//! ## Layout
//!
//! ```text
//!  63  62                  43 42                                    0
//! ┌───┬──────────────────────┬───────────────────────────────────────┐
//! │ K │      method id       │         time offset (ms)              │
//! └───┴──────────────────────┴───────────────────────────────────────┘
//!  K = 1 for ENTER, 0 for EXIT
//! ```
//!
//! ## Key Types
//!
//! - [`EventKind`] - ENTER or EXIT
//! - [`EventRecord`] - one packed buffer slot

#![no_std]

// ============================================================================
// Layout Constants
// ============================================================================

/// Number of bits used by the method id field.
pub const METHOD_ID_BITS: u32 = 20;

/// Number of bits used by the time offset field.
pub const TIME_OFFSET_BITS: u32 = 43;

/// Largest value representable in the method id field.
pub const METHOD_ID_MAX: u32 = (1 << METHOD_ID_BITS) - 1;

/// Reserved id written at host loop dispatch boundaries.
pub const METHOD_ID_DISPATCH: u32 = METHOD_ID_MAX - 1;

/// Reserved id substituted for application ids that do not fit below the
/// reserved range.
pub const METHOD_ID_OVERFLOW: u32 = METHOD_ID_MAX;

/// Mask selecting the time offset bits.
pub const TIME_OFFSET_MASK: u64 = (1 << TIME_OFFSET_BITS) - 1;

const KIND_SHIFT: u32 = 63;
const METHOD_ID_SHIFT: u32 = TIME_OFFSET_BITS;

// ============================================================================
// Record Types
// ============================================================================

/// Direction of a recorded method boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// Method entry
    Enter,
    /// Method exit
    Exit,
}

/// One packed 64-bit slot of the event buffer.
///
/// The zero value decodes as an EXIT of method 0 at offset 0, which is what an
/// untouched slot of a freshly allocated buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct EventRecord(pub u64);

impl EventRecord {
    /// Pack a record.
    ///
    /// `method_id` is truncated to [`METHOD_ID_BITS`] and `time_offset_ms`
    /// wraps modulo 2^[`TIME_OFFSET_BITS`].
    #[inline]
    #[must_use]
    pub const fn pack(kind: EventKind, method_id: u32, time_offset_ms: u64) -> Self {
        let kind_bit: u64 = match kind {
            EventKind::Enter => 1,
            EventKind::Exit => 0,
        };
        let id = (method_id & METHOD_ID_MAX) as u64;
        Self(
            (kind_bit << KIND_SHIFT)
                | (id << METHOD_ID_SHIFT)
                | (time_offset_ms & TIME_OFFSET_MASK),
        )
    }

    /// Raw 64-bit value as stored in the buffer.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> EventKind {
        if self.0 >> KIND_SHIFT == 1 {
            EventKind::Enter
        } else {
            EventKind::Exit
        }
    }

    #[inline]
    #[must_use]
    pub const fn method_id(self) -> u32 {
        ((self.0 >> METHOD_ID_SHIFT) as u32) & METHOD_ID_MAX
    }

    /// Milliseconds since the tracer epoch, modulo 2^43.
    #[inline]
    #[must_use]
    pub const fn time_offset(self) -> u64 {
        self.0 & TIME_OFFSET_MASK
    }

    /// True for the reserved dispatch-boundary id.
    #[inline]
    #[must_use]
    pub const fn is_dispatch_marker(self) -> bool {
        self.method_id() == METHOD_ID_DISPATCH
    }
}

/// Elapsed milliseconds between two offsets, tolerating one wrap of the
/// 43-bit offset field.
#[inline]
#[must_use]
pub const fn offset_delta(from: u64, to: u64) -> u64 {
    to.wrapping_sub(from) & TIME_OFFSET_MASK
}
