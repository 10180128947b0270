//! Recording engine
//!
//! The pieces instrumented call sites touch, leaves first:
//! - Event buffer: lock-free circular array of packed records
//! - Index registry: sorted bookmarks into the buffer
//! - Time keeper: cached millisecond offset refreshed by a background thread
//! - Dispatch gate: host loop begin/end → time keeper resume/pause

pub mod dispatch_gate;
pub mod event_buffer;
pub mod index_registry;
pub mod time_keeper;

pub use dispatch_gate::DispatchGate;
pub use event_buffer::EventBuffer;
pub use index_registry::{Bookmark, IndexRecord, IndexRegistry};
pub use time_keeper::{KeepRunning, TimeKeeper};
