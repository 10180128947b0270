//! # methodbeat - Method Enter/Exit Tracer
//!
//! methodbeat records every instrumented method entry and exit into a fixed
//! circular buffer of packed 64-bit records, cheaply enough to leave on in
//! production. Consumers bookmark positions in the buffer, copy out the
//! records between two bookmarks and look for slow ("evil") calls.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Instrumented Application                      │
//! │         record_enter(id, tid) / record_exit(id, tid)            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ lock-free writes
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    methodbeat (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Lifecycle   │──▶│    Event     │◀──│    Index     │         │
//! │  │  Controller  │   │    Buffer    │   │   Registry   │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                   ▲                                   │
//! │         ▼                   │ cached ms offset                  │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │   Dispatch   │──▶│     Time     │                            │
//! │  │     Gate     │   │    Keeper    │                            │
//! │  └──────────────┘   └──────────────┘                            │
//! │         ▲                                                       │
//! │         │ begin / end                                           │
//! │  ┌──────────────┐                     ┌──────────────┐          │
//! │  │ Loop Monitor │                     │   Analysis   │          │
//! │  │ (host loop)  │                     │ (evil calls) │          │
//! │  └──────────────┘                     └──────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`recording`]: the pieces call sites touch
//!   - `event_buffer`: circular array of packed records
//!   - `index_registry`: bookmarks into the buffer, kept sorted by position
//!   - `time_keeper`: background thread maintaining the cached ms offset
//!   - `dispatch_gate`: pauses the time keeper while the host loop is idle
//!
//! - [`lifecycle`]: [`MethodBeat`], its status machine and timers
//!
//! - [`looper`]: dispatch listener traits, [`LoopMonitor`] and a small
//!   single-threaded [`WorkLoop`]
//!
//! - [`analysis`]: slow-call detection over copied records
//!
//! - [`config`]: [`TracerConfig`] and its defaults
//!
//! - [`cli`]: command-line arguments of the `methodbeat` binary
//!
//! - [`domain`]: newtypes (`MethodId`, `ThreadId`, `Position`, `TimeOffset`)
//!   and error enums
//!
//! ## Record Layout
//!
//! ```text
//!  63   62                 43 42                                  0
//! ┌────┬─────────────────────┬─────────────────────────────────────┐
//! │kind│      method id      │        ms offset from epoch         │
//! └────┴─────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! Method ids `0xFFFFE` and `0xFFFFF` are reserved for dispatch markers and
//! ids that do not fit. See `methodbeat-common`.
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use methodbeat::{LoopMonitor, MethodBeat, TracerConfig};
//! use methodbeat::domain::{MethodId, ThreadId};
//!
//! let monitor = Arc::new(LoopMonitor::new());
//! let tracer = MethodBeat::new(TracerConfig::default(), monitor).unwrap();
//! tracer.start().unwrap();
//!
//! let begin = tracer.mark("frame").unwrap();
//! tracer.record_enter(MethodId(42), ThreadId(1));
//! tracer.record_exit(MethodId(42), ThreadId(1));
//! let records = tracer.copy_between(&begin, None);
//! begin.release();
//!
//! let slow = methodbeat::analysis::find_evil_methods(&records, 700);
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod looper;
pub mod recording;

pub use config::TracerConfig;
pub use lifecycle::{MethodBeat, MethodEnterListener, Status};
pub use looper::{DispatchListener, LoopMonitor, LoopObserver, WorkLoop};
pub use methodbeat_common::{EventKind, EventRecord};
