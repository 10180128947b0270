//! Lifecycle control
//!
//! - `status`: the ranked status values and a lock-free status cell
//! - `deadline`: one-shot cancellable timers for idle release and start expiry
//! - `controller`: [`MethodBeat`], which owns the recording components and
//!   drives every status transition

pub mod controller;
pub mod deadline;
pub mod status;

pub use controller::{MethodBeat, MethodEnterListener};
pub use deadline::Deadline;
pub use status::{Status, StatusCell};
