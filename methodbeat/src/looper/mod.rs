//! Host loop side
//!
//! - `monitor`: listener traits and the begin/end fan-out
//! - `work_loop`: a small single-threaded job loop that drives a monitor

pub mod monitor;
pub mod work_loop;

pub use monitor::{DispatchListener, LoopMonitor, LoopObserver};
pub use work_loop::{current_thread_id, WorkLoop};
