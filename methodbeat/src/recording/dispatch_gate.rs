//! Dispatch gate: host loop activity drives the time keeper.
//!
//! Begin resumes the refresh thread, end parks it. Repeated begins or ends
//! without the opposite notification in between are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::looper::DispatchListener;

use super::TimeKeeper;

#[derive(Debug)]
pub struct DispatchGate {
    keeper: Arc<TimeKeeper>,
    dispatching: AtomicBool,
}

impl DispatchGate {
    #[must_use]
    pub fn new(keeper: Arc<TimeKeeper>) -> Self {
        Self { keeper, dispatching: AtomicBool::new(false) }
    }

    /// Returns `true` if this call opened a dispatch.
    pub fn begin(&self) -> bool {
        if self.dispatching.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.keeper.resume();
        true
    }

    /// Returns `true` if this call closed an open dispatch.
    pub fn end(&self) -> bool {
        if !self.dispatching.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.keeper.pause();
        true
    }

    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn keeper(&self) -> &Arc<TimeKeeper> {
        &self.keeper
    }
}

impl DispatchListener for DispatchGate {
    fn on_dispatch_begin(&self) {
        self.begin();
    }

    fn on_dispatch_end(&self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate() -> DispatchGate {
        let keeper = TimeKeeper::spawn(Duration::from_millis(2), Box::new(|| true)).unwrap();
        DispatchGate::new(keeper)
    }

    #[test]
    fn test_begin_resumes_and_end_pauses() {
        let gate = gate();
        assert!(gate.keeper().is_paused());

        assert!(gate.begin());
        assert!(!gate.keeper().is_paused());
        assert!(gate.is_dispatching());

        assert!(gate.end());
        assert!(gate.keeper().is_paused());
        gate.keeper().shutdown();
    }

    #[test]
    fn test_repeated_notifications_are_noops() {
        let gate = gate();
        assert!(gate.begin());
        assert!(!gate.begin());
        assert!(gate.end());
        assert!(!gate.end());
        gate.keeper().shutdown();
    }

    #[test]
    fn test_end_without_begin_is_ignored() {
        let gate = gate();
        gate.on_dispatch_end();
        assert!(!gate.is_dispatching());
        assert!(gate.keeper().is_paused());
        gate.keeper().shutdown();
    }
}
