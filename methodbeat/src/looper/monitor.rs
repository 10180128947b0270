//! # Loop Monitor
//!
//! Fans the host loop's "dispatch begin / dispatch end" notifications out to
//! registered listeners.
//!
//! How the notifications are obtained from a real host loop (message logging
//! hooks, patched dispatchers, ...) is platform specific and lives outside
//! this crate. Whatever adapter does it only needs to call
//! [`LoopMonitor::dispatch_begin`] and [`LoopMonitor::dispatch_end`] once per
//! unit of work.
//!
//! ## Per-listener state
//!
//! Each registration tracks whether its dispatch is open, so a listener never
//! sees two begins or two ends in a row. A listener that turns invalid while a
//! dispatch is open still receives the closing end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

/// Receiver of host loop dispatch boundaries.
pub trait DispatchListener: Send + Sync {
    /// Listeners reporting `false` are skipped, except for closing an open
    /// dispatch.
    fn is_valid(&self) -> bool {
        true
    }

    fn on_dispatch_begin(&self);

    fn on_dispatch_end(&self);
}

/// Registration point offered by the host loop observer.
pub trait LoopObserver: Send + Sync {
    fn register(&self, listener: Arc<dyn DispatchListener>);

    fn unregister(&self, listener: &Arc<dyn DispatchListener>);
}

struct Registration {
    listener: Arc<dyn DispatchListener>,
    dispatch_started: AtomicBool,
}

fn same_listener(a: &Arc<dyn DispatchListener>, b: &Arc<dyn DispatchListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[derive(Default)]
pub struct LoopMonitor {
    registrations: Mutex<Vec<Arc<Registration>>>,
}

impl LoopMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Registration>>> {
        self.registrations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listeners are called outside the registration lock, so a callback may
    /// register or unregister without deadlocking.
    fn snapshot(&self) -> Vec<Arc<Registration>> {
        self.lock().clone()
    }

    pub fn dispatch_begin(&self) {
        for registration in self.snapshot() {
            if registration.listener.is_valid()
                && !registration.dispatch_started.swap(true, Ordering::AcqRel)
            {
                registration.listener.on_dispatch_begin();
            }
        }
    }

    pub fn dispatch_end(&self) {
        for registration in self.snapshot() {
            if registration.dispatch_started.swap(false, Ordering::AcqRel) {
                registration.listener.on_dispatch_end();
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every registration, closing any dispatch still open.
    pub fn release(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        for registration in drained {
            if registration.dispatch_started.swap(false, Ordering::AcqRel) {
                registration.listener.on_dispatch_end();
            }
        }
        debug!("[loop_monitor] released");
    }
}

impl LoopObserver for LoopMonitor {
    fn register(&self, listener: Arc<dyn DispatchListener>) {
        let mut registrations = self.lock();
        if registrations.iter().any(|r| same_listener(&r.listener, &listener)) {
            return;
        }
        registrations
            .push(Arc::new(Registration { listener, dispatch_started: AtomicBool::new(false) }));
    }

    fn unregister(&self, listener: &Arc<dyn DispatchListener>) {
        self.lock().retain(|r| !same_listener(&r.listener, listener));
    }
}

impl std::fmt::Debug for LoopMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopMonitor").field("listeners", &self.listener_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        valid: AtomicBool,
        begins: AtomicUsize,
        ends: AtomicUsize,
    }

    impl Counting {
        fn valid() -> Arc<Self> {
            let listener = Self::default();
            listener.valid.store(true, Ordering::SeqCst);
            Arc::new(listener)
        }
    }

    impl DispatchListener for Counting {
        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
        fn on_dispatch_begin(&self) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }
        fn on_dispatch_end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_alternating_dispatch_reaches_listener() {
        let monitor = LoopMonitor::new();
        let listener = Counting::valid();
        monitor.register(listener.clone());

        for _ in 0..3 {
            monitor.dispatch_begin();
            monitor.dispatch_end();
        }
        assert_eq!(listener.begins.load(Ordering::SeqCst), 3);
        assert_eq!(listener.ends.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_duplicate_notifications_are_collapsed() {
        let monitor = LoopMonitor::new();
        let listener = Counting::valid();
        monitor.register(listener.clone());

        monitor.dispatch_end();
        monitor.dispatch_begin();
        monitor.dispatch_begin();
        monitor.dispatch_end();
        monitor.dispatch_end();
        assert_eq!(listener.begins.load(Ordering::SeqCst), 1);
        assert_eq!(listener.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_listener_still_gets_closing_end() {
        let monitor = LoopMonitor::new();
        let listener = Counting::valid();
        monitor.register(listener.clone());

        monitor.dispatch_begin();
        listener.valid.store(false, Ordering::SeqCst);
        monitor.dispatch_end();
        monitor.dispatch_begin();

        assert_eq!(listener.begins.load(Ordering::SeqCst), 1);
        assert_eq!(listener.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_twice_and_unregister() {
        let monitor = LoopMonitor::new();
        let listener: Arc<dyn DispatchListener> = Counting::valid();
        monitor.register(Arc::clone(&listener));
        monitor.register(Arc::clone(&listener));
        assert_eq!(monitor.listener_count(), 1);

        monitor.unregister(&listener);
        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_release_closes_open_dispatch() {
        let monitor = LoopMonitor::new();
        let listener = Counting::valid();
        monitor.register(listener.clone());

        monitor.dispatch_begin();
        monitor.release();
        assert_eq!(listener.ends.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.listener_count(), 0);
    }
}
